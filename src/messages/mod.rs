// Helper functions to frame protocol messages and handle the transport stream.

// Declare submodules
pub mod backend;
pub mod config_socket;
pub mod error;
pub mod protocol;
pub mod socket;
pub mod types;

// Re-export public items
pub use backend::{Authentication, BackendMessage, TransactionStatus};
pub use config_socket::{configure_tcp_socket, configure_unix_socket};
pub use error::{read_error_fields, PgErrorMsg};
pub use protocol::{
    md5_hash_password, md5_password, password_message, sasl_initial_response, sasl_response,
    startup, terminate, StartupParameters,
};
pub use socket::{
    encode_message, read_message, read_message_header, read_message_payload, write_all,
    write_all_flush, write_empty_message, write_message, FlushMode,
};
pub use types::{BytesMutReader, BytesMutWriter};

// Constants
pub const MAX_MESSAGE_SIZE: i32 = 256 * 1024 * 1024;

// Tests
#[cfg(test)]
mod tests;
