pub mod scram;

use crate::errors::Error;

pub use scram::ScramSha256;

/// The client half of a SASL SCRAM exchange. The handshake decides when each
/// step runs; the implementation owns the nonce and the key derivation.
pub trait ScramClient: Send {
    /// `n,,n=<user>,r=<client-nonce>`
    fn client_first_message(&mut self) -> Result<Vec<u8>, Error>;

    /// Consume `r=<nonce>,s=<salt>,i=<iterations>`.
    fn server_first_message(&mut self, message: &str) -> Result<(), Error>;

    /// `c=biws,r=<nonce>,p=<proof>`
    fn client_final_message(&mut self) -> Result<Vec<u8>, Error>;

    /// Verify `v=<server-signature>`. Fails on a bad signature or `e=<error>`.
    fn server_final_message(&mut self, message: &str) -> Result<(), Error>;
}
