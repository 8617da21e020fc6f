// https://www.postgresql.org/docs/16/protocol-message-formats.html

// Used in the StartupMessage to indicate regular handshake.
pub const PROTOCOL_VERSION_NUMBER: i32 = 0x0003_0000;

// Backend message type bytes.
pub const AUTHENTICATION: u8 = b'R';
pub const BACKEND_KEY_DATA: u8 = b'K';
pub const BIND_COMPLETE: u8 = b'2';
pub const CLOSE_COMPLETE: u8 = b'3';
pub const COMMAND_COMPLETE: u8 = b'C';
pub const COPY_BOTH_RESPONSE: u8 = b'W';
pub const COPY_IN_RESPONSE: u8 = b'G';
pub const COPY_OUT_RESPONSE: u8 = b'H';
pub const DATA_ROW: u8 = b'D';
pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
pub const ERROR_RESPONSE: u8 = b'E';
pub const FUNCTION_CALL_RESPONSE: u8 = b'V';
pub const NEGOTIATE_PROTOCOL_VERSION: u8 = b'v';
pub const NO_DATA: u8 = b'n';
pub const NOTICE_RESPONSE: u8 = b'N';
pub const NOTIFICATION_RESPONSE: u8 = b'A';
pub const PARAMETER_DESCRIPTION: u8 = b't';
pub const PARAMETER_STATUS: u8 = b'S';
pub const PARSE_COMPLETE: u8 = b'1';
pub const PORTAL_SUSPENDED: u8 = b's';
pub const READY_FOR_QUERY: u8 = b'Z';
pub const ROW_DESCRIPTION: u8 = b'T';

// Frontend message type bytes.
// PasswordMessage, SASLInitialResponse and SASLResponse share the same identifier.
pub const PASSWORD_MESSAGE: u8 = b'p';
pub const SASL_INITIAL_RESPONSE: u8 = b'p';
pub const SASL_RESPONSE: u8 = b'p';
pub const QUERY: u8 = b'Q';
pub const SYNC: u8 = b'S';
pub const FLUSH: u8 = b'H';
pub const TERMINATE: u8 = b'X';

// AuthenticationOk
pub const AUTHENTICATION_SUCCESSFUL: i32 = 0;
pub const AUTHENTICATION_KERBEROS_V5: i32 = 2;
// AuthenticationCleartextPassword
pub const AUTHENTICATION_CLEAR_PASSWORD: i32 = 3;
// AuthenticationMD5Password
pub const MD5_ENCRYPTED_PASSWORD: i32 = 5;
pub const AUTHENTICATION_GSS: i32 = 7;
pub const AUTHENTICATION_GSS_CONTINUE: i32 = 8;
pub const AUTHENTICATION_SSPI: i32 = 9;

// SASL
pub const SASL: i32 = 10;
pub const SASL_CONTINUE: i32 = 11;
pub const SASL_FINAL: i32 = 12;
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";
pub const SCRAM_SHA_256_PLUS: &str = "SCRAM-SHA-256-PLUS";
pub const MD5_PASSWORD_PREFIX: &str = "md5";
pub const NONCE_LENGTH: usize = 24;

// ErrorResponse: A code identifying the field type; if zero, this is the message terminator and no string follows.
pub const MESSAGE_TERMINATOR: u8 = 0;

// https://www.postgresql.org/docs/16/protocol-error-fields.html
pub const FIELD_SEVERITY: u8 = b'S';
pub const FIELD_SEVERITY_NON_LOCALIZED: u8 = b'V';
pub const FIELD_CODE: u8 = b'C';
pub const FIELD_MESSAGE: u8 = b'M';
pub const FIELD_DETAIL: u8 = b'D';
pub const FIELD_HINT: u8 = b'H';
pub const FIELD_POSITION: u8 = b'P';
pub const FIELD_INTERNAL_POSITION: u8 = b'p';
pub const FIELD_INTERNAL_QUERY: u8 = b'q';
pub const FIELD_WHERE: u8 = b'W';
pub const FIELD_SCHEMA_NAME: u8 = b's';
pub const FIELD_TABLE_NAME: u8 = b't';
pub const FIELD_COLUMN_NAME: u8 = b'c';
pub const FIELD_DATA_TYPE_NAME: u8 = b'd';
pub const FIELD_CONSTRAINT_NAME: u8 = b'n';
pub const FIELD_FILE: u8 = b'F';
pub const FIELD_LINE: u8 = b'L';
pub const FIELD_ROUTINE: u8 = b'R';

// Startup parameters.
pub const PARAM_USER: &str = "user";
pub const PARAM_DATABASE: &str = "database";
// https://www.postgresql.org/docs/16/runtime-config-client.html
pub const PARAM_APPLICATION_NAME: &str = "application_name";
pub const PARAM_CLIENT_ENCODING: &str = "client_encoding";
pub const PARAM_DATE_STYLE: &str = "DateStyle";
pub const CLIENT_ENCODING_UTF8: &str = "utf8";
pub const DATE_STYLE_ISO: &str = "ISO";

pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";
