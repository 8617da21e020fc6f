// External crate imports
use bytes::BufMut;
use md5::{Digest, Md5};

// Internal crate imports
use crate::constants::*;
use crate::errors::Error;
use crate::messages::socket::{write_empty_message, write_message, FlushMode};
use crate::messages::types::BytesMutWriter;

/// Session parameters sent in the StartupMessage.
#[derive(Debug, Clone, PartialEq)]
pub struct StartupParameters<'a> {
    pub user: &'a str,
    pub database: &'a str,
    pub application_name: &'a str,
}

impl StartupParameters<'_> {
    /// Configurable parameters first, then the hard-coded ones.
    pub fn as_pairs(&self) -> [(&str, &str); 5] {
        [
            (PARAM_USER, self.user),
            (PARAM_DATABASE, self.database),
            (PARAM_APPLICATION_NAME, self.application_name),
            (PARAM_CLIENT_ENCODING, CLIENT_ENCODING_UTF8),
            (PARAM_DATE_STYLE, DATE_STYLE_ISO),
        ]
    }
}

/// Send startup message to the server.
/// https://www.postgresql.org/docs/16/protocol-message-formats.html#PROTOCOL-MESSAGE-FORMATS-STARTUPMESSAGE
pub async fn startup<S>(stream: &mut S, params: &StartupParameters<'_>) -> Result<(), Error>
where
    S: tokio::io::AsyncWrite + std::marker::Unpin,
{
    write_message(stream, None, FlushMode::Immediate, |bytes| {
        bytes.put_i32(PROTOCOL_VERSION_NUMBER);
        bytes.put_params(&params.as_pairs());
    })
    .await
}

/// Create md5 password hash given a salt.
pub fn md5_hash_password(user: &str, password: &str, salt: &[u8]) -> Vec<u8> {
    let mut md5 = Md5::new();

    // First pass
    md5.update(password.as_bytes());
    md5.update(user.as_bytes());

    let output = md5.finalize_reset();

    // Second pass
    md5.update(format!("{output:x}"));
    md5.update(salt);

    format!("{MD5_PASSWORD_PREFIX}{:x}", md5.finalize()).into_bytes()
}

/// PasswordMessage carrying either the cleartext password or its md5 hash.
/// https://www.postgresql.org/docs/16/protocol-message-formats.html#PROTOCOL-MESSAGE-FORMATS-PASSWORDMESSAGE
pub async fn password_message<S>(stream: &mut S, password: &[u8]) -> Result<(), Error>
where
    S: tokio::io::AsyncWrite + std::marker::Unpin,
{
    write_message(stream, Some(PASSWORD_MESSAGE), FlushMode::Immediate, |bytes| {
        bytes.put_cstring(password);
    })
    .await
}

/// Send password challenge response to the server.
/// This is the MD5 challenge.
pub async fn md5_password<S>(
    stream: &mut S,
    user: &str,
    password: &str,
    salt: &[u8],
) -> Result<(), Error>
where
    S: tokio::io::AsyncWrite + std::marker::Unpin,
{
    let password = md5_hash_password(user, password, salt);
    password_message(stream, &password).await
}

/// https://www.postgresql.org/docs/16/protocol-message-formats.html#PROTOCOL-MESSAGE-FORMATS-SASLINITIALRESPONSE
pub async fn sasl_initial_response<S>(
    stream: &mut S,
    mechanism: &str,
    client_first: &[u8],
) -> Result<(), Error>
where
    S: tokio::io::AsyncWrite + std::marker::Unpin,
{
    let client_first_len = match i32::try_from(client_first.len()) {
        Ok(len) => len,
        Err(_) => {
            return Err(Error::ScramClientError(
                "client-first-message is too large".to_string(),
            ))
        }
    };
    write_message(
        stream,
        Some(SASL_INITIAL_RESPONSE),
        FlushMode::Immediate,
        |bytes| {
            bytes.put_cstring(mechanism.as_bytes());
            bytes.put_i32(client_first_len);
            bytes.put_slice(client_first);
        },
    )
    .await
}

/// https://www.postgresql.org/docs/16/protocol-message-formats.html#PROTOCOL-MESSAGE-FORMATS-SASLRESPONSE
pub async fn sasl_response<S>(stream: &mut S, client_final: &[u8]) -> Result<(), Error>
where
    S: tokio::io::AsyncWrite + std::marker::Unpin,
{
    write_message(stream, Some(SASL_RESPONSE), FlushMode::Immediate, |bytes| {
        bytes.put_slice(client_final);
    })
    .await
}

/// https://www.postgresql.org/docs/16/protocol-message-formats.html#PROTOCOL-MESSAGE-FORMATS-TERMINATE
pub async fn terminate<S>(stream: &mut S) -> Result<(), Error>
where
    S: tokio::io::AsyncWrite + std::marker::Unpin,
{
    write_empty_message(stream, TERMINATE, FlushMode::Immediate).await
}
