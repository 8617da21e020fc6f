// External crate imports
use bytes::{Buf, Bytes, BytesMut};

// Internal crate imports
use crate::constants::*;
use crate::errors::Error;
use crate::messages::error::PgErrorMsg;
use crate::messages::types::BytesMutReader;

/// Authentication request sub-type ('R' message), decoded from its 4-byte code.
#[derive(Debug, Clone, PartialEq)]
pub enum Authentication {
    Ok,
    CleartextPassword,
    Md5Password { salt: [u8; 4] },
    Sasl { mechanisms: Vec<String> },
    SaslContinue(Bytes),
    SaslFinal(Bytes),
    Unsupported(i32),
}

/// Transaction status indicator carried by ReadyForQuery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Idle,
    InTransaction,
    Failed,
}

/// Backend messages that may arrive during startup. Anything else is `Unsupported`.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMessage {
    Authentication(Authentication),
    ParameterStatus { name: String, value: String },
    BackendKeyData { process_id: i32, secret_key: i32 },
    ErrorResponse(PgErrorMsg),
    NoticeResponse(PgErrorMsg),
    ReadyForQuery(TransactionStatus),
    Unsupported(u8),
}

fn ensure_remaining(bytes: &BytesMut, needed: usize, what: &str) -> Result<(), Error> {
    if bytes.remaining() < needed {
        return Err(Error::ProtocolSyncError(format!(
            "{what} message is too short: {} bytes",
            bytes.remaining()
        )));
    }
    Ok(())
}

impl Authentication {
    fn decode(mut bytes: BytesMut) -> Result<Authentication, Error> {
        ensure_remaining(&bytes, 4, "Authentication")?;
        let auth_code = bytes.get_i32();

        let auth = match auth_code {
            AUTHENTICATION_SUCCESSFUL => Authentication::Ok,
            AUTHENTICATION_CLEAR_PASSWORD => Authentication::CleartextPassword,
            MD5_ENCRYPTED_PASSWORD => {
                ensure_remaining(&bytes, 4, "AuthenticationMD5Password")?;
                let mut salt = [0u8; 4];
                bytes.copy_to_slice(&mut salt);
                Authentication::Md5Password { salt }
            }
            SASL => {
                let mut mechanisms = Vec::new();
                while let Some(mechanism) = bytes.read_string_or_none()? {
                    mechanisms.push(mechanism);
                }
                Authentication::Sasl { mechanisms }
            }
            SASL_CONTINUE => Authentication::SaslContinue(bytes.freeze()),
            SASL_FINAL => Authentication::SaslFinal(bytes.freeze()),
            code => Authentication::Unsupported(code),
        };
        Ok(auth)
    }
}

impl BackendMessage {
    /// Decode a message from its type byte and payload (the bytes after the length).
    pub fn decode(code: u8, mut bytes: BytesMut) -> Result<BackendMessage, Error> {
        let message = match code {
            AUTHENTICATION => BackendMessage::Authentication(Authentication::decode(bytes)?),
            PARAMETER_STATUS => {
                let name = bytes.read_string()?;
                let value = bytes.read_string()?;
                BackendMessage::ParameterStatus { name, value }
            }
            BACKEND_KEY_DATA => {
                ensure_remaining(&bytes, 8, "BackendKeyData")?;
                BackendMessage::BackendKeyData {
                    process_id: bytes.get_i32(),
                    secret_key: bytes.get_i32(),
                }
            }
            ERROR_RESPONSE => BackendMessage::ErrorResponse(PgErrorMsg::parse(bytes)?),
            NOTICE_RESPONSE => BackendMessage::NoticeResponse(PgErrorMsg::parse(bytes)?),
            READY_FOR_QUERY => {
                ensure_remaining(&bytes, 1, "ReadyForQuery")?;
                let status = match bytes.get_u8() {
                    b'I' => TransactionStatus::Idle,
                    b'T' => TransactionStatus::InTransaction,
                    b'E' => TransactionStatus::Failed,
                    other => {
                        return Err(Error::ProtocolSyncError(format!(
                            "Unknown transaction status: {}",
                            other as char
                        )))
                    }
                };
                BackendMessage::ReadyForQuery(status)
            }
            other => BackendMessage::Unsupported(other),
        };
        Ok(message)
    }
}
