// Standard library imports
use std::io::ErrorKind;

// External crate imports
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// Internal crate imports
use crate::errors::Error;
use crate::messages::MAX_MESSAGE_SIZE;

/// Whether a written message is flushed to the transport right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    #[default]
    Immediate,
    /// Leave the bytes in the stream's buffer; the caller flushes a batch later.
    Deferred,
}

/// Frame a message: `[code][len][payload]`, where len counts itself and the payload.
/// The startup message has no code.
pub fn encode_message<F>(code: Option<u8>, build: F) -> Result<BytesMut, Error>
where
    F: FnOnce(&mut BytesMut),
{
    let mut payload = BytesMut::new();
    build(&mut payload);

    let len = match i32::try_from(payload.len() + 4) {
        Ok(len) if len <= MAX_MESSAGE_SIZE => len,
        _ => {
            return Err(Error::ProtocolSyncError(format!(
                "Message length is too large: {}",
                payload.len() + 4
            )))
        }
    };

    let mut message = BytesMut::with_capacity(payload.len() + 5);
    if let Some(code) = code {
        message.put_u8(code);
    }
    message.put_i32(len);
    message.put(payload);
    Ok(message)
}

/// Write all data in the buffer to the stream.
pub async fn write_all<S>(stream: &mut S, buf: &[u8]) -> Result<(), Error>
where
    S: tokio::io::AsyncWrite + std::marker::Unpin,
{
    match stream.write_all(buf).await {
        Ok(_) => Ok(()),
        Err(err) => Err(Error::SocketError(format!(
            "Error writing to socket: {err:?}"
        ))),
    }
}

/// Write all the data in the buffer to the stream and flush the stream.
pub async fn write_all_flush<S>(stream: &mut S, buf: &[u8]) -> Result<(), Error>
where
    S: tokio::io::AsyncWrite + std::marker::Unpin,
{
    write_all(stream, buf).await?;
    match stream.flush().await {
        Ok(_) => Ok(()),
        Err(err) => Err(Error::SocketError(format!(
            "Error flushing socket: {err:?}"
        ))),
    }
}

/// Build a message with `build` and write it.
pub async fn write_message<S, F>(
    stream: &mut S,
    code: Option<u8>,
    flush: FlushMode,
    build: F,
) -> Result<(), Error>
where
    S: tokio::io::AsyncWrite + std::marker::Unpin,
    F: FnOnce(&mut BytesMut),
{
    let message = encode_message(code, build)?;
    match flush {
        FlushMode::Immediate => write_all_flush(stream, &message).await,
        FlushMode::Deferred => write_all(stream, &message).await,
    }
}

/// Write a message without payload, e.g. Sync or Terminate.
pub async fn write_empty_message<S>(stream: &mut S, code: u8, flush: FlushMode) -> Result<(), Error>
where
    S: tokio::io::AsyncWrite + std::marker::Unpin,
{
    write_message(stream, Some(code), flush, |_| {}).await
}

fn read_error(what: &str, code: Option<u8>, err: std::io::Error) -> Error {
    let code = code.map(|c| format!(" - Code: {:?},", c as char)).unwrap_or_default();
    match err.kind() {
        ErrorKind::UnexpectedEof => Error::ProtocolSyncError(format!(
            "Stream closed while reading {what}{code} Error: {err:?}"
        )),
        _ => Error::SocketError(format!(
            "Error reading {what} from socket{code} Error: {err:?}"
        )),
    }
}

/// Read message header.
pub async fn read_message_header<S>(stream: &mut S) -> Result<(u8, i32), Error>
where
    S: tokio::io::AsyncRead + std::marker::Unpin,
{
    let code = match stream.read_u8().await {
        Ok(code) => code,
        Err(err) => return Err(read_error("message code", None, err)),
    };
    let len = match stream.read_i32().await {
        Ok(len) => len,
        Err(err) => return Err(read_error("message len", Some(code), err)),
    };

    Ok((code, len))
}

/// Read the payload of a message whose header has already been read.
/// Exactly `len - 4` bytes are consumed.
pub async fn read_message_payload<S>(stream: &mut S, code: u8, len: i32) -> Result<BytesMut, Error>
where
    S: tokio::io::AsyncRead + std::marker::Unpin,
{
    if len < 4 {
        return Err(Error::ProtocolSyncError(format!(
            "Message length is too small: {len}"
        )));
    }

    if len > MAX_MESSAGE_SIZE {
        return Err(Error::ProtocolSyncError(format!(
            "Message length is too large: {len}"
        )));
    }

    let mut payload = BytesMut::zeroed(len as usize - 4);

    match stream.read_exact(&mut payload).await {
        Ok(_) => Ok(payload),
        Err(err) => Err(read_error("message data", Some(code), err)),
    }
}

/// Read a complete message from the stream, returning its code and payload.
pub async fn read_message<S>(stream: &mut S) -> Result<(u8, BytesMut), Error>
where
    S: tokio::io::AsyncRead + std::marker::Unpin,
{
    let (code, len) = read_message_header(stream).await?;
    let payload = read_message_payload(stream, code, len).await?;
    Ok((code, payload))
}
