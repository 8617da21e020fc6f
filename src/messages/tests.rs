// Tests for the messages module
// This file contains tests for framing, the frontend messages and backend decoding

// Standard library imports
use std::io::Error as IoError;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

// External crate imports
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, BufWriter, ReadBuf};

// Internal crate imports
use crate::constants::*;
use crate::errors::Error;
use crate::messages::*;
use crate::test_utils::mixed_hex;

// Mock implementation for AsyncReadExt: hands out at most `chunk` bytes per read.
struct MockReader {
    data: Vec<u8>,
    position: usize,
    chunk: usize,
}

impl MockReader {
    fn new(data: Vec<u8>, chunk: usize) -> MockReader {
        MockReader {
            data,
            position: 0,
            chunk,
        }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

impl AsyncRead for MockReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<(), IoError>> {
        let to_copy = self.chunk.min(buf.remaining()).min(self.remaining());
        let start = self.position;
        buf.put_slice(&self.data[start..start + to_copy]);
        self.position += to_copy;

        Poll::Ready(Ok(()))
    }
}

// Mock implementation for AsyncWriteExt
#[derive(Default)]
struct MockWriter {
    written: Arc<Mutex<Vec<u8>>>,
    flushes: Arc<AtomicUsize>,
}

impl AsyncWrite for MockWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, IoError>> {
        self.written.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), IoError>> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), IoError>> {
        Poll::Ready(Ok(()))
    }
}

fn decode(message: &str) -> Result<BackendMessage, Error> {
    let bytes = mixed_hex(message);
    BackendMessage::decode(bytes[0], BytesMut::from(&bytes[5..]))
}

#[test]
fn test_encode_message() {
    let message = encode_message(Some(b'Q'), |bytes| bytes.put_cstring(b"select 1")).unwrap();
    assert_eq!(&message[..], &mixed_hex("Q[0000000d]select 1[00]")[..]);

    let message = encode_message(None, |_| {}).unwrap();
    assert_eq!(&message[..], &mixed_hex("[00000004]")[..]);
}

#[tokio::test]
async fn test_framing_round_trip() {
    use bytes::BufMut;

    let payloads: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![b'I'],
        b"user\0\0x\0".to_vec(),
        (0..64 * 1024).map(|i| (i % 251) as u8).collect(),
    ];

    let mut stream = Vec::new();
    for (i, payload) in payloads.iter().enumerate() {
        let message = encode_message(Some(b'a' + i as u8), |bytes| bytes.put_slice(payload)).unwrap();
        let len = i32::from_be_bytes([message[1], message[2], message[3], message[4]]);
        assert_eq!(len as usize, payload.len() + 4);
        stream.extend_from_slice(&message);
    }

    let mut reader = MockReader::new(stream, 1000);
    for (i, payload) in payloads.iter().enumerate() {
        let (code, read) = read_message(&mut reader).await.unwrap();
        assert_eq!(code, b'a' + i as u8);
        assert_eq!(&read[..], &payload[..]);
    }
    assert_eq!(reader.remaining(), 0);
}

#[tokio::test]
async fn test_startup_message() {
    let mut buf = Vec::new();
    startup(
        &mut buf,
        &StartupParameters {
            user: "test-user",
            database: "test-db",
            application_name: "test-app",
        },
    )
    .await
    .unwrap();

    assert_eq!(
        buf,
        mixed_hex("[00000066][00030000]user[00]test-user[00]database[00]test-db[00]application_name[00]test-app[00]client_encoding[00]utf8[00]DateStyle[00]ISO[00][00]")
    );
}

#[tokio::test]
async fn test_empty_message() {
    let mut buf = Vec::new();
    write_empty_message(&mut buf, TERMINATE, FlushMode::Immediate)
        .await
        .unwrap();
    write_empty_message(&mut buf, SYNC, FlushMode::Deferred)
        .await
        .unwrap();
    assert_eq!(buf, mixed_hex("X[00000004]S[00000004]"));
}

#[tokio::test]
async fn test_deferred_flush_stays_buffered() {
    let writer = MockWriter::default();
    let written = writer.written.clone();
    let flushes = writer.flushes.clone();
    let mut stream = BufWriter::new(writer);

    write_empty_message(&mut stream, SYNC, FlushMode::Deferred)
        .await
        .unwrap();
    assert!(written.lock().unwrap().is_empty());
    assert_eq!(flushes.load(Ordering::SeqCst), 0);

    write_empty_message(&mut stream, FLUSH, FlushMode::Immediate)
        .await
        .unwrap();
    assert_eq!(
        *written.lock().unwrap(),
        mixed_hex("S[00000004]H[00000004]")
    );
    assert_eq!(flushes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_md5_hash_password() {
    let hash = md5_hash_password("test-user", "test-password", &[0x34, 0xac, 0x9b, 0x4f]);
    assert_eq!(hash, b"md5d0083471c712392fd3ba76ada9f85d3c".to_vec());
}

#[tokio::test]
async fn test_md5_password_message() {
    let mut buf = Vec::new();
    md5_password(&mut buf, "test-user", "test-password", &[0x34, 0xac, 0x9b, 0x4f])
        .await
        .unwrap();
    assert_eq!(
        buf,
        mixed_hex("p[00000028]md5d0083471c712392fd3ba76ada9f85d3c[00]")
    );
}

#[tokio::test]
async fn test_sasl_messages() {
    let mut buf = Vec::new();
    sasl_initial_response(&mut buf, SCRAM_SHA_256, b"n,,n=test-user,r=Zr_UEQW:@]US$3;>;OWTSOJF")
        .await
        .unwrap();
    assert_eq!(
        buf,
        mixed_hex("p[0000003f]SCRAM-SHA-256[00][00000029]n,,n=test-user,r=Zr_UEQW:@]US$3;>;OWTSOJF")
    );

    let mut buf = Vec::new();
    sasl_response(&mut buf, b"c=biws").await.unwrap();
    assert_eq!(buf, mixed_hex("p[0000000a]c=biws"));
}

#[tokio::test]
async fn test_read_message_in_small_chunks() {
    let data = mixed_hex("R[00000008][00000000]Z[00000005]I");
    let mut reader = MockReader::new(data, 3);

    let (code, payload) = read_message(&mut reader).await.unwrap();
    assert_eq!(code, AUTHENTICATION);
    assert_eq!(&payload[..], &[0, 0, 0, 0]);

    // Only the first message was consumed.
    assert_eq!(reader.remaining(), 6);
    let (code, payload) = read_message(&mut reader).await.unwrap();
    assert_eq!(code, READY_FOR_QUERY);
    assert_eq!(&payload[..], b"I");
}

#[tokio::test]
async fn test_read_message_header_short_read() {
    let mut reader = MockReader::new(mixed_hex("R[0000]"), 64);
    let err = read_message_header(&mut reader).await.unwrap_err();
    assert!(matches!(err, Error::ProtocolSyncError(_)));
}

#[tokio::test]
async fn test_read_message_payload_short_read() {
    let mut reader = MockReader::new(mixed_hex("[000000]"), 64);
    let err = read_message_payload(&mut reader, b'S', 8).await.unwrap_err();
    assert!(matches!(err, Error::ProtocolSyncError(_)));
}

#[tokio::test]
async fn test_read_message_payload_bad_length() {
    let mut reader = MockReader::new(Vec::new(), 64);
    let err = read_message_payload(&mut reader, b'R', 3).await.unwrap_err();
    assert!(matches!(err, Error::ProtocolSyncError(_)));

    let err = read_message_payload(&mut reader, b'R', MAX_MESSAGE_SIZE + 1)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProtocolSyncError(_)));

    // An empty payload needs no bytes at all.
    let payload = read_message_payload(&mut reader, b'R', 4).await.unwrap();
    assert!(payload.is_empty());
}

#[test]
fn test_decode_authentication() {
    assert_eq!(
        decode("R[00000008][00000000]").unwrap(),
        BackendMessage::Authentication(Authentication::Ok)
    );
    assert_eq!(
        decode("R[00000008][00000003]").unwrap(),
        BackendMessage::Authentication(Authentication::CleartextPassword)
    );
    assert_eq!(
        decode("R[0000000c][00000005][34ac9b4f]").unwrap(),
        BackendMessage::Authentication(Authentication::Md5Password {
            salt: [0x34, 0xac, 0x9b, 0x4f]
        })
    );
    assert_eq!(
        decode("R[0000002a][0000000a]SCRAM-SHA-256-PLUS[00]SCRAM-SHA-256[00][00]").unwrap(),
        BackendMessage::Authentication(Authentication::Sasl {
            mechanisms: vec![SCRAM_SHA_256_PLUS.to_string(), SCRAM_SHA_256.to_string()]
        })
    );
    assert_eq!(
        decode("R[0000000d][0000000b]r=abc").unwrap(),
        BackendMessage::Authentication(Authentication::SaslContinue(Bytes::from_static(
            b"r=abc"
        )))
    );
    assert_eq!(
        decode("R[0000000c][0000000c]v=xy").unwrap(),
        BackendMessage::Authentication(Authentication::SaslFinal(Bytes::from_static(b"v=xy")))
    );
    assert_eq!(
        decode("R[00000008][00000002]").unwrap(),
        BackendMessage::Authentication(Authentication::Unsupported(
            AUTHENTICATION_KERBEROS_V5
        ))
    );
}

#[test]
fn test_decode_truncated_authentication() {
    assert!(matches!(
        decode("R[00000006][0000]"),
        Err(Error::ProtocolSyncError(_))
    ));
    assert!(matches!(
        decode("R[0000000a][00000005][34ac]"),
        Err(Error::ProtocolSyncError(_))
    ));
}

#[test]
fn test_decode_startup_messages() {
    assert_eq!(
        decode("S[00000011]TimeZone[00]UTC[00]").unwrap(),
        BackendMessage::ParameterStatus {
            name: "TimeZone".to_string(),
            value: "UTC".to_string()
        }
    );
    assert_eq!(
        decode("K[0000000c][00000457][0000162e]").unwrap(),
        BackendMessage::BackendKeyData {
            process_id: 1111,
            secret_key: 5678
        }
    );
    assert_eq!(
        decode("Z[00000005]T").unwrap(),
        BackendMessage::ReadyForQuery(TransactionStatus::InTransaction)
    );
    assert!(matches!(
        decode("Z[00000005]?"),
        Err(Error::ProtocolSyncError(_))
    ));
    assert_eq!(
        decode("D[00000006][0000]").unwrap(),
        BackendMessage::Unsupported(b'D')
    );
}

#[test]
fn test_decode_error_response() {
    let message = decode("E[00000069]SFATAL[00]VFATAL[00]C28P01[00]Mpassword authentication failed for user \"test-user\"[00]Fauth.c[00]L323[00]Rauth_failed[00][00]").unwrap();
    let err = match message {
        BackendMessage::ErrorResponse(err) => err,
        other => panic!("unexpected message {other:?}"),
    };

    assert_eq!(err.severity, "FATAL");
    assert_eq!(err.severity_non_localized.as_deref(), Some("FATAL"));
    assert_eq!(err.code, "28P01");
    assert_eq!(
        err.message,
        "password authentication failed for user \"test-user\""
    );
    assert_eq!(err.file_name.as_deref(), Some("auth.c"));
    assert_eq!(err.line, Some(323));
    assert_eq!(
        err.to_string(),
        "FATAL: password authentication failed for user \"test-user\" [28P01][routine: auth_failed]"
    );
}

#[test]
fn test_error_response_without_message() {
    let err = PgErrorMsg::parse(BytesMut::from(&mixed_hex("SERROR[00]CXX000[00][00]")[..])).unwrap();
    assert_eq!(err.message, UNKNOWN_ERROR_MESSAGE);
    assert_eq!(err.code, "XX000");
}

#[test]
fn test_error_fields_unterminated() {
    let mut bytes = BytesMut::from(&mixed_hex("SERROR[00]")[..]);
    assert!(matches!(
        read_error_fields(&mut bytes),
        Err(Error::ParseBytesError(_))
    ));

    let mut bytes = BytesMut::from(&b"Mno terminator"[..]);
    assert!(matches!(
        read_error_fields(&mut bytes),
        Err(Error::ParseBytesError(_))
    ));
}

#[test]
fn test_notice_response() {
    let message = decode("N[0000001c]SWARNING[00]C01000[00]Mhello[00][00]").unwrap();
    match message {
        BackendMessage::NoticeResponse(notice) => {
            assert_eq!(notice.severity, "WARNING");
            assert_eq!(notice.code, "01000");
            assert_eq!(notice.message, "hello");
        }
        other => panic!("unexpected message {other:?}"),
    }
}
