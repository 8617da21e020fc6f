//! Helpers shared by the unit tests.

use crate::config::PgProperties;

/// Turn `"R[00000008][00000000]"` into bytes: text outside brackets is taken
/// literally, bracketed text is hex.
pub fn mixed_hex(s: &str) -> Vec<u8> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find('[') {
        out.extend_from_slice(rest[..start].as_bytes());
        let end = start + rest[start..].find(']').expect("unclosed bracket");
        let hex = &rest[start + 1..end];
        for i in (0..hex.len()).step_by(2) {
            out.push(u8::from_str_radix(&hex[i..i + 2], 16).expect("bad hex"));
        }
        rest = &rest[end + 1..];
    }
    out.extend_from_slice(rest.as_bytes());
    out
}

pub fn test_properties() -> PgProperties {
    PgProperties {
        username: "test-user".to_string(),
        password: "test-password".into(),
        database: "test-db".to_string(),
        application_name: "test-app".to_string(),
        ..Default::default()
    }
}

/// Backend reply for trust authentication: AuthenticationOk, BackendKeyData,
/// ReadyForQuery(idle).
pub fn trust_reply() -> Vec<u8> {
    mixed_hex("R[00000008][00000000]K[0000000c][00000457][0000162e]Z[00000005]I")
}

#[test]
fn mixed_hex_parses_brackets() {
    assert_eq!(
        mixed_hex("Z[00000005]I"),
        vec![b'Z', 0, 0, 0, 5, b'I']
    );
    assert_eq!(mixed_hex("r=a]b"), b"r=a]b".to_vec());
}
