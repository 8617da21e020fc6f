use crate::auth::ScramClient;
use crate::config::wipe;
use crate::constants;
use crate::errors::Error;
use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

type HmacSha = Hmac<Sha256>;

// gs2 header without channel binding, and its base64 form for the c= attribute.
const GS2_HEADER: &str = "n,,";
const GS2_HEADER_BASE64: &str = "biws";

enum State {
    Initial,
    ClientFirstSent {
        client_first_bare: String,
    },
    ServerFirstReceived {
        salted_password: [u8; 32],
        auth_message: String,
        client_final_without_proof: String,
    },
    ClientFinalSent {
        salted_password: [u8; 32],
        auth_message: String,
    },
    Done,
}

/// SCRAM-SHA-256 client side of the SASL exchange (RFC 5802 / RFC 7677),
/// without channel binding.
pub struct ScramSha256 {
    username: String,
    password: Vec<u8>,
    nonce: String,
    state: State,
}

/// Generate a printable nonce: 18 random bytes, base64 encoded to 24 chars.
pub fn generate_nonce() -> String {
    let mut rng = rand::rng();
    let key = rng.random::<[u8; 18]>();
    let nonce = general_purpose::STANDARD.encode(key);
    debug_assert_eq!(nonce.len(), constants::NONCE_LENGTH);
    nonce
}

// saslname: ',' and '=' must be escaped.
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

// SASLprep the password; PostgreSQL uses the raw bytes when that fails.
fn normalize(password: &str) -> Vec<u8> {
    match stringprep::saslprep(password) {
        Ok(prepped) => prepped.into_owned().into_bytes(),
        Err(_) => password.as_bytes().to_vec(),
    }
}

// Hi(str, salt, i) from RFC 5802.
fn hi(password: &[u8], salt: &[u8], iterations: u32) -> Result<[u8; 32], Error> {
    let mut mac = hmac(password, salt)?;
    mac.update(&[0, 0, 0, 1]);
    let mut prev = mac.finalize().into_bytes();
    let mut result = [0u8; 32];
    result.copy_from_slice(&prev);

    for _ in 1..iterations {
        prev = hmac(password, &prev)?.finalize().into_bytes();
        for (acc, byte) in result.iter_mut().zip(prev.iter()) {
            *acc ^= byte;
        }
    }

    Ok(result)
}

fn hmac(key: &[u8], data: &[u8]) -> Result<HmacSha, Error> {
    let mut mac = match HmacSha::new_from_slice(key) {
        Ok(mac) => mac,
        Err(err) => return Err(Error::ScramClientError(format!("HMAC key: {err}"))),
    };
    mac.update(data);
    Ok(mac)
}

/// Parses a part of a SCRAM message, after it has been split on commas.
/// Checks to make sure there's a key, and then verifies its the right key.
/// Returns everything after the first '='.
macro_rules! parse_part {
    ($iter:expr, $key:expr) => {
        match $iter.next() {
            Some(part) if part.len() >= 2 && &part.as_bytes()[..2] == $key => &part[2..],
            Some(_) => {
                return Err(Error::ScramServerError(format!(
                    "unexpected field, expected {}",
                    String::from_utf8_lossy($key)
                )))
            }
            None => {
                return Err(Error::ScramServerError(format!(
                    "missing field {}",
                    String::from_utf8_lossy($key)
                )))
            }
        }
    };
}

impl ScramSha256 {
    /// Create a client with a random nonce.
    pub fn new(username: &str, password: &str) -> ScramSha256 {
        ScramSha256::with_nonce(username, password, generate_nonce())
    }

    /// Create a client with a fixed nonce.
    pub fn with_nonce(username: &str, password: &str, nonce: String) -> ScramSha256 {
        ScramSha256 {
            username: username.to_string(),
            password: normalize(password),
            nonce,
            state: State::Initial,
        }
    }
}

impl Drop for ScramSha256 {
    fn drop(&mut self) {
        wipe(&mut self.password);
        match &mut self.state {
            State::ServerFirstReceived {
                salted_password, ..
            }
            | State::ClientFinalSent {
                salted_password, ..
            } => wipe(salted_password),
            _ => {}
        }
    }
}

impl ScramClient for ScramSha256 {
    fn client_first_message(&mut self) -> Result<Vec<u8>, Error> {
        if !matches!(self.state, State::Initial) {
            return Err(Error::ScramClientError(
                "client-first-message already sent".to_string(),
            ));
        }
        let client_first_bare = format!("n={},r={}", escape_username(&self.username), self.nonce);
        let message = format!("{GS2_HEADER}{client_first_bare}");
        self.state = State::ClientFirstSent { client_first_bare };
        Ok(message.into_bytes())
    }

    // r=nonce,s=salt,i=iteration
    fn server_first_message(&mut self, message: &str) -> Result<(), Error> {
        let client_first_bare = match &self.state {
            State::ClientFirstSent { client_first_bare } => client_first_bare.clone(),
            _ => {
                return Err(Error::ScramClientError(
                    "unexpected server-first-message".to_string(),
                ))
            }
        };

        let mut parts = message.split(',');
        let nonce = parse_part!(parts, b"r=");
        let salt = parse_part!(parts, b"s=");
        let iterations = parse_part!(parts, b"i=");

        if !nonce.starts_with(&self.nonce) || nonce.len() == self.nonce.len() {
            return Err(Error::ScramServerError("e=nonce-mismatch".to_string()));
        }
        let salt = match general_purpose::STANDARD.decode(salt) {
            Ok(salt) => salt,
            Err(_) => return Err(Error::ScramServerError("invalid salt".to_string())),
        };
        let iterations = match iterations.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(Error::ScramServerError(format!(
                    "invalid iteration count: {iterations}"
                )))
            }
        };

        let mut salted_password = hi(&self.password, &salt, iterations)?;
        let client_final_without_proof = format!("c={GS2_HEADER_BASE64},r={nonce}");
        // AuthMessage = client-first-bare + "," + server-first + "," + client-final-without-proof
        let auth_message = format!("{client_first_bare},{message},{client_final_without_proof}");

        self.state = State::ServerFirstReceived {
            salted_password,
            auth_message,
            client_final_without_proof,
        };
        wipe(&mut salted_password);
        Ok(())
    }

    fn client_final_message(&mut self) -> Result<Vec<u8>, Error> {
        let (mut salted_password, auth_message, client_final_without_proof) =
            match std::mem::replace(&mut self.state, State::Done) {
                State::ServerFirstReceived {
                    salted_password,
                    auth_message,
                    client_final_without_proof,
                } => (salted_password, auth_message, client_final_without_proof),
                _ => {
                    return Err(Error::ScramClientError(
                        "server-first-message has not been received".to_string(),
                    ))
                }
            };

        // ClientProof = ClientKey XOR HMAC(H(ClientKey), AuthMessage)
        let client_key = hmac(&salted_password, b"Client Key")?.finalize().into_bytes();
        let stored_key = Sha256::digest(client_key);
        let client_signature = hmac(&stored_key, auth_message.as_bytes())?
            .finalize()
            .into_bytes();
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(x, y)| x ^ y)
            .collect();

        let message = format!(
            "{client_final_without_proof},p={}",
            general_purpose::STANDARD.encode(proof)
        );
        self.state = State::ClientFinalSent {
            salted_password,
            auth_message,
        };
        wipe(&mut salted_password);
        Ok(message.into_bytes())
    }

    // v=ServerSignature, or e=server-error-value
    fn server_final_message(&mut self, message: &str) -> Result<(), Error> {
        let (mut salted_password, auth_message) =
            match std::mem::replace(&mut self.state, State::Done) {
                State::ClientFinalSent {
                    salted_password,
                    auth_message,
                } => (salted_password, auth_message),
                _ => {
                    return Err(Error::ScramClientError(
                        "client-final-message has not been sent".to_string(),
                    ))
                }
            };
        let server_key = hmac(&salted_password, b"Server Key");
        wipe(&mut salted_password);
        let server_key = server_key?.finalize().into_bytes();

        if let Some(err) = message.strip_prefix("e=") {
            return Err(Error::ScramServerError(err.to_string()));
        }
        let signature = match message.strip_prefix("v=") {
            Some(signature) => signature.split(',').next().unwrap_or_default(),
            None => {
                return Err(Error::ScramServerError(
                    "unexpected server-final-message".to_string(),
                ))
            }
        };
        let signature = match general_purpose::STANDARD.decode(signature) {
            Ok(signature) => signature,
            Err(_) => {
                return Err(Error::ScramServerError(
                    "invalid server signature encoding".to_string(),
                ))
            }
        };

        // ServerSignature = HMAC(ServerKey, AuthMessage)
        match hmac(&server_key, auth_message.as_bytes())?.verify_slice(&signature) {
            Ok(_) => Ok(()),
            Err(_) => Err(Error::ScramServerError(
                "invalid server signature".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONCE: &str = "Zr_UEQW:@]US$3;>;OWTSOJF";
    const SERVER_FIRST: &str =
        "r=Zr_UEQW:@]US$3;>;OWTSOJFVt7fBPDMwIckFZhqWGSWllyY,s=rD4Klg5kIRdD9Lmh0WIhfA==,i=4096";

    fn client() -> ScramSha256 {
        ScramSha256::with_nonce("test-user", "test-password", NONCE.to_string())
    }

    #[test]
    fn full_exchange() {
        let mut scram = client();

        assert_eq!(
            scram.client_first_message().unwrap(),
            b"n,,n=test-user,r=Zr_UEQW:@]US$3;>;OWTSOJF".to_vec()
        );
        scram.server_first_message(SERVER_FIRST).unwrap();
        assert_eq!(
            String::from_utf8(scram.client_final_message().unwrap()).unwrap(),
            "c=biws,r=Zr_UEQW:@]US$3;>;OWTSOJFVt7fBPDMwIckFZhqWGSWllyY,p=vgKpQ5YXjKrIcvyuopH/bp+7Rhp5we1poCyKkIMyrpI="
        );
        scram
            .server_final_message("v=IpT7VwZ1dlYdlXrfOKJUdS+VVTz+8/Oark1phDOpQFQ=")
            .unwrap();
    }

    #[test]
    fn tampered_server_signature_fails() {
        let mut scram = client();
        scram.client_first_message().unwrap();
        scram.server_first_message(SERVER_FIRST).unwrap();
        scram.client_final_message().unwrap();

        let err = scram
            .server_final_message("v=AAAAVwZ1dlYdlXrfOKJUdS+VVTz+8/Oark1phDOpQFQ=")
            .unwrap_err();
        assert_eq!(
            err,
            Error::ScramServerError("invalid server signature".to_string())
        );
    }

    #[test]
    fn server_error_attribute() {
        let mut scram = client();
        scram.client_first_message().unwrap();
        scram.server_first_message(SERVER_FIRST).unwrap();
        scram.client_final_message().unwrap();

        let err = scram.server_final_message("e=invalid-proof").unwrap_err();
        assert_eq!(err, Error::ScramServerError("invalid-proof".to_string()));
    }

    #[test]
    fn nonce_must_extend_client_nonce() {
        let mut scram = client();
        scram.client_first_message().unwrap();

        let err = scram
            .server_first_message("r=somebodyelse,s=rD4Klg5kIRdD9Lmh0WIhfA==,i=4096")
            .unwrap_err();
        assert_eq!(err, Error::ScramServerError("e=nonce-mismatch".to_string()));
    }

    #[test]
    fn out_of_order_steps_fail() {
        let mut scram = client();
        assert!(scram.server_first_message(SERVER_FIRST).is_err());
        assert!(scram.client_final_message().is_err());
    }

    #[test]
    fn random_nonce_is_printable() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), constants::NONCE_LENGTH);
        assert!(!nonce.contains(','));
        assert_ne!(nonce, generate_nonce());
    }

    #[test]
    fn username_is_escaped() {
        let mut scram = ScramSha256::with_nonce("a=b,c", "pw", "abc".to_string());
        assert_eq!(
            scram.client_first_message().unwrap(),
            b"n,,n=a=3Db=2Cc,r=abc".to_vec()
        );
    }
}
