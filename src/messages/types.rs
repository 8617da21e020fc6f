// External crate imports
use bytes::{Buf, BufMut, BytesMut};

// Internal crate imports
use crate::errors::Error;

/// Trait for reading strings from BytesMut
pub trait BytesMutReader {
    fn read_string(&mut self) -> Result<String, Error>;
    fn read_string_or_none(&mut self) -> Result<Option<String>, Error>;
}

impl BytesMutReader for BytesMut {
    /// Should only be used when reading strings from the message protocol.
    /// Can be used to read multiple strings from the same message which are separated by the null byte
    fn read_string(&mut self) -> Result<String, Error> {
        let null_index = self.iter().position(|&byte| byte == b'\0');

        match null_index {
            Some(index) => {
                let string_bytes = self.split_to(index + 1);
                match std::str::from_utf8(&string_bytes[..index]) {
                    Ok(string) => Ok(string.to_string()),
                    Err(err) => Err(Error::ParseBytesError(format!(
                        "Invalid UTF-8 in string: {err}"
                    ))),
                }
            }
            None => Err(Error::ParseBytesError("Could not read string".to_string())),
        }
    }

    /// Reads the next string of a zero-terminated list.
    /// Returns None on the list terminator (which is consumed) or on an exhausted buffer.
    fn read_string_or_none(&mut self) -> Result<Option<String>, Error> {
        match self.first() {
            None => Ok(None),
            Some(0) => {
                self.advance(1);
                Ok(None)
            }
            Some(_) => self.read_string().map(Some),
        }
    }
}

/// Trait for writing C-strings and parameter lists into BytesMut.
pub trait BytesMutWriter {
    fn put_cstring(&mut self, value: &[u8]);
    fn put_param(&mut self, name: &str, value: &str);
    fn put_params(&mut self, params: &[(&str, &str)]);
}

impl BytesMutWriter for BytesMut {
    fn put_cstring(&mut self, value: &[u8]) {
        self.put_slice(value);
        self.put_u8(0);
    }

    fn put_param(&mut self, name: &str, value: &str) {
        self.put_cstring(name.as_bytes());
        self.put_cstring(value.as_bytes());
    }

    /// name/value pairs followed by the list terminator.
    fn put_params(&mut self, params: &[(&str, &str)]) {
        for (name, value) in params {
            self.put_param(name, value);
        }
        self.put_u8(0);
    }
}
