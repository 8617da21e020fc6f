// Standard library imports
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

// External crate imports
use bytes::{Buf, BytesMut};

// Internal crate imports
use crate::constants::*;
use crate::errors::Error;
use crate::messages::types::BytesMutReader;

/// PostgreSQL error message structure, used for both ErrorResponse and NoticeResponse.
/// See: https://www.postgresql.org/docs/16/protocol-error-fields.html
#[derive(Debug, Default, PartialEq, Clone)]
pub struct PgErrorMsg {
    pub severity: String,                       // S
    pub severity_non_localized: Option<String>, // V
    pub code: String,                           // C
    pub message: String,                        // M
    pub detail: Option<String>,                 // D
    pub hint: Option<String>,                   // H
    pub position: Option<u32>,                  // P
    pub internal_position: Option<u32>,         // p
    pub internal_query: Option<String>,         // q
    pub where_context: Option<String>,          // W
    pub schema_name: Option<String>,            // s
    pub table_name: Option<String>,             // t
    pub column_name: Option<String>,            // c
    pub data_type_name: Option<String>,         // d
    pub constraint_name: Option<String>,        // n
    pub file_name: Option<String>,              // F
    pub line: Option<u32>,                      // L
    pub routine: Option<String>,                // R
}

impl Display for PgErrorMsg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} [{}]", self.severity, self.message, self.code)?;

        if let Some(val) = &self.detail {
            write!(f, "[detail: {val}]")?;
        }
        if let Some(val) = &self.hint {
            write!(f, "[hint: {val}]")?;
        }
        if let Some(val) = &self.where_context {
            write!(f, "[where: {val}]")?;
        }
        if let Some(val) = &self.routine {
            write!(f, "[routine: {val}]")?;
        }

        Ok(())
    }
}

/// Read the field list of an ErrorResponse/NoticeResponse body:
/// (field type byte, C-string) pairs up to a zero field type.
pub fn read_error_fields(bytes: &mut BytesMut) -> Result<HashMap<u8, String>, Error> {
    let mut fields = HashMap::new();

    loop {
        if !bytes.has_remaining() {
            return Err(Error::ParseBytesError(
                "error fields are not terminated".to_string(),
            ));
        }
        let field_type = bytes.get_u8();
        if field_type == MESSAGE_TERMINATOR {
            return Ok(fields);
        }
        let value = bytes.read_string()?;
        fields.insert(field_type, value);
    }
}

impl PgErrorMsg {
    /// Parse a PostgreSQL error message body.
    pub fn parse(mut bytes: BytesMut) -> Result<PgErrorMsg, Error> {
        let fields = read_error_fields(&mut bytes)?;
        Ok(PgErrorMsg::from_fields(fields))
    }

    /// Build the typed message from parsed fields. A missing message becomes "Unknown error".
    pub fn from_fields(mut fields: HashMap<u8, String>) -> PgErrorMsg {
        let number = |value: Option<String>| value.map(|v| v.parse::<u32>().unwrap_or(0));

        PgErrorMsg {
            severity: fields.remove(&FIELD_SEVERITY).unwrap_or_default(),
            severity_non_localized: fields.remove(&FIELD_SEVERITY_NON_LOCALIZED),
            code: fields.remove(&FIELD_CODE).unwrap_or_default(),
            message: fields
                .remove(&FIELD_MESSAGE)
                .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
            detail: fields.remove(&FIELD_DETAIL),
            hint: fields.remove(&FIELD_HINT),
            position: number(fields.remove(&FIELD_POSITION)),
            internal_position: number(fields.remove(&FIELD_INTERNAL_POSITION)),
            internal_query: fields.remove(&FIELD_INTERNAL_QUERY),
            where_context: fields.remove(&FIELD_WHERE),
            schema_name: fields.remove(&FIELD_SCHEMA_NAME),
            table_name: fields.remove(&FIELD_TABLE_NAME),
            column_name: fields.remove(&FIELD_COLUMN_NAME),
            data_type_name: fields.remove(&FIELD_DATA_TYPE_NAME),
            constraint_name: fields.remove(&FIELD_CONSTRAINT_NAME),
            file_name: fields.remove(&FIELD_FILE),
            line: number(fields.remove(&FIELD_LINE)),
            routine: fields.remove(&FIELD_ROUTINE),
        }
    }
}
