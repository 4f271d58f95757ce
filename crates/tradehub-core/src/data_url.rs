//! `data:<mime>;base64,<payload>` URLs.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{AppError, AppResult};

const SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub payload: String,
}

impl DataUrl {
    pub fn new(mime_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            payload: payload.into(),
        }
    }

    /// Encode raw bytes.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self::new(mime_type, STANDARD.encode(bytes))
    }

    pub fn parse(input: &str) -> AppResult<Self> {
        let rest = input
            .strip_prefix(SCHEME)
            .ok_or_else(|| AppError::Decode("data URL must start with 'data:'".to_string()))?;

        let marker = rest.find(BASE64_MARKER).ok_or_else(|| {
            AppError::Decode("data URL must carry a ';base64,' payload".to_string())
        })?;

        let mime_type = &rest[..marker];
        let payload = &rest[marker + BASE64_MARKER.len()..];

        if mime_type.is_empty() {
            return Err(AppError::Decode("data URL has no MIME type".to_string()));
        }

        if !is_base64_text(payload) {
            return Err(AppError::Decode(
                "data URL payload is not valid base64 text".to_string(),
            ));
        }

        Ok(Self::new(mime_type, payload))
    }

    /// Approximate decoded byte length: `ceil(payload_len * 3 / 4)`.
    pub fn decoded_len(&self) -> u64 {
        estimated_decoded_len(self.payload.len())
    }

    pub fn decode_bytes(&self) -> AppResult<Vec<u8>> {
        Ok(STANDARD.decode(self.payload.as_bytes())?)
    }
}

impl fmt::Display for DataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}", SCHEME, self.mime_type, BASE64_MARKER, self.payload)
    }
}

impl FromStr for DataUrl {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataUrl::parse(s)
    }
}

/// `ceil(base64_len * 3 / 4)`
pub fn estimated_decoded_len(base64_len: usize) -> u64 {
    (base64_len as u64 * 3).div_ceil(4)
}

/// True when every character belongs to the standard base64 alphabet (padding included).
pub fn is_base64_text(payload: &str) -> bool {
    payload
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=')
}
