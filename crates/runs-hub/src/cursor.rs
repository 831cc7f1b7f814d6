//! Client-facing pagination cursors
//!
//! A cursor wraps the store's continuation token with an offset into that
//! page and the page size in use. It is URL-safe base64 over JSON without
//! padding: transparent to anyone who decodes it, not tamper-proof.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

const CURSOR_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded pagination position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub token: Option<String>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl Cursor {
    pub fn new(token: Option<String>, skip: usize, page_size: usize) -> Self {
        Self {
            token,
            skip,
            page_size: Some(page_size),
        }
    }

    /// Encode for a client, or `None` at the start of the listing.
    ///
    /// The start position never encodes to a present-but-empty cursor.
    pub fn encode(&self) -> Option<String> {
        if self.token.is_none() && self.skip == 0 {
            return None;
        }
        let json = serde_json::to_vec(self).ok()?;
        Some(CURSOR_ENGINE.encode(json))
    }

    /// Decode a cursor from a client. Absent or blank input is the start.
    pub fn decode(cursor: Option<&str>) -> Result<Self, CursorError> {
        let raw = match cursor.map(str::trim) {
            None | Some("") => return Ok(Self::default()),
            Some(raw) => raw,
        };

        let bytes = CURSOR_ENGINE.decode(raw).map_err(CursorError::Base64)?;
        let mut decoded: Cursor = serde_json::from_slice(&bytes).map_err(CursorError::Json)?;
        decoded.page_size = decoded.page_size.filter(|size| *size > 0);
        Ok(decoded)
    }
}

#[derive(Debug)]
pub enum CursorError {
    Base64(base64::DecodeError),
    Json(serde_json::Error),
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::Base64(err) => write!(f, "cursor is not valid base64: {}", err),
            CursorError::Json(err) => write!(f, "cursor payload is invalid: {}", err),
        }
    }
}

impl std::error::Error for CursorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CursorError::Base64(err) => Some(err),
            CursorError::Json(err) => Some(err),
        }
    }
}
