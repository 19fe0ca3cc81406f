//! Opaque pagination cursors
//!
//! A cursor names a sort-key boundary and the side of it the next page lies
//! on. It is serialized as JSON and base64url-encoded without padding so it
//! can travel in a query string untouched.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

/// Side of the boundary a cursor points to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorDirection {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "k")]
    pub sort_key: String,
    #[serde(rename = "d")]
    pub direction: CursorDirection,
}

impl Cursor {
    pub fn before(sort_key: impl Into<String>) -> Self {
        Self {
            sort_key: sort_key.into(),
            direction: CursorDirection::Before,
        }
    }

    pub fn after(sort_key: impl Into<String>) -> Self {
        Self {
            sort_key: sort_key.into(),
            direction: CursorDirection::After,
        }
    }

    pub fn encode(&self) -> String {
        // Serializing a struct of a String and a unit enum cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| Error::InvalidCursor(format!("{}: {}", token, e)))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::InvalidCursor(format!("{}: {}", token, e)))
    }

    /// Decode a token and require it to point in `expected` direction
    pub fn decode_expecting(token: &str, expected: CursorDirection) -> Result<Self> {
        let cursor = Self::decode(token)?;
        if cursor.direction != expected {
            return Err(Error::InvalidCursor(format!(
                "{}: expected a {:?} cursor",
                token, expected
            )));
        }
        Ok(cursor)
    }
}
