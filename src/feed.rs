//! External volatility feed
//!
//! A sidecar process (an indicator running inside the trading terminal)
//! writes the current volatility estimate to a one-field JSON document. The
//! terminal writes UTF-16 with a BOM, so the reader sniffs the encoding
//! before parsing. A value of exactly 0.0 is the documented "unavailable"
//! sentinel and acts as a global circuit breaker for entries and trailing.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct FeedDocument {
    #[serde(default)]
    atr_value: f64,
}

/// Reader for the volatility feed document
pub struct VolatilityFeed {
    path: PathBuf,
}

impl VolatilityFeed {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Current volatility estimate in price units.
    ///
    /// Any read or parse failure resolves to the 0.0 sentinel so callers
    /// treat it exactly like an explicit "unavailable".
    pub fn read(&self) -> f64 {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    "Volatility feed {} unreadable ({}), treating as unavailable",
                    self.path.display(),
                    e
                );
                return 0.0;
            }
        };

        let text = decode_feed_text(&bytes);
        match serde_json::from_str::<FeedDocument>(&text) {
            Ok(doc) => doc.atr_value,
            Err(e) => {
                warn!(
                    "Volatility feed {} malformed ({}), treating as unavailable",
                    self.path.display(),
                    e
                );
                0.0
            }
        }
    }

    /// True when the feed currently reports the unavailable sentinel
    pub fn is_unavailable(&self) -> bool {
        self.read() == 0.0
    }
}

/// Decode feed bytes as UTF-16 when a BOM is present, UTF-8 otherwise
fn decode_feed_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => utf16_to_string(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => utf16_to_string(rest, u16::from_be_bytes),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn utf16_to_string(bytes: &[u8], from_bytes: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| from_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
