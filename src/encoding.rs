//! Printable byte encoding shared by basic auth and request signing.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::Result;

#[must_use]
pub fn encode<T: AsRef<[u8]>>(bytes: T) -> String {
    STANDARD.encode(bytes)
}

pub fn decode<T: AsRef<[u8]>>(text: T) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}
