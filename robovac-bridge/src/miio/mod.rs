//! Client for the vendor's local control protocol (miIO).
//!
//! The protocol is UDP request/response on port 54321. A session starts
//! with a plaintext hello handshake that reveals the device id and its
//! clock; afterwards every request carries a JSON payload encrypted with
//! keys derived from the device's secret token. See [`packet`] for the
//! wire format and [`MiioDevice`] for the session client.

mod device;
pub mod packet;

pub use device::{MiioConnector, MiioDevice};

use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Device secret token: 16 bytes, configured as 32 hex characters.
///
/// The token doubles as key material for payload encryption, so it never
/// appears in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Token([u8; 16]);

impl Token {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Hex form, as configured.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// AES key: `md5(token)`.
    pub(crate) fn key(&self) -> [u8; 16] {
        Md5::digest(self.0).into()
    }

    /// AES IV: `md5(key ‖ token)`.
    pub(crate) fn iv(&self) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(self.key());
        hasher.update(self.0);
        hasher.finalize().into()
    }
}

impl FromStr for Token {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|_| Error::Config("token is not valid hex".into()))?;
        let bytes: [u8; 16] = bytes.try_into().map_err(|_| {
            Error::Config("token must be 32 hex characters".into())
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(..)")
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
