//! Decoded variable-length records

use serde::{Deserialize, Serialize};

/// One decoded record, typically an instruction
///
/// `bytes` holds the raw encoding and `text` its rendered form; the cache
/// only interprets `address` and `size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub address: u64,
    pub size: u32,
    #[serde(default, with = "hex_bytes")]
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub text: String,
}

impl Record {
    pub fn new(address: u64, size: u32, bytes: Vec<u8>, text: impl Into<String>) -> Self {
        Self {
            address,
            size,
            bytes,
            text: text.into(),
        }
    }

    /// First address past this record, saturating at `u64::MAX`
    pub fn end(&self) -> u64 {
        self.address.saturating_add(u64::from(self.size.max(1)))
    }

    /// Whether `address` falls inside this record
    pub fn covers(&self, address: u64) -> bool {
        address >= self.address && address < self.end()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
