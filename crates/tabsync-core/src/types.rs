//! Strong type definitions for peer and correlation identifiers.
//!
//! Both identifiers are random 16-byte newtypes so an instance id can never be
//! passed where a correlation id is expected.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

macro_rules! random_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            /// Generate a fresh random identifier.
            pub fn random() -> Self {
                use rand::Rng;
                Self(rand::thread_rng().gen())
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from a 32-digit hex string. Hyphens are ignored, so
            /// UUID text such as `6f1c2b3a-0d4e-4f5a-9b6c-7d8e9f0a1b2c`
            /// parses too.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let digits: String = s.chars().filter(|c| *c != '-').collect();
                let bytes = hex::decode(digits)?;
                let arr: [u8; 16] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..8])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; 16]> for $name {
            fn from(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

random_id!(
    /// Identity of one running channel manager.
    ///
    /// Generated once per manager and stamped on every outbound message so the
    /// manager can recognise and drop its own echoes.
    InstanceId
);

random_id!(
    /// Correlation id linking a REQUEST to its RESPONSE, or a SYNC_START to
    /// its SYNC_END.
    SyncId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_hex_roundtrip() {
        let id = InstanceId::from_bytes([0x42; 16]);
        let recovered = InstanceId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(SyncId::from_hex("abcd").is_err());
        assert!(SyncId::from_hex("zz").is_err());
    }

    #[test]
    fn test_from_hex_accepts_uuid_text() {
        let id = InstanceId::from_hex("6f1c2b3a-0d4e-4f5a-9b6c-7d8e9f0a1b2c").unwrap();
        assert_eq!(id.to_hex(), "6f1c2b3a0d4e4f5a9b6c7d8e9f0a1b2c");

        let back: InstanceId =
            serde_json::from_str("\"6F1C2B3A-0D4E-4F5A-9B6C-7D8E9F0A1B2C\"").unwrap();
        assert_eq!(back, id);
        // Still sixteen bytes, however it is punctuated.
        assert!(InstanceId::from_hex("6f1c2b3a-0d4e").is_err());
    }

    #[test]
    fn test_debug_is_truncated() {
        let id = SyncId::from_bytes([0xab; 16]);
        assert_eq!(format!("{:?}", id), "SyncId(abababab)");
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(InstanceId::random(), InstanceId::random());
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let id = InstanceId::from_bytes([0x01; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(16)));
        let back: InstanceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
