use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Defines an opaque 64-bit identifier rendered as 16 uppercase hex digits.
macro_rules! hex_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);

        impl $name {
            pub const NONE: Self = Self(0);

            pub fn is_none(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016X}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:016X})"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                u64::from_str_radix(s, 16).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&format_args!("{:016X}", self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                text.parse().map_err(|_| {
                    serde::de::Error::custom(format_args!(
                        concat!("invalid ", stringify!($name), " hex: {:?}"),
                        text
                    ))
                })
            }
        }
    };
}

hex_id! {
    /// Identifies one bundle object on the origin.
    BundleId
}

hex_id! {
    /// Identifies one chunk; doubles as its content-integrity tag.
    ChunkId
}

hex_id! {
    /// Identifies one file entry in the manifest.
    FileId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_zero_padded_uppercase() {
        assert_eq!(BundleId(0xB1).to_string(), "00000000000000B1");
        assert_eq!(ChunkId(u64::MAX).to_string(), "FFFFFFFFFFFFFFFF");
    }

    #[test]
    fn parses_hex_case_insensitively() {
        assert_eq!("00000000000000b1".parse(), Ok(BundleId(0xB1)));
        assert_eq!("DEAD".parse(), Ok(FileId(0xDEAD)));
        assert!("not-hex".parse::<ChunkId>().is_err());
    }

    #[test]
    fn serde_round_trip() {
        let id = ChunkId(0x0123_4567_89AB_CDEF);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0123456789ABCDEF\"");
        assert_eq!(serde_json::from_str::<ChunkId>(&json).unwrap(), id);
    }
}
