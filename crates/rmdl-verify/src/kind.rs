use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;

/// Hash algorithm a manifest selects per file.
///
/// The discriminants are the wire values carried in the manifest's
/// `hash_type` field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HashKind {
    /// No verification possible; chunk IDs are opaque.
    #[default]
    None = 0,
    Sha512 = 1,
    Sha256 = 2,
    /// Iterated HMAC-SHA-256: key = SHA-256(payload), tag = HMAC(key, be32(1))
    /// XOR-folded over 31 further HMAC rounds.
    HkdfSha256 = 3,
}

impl HashKind {
    pub fn is_none(self) -> bool {
        self == HashKind::None
    }
}

impl From<HashKind> for u8 {
    fn from(kind: HashKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for HashKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(HashKind::None),
            1 => Ok(HashKind::Sha512),
            2 => Ok(HashKind::Sha256),
            3 => Ok(HashKind::HkdfSha256),
            other => Err(other),
        }
    }
}

/// Compute the 64-bit content ID of a decompressed payload.
///
/// Returns `None` for [`HashKind::None`], which admits no verification.
pub fn content_id(kind: HashKind, data: &[u8]) -> Option<u64> {
    match kind {
        HashKind::None => None,
        HashKind::Sha512 => Some(tag64(&Sha512::digest(data))),
        HashKind::Sha256 => Some(tag64(&Sha256::digest(data))),
        HashKind::HkdfSha256 => Some(hkdf_tag(data)),
    }
}

fn tag64(digest: &[u8]) -> u64 {
    let mut tag = [0u8; 8];
    tag.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(tag)
}

fn hkdf_tag(data: &[u8]) -> u64 {
    let key = Sha256::digest(data);
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = HmacSha256::new_from_slice(&key).expect("hmac key");
    mac.update(&1u32.to_be_bytes());
    let mut block: [u8; 32] = mac.finalize().into_bytes().into();

    let mut tag = [0u8; 8];
    tag.copy_from_slice(&block[..8]);
    for _ in 0..31 {
        let mut mac = HmacSha256::new_from_slice(&key).expect("hmac key");
        mac.update(&block);
        block = mac.finalize().into_bytes().into();
        for (t, b) in tag.iter_mut().zip(&block) {
            *t ^= b;
        }
    }
    u64::from_le_bytes(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_yields_no_tag() {
        assert_eq!(content_id(HashKind::None, b"payload"), None);
    }

    #[test]
    fn sha256_tag_is_digest_prefix() {
        let digest = Sha256::digest(b"payload");
        let expected = u64::from_le_bytes(digest[..8].try_into().unwrap());
        assert_eq!(content_id(HashKind::Sha256, b"payload"), Some(expected));
    }

    #[test]
    fn kinds_produce_distinct_tags() {
        let data = b"the same payload";
        let sha256 = content_id(HashKind::Sha256, data);
        let sha512 = content_id(HashKind::Sha512, data);
        let hkdf = content_id(HashKind::HkdfSha256, data);
        assert_ne!(sha256, sha512);
        assert_ne!(sha256, hkdf);
        assert_ne!(sha512, hkdf);
    }

    #[test]
    fn bit_flip_changes_tag() {
        let mut data = b"sensitive bytes".to_vec();
        let before = content_id(HashKind::HkdfSha256, &data);
        data[3] ^= 0x01;
        assert_ne!(before, content_id(HashKind::HkdfSha256, &data));
    }

    #[test]
    fn wire_values_round_trip() {
        for kind in [
            HashKind::None,
            HashKind::Sha512,
            HashKind::Sha256,
            HashKind::HkdfSha256,
        ] {
            assert_eq!(HashKind::try_from(u8::from(kind)), Ok(kind));
        }
        assert_eq!(HashKind::try_from(9), Err(9));
    }
}
