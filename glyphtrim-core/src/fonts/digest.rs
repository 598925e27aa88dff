//! Content identity for embedded font programs
//!
//! Two programs with equal bytes are the same font, whatever font
//! dictionaries reference them.

use crate::error::{FontError, Result};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of a font program's raw bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontProgramDigest([u8; 32]);

impl FontProgramDigest {
    /// Hash the given program bytes.
    ///
    /// An empty program is not an embedded font and has no identity.
    pub fn compute(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(FontError::DigestComputationFailure(
                "font program is empty".to_string(),
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(data);
        Ok(Self(hasher.finalize().into()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex digits, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for FontProgramDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FontProgramDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FontProgramDigest({})", self.short())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FontProgramDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_bytes_equal_digest() {
        let a = FontProgramDigest::compute(b"font program").unwrap();
        let b = FontProgramDigest::compute(&b"font program".to_vec()).unwrap();
        let c = FontProgramDigest::compute(b"font program!").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_known_vector() {
        let digest = FontProgramDigest::compute(b"abc").unwrap();
        assert_eq!(
            digest.to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest.short(), "ba7816bf8f01");
        assert_eq!(format!("{:?}", digest), "FontProgramDigest(ba7816bf8f01)");
    }

    #[test]
    fn test_empty_program_fails() {
        assert!(matches!(
            FontProgramDigest::compute(&[]),
            Err(FontError::DigestComputationFailure(_))
        ));
    }
}
