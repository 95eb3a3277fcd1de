use commonware_utils::hex;
use sha2::{Digest, Sha256};
use std::fmt;

/// A content hash key, identifying an inserted block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key([u8; Key::SIZE]);

impl Key {
    /// Length of a key in bytes.
    pub const SIZE: usize = 32;

    /// Create a key from its raw bytes.
    pub fn new(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }

    /// Derive the key of `block` from its content.
    pub fn for_block(block: &[u8]) -> Self {
        let digest = Sha256::digest(block);
        let mut bytes = [0u8; Self::SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", hex(&self.0))
    }
}

/// Identifies a block within its segment.
///
/// Data and check blocks are indexed separately. On the wire, blocks are identified
/// by a single integer: data blocks occupy `0..data_blocks` and check blocks follow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    Data(usize),
    Check(usize),
}

impl Token {
    /// Convert a raw integer token into a [Token] for a segment with `data_blocks` data blocks.
    pub fn from_raw(raw: usize, data_blocks: usize) -> Self {
        if raw >= data_blocks {
            Token::Check(raw - data_blocks)
        } else {
            Token::Data(raw)
        }
    }

    /// Convert into a raw integer token for a segment with `data_blocks` data blocks.
    pub fn raw(self, data_blocks: usize) -> usize {
        match self {
            Token::Data(index) => index,
            Token::Check(index) => data_blocks + index,
        }
    }

    /// Returns the index of the block within its kind.
    pub fn index(self) -> usize {
        match self {
            Token::Data(index) | Token::Check(index) => index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_boundary() {
        // Tokens on either side of the boundary
        assert_eq!(Token::from_raw(0, 3), Token::Data(0));
        assert_eq!(Token::from_raw(2, 3), Token::Data(2));
        assert_eq!(Token::from_raw(3, 3), Token::Check(0));
        assert_eq!(Token::from_raw(4, 3), Token::Check(1));

        // No data blocks
        assert_eq!(Token::from_raw(0, 0), Token::Check(0));
    }

    #[test]
    fn test_token_raw() {
        for raw in 0..8 {
            assert_eq!(Token::from_raw(raw, 5).raw(5), raw);
        }
        assert_eq!(Token::Check(0).raw(5), 5);
        assert_eq!(Token::Data(4).raw(5), 4);
        assert_eq!(Token::Check(2).index(), 2);
    }

    #[test]
    fn test_key_for_block() {
        let a = Key::for_block(b"hello");
        let b = Key::for_block(b"hello");
        let c = Key::for_block(b"world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(
            a.to_string(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(a.as_ref().len(), Key::SIZE);
    }
}
