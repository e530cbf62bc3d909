use crate::registry::{StoreBucket, SEPARATOR};
use std::fmt::{Display, Formatter};

/// A fully-qualified database key: bucket prefix, separator, then the
/// store-level key bytes.
#[derive(Debug, Clone)]
pub struct DbKey {
    path: Vec<u8>,
    prefix_len: usize,
}

impl DbKey {
    pub fn new<TKey: AsRef<[u8]>>(prefix: &[u8], key: TKey) -> Self {
        Self {
            path: prefix.iter().chain(std::iter::once(&SEPARATOR)).chain(key.as_ref().iter()).copied().collect(),
            prefix_len: prefix.len() + 1,
        }
    }

    pub fn bucket<TKey: AsRef<[u8]>>(bucket: StoreBucket, key: TKey) -> Self {
        Self::new(bucket.as_ref(), key)
    }

    /// A key spanning the whole bucket, used for prefix iteration and
    /// range deletion.
    pub fn prefix_only(prefix: &[u8]) -> Self {
        Self::new(prefix, [])
    }

    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }
}

impl AsRef<[u8]> for DbKey {
    fn as_ref(&self) -> &[u8] {
        &self.path
    }
}

impl Display for DbKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (prefix, key) = self.path.split_at(self.prefix_len);
        if let Ok(prefix_str) = std::str::from_utf8(&prefix[..prefix.len() - 1]) {
            f.write_str(prefix_str)?;
        } else {
            write!(f, "{prefix:?}")?;
        }
        f.write_str("/")?;
        key.iter().try_for_each(|b| write!(f, "{b:02x}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sedra_hashes::Hash;

    #[test]
    fn test_key_display() {
        let key = DbKey::bucket(StoreBucket::BlockHeader, Hash::from_u64(1));
        let display = key.to_string();
        assert!(display.starts_with("block-header/"));
        assert!(display.ends_with("00"));
    }
}
