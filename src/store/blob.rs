//! Presence-aware byte blobs exchanged between the store and the codecs

/// Content of one cache file, or the fact that there is none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blob {
    /// The file exists; plaintext bytes after decryption
    Present(Vec<u8>),
    /// The file does not exist (or should not exist, when writing)
    Absent,
}

impl Blob {
    /// Whether the blob carries bytes
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Borrow the bytes, if any
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Present(bytes) => Some(bytes),
            Self::Absent => None,
        }
    }

    /// Take the bytes, if any
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Present(bytes) => Some(bytes),
            Self::Absent => None,
        }
    }

    /// Size of the content in bytes (0 when absent)
    pub fn len(&self) -> usize {
        self.as_bytes().map_or(0, <[u8]>::len)
    }

    /// True when absent or zero-length
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Present(bytes)
    }
}

impl From<Option<Vec<u8>>> for Blob {
    fn from(bytes: Option<Vec<u8>>) -> Self {
        bytes.map_or(Self::Absent, Self::Present)
    }
}
