//! LOB locator and value types.
//!
//! LOB columns arrive either with inline prefetched data (when the value fits
//! the prefetch length) or as a bare locator whose bytes must be fetched on
//! demand through LOB operations on an open connection.

use crate::protocol::constants::*;

/// Opaque LOB locator handle returned by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct LobLocator {
    /// Raw locator bytes.
    pub locator: Vec<u8>,
    /// Size in characters (CLOB) or bytes (BLOB). Invalidated by writes.
    pub size: u64,
    /// Recommended chunk size for read/write operations.
    pub chunk_size: u32,
    /// Whether size and chunk size are known. BFILE locators carry neither.
    pub has_metadata: bool,
}

impl LobLocator {
    /// Create a new LOB locator.
    pub fn new(locator: Vec<u8>, size: u64, chunk_size: u32, has_metadata: bool) -> Self {
        Self {
            locator,
            size,
            chunk_size,
            has_metadata,
        }
    }

    /// Create an all-zero locator for temporary LOB creation.
    pub fn empty() -> Self {
        Self {
            locator: vec![0; 40],
            size: 0,
            chunk_size: 0,
            has_metadata: false,
        }
    }

    /// Drop the cached length. Any server-side mutation invalidates it.
    pub fn invalidate_metadata(&mut self) {
        self.has_metadata = false;
        self.size = 0;
    }

    /// Whether the locator flags mark this as a BLOB.
    pub fn is_blob(&self) -> bool {
        self.locator
            .get(TNS_LOB_LOC_OFFSET_FLAG_1)
            .is_some_and(|b| b & TNS_LOB_LOC_FLAGS_BLOB != 0)
    }

    /// Whether this is a temporary LOB.
    pub fn is_temp(&self) -> bool {
        self.locator
            .get(TNS_LOB_LOC_OFFSET_FLAG_4)
            .is_some_and(|b| b & TNS_LOB_LOC_FLAGS_TEMP != 0)
    }

    /// Whether this is an abstract LOB.
    pub fn is_abstract(&self) -> bool {
        self.locator
            .get(TNS_LOB_LOC_OFFSET_FLAG_1)
            .is_some_and(|b| b & TNS_LOB_LOC_FLAGS_ABSTRACT != 0)
    }
}

/// LOB value: a locator plus optionally prefetched data.
#[derive(Debug, Clone, PartialEq)]
pub struct LobValue {
    /// The locator, always present for non-NULL LOBs.
    pub locator: LobLocator,
    /// Inline data, present when the value fit the prefetch length.
    pub data: Option<Vec<u8>>,
}

impl LobValue {
    /// Create a LOB value with prefetched data.
    pub fn with_data(locator: LobLocator, data: Vec<u8>) -> Self {
        Self {
            locator,
            data: Some(data),
        }
    }

    /// Create a LOB value carrying only a locator.
    pub fn locator_only(locator: LobLocator) -> Self {
        Self {
            locator,
            data: None,
        }
    }

    /// Whether data was prefetched.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Prefetched CLOB data as a string. Prefetched CLOB payloads travel in
    /// big-endian UTF-16.
    pub fn as_string(&self) -> Option<String> {
        self.data.as_ref().map(|d| {
            String::from_utf16_lossy(
                &d.chunks(2)
                    .map(|chunk| {
                        u16::from_be_bytes([chunk[0], *chunk.get(1).unwrap_or(&0)])
                    })
                    .collect::<Vec<u16>>(),
            )
        })
    }

    /// Prefetched BLOB data.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// LOB size in characters (CLOB) or bytes (BLOB).
    pub fn size(&self) -> u64 {
        self.locator.size
    }

    /// Whether this LOB is NULL.
    pub fn is_null(&self) -> bool {
        self.locator.locator.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_flags() {
        let mut locator_bytes = vec![0u8; 10];
        locator_bytes[TNS_LOB_LOC_OFFSET_FLAG_1] = TNS_LOB_LOC_FLAGS_BLOB;
        locator_bytes[TNS_LOB_LOC_OFFSET_FLAG_4] = TNS_LOB_LOC_FLAGS_TEMP;

        let locator = LobLocator::new(locator_bytes, 100, 8192, true);
        assert!(locator.is_blob());
        assert!(locator.is_temp());
        assert!(!locator.is_abstract());
    }

    #[test]
    fn test_invalidate_metadata() {
        let mut locator = LobLocator::new(vec![1, 2, 3], 500, 8192, true);
        locator.invalidate_metadata();
        assert!(!locator.has_metadata);
        assert_eq!(locator.size, 0);
    }

    #[test]
    fn test_empty_locator() {
        let locator = LobLocator::empty();
        assert_eq!(locator.locator.len(), 40);
        assert!(!locator.has_metadata);
    }

    #[test]
    fn test_value_with_data() {
        let locator = LobLocator::new(vec![1, 2, 3, 4], 5, 8192, true);
        let value = LobValue::with_data(locator, b"hello".to_vec());
        assert!(value.has_data());
        assert_eq!(value.as_bytes(), Some(b"hello".as_slice()));
        assert_eq!(value.size(), 5);
    }

    #[test]
    fn test_value_locator_only() {
        let locator = LobLocator::new(vec![1, 2, 3, 4], 1_000_000, 8192, true);
        let value = LobValue::locator_only(locator);
        assert!(!value.has_data());
        assert_eq!(value.as_string(), None);
    }

    #[test]
    fn test_clob_utf16_string() {
        // "hi" in big-endian UTF-16
        let locator = LobLocator::new(vec![1], 2, 8192, true);
        let value = LobValue::with_data(locator, vec![0, b'h', 0, b'i']);
        assert_eq!(value.as_string(), Some("hi".to_string()));
    }
}
