//! Runtime configuration of a [`crate::Heap`].
//!
//! The block layout itself (header size, alignment, minimum block size) is
//! fixed at compile time, see the constants at the crate root. Only the
//! policy knobs live here.

use crate::MAX_REQUEST_SIZE;

/// Configuration for a [`crate::Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Largest block (header included) a single request may produce.
    max_request_size: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            max_request_size: MAX_REQUEST_SIZE,
        }
    }
}

impl HeapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest block size a single request may produce.
    pub fn with_max_request_size(mut self, max_request_size: usize) -> Self {
        self.max_request_size = max_request_size;
        self
    }

    /// Get the largest block size a single request may produce.
    pub fn max_request_size(&self) -> usize {
        self.max_request_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = HeapConfig::default();
        assert_eq!(config.max_request_size(), MAX_REQUEST_SIZE);
    }

    #[test]
    fn builder_overrides() {
        let config = HeapConfig::new().with_max_request_size(4096);
        assert_eq!(config.max_request_size(), 4096);
    }
}
