//! Container configuration.

use crate::error::{Error, Result};
use serde::Serialize;

/// Block size used when none is given.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Settings fixed when a container is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerConfig {
    /// Size of every block except possibly a file's last one, in bytes.
    pub block_size: u32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl ContainerConfig {
    /// Create a configuration with the given block size.
    pub fn with_block_size(block_size: u32) -> Self {
        Self { block_size }
    }

    /// Reject block sizes the format cannot represent.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::invalid_configuration("Block size must be positive"));
        }
        if i32::try_from(self.block_size).is_err() {
            return Err(Error::invalid_configuration(format!(
                "Block size {} exceeds {}",
                self.block_size,
                i32::MAX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ContainerConfig::default();
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let err = ContainerConfig::with_block_size(0).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_oversized_block_size_rejected() {
        assert!(ContainerConfig::with_block_size(u32::MAX).validate().is_err());
        assert!(ContainerConfig::with_block_size(i32::MAX as u32).validate().is_ok());
    }
}
