//! Device configuration.

use crate::backend::BackendType;
use crate::error::{GlesError, Result};

/// Configuration for a [`GlesDevice`](crate::device::GlesDevice) and the
/// managers it creates.
///
/// # Example
///
/// ```ignore
/// let config = DeviceConfig::default()
///     .with_backend(BackendType::Dummy)
///     .with_input_layout_cache_capacity(256);
/// let device = GlesDevice::new(config)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Which backend strategy to use.
    pub backend: BackendType,
    /// Initial size of the per-draw streaming buffer.
    pub initial_streaming_buffer_size: u64,
    /// Size of each attribute's current-value buffer.
    pub current_value_buffer_size: u64,
    /// Maximum number of cached input layouts.
    pub input_layout_cache_capacity: usize,
    /// Alignment of streaming allocations.
    pub streaming_alignment: u64,
    /// A dynamic buffer is promoted to static after this many full-size
    /// uses without modification.
    pub static_promotion_factor: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Dummy,
            initial_streaming_buffer_size: 1024 * 1024,
            current_value_buffer_size: 4096,
            input_layout_cache_capacity: 1024,
            streaming_alignment: 16,
            static_promotion_factor: 3,
        }
    }
}

impl DeviceConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    /// Set the initial streaming buffer size.
    pub fn with_initial_streaming_buffer_size(mut self, size: u64) -> Self {
        self.initial_streaming_buffer_size = size;
        self
    }

    /// Set the current-value buffer size.
    pub fn with_current_value_buffer_size(mut self, size: u64) -> Self {
        self.current_value_buffer_size = size;
        self
    }

    /// Set the input layout cache capacity.
    pub fn with_input_layout_cache_capacity(mut self, capacity: usize) -> Self {
        self.input_layout_cache_capacity = capacity;
        self
    }

    /// Set the streaming allocation alignment.
    pub fn with_streaming_alignment(mut self, alignment: u64) -> Self {
        self.streaming_alignment = alignment;
        self
    }

    /// Set the static promotion factor.
    pub fn with_static_promotion_factor(mut self, factor: u64) -> Self {
        self.static_promotion_factor = factor;
        self
    }

    /// Check that all sizes are usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for zero sizes or a non power-of-two alignment.
    pub fn validate(&self) -> Result<()> {
        if !self.streaming_alignment.is_power_of_two() {
            return Err(GlesError::InvalidOperation(format!(
                "streaming alignment must be a power of 2, got {}",
                self.streaming_alignment
            )));
        }
        if self.initial_streaming_buffer_size == 0 {
            return Err(GlesError::InvalidOperation(
                "streaming buffer size cannot be zero".to_string(),
            ));
        }
        if self.current_value_buffer_size < 16 {
            return Err(GlesError::InvalidOperation(format!(
                "current value buffer must hold at least one value, got {} bytes",
                self.current_value_buffer_size
            )));
        }
        if self.input_layout_cache_capacity == 0 {
            return Err(GlesError::InvalidOperation(
                "input layout cache capacity cannot be zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.initial_streaming_buffer_size, 1 << 20);
        assert_eq!(config.current_value_buffer_size, 4096);
        assert_eq!(config.input_layout_cache_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(DeviceConfig::new().with_streaming_alignment(12).validate().is_err());
        assert!(DeviceConfig::new().with_input_layout_cache_capacity(0).validate().is_err());
        assert!(DeviceConfig::new().with_current_value_buffer_size(8).validate().is_err());
        assert!(DeviceConfig::new().with_initial_streaming_buffer_size(0).validate().is_err());
    }
}
