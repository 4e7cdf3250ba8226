//! Rendering-context device.
//!
//! The [`GlesDevice`] owns the backend strategy chosen at creation time, the
//! configuration, and the serial allocator that stamps every buffer it
//! creates. Managers and caches created from one device share its serials,
//! so a serial identifies a buffer generation within that context only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::backend::{self, BackendCapabilities, GpuBackend};
use crate::config::DeviceConfig;
use crate::error::{GlesError, Result};
use crate::resources::{Buffer, SourceBuffer};
use crate::types::{BufferDescriptor, MapHint, UsageHint};
use crate::vertex::{InputLayoutCache, VertexDataManager};

/// Monotonically increasing serial source owned by one device.
#[derive(Debug)]
pub struct SerialAllocator {
    next: AtomicU64,
}

impl Default for SerialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialAllocator {
    /// Create an allocator whose first serial is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next serial.
    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// A device for creating vertex buffers and vertex pipeline objects.
///
/// # Example
///
/// ```ignore
/// let device = GlesDevice::new(DeviceConfig::default())?;
/// let mut manager = device.create_vertex_data_manager()?;
/// let mut layouts = device.create_input_layout_cache();
/// ```
pub struct GlesDevice {
    backend: Arc<dyn GpuBackend>,
    config: DeviceConfig,
    serials: SerialAllocator,
    // Track allocated buffers (weak references for cleanup/debugging)
    buffers: RwLock<Vec<Weak<Buffer>>>,
}

impl GlesDevice {
    /// Create a device with the backend named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the backend
    /// cannot be created.
    pub fn new(config: DeviceConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let backend = backend::create_backend(config.backend)?;
        Self::with_backend(backend, config)
    }

    /// Create a device around an existing backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_backend(backend: Arc<dyn GpuBackend>, config: DeviceConfig) -> Result<Arc<Self>> {
        config.validate()?;
        log::info!("Creating GlesDevice on {}", backend.name());
        Ok(Arc::new(Self {
            backend,
            config,
            serials: SerialAllocator::new(),
            buffers: RwLock::new(Vec::new()),
        }))
    }

    /// Get the backend.
    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Get the backend capabilities.
    pub fn capabilities(&self) -> &BackendCapabilities {
        self.backend.capabilities()
    }

    /// Get the device configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Allocate a serial from this device's counter.
    pub fn next_serial(&self) -> u64 {
        self.serials.allocate()
    }

    /// Create a device buffer.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the allocation fails.
    pub fn create_buffer(self: &Arc<Self>, descriptor: &BufferDescriptor) -> Result<Arc<Buffer>> {
        if descriptor.size == 0 {
            return Err(GlesError::InvalidOperation(
                "buffer size cannot be zero".to_string(),
            ));
        }

        let raw = self.backend.create_buffer(descriptor)?;
        let serial = self.next_serial();
        let buffer = Arc::new(Buffer::new(
            Arc::clone(&self.backend),
            raw,
            descriptor.clone(),
            serial,
        ));

        let mut buffers = self.buffers.write();
        // Prune before the list reallocates so it tracks live buffers only.
        if buffers.len() == buffers.capacity() {
            buffers.retain(|b| b.strong_count() > 0);
        }
        buffers.push(Arc::downgrade(&buffer));
        drop(buffers);

        log::trace!(
            "GlesDevice: created buffer {:?}, size={}, serial={}",
            descriptor.label,
            descriptor.size,
            serial
        );

        Ok(buffer)
    }

    /// Create a device buffer and fill it with `data`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the allocation or the upload fails.
    pub fn create_buffer_with_data(
        self: &Arc<Self>,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<Arc<Buffer>> {
        let buffer = self.create_buffer(descriptor)?;
        buffer.map_write(0, data.len() as u64, MapHint::Discard, &mut |dst| {
            dst.copy_from_slice(data)
        })?;
        Ok(buffer)
    }

    /// Create an application vertex data buffer.
    pub fn create_source_buffer(&self, data: impl Into<Vec<u8>>, usage: UsageHint) -> Arc<SourceBuffer> {
        Arc::new(SourceBuffer::new(self.next_serial(), data.into(), usage))
    }

    /// Create a vertex data manager for one rendering context.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the initial streaming buffer cannot be allocated.
    pub fn create_vertex_data_manager(self: &Arc<Self>) -> Result<VertexDataManager> {
        VertexDataManager::new(self)
    }

    /// Create an input layout cache with the configured capacity.
    pub fn create_input_layout_cache(self: &Arc<Self>) -> InputLayoutCache {
        InputLayoutCache::new(self, self.config.input_layout_cache_capacity)
    }

    /// Get the number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers
            .read()
            .iter()
            .filter(|b| b.strong_count() > 0)
            .count()
    }

    /// Drop tracking entries of buffers that no longer exist.
    pub fn cleanup_dead_resources(&self) {
        self.buffers.write().retain(|b| b.strong_count() > 0);
    }
}

impl std::fmt::Debug for GlesDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlesDevice")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("buffer_count", &self.buffer_count())
            .finish()
    }
}

// Ensure GlesDevice is Send + Sync
static_assertions::assert_impl_all!(GlesDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    fn create_test_device() -> Arc<GlesDevice> {
        GlesDevice::new(DeviceConfig::default()).unwrap()
    }

    #[test]
    fn test_serials_are_monotonic_per_device() {
        let a = create_test_device();
        let b = create_test_device();
        let first = a.next_serial();
        assert!(a.next_serial() > first);
        // Each device counts independently.
        assert_eq!(b.next_serial(), 1);
    }

    #[test]
    fn test_buffer_tracking_stays_bounded() {
        let device = create_test_device();
        let source = device.create_source_buffer(vec![0u8; 64], UsageHint::Static);

        // Every rewrite replaces the uploaded copy with a new buffer.
        for i in 0..1000u32 {
            source.sub_data(0, &i.to_le_bytes()).unwrap();
            source.native_buffer(&device).unwrap();
        }

        assert_eq!(device.buffer_count(), 1);
        assert!(device.buffers.read().len() < 16);
    }

    #[test]
    fn test_create_buffer() {
        let device = create_test_device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX).with_label("test"))
            .unwrap();
        assert_eq!(buffer.size(), 1024);
        assert_eq!(buffer.label(), Some("test"));
        assert_eq!(device.buffer_count(), 1);
    }

    #[test]
    fn test_create_buffer_zero_size() {
        let device = create_test_device();
        let result = device.create_buffer(&BufferDescriptor::new(0, BufferUsage::VERTEX));
        assert!(matches!(result, Err(GlesError::InvalidOperation(_))));
    }

    #[test]
    fn test_create_buffer_with_data() {
        let device = create_test_device();
        let buffer = device
            .create_buffer_with_data(&BufferDescriptor::new(4, BufferUsage::VERTEX), &[9, 8, 7, 6])
            .unwrap();
        assert_eq!(buffer.read(0, 4), vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_resource_cleanup() {
        let device = create_test_device();
        {
            let _buffer = device
                .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
                .unwrap();
            assert_eq!(device.buffer_count(), 1);
        }
        assert_eq!(device.buffer_count(), 0);
        device.cleanup_dead_resources();
        assert!(device.buffers.read().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DeviceConfig::default().with_streaming_alignment(3);
        assert!(GlesDevice::new(config).is_err());
    }
}
