//! Device buffer resource.

use std::sync::Arc;

use crate::backend::{GpuBackend, GpuBuffer};
use crate::error::Result;
use crate::types::{BufferDescriptor, MapHint};

/// A device buffer.
///
/// Buffers are created by [`GlesDevice::create_buffer`] and are reference-counted.
/// The allocation is released through the backend when the last reference drops.
///
/// Every buffer carries the serial it was stamped with at creation. A buffer
/// that is replaced (for example when a streaming buffer grows) is a new
/// buffer with a new serial.
///
/// [`GlesDevice::create_buffer`]: crate::device::GlesDevice::create_buffer
pub struct Buffer {
    backend: Arc<dyn GpuBackend>,
    raw: GpuBuffer,
    descriptor: BufferDescriptor,
    serial: u64,
}

impl Buffer {
    /// Create a new buffer (called by GlesDevice).
    pub(crate) fn new(
        backend: Arc<dyn GpuBackend>,
        raw: GpuBuffer,
        descriptor: BufferDescriptor,
        serial: u64,
    ) -> Self {
        Self {
            backend,
            raw,
            descriptor,
            serial,
        }
    }

    /// Get the backend handle.
    pub fn raw(&self) -> &GpuBuffer {
        &self.raw
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Get the serial stamped at creation.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Map a byte range for writing and fill it through `writer`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the backend fails to map, or
    /// `InvalidOperation` if the range lies outside the buffer.
    pub fn map_write(
        &self,
        offset: u64,
        size: u64,
        hint: MapHint,
        writer: &mut dyn FnMut(&mut [u8]),
    ) -> Result<()> {
        self.backend
            .map_write(&self.raw, offset, size, hint, writer)
            .map_err(Into::into)
    }

    /// Abandon the current contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the discard.
    pub fn discard(&self) -> Result<()> {
        self.backend.discard(&self.raw).map_err(Into::into)
    }

    /// Read bytes back from the device.
    pub fn read(&self, offset: u64, size: u64) -> Vec<u8> {
        self.backend.read_buffer(&self.raw, offset, size)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.backend.destroy_buffer(&self.raw);
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .field("serial", &self.serial)
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);
