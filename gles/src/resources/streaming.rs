//! Streaming vertex buffer.
//!
//! A streaming buffer is a bump allocator over one device buffer. Per-draw
//! vertex data is written at the cursor with a no-overwrite map, so data
//! written for earlier draws stays intact while the device may still read
//! it. When the remaining space is too small the buffer is discarded and
//! the cursor starts over; when a single request is larger than the whole
//! buffer a bigger buffer replaces it.
//!
//! # Example
//!
//! ```ignore
//! let mut stream = StreamingBuffer::new(&device, 1024 * 1024, "vertex_stream")?;
//!
//! // Reserve once for everything the draw will write...
//! stream.reserve_space(total_bytes)?;
//!
//! // ...then store each attribute.
//! let alloc = stream.store(bytes, &mut |dst| dst.copy_from_slice(&data))?;
//! // alloc.offset is the bind offset in stream.buffer()
//! ```

use std::sync::Arc;

use crate::device::GlesDevice;
use crate::error::{GlesError, Result};
use crate::resources::Buffer;
use crate::types::{BufferDescriptor, BufferUsage, MapHint};

/// A region written into a streaming buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamAllocation {
    /// Byte offset into the streaming buffer.
    pub offset: u64,
    /// Size of the written data in bytes.
    pub size: u64,
}

impl StreamAllocation {
    /// Create a new stream allocation.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Get the end offset (offset + size).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// A bump-allocated device buffer for per-draw vertex data.
///
/// # Alignment
///
/// The cursor advances by each store's size rounded up to the configured
/// alignment, so every returned offset is a valid bind offset.
///
/// # Thread Safety
///
/// `StreamingBuffer` is exclusively owned by one vertex data manager.
pub struct StreamingBuffer {
    device: Arc<GlesDevice>,
    buffer: Arc<Buffer>,
    capacity: u64,
    write_offset: u64,
    alignment: u64,
    recycle_count: u64,
    label: String,
}

impl StreamingBuffer {
    /// Create a streaming buffer using the device's configured alignment.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the buffer cannot be allocated.
    pub fn new(device: &Arc<GlesDevice>, capacity: u64, label: &str) -> Result<Self> {
        Self::with_alignment(device, capacity, label, device.config().streaming_alignment)
    }

    /// Create a streaming buffer with a custom alignment.
    ///
    /// # Arguments
    ///
    /// * `device` - The device to create the buffer on
    /// * `capacity` - Initial size of the buffer in bytes
    /// * `label` - Debug label for the buffer
    /// * `alignment` - Alignment of every store (must be power of 2)
    pub fn with_alignment(
        device: &Arc<GlesDevice>,
        capacity: u64,
        label: &str,
        alignment: u64,
    ) -> Result<Self> {
        if !alignment.is_power_of_two() {
            return Err(GlesError::InvalidOperation(format!(
                "alignment must be a power of 2, got {alignment}"
            )));
        }

        if capacity == 0 {
            return Err(GlesError::InvalidOperation(
                "streaming buffer capacity cannot be zero".to_string(),
            ));
        }

        let capacity = align_up(capacity, alignment)?;
        let buffer = Self::allocate(device, capacity, label)?;

        Ok(Self {
            device: Arc::clone(device),
            buffer,
            capacity,
            write_offset: 0,
            alignment,
            recycle_count: 0,
            label: label.to_string(),
        })
    }

    fn allocate(device: &Arc<GlesDevice>, capacity: u64, label: &str) -> Result<Arc<Buffer>> {
        let descriptor = BufferDescriptor::new(
            capacity,
            BufferUsage::VERTEX | BufferUsage::MAP_WRITE | BufferUsage::STREAMING,
        )
        .with_label(format!("{label}_stream"));
        device.create_buffer(&descriptor)
    }

    /// Get the current device buffer.
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// Get the serial of the current device buffer.
    pub fn serial(&self) -> u64 {
        self.buffer.serial()
    }

    /// Get the capacity of the current device buffer.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the write cursor.
    pub fn write_offset(&self) -> u64 {
        self.write_offset
    }

    /// Get the store alignment.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Get the number of discard-recycles performed.
    pub fn recycle_count(&self) -> u64 {
        self.recycle_count
    }

    /// Get the amount of space remaining before a recycle.
    pub fn remaining(&self) -> u64 {
        self.capacity - self.write_offset
    }

    /// Round `size` up to the store alignment.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the rounded size overflows.
    pub fn aligned_size(&self, size: u64) -> Result<u64> {
        align_up(size, self.alignment)
    }

    /// Make `size` contiguous bytes available at the cursor.
    ///
    /// Grows into a new buffer of `max(size, 1.5 × capacity)` when the
    /// request exceeds the whole buffer, otherwise recycles the current
    /// buffer when the tail is too short. Buffers replaced by growth stay
    /// alive for as long as translated attributes reference them.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if a larger buffer cannot be allocated.
    pub fn reserve_space(&mut self, size: u64) -> Result<()> {
        let size = self.aligned_size(size)?;

        if size > self.capacity {
            let grown = self.capacity.saturating_add(self.capacity / 2).max(size);
            let grown = align_up(grown, self.alignment)?;
            let buffer = Self::allocate(&self.device, grown, &self.label)?;

            log::debug!(
                "Streaming buffer '{}' grew from {} to {} bytes (serial {} -> {})",
                self.label,
                self.capacity,
                grown,
                self.buffer.serial(),
                buffer.serial()
            );
            crate::profile_plot!("streaming_capacity", grown as f64);

            self.buffer = buffer;
            self.capacity = grown;
            self.write_offset = 0;
        } else if self.write_offset + size > self.capacity {
            self.recycle()?;
        }

        debug_assert!(self.write_offset + size <= self.capacity);
        Ok(())
    }

    /// Write `size` bytes at the cursor through `writer` and advance.
    ///
    /// The range must have been made available by [`reserve_space`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the store does not fit, or
    /// `OutOfMemory` if the map fails.
    ///
    /// [`reserve_space`]: Self::reserve_space
    pub fn store(&mut self, size: u64, writer: &mut dyn FnMut(&mut [u8])) -> Result<StreamAllocation> {
        let offset = self.write_offset;
        if size == 0 {
            return Ok(StreamAllocation::new(offset, 0));
        }

        let aligned = self.aligned_size(size)?;
        if offset + aligned > self.capacity {
            return Err(GlesError::InvalidOperation(format!(
                "store of {size} bytes at {offset} exceeds streaming capacity {}",
                self.capacity
            )));
        }

        self.buffer
            .map_write(offset, size, MapHint::NoOverwrite, writer)?;
        self.write_offset = offset + aligned;

        Ok(StreamAllocation::new(offset, size))
    }

    /// Discard the buffer contents and move the cursor to the start.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the discard.
    pub fn recycle(&mut self) -> Result<()> {
        self.buffer.discard()?;
        self.write_offset = 0;
        self.recycle_count += 1;
        log::debug!(
            "Streaming buffer '{}' recycled ({} total)",
            self.label,
            self.recycle_count
        );
        Ok(())
    }
}

impl std::fmt::Debug for StreamingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingBuffer")
            .field("capacity", &self.capacity)
            .field("write_offset", &self.write_offset)
            .field("alignment", &self.alignment)
            .field("recycle_count", &self.recycle_count)
            .field("serial", &self.buffer.serial())
            .field("buffer", &self.buffer.label())
            .finish()
    }
}

/// Align a value up to the given alignment.
#[inline]
pub(crate) fn align_up(value: u64, alignment: u64) -> Result<u64> {
    debug_assert!(alignment.is_power_of_two());
    value
        .checked_add(alignment - 1)
        .map(|v| v & !(alignment - 1))
        .ok_or_else(|| GlesError::OutOfMemory(format!("size {value} overflows when aligned")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    fn create_test_device() -> Arc<GlesDevice> {
        GlesDevice::new(DeviceConfig::default()).unwrap()
    }

    fn fill(stream: &mut StreamingBuffer, size: u64) -> StreamAllocation {
        stream.reserve_space(size).unwrap();
        stream.store(size, &mut |dst| dst.fill(0xAB)).unwrap()
    }

    #[test]
    fn test_streaming_buffer_creation() {
        let device = create_test_device();
        let stream = StreamingBuffer::new(&device, 4096, "test").unwrap();

        assert_eq!(stream.capacity(), 4096);
        assert_eq!(stream.write_offset(), 0);
        assert_eq!(stream.recycle_count(), 0);
        assert_eq!(stream.remaining(), 4096);
        assert_eq!(stream.alignment(), 16);
    }

    #[test]
    fn test_invalid_alignment() {
        let device = create_test_device();
        let result = StreamingBuffer::with_alignment(&device, 1024, "test", 3);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_capacity() {
        let device = create_test_device();
        let result = StreamingBuffer::new(&device, 0, "test");
        assert!(result.is_err());
    }

    #[test]
    fn test_store_advances_aligned() {
        let device = create_test_device();
        let mut stream = StreamingBuffer::with_alignment(&device, 1024, "test", 16).unwrap();

        let a = fill(&mut stream, 10);
        assert_eq!(a, StreamAllocation::new(0, 10));
        assert_eq!(stream.write_offset(), 16);

        let b = fill(&mut stream, 20);
        assert_eq!(b.offset, 16);
        assert_eq!(b.end(), 36);
        assert_eq!(stream.write_offset(), 48);
    }

    #[test]
    fn test_store_writes_data() {
        let device = create_test_device();
        let mut stream = StreamingBuffer::with_alignment(&device, 64, "test", 4).unwrap();
        stream.reserve_space(4).unwrap();
        let alloc = stream
            .store(4, &mut |dst| dst.copy_from_slice(&[1, 2, 3, 4]))
            .unwrap();
        assert_eq!(stream.buffer().read(alloc.offset, 4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_recycle_when_tail_too_short() {
        let device = create_test_device();
        let mut stream = StreamingBuffer::with_alignment(&device, 1500, "test", 4).unwrap();
        let serial = stream.serial();

        fill(&mut stream, 1000);
        assert_eq!(stream.write_offset(), 1000);

        fill(&mut stream, 1000);
        assert_eq!(stream.write_offset(), 1000);
        assert_eq!(stream.recycle_count(), 1);

        fill(&mut stream, 1000);
        assert_eq!(stream.write_offset(), 1000);
        assert_eq!(stream.recycle_count(), 2);

        assert_eq!(stream.capacity(), 1500);
        assert_eq!(stream.serial(), serial);
    }

    #[test]
    fn test_growth_replaces_buffer() {
        let device = create_test_device();
        let mut stream = StreamingBuffer::with_alignment(&device, 1000, "test", 4).unwrap();
        fill(&mut stream, 100);
        let old = Arc::clone(stream.buffer());

        stream.reserve_space(1200).unwrap();
        assert_eq!(stream.capacity(), 1500);
        assert_eq!(stream.write_offset(), 0);
        assert!(stream.serial() > old.serial());

        stream.reserve_space(10_000).unwrap();
        assert_eq!(stream.capacity(), 10_000);
    }

    #[test]
    fn test_store_without_reserve_fails() {
        let device = create_test_device();
        let mut stream = StreamingBuffer::with_alignment(&device, 64, "test", 4).unwrap();
        let result = stream.store(128, &mut |_| {});
        assert!(matches!(result, Err(GlesError::InvalidOperation(_))));
    }

    #[test]
    fn test_zero_size_store() {
        let device = create_test_device();
        let mut stream = StreamingBuffer::new(&device, 64, "test").unwrap();
        let alloc = stream.store(0, &mut |_| panic!("no write expected")).unwrap();
        assert_eq!(alloc.size, 0);
        assert_eq!(stream.write_offset(), 0);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16).unwrap(), 0);
        assert_eq!(align_up(1, 16).unwrap(), 16);
        assert_eq!(align_up(16, 16).unwrap(), 16);
        assert_eq!(align_up(17, 4).unwrap(), 20);
        assert!(align_up(u64::MAX, 16).is_err());
    }
}
