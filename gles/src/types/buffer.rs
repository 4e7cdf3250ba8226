//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for device buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be bound as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be bound as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 2;
        /// Buffer is mappable for CPU write.
        const MAP_WRITE = 1 << 3;
        /// Buffer is rewritten every draw (streaming and current-value pools).
        const STREAMING = 1 << 4;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a device buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Usage hint supplied by the application when it specifies buffer data.
///
/// Only `Static` buffers are eligible for zero-copy binding and for the
/// static conversion cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UsageHint {
    /// Specified once, drawn many times.
    #[default]
    Static,
    /// Modified repeatedly, drawn many times.
    Dynamic,
    /// Specified once, drawn a few times.
    Stream,
}

/// Hint passed when mapping a range of a device buffer for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapHint {
    /// Previous contents of the whole buffer may be abandoned.
    Discard,
    /// The written range is not in use by the device; earlier ranges may be.
    NoOverwrite,
    /// Plain write; the device may have to synchronize.
    Write,
}

/// Index element type for index buffer bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit unsigned indices.
    Uint16,
    /// 32-bit unsigned indices.
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}
