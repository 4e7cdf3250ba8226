//! Converted copies of unchanging source buffers.

use std::sync::Arc;

use crate::device::GlesDevice;
use crate::error::{GlesError, Result};
use crate::format::{NativeFormatDescriptor, VertexFormat};
use crate::resources::Buffer;
use crate::types::{AttributeDescriptor, BufferDescriptor, BufferUsage, ComponentType, MapHint};

/// Shape of an attribute as seen by a static conversion.
///
/// Two attributes with equal signatures read the same bytes of a source
/// buffer in the same way, so they can share one converted copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeSignature {
    /// Client component type.
    pub component_type: ComponentType,
    /// Component count.
    pub size: u32,
    /// Effective stride in bytes.
    pub stride: u32,
    /// Normalization flag.
    pub normalized: bool,
    /// Pure-integer flag.
    pub pure_integer: bool,
    /// Attribute offset modulo stride.
    pub offset_in_stride: u64,
}

impl AttributeSignature {
    /// Compute the signature of an attribute.
    pub fn from_attribute(attribute: &AttributeDescriptor) -> Self {
        let stride = attribute.effective_stride();
        Self {
            component_type: attribute.component_type,
            size: attribute.size,
            stride,
            normalized: attribute.normalized,
            pure_integer: attribute.pure_integer,
            offset_in_stride: attribute.offset % stride.max(1) as u64,
        }
    }
}

/// Number of whole elements of `attribute` that fit in `size` bytes,
/// counting from the first element position `offset % stride`.
pub fn elements_in_buffer(attribute: &AttributeDescriptor, size: u64) -> u64 {
    let stride = attribute.effective_stride().max(1) as u64;
    let element_size = attribute.element_size() as u64;
    let first = attribute.offset % stride;
    match size.checked_sub(first + element_size) {
        Some(rest) => rest / stride + 1,
        None => 0,
    }
}

/// One converted copy of a source buffer.
///
/// Holds the signature the copy was converted for. A request with a
/// different signature replaces the whole slot.
pub struct StaticVertexBuffer {
    signature: AttributeSignature,
    format: VertexFormat,
    buffer: Option<Arc<Buffer>>,
    element_count: u64,
}

impl StaticVertexBuffer {
    /// Create an empty slot for `attribute`.
    pub fn new(attribute: &AttributeDescriptor, descriptor: &NativeFormatDescriptor) -> Self {
        Self {
            signature: AttributeSignature::from_attribute(attribute),
            format: descriptor.format,
            buffer: None,
            element_count: 0,
        }
    }

    /// Get the signature this slot was created for.
    pub fn signature(&self) -> &AttributeSignature {
        &self.signature
    }

    /// Get the native format of the converted data.
    pub fn format(&self) -> VertexFormat {
        self.format
    }

    /// Whether `attribute` can read this slot's converted data.
    pub fn matches(&self, attribute: &AttributeDescriptor) -> bool {
        self.signature == AttributeSignature::from_attribute(attribute)
    }

    /// Whether no conversion has been performed yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }

    /// Get the converted device buffer.
    pub fn buffer(&self) -> Option<&Arc<Buffer>> {
        self.buffer.as_ref()
    }

    /// Get the number of converted elements.
    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    /// Convert every element of `data` into a new device buffer.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the converted size overflows or the buffer
    /// cannot be allocated.
    pub fn convert(
        &mut self,
        device: &Arc<GlesDevice>,
        data: &[u8],
        attribute: &AttributeDescriptor,
        descriptor: &NativeFormatDescriptor,
    ) -> Result<Arc<Buffer>> {
        crate::profile_scope!("static_conversion");

        let count = elements_in_buffer(attribute, data.len() as u64);
        let bytes = descriptor.space_required(count)?;
        let first = usize::try_from(self.signature.offset_in_stride).map_err(|_| {
            GlesError::OutOfMemory("static conversion offset overflows".to_string())
        })?;
        let count_usize = usize::try_from(count)
            .map_err(|_| GlesError::OutOfMemory("static element count overflows".to_string()))?;
        let stride = self.signature.stride as usize;

        let size = bytes.max(descriptor.output_element_size() as u64);
        let buffer = device.create_buffer(
            &BufferDescriptor::new(size, BufferUsage::VERTEX | BufferUsage::COPY_DST)
                .with_label("static_vertex"),
        )?;

        if count > 0 {
            let source = &data[first..];
            buffer.map_write(0, bytes, MapHint::Write, &mut |dst| {
                descriptor.convert(source, stride, count_usize, dst)
            })?;
        }

        log::debug!(
            "Static conversion of {} elements ({:?} x{} -> {:?}), {} bytes",
            count,
            attribute.component_type,
            attribute.size,
            descriptor.format,
            bytes
        );

        self.element_count = count;
        self.buffer = Some(Arc::clone(&buffer));
        Ok(buffer)
    }
}

impl std::fmt::Debug for StaticVertexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticVertexBuffer")
            .field("signature", &self.signature)
            .field("format", &self.format)
            .field("element_count", &self.element_count)
            .field("serial", &self.buffer.as_ref().map(|b| b.serial()))
            .finish()
    }
}
