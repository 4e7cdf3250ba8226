//! Vertex attribute state as specified by the application.

use std::sync::Arc;

use crate::error::{GlesError, Result};
use crate::format::{FormatKey, VertexFormat};
use crate::resources::SourceBuffer;

/// Maximum number of vertex attributes per vertex array.
pub const MAX_VERTEX_ATTRIBS: usize = 16;

/// Client-side component type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// Signed 8-bit integer.
    Byte,
    /// Unsigned 8-bit integer.
    UnsignedByte,
    /// Signed 16-bit integer.
    Short,
    /// Unsigned 16-bit integer.
    UnsignedShort,
    /// Signed 32-bit integer.
    Int,
    /// Unsigned 32-bit integer.
    UnsignedInt,
    /// Signed 16.16 fixed point.
    Fixed,
    /// IEEE half float.
    HalfFloat,
    /// IEEE single float.
    Float,
    /// Signed 2-10-10-10 packed into one 32-bit word.
    Int2101010Rev,
    /// Unsigned 2-10-10-10 packed into one 32-bit word.
    UnsignedInt2101010Rev,
}

impl ComponentType {
    /// Size of one component in bytes (the whole word for packed types).
    pub fn size(self) -> u32 {
        match self {
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort | Self::HalfFloat => 2,
            Self::Int
            | Self::UnsignedInt
            | Self::Fixed
            | Self::Float
            | Self::Int2101010Rev
            | Self::UnsignedInt2101010Rev => 4,
        }
    }

    /// Whether all components share one packed word.
    pub fn is_packed(self) -> bool {
        matches!(self, Self::Int2101010Rev | Self::UnsignedInt2101010Rev)
    }
}

/// State of one vertex attribute slot.
///
/// Data comes either from a bound [`SourceBuffer`] at `offset`, or from
/// client memory (`client_data`, starting at `offset`) when no buffer is bound.
#[derive(Clone)]
pub struct AttributeDescriptor {
    /// Component type.
    pub component_type: ComponentType,
    /// Component count, 1..=4.
    pub size: u32,
    /// Fixed-point data is normalized.
    pub normalized: bool,
    /// The shader reads the attribute as integers.
    pub pure_integer: bool,
    /// Byte stride between elements; 0 means tightly packed.
    pub stride: u32,
    /// Byte offset of the first element.
    pub offset: u64,
    /// Bound source buffer.
    pub buffer: Option<Arc<SourceBuffer>>,
    /// Client memory used when no buffer is bound.
    pub client_data: Option<Arc<[u8]>>,
    /// Instancing step rate; 0 is per-vertex.
    pub divisor: u32,
    /// Whether the attribute array is enabled.
    pub enabled: bool,
}

impl Default for AttributeDescriptor {
    fn default() -> Self {
        Self {
            component_type: ComponentType::Float,
            size: 4,
            normalized: false,
            pure_integer: false,
            stride: 0,
            offset: 0,
            buffer: None,
            client_data: None,
            divisor: 0,
            enabled: false,
        }
    }
}

impl AttributeDescriptor {
    /// Size of one client element in bytes.
    pub fn element_size(&self) -> u32 {
        if self.component_type.is_packed() {
            4
        } else {
            self.size * self.component_type.size()
        }
    }

    /// Stride with 0 resolved to the element size.
    pub fn effective_stride(&self) -> u32 {
        if self.stride == 0 {
            self.element_size()
        } else {
            self.stride
        }
    }

    /// Key used by the format conversion table.
    pub fn format_key(&self) -> FormatKey {
        FormatKey::new(
            self.component_type,
            self.size,
            self.normalized,
            self.pure_integer,
        )
    }
}

impl std::fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("component_type", &self.component_type)
            .field("size", &self.size)
            .field("normalized", &self.normalized)
            .field("pure_integer", &self.pure_integer)
            .field("stride", &self.stride)
            .field("offset", &self.offset)
            .field("buffer", &self.buffer.as_ref().map(|b| b.id()))
            .field("client_data", &self.client_data.as_ref().map(|d| d.len()))
            .field("divisor", &self.divisor)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Constant value read by a disabled attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurrentValue {
    /// Float value (set by `glVertexAttrib4f` and friends).
    Float([f32; 4]),
    /// Signed integer value.
    Int([i32; 4]),
    /// Unsigned integer value.
    Uint([u32; 4]),
}

impl Default for CurrentValue {
    fn default() -> Self {
        Self::Float([0.0, 0.0, 0.0, 1.0])
    }
}

impl CurrentValue {
    /// Native format used to bind the value.
    pub fn format(&self) -> VertexFormat {
        match self {
            Self::Float(_) => VertexFormat::Float32x4,
            Self::Int(_) => VertexFormat::Sint32x4,
            Self::Uint(_) => VertexFormat::Uint32x4,
        }
    }

    /// Raw little-endian bytes of the four components.
    pub fn to_bytes(&self) -> [u8; 16] {
        match self {
            Self::Float(v) => bytemuck::cast(*v),
            Self::Int(v) => bytemuck::cast(*v),
            Self::Uint(v) => bytemuck::cast(*v),
        }
    }

    /// Compare type tag and bit pattern; NaN payloads compare equal to themselves.
    pub fn bitwise_eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
            && self.to_bytes() == other.to_bytes()
    }
}

/// Current values for every attribute slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentValues {
    values: [CurrentValue; MAX_VERTEX_ATTRIBS],
}

impl Default for CurrentValues {
    fn default() -> Self {
        Self {
            values: [CurrentValue::default(); MAX_VERTEX_ATTRIBS],
        }
    }
}

impl CurrentValues {
    /// Create current values with the GL defaults `(0, 0, 0, 1)`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a float value.
    pub fn set_float(&mut self, index: usize, value: [f32; 4]) -> Result<()> {
        self.set(index, CurrentValue::Float(value))
    }

    /// Set a signed integer value.
    pub fn set_int(&mut self, index: usize, value: [i32; 4]) -> Result<()> {
        self.set(index, CurrentValue::Int(value))
    }

    /// Set an unsigned integer value.
    pub fn set_uint(&mut self, index: usize, value: [u32; 4]) -> Result<()> {
        self.set(index, CurrentValue::Uint(value))
    }

    /// Set a value of any type.
    pub fn set(&mut self, index: usize, value: CurrentValue) -> Result<()> {
        let slot = self.values.get_mut(index).ok_or_else(|| out_of_range(index))?;
        *slot = value;
        Ok(())
    }

    /// Get the value for an attribute slot.
    pub fn get(&self, index: usize) -> Option<&CurrentValue> {
        self.values.get(index)
    }

    /// All values, indexed by attribute slot.
    pub fn as_slice(&self) -> &[CurrentValue] {
        &self.values
    }
}

/// Primitive topology of a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// Attribute state of a vertex array object.
///
/// The setters mirror the GL attribute-pointer entry points.
#[derive(Debug, Clone)]
pub struct VertexArray {
    attributes: Vec<AttributeDescriptor>,
}

impl Default for VertexArray {
    fn default() -> Self {
        Self {
            attributes: vec![AttributeDescriptor::default(); MAX_VERTEX_ATTRIBS],
        }
    }
}

impl VertexArray {
    /// Create a vertex array with every attribute disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// All attribute descriptors, indexed by attribute location.
    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    /// Get one attribute descriptor.
    pub fn attribute(&self, index: usize) -> Option<&AttributeDescriptor> {
        self.attributes.get(index)
    }

    fn attribute_mut(&mut self, index: usize) -> Result<&mut AttributeDescriptor> {
        self.attributes
            .get_mut(index)
            .ok_or_else(|| out_of_range(index))
    }

    /// Source a float attribute from a buffer (`glVertexAttribPointer`).
    #[allow(clippy::too_many_arguments)]
    pub fn attribute_pointer(
        &mut self,
        index: usize,
        size: u32,
        component_type: ComponentType,
        normalized: bool,
        stride: u32,
        buffer: Arc<SourceBuffer>,
        offset: u64,
    ) -> Result<()> {
        let attribute = self.attribute_mut(index)?;
        attribute.component_type = component_type;
        attribute.size = size;
        attribute.normalized = normalized;
        attribute.pure_integer = false;
        attribute.stride = stride;
        attribute.offset = offset;
        attribute.buffer = Some(buffer);
        attribute.client_data = None;
        Ok(())
    }

    /// Source an integer attribute from a buffer (`glVertexAttribIPointer`).
    pub fn attribute_integer_pointer(
        &mut self,
        index: usize,
        size: u32,
        component_type: ComponentType,
        stride: u32,
        buffer: Arc<SourceBuffer>,
        offset: u64,
    ) -> Result<()> {
        let attribute = self.attribute_mut(index)?;
        attribute.component_type = component_type;
        attribute.size = size;
        attribute.normalized = false;
        attribute.pure_integer = true;
        attribute.stride = stride;
        attribute.offset = offset;
        attribute.buffer = Some(buffer);
        attribute.client_data = None;
        Ok(())
    }

    /// Source a float attribute from client memory.
    pub fn attribute_client_pointer(
        &mut self,
        index: usize,
        size: u32,
        component_type: ComponentType,
        normalized: bool,
        stride: u32,
        data: Arc<[u8]>,
    ) -> Result<()> {
        let attribute = self.attribute_mut(index)?;
        attribute.component_type = component_type;
        attribute.size = size;
        attribute.normalized = normalized;
        attribute.pure_integer = false;
        attribute.stride = stride;
        attribute.offset = 0;
        attribute.buffer = None;
        attribute.client_data = Some(data);
        Ok(())
    }

    /// Enable or disable an attribute array.
    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        self.attribute_mut(index)?.enabled = enabled;
        Ok(())
    }

    /// Set the instancing divisor of an attribute.
    pub fn set_divisor(&mut self, index: usize, divisor: u32) -> Result<()> {
        self.attribute_mut(index)?.divisor = divisor;
        Ok(())
    }
}

fn out_of_range(index: usize) -> GlesError {
    GlesError::InvalidOperation(format!(
        "attribute index {index} exceeds the maximum of {MAX_VERTEX_ATTRIBS}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_size_and_stride() {
        let attribute = AttributeDescriptor {
            component_type: ComponentType::UnsignedByte,
            size: 3,
            ..Default::default()
        };
        assert_eq!(attribute.element_size(), 3);
        assert_eq!(attribute.effective_stride(), 3);

        let packed = AttributeDescriptor {
            component_type: ComponentType::Int2101010Rev,
            size: 4,
            stride: 12,
            ..Default::default()
        };
        assert_eq!(packed.element_size(), 4);
        assert_eq!(packed.effective_stride(), 12);
    }

    #[test]
    fn test_current_value_bitwise_eq() {
        let a = CurrentValue::Float([f32::NAN, 0.0, 0.0, 1.0]);
        assert!(a.bitwise_eq(&a));
        assert!(!CurrentValue::Float([1.0; 4]).bitwise_eq(&CurrentValue::Int([1; 4])));
        assert!(!CurrentValue::Float([0.0; 4]).bitwise_eq(&CurrentValue::Float([-0.0, 0.0, 0.0, 0.0])));
    }

    #[test]
    fn test_current_value_format() {
        assert_eq!(CurrentValue::default().format(), VertexFormat::Float32x4);
        assert_eq!(CurrentValue::Uint([0; 4]).format(), VertexFormat::Uint32x4);
    }

    #[test]
    fn test_vertex_array_client_pointer() {
        let mut vao = VertexArray::new();
        let data: Arc<[u8]> = Arc::from(vec![0u8; 24]);
        vao.attribute_client_pointer(2, 3, ComponentType::Float, false, 0, data)
            .unwrap();
        vao.set_enabled(2, true).unwrap();
        vao.set_divisor(2, 1).unwrap();

        let attribute = vao.attribute(2).unwrap();
        assert!(attribute.enabled);
        assert!(attribute.buffer.is_none());
        assert_eq!(attribute.divisor, 1);
        assert_eq!(attribute.element_size(), 12);
    }

    #[test]
    fn test_vertex_array_index_out_of_range() {
        let mut vao = VertexArray::new();
        assert!(matches!(
            vao.set_enabled(MAX_VERTEX_ATTRIBS, true),
            Err(GlesError::InvalidOperation(_))
        ));

        let mut values = CurrentValues::new();
        assert!(values.set_float(MAX_VERTEX_ATTRIBS, [0.0; 4]).is_err());
        values.set_int(1, [1, 2, 3, 4]).unwrap();
        assert_eq!(values.get(1), Some(&CurrentValue::Int([1, 2, 3, 4])));
    }
}
