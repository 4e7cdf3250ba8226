//! Device input layout descriptions.

use crate::format::VertexFormat;

/// Shader input an element feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputSemantic {
    /// Application attribute, addressed by the translator's semantic index.
    TexCoord(u32),
    /// Synthetic quad corner position for point-sprite emulation.
    SpritePosition,
    /// Synthetic quad texture coordinate for point-sprite emulation.
    SpriteTexCoord,
}

/// How often an element advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputStepRate {
    /// Advance once per vertex.
    PerVertex,
    /// Advance once every `n` instances.
    PerInstance(u32),
}

/// One element of a device input layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputElement {
    /// Shader input fed by this element.
    pub semantic: InputSemantic,
    /// Native format of the element.
    pub format: VertexFormat,
    /// Vertex buffer slot the element reads from.
    pub slot: u32,
    /// Byte offset of the element within one stride of its slot.
    pub offset: u32,
    /// Step rate.
    pub step: InputStepRate,
}

impl InputElement {
    /// Create an element reading from the start of a slot.
    pub fn new(semantic: InputSemantic, format: VertexFormat, slot: u32, step: InputStepRate) -> Self {
        Self {
            semantic,
            format,
            slot,
            offset: 0,
            step,
        }
    }

    /// Set the byte offset within the slot's stride.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}
