//! Common types and descriptors for vertex data translation.
//!
//! This module contains the attribute state supplied by the GL front end,
//! buffer descriptors and usage hints, and the shader linkage consumed by
//! the input layout cache.

mod attribute;
mod buffer;
mod layout;
mod program;

pub use attribute::{
    AttributeDescriptor, ComponentType, CurrentValue, CurrentValues, MAX_VERTEX_ATTRIBS,
    PrimitiveMode, VertexArray,
};
pub use buffer::{BufferDescriptor, BufferUsage, IndexFormat, MapHint, UsageHint};
pub use layout::{InputElement, InputSemantic, InputStepRate};
pub use program::{ShaderAttribute, ShaderInputType, ShaderProgram};
