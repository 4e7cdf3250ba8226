//! Vertex data buffer resources.
//!
//! [`Buffer`] wraps a device allocation. The pools built on top of it each
//! own their buffers exclusively: [`StreamingBuffer`] for per-draw data,
//! [`StaticVertexBuffer`] for converted copies, and [`SourceBuffer`] for
//! the application's own data.

mod buffer;
mod source_buffer;
mod static_buffer;
mod streaming;

pub use buffer::Buffer;
pub use source_buffer::SourceBuffer;
pub use static_buffer::{AttributeSignature, StaticVertexBuffer, elements_in_buffer};
pub use streaming::{StreamAllocation, StreamingBuffer};
