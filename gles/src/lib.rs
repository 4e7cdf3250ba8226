//! # RedLilium GLES
//!
//! Vertex attribute streaming, conversion and caching for an OpenGL ES
//! translation layer running on a native GPU backend.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`format`] - Client-to-native vertex format table and converters
//! - [`GlesDevice`] - Backend strategy, configuration and buffer serials
//! - [`StreamingBuffer`] and [`SourceBuffer`] - Per-draw and cached vertex data
//! - [`VertexDataManager`] - Per-draw attribute translation
//! - [`InputLayoutCache`] - Input layout caching and vertex buffer binding
//! - Multiple backend support: wgpu and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_gles::{DeviceConfig, GlesDevice, PrimitiveMode};
//!
//! let device = GlesDevice::new(DeviceConfig::default())?;
//! let mut manager = device.create_vertex_data_manager()?;
//! let mut layouts = device.create_input_layout_cache();
//!
//! let translated = manager.prepare_vertex_data(
//!     vao.attributes(),
//!     current_values.as_slice(),
//!     &program,
//!     first,
//!     count,
//!     instances,
//! )?;
//! layouts.apply_vertex_buffers(&translated, PrimitiveMode::Triangles, &program)?;
//! ```

pub mod backend;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod profiling;
pub mod resources;
pub mod types;
pub mod vertex;

// Re-export main types for convenience
pub use backend::{BackendCapabilities, BackendError, BackendType, GpuBackend};
pub use config::DeviceConfig;
pub use device::GlesDevice;
pub use error::{GlesError, Result};
pub use format::{FormatKey, NativeFormatDescriptor, VertexFormat};
pub use resources::{Buffer, SourceBuffer, StaticVertexBuffer, StreamingBuffer};
pub use types::{
    AttributeDescriptor, ComponentType, CurrentValue, CurrentValues, PrimitiveMode,
    ShaderAttribute, ShaderInputType, ShaderProgram, UsageHint, VertexArray,
};
pub use vertex::{InputLayoutCache, StorageClass, TranslatedAttribute, VertexDataManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the vertex translation subsystem.
///
/// Starts the Tracy client when the `profiling` feature is enabled.
pub fn init() {
    #[cfg(feature = "profiling")]
    profiling::Client::start();
    log::info!("RedLilium GLES v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_device() {
        let device = GlesDevice::new(DeviceConfig::default()).unwrap();
        assert_eq!(device.backend().name(), "Dummy Backend");
    }
}
