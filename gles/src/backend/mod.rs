//! Device backend abstraction layer.
//!
//! The vertex pipeline talks to the device through the [`GpuBackend`]
//! capability trait. One backend is chosen when a [`GlesDevice`] is created
//! and all buffers, input layouts and bindings go through it.
//!
//! # Available Backends
//!
//! - `dummy` (default): host-memory backend for testing; records every call
//! - `wgpu-backend`: cross-platform backend using wgpu
//!
//! [`GlesDevice`]: crate::device::GlesDevice

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub mod dummy;
mod error;

use std::sync::Arc;

pub use error::BackendError;

use crate::format::FormatCaps;
use crate::types::{BufferDescriptor, IndexFormat, InputElement, MapHint, ShaderProgram};

/// Handle to a device buffer allocation.
pub enum GpuBuffer {
    /// Dummy backend buffer (host memory)
    Dummy(dummy::DummyBuffer),
    /// wgpu backend buffer
    #[cfg(feature = "wgpu-backend")]
    Wgpu(Arc<wgpu::Buffer>),
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(buffer) => f.debug_tuple("GpuBuffer::Dummy").field(buffer).finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(buffer) => f.debug_tuple("GpuBuffer::Wgpu").field(buffer).finish(),
        }
    }
}

/// Handle to a device input layout object.
pub enum GpuInputLayout {
    /// Dummy backend layout
    Dummy {
        /// Backend-local identifier.
        id: u64,
        /// Elements the layout was created from.
        elements: Vec<InputElement>,
    },
    /// wgpu backend layout
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu_backend::WgpuInputLayout),
}

impl std::fmt::Debug for GpuInputLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { id, elements } => f
                .debug_struct("GpuInputLayout::Dummy")
                .field("id", id)
                .field("elements", &elements.len())
                .finish(),
            #[cfg(feature = "wgpu-backend")]
            Self::Wgpu(layout) => f.debug_tuple("GpuInputLayout::Wgpu").field(layout).finish(),
        }
    }
}

/// One vertex buffer slot binding.
#[derive(Debug, Clone, Copy)]
pub struct VertexBufferBinding<'a> {
    /// Bound buffer; `None` unbinds the slot.
    pub buffer: Option<&'a GpuBuffer>,
    /// Byte stride between elements.
    pub stride: u32,
    /// Byte offset of the first element.
    pub offset: u32,
}

/// What the active backend can do.
///
/// The format table and the input layout cache consult these flags instead
/// of branching on the backend type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendCapabilities {
    /// Application buffers can be bound without a copy.
    pub direct_binding: bool,
    /// One-component 8/16-bit formats are available.
    pub single_component_formats: bool,
    /// Unsigned 10-10-10-2 formats are available.
    pub packed_10_10_10_2: bool,
    /// Integer vertex inputs are available.
    pub integer_attributes: bool,
    /// Instance step rates other than 1 are available.
    pub instance_step_rates: bool,
    /// Points with `gl_PointSize` are drawn as instanced quads.
    pub instanced_point_sprite_emulation: bool,
    /// Slot 0 must hold per-vertex data.
    pub requires_non_instanced_slot_zero: bool,
    /// Number of vertex buffer slots.
    pub max_vertex_buffer_slots: u32,
    /// Minimum alignment of vertex buffer binding offsets.
    pub min_binding_alignment: u32,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            direct_binding: true,
            single_component_formats: true,
            packed_10_10_10_2: true,
            integer_attributes: true,
            instance_step_rates: true,
            instanced_point_sprite_emulation: false,
            requires_non_instanced_slot_zero: false,
            max_vertex_buffer_slots: 32,
            min_binding_alignment: 4,
        }
    }
}

impl BackendCapabilities {
    /// Format support used by the conversion table.
    pub fn format_caps(&self) -> FormatCaps {
        FormatCaps {
            single_component_formats: self.single_component_formats,
            packed_10_10_10_2: self.packed_10_10_10_2,
            integer_attributes: self.integer_attributes,
        }
    }
}

/// Device backend trait.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Get the backend capabilities.
    fn capabilities(&self) -> &BackendCapabilities;

    /// Create a buffer. Contents are undefined until written.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, BackendError>;

    /// Map `[offset, offset + size)` for writing, run `writer` on it and unmap.
    fn map_write(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
        hint: MapHint,
        writer: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), BackendError>;

    /// Abandon the previous contents of a buffer.
    fn discard(&self, buffer: &GpuBuffer) -> Result<(), BackendError>;

    /// Read data back from a buffer.
    ///
    /// This is a blocking operation that waits for the device to finish.
    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8>;

    /// Release a buffer allocation.
    fn destroy_buffer(&self, buffer: &GpuBuffer);

    /// Create an input layout object linking `elements` to `program`.
    fn create_input_layout(
        &self,
        elements: &[InputElement],
        program: &ShaderProgram,
    ) -> Result<GpuInputLayout, BackendError>;

    /// Make an input layout current.
    fn set_input_layout(&self, layout: &GpuInputLayout);

    /// Bind consecutive vertex buffer slots starting at `first_slot`.
    fn bind_vertex_buffers(&self, first_slot: u32, bindings: &[VertexBufferBinding<'_>]);

    /// Bind an index buffer.
    fn set_index_buffer(&self, buffer: &GpuBuffer, format: IndexFormat, offset: u64);
}

/// Backend selection made at device creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Host-memory backend.
    #[default]
    Dummy,
    /// wgpu backend.
    Wgpu,
    /// Best available backend, falling back to dummy.
    Auto,
}

/// Creates the backend strategy for a device.
///
/// # Errors
///
/// Returns `InitializationFailed` when wgpu is requested explicitly but the
/// crate was built without `wgpu-backend`.
pub fn create_backend(backend_type: BackendType) -> Result<Arc<dyn GpuBackend>, BackendError> {
    match backend_type {
        BackendType::Dummy => {
            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::new()))
        }
        BackendType::Wgpu => {
            #[cfg(feature = "wgpu-backend")]
            {
                let backend = wgpu_backend::WgpuBackend::new()?;
                log::info!("Using wgpu backend");
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "wgpu-backend"))]
            {
                Err(BackendError::InitializationFailed(
                    "crate built without the wgpu-backend feature".to_string(),
                ))
            }
        }
        BackendType::Auto => {
            #[cfg(feature = "wgpu-backend")]
            {
                match wgpu_backend::WgpuBackend::new() {
                    Ok(backend) => {
                        log::info!("Using wgpu backend");
                        return Ok(Arc::new(backend));
                    }
                    Err(e) => {
                        log::warn!("Failed to create wgpu backend: {}", e);
                    }
                }
            }

            // Fall back to dummy backend
            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::new()))
        }
    }
}

/// Check if a real device backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_dummy_backend() {
        let backend = create_backend(BackendType::Dummy).unwrap();
        assert_eq!(backend.name(), "Dummy Backend");
    }

    #[test]
    fn test_auto_backend_always_succeeds() {
        assert!(create_backend(BackendType::Auto).is_ok());
    }

    #[cfg(not(feature = "wgpu-backend"))]
    #[test]
    fn test_wgpu_unavailable_without_feature() {
        assert!(matches!(
            create_backend(BackendType::Wgpu),
            Err(BackendError::InitializationFailed(_))
        ));
        assert!(!has_gpu_backend());
    }

    #[test]
    fn test_format_caps_follow_capabilities() {
        let caps = BackendCapabilities {
            single_component_formats: false,
            ..Default::default()
        };
        assert!(!caps.format_caps().single_component_formats);
        assert!(caps.format_caps().integer_attributes);
    }
}
