//! Common utilities for vertex translation integration tests.
//!
//! This module provides shared test infrastructure that can be reused
//! across different backend implementations.

use std::sync::Arc;

use redlilium_gles::backend::dummy::DummyBackend;
use redlilium_gles::{
    BackendCapabilities, BackendType, DeviceConfig, GlesDevice, ShaderAttribute, ShaderInputType,
    ShaderProgram,
};

/// Install the test logger once.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available device backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend (host memory, records every call).
    Dummy,
    /// wgpu backend.
    Wgpu,
}

impl Backend {
    /// Check if this backend is currently available.
    pub fn is_available(&self) -> bool {
        match self {
            // Dummy backend is always available
            Backend::Dummy => true,
            // wgpu backend is available when the feature is enabled
            Backend::Wgpu => redlilium_gles::backend::has_gpu_backend(),
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// Test context providing a device and, for the dummy backend, its call log.
pub struct TestContext {
    /// The backend being tested.
    #[allow(dead_code)]
    pub backend: Backend,
    /// Device for creating resources.
    pub device: Arc<GlesDevice>,
    /// The dummy backend behind `device`, when testing the dummy backend.
    #[allow(dead_code)]
    pub dummy: Option<Arc<DummyBackend>>,
}

impl TestContext {
    /// Create a new test context for the given backend.
    ///
    /// Returns `None` if the backend is not available.
    pub fn new(backend: Backend) -> Option<Self> {
        Self::with_config(backend, DeviceConfig::default())
    }

    /// Create a test context with a custom configuration.
    pub fn with_config(backend: Backend, config: DeviceConfig) -> Option<Self> {
        if !backend.is_available() {
            return None;
        }
        init_logging();

        match backend {
            Backend::Dummy => Some(Self::dummy(DummyBackend::new(), config)),
            Backend::Wgpu => {
                let device = GlesDevice::new(config.with_backend(BackendType::Wgpu)).ok()?;
                Some(Self {
                    backend,
                    device,
                    dummy: None,
                })
            }
        }
    }

    /// Create a dummy-backend context with the given capabilities.
    #[allow(dead_code)]
    pub fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        init_logging();
        Self::dummy(DummyBackend::with_capabilities(capabilities), DeviceConfig::default())
    }

    /// Create a context around a configured dummy backend.
    pub fn dummy(backend: DummyBackend, config: DeviceConfig) -> Self {
        let dummy = Arc::new(backend);
        let device = GlesDevice::with_backend(dummy.clone(), config)
            .expect("dummy device creation cannot fail with a valid config");
        Self {
            backend: Backend::Dummy,
            device,
            dummy: Some(dummy),
        }
    }

    /// Get the dummy backend; panics for other backends.
    #[allow(dead_code)]
    pub fn dummy_backend(&self) -> &Arc<DummyBackend> {
        self.dummy.as_ref().expect("test requires the dummy backend")
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Program reading float attributes at the given locations.
pub fn float_program(locations: &[u32]) -> ShaderProgram {
    locations.iter().fold(ShaderProgram::new(), |program, &location| {
        program.with_attribute(ShaderAttribute::new(
            format!("a_input{location}"),
            location,
            ShaderInputType::Float,
        ))
    })
}

/// Decode little-endian 32-bit floats.
#[allow(dead_code)]
pub fn read_f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Encode values as little-endian bytes.
#[allow(dead_code)]
pub fn bytes_of<T: bytemuck::Pod>(values: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}
