//! Tracy instrumentation for the draw-call path.
//!
//! Built with the `profiling` feature, [`prepare_vertex_data`], static
//! conversions and [`apply_vertex_buffers`] open Tracy zones, and the
//! streaming buffer plots its capacity every time it grows. Without the
//! feature every macro here expands to nothing.
//!
//! Call [`crate::init`] once before the first draw so the Tracy client is
//! running when the first zone opens.
//!
//! [`prepare_vertex_data`]: crate::VertexDataManager::prepare_vertex_data
//! [`apply_vertex_buffers`]: crate::InputLayoutCache::apply_vertex_buffers

#[cfg(feature = "profiling")]
pub use tracy_client::{Client, plot as tracy_plot, span};

/// Open a named zone that closes at the end of the enclosing block.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _zone = $crate::profiling::span!($name);
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Open a zone named after the enclosing function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _zone = $crate::profiling::span!();
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Record one sample of a Tracy plot, e.g. a buffer capacity in bytes.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_plot {
    ($name:literal, $value:expr) => {
        $crate::profiling::tracy_plot!($name, $value as f64)
    };
}

#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_plot {
    ($name:literal, $value:expr) => {
        let _ = $value;
    };
}
