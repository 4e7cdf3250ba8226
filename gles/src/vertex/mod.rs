//! Vertex attribute translation for draw calls.
//!
//! A draw goes through two stages:
//!
//! 1. [`VertexDataManager::prepare_vertex_data`] turns the attribute state
//!    into [`TranslatedAttribute`]s, moving data into device buffers with
//!    one of the [`StorageClass`] strategies.
//! 2. [`InputLayoutCache::apply_vertex_buffers`] makes a matching input
//!    layout current and binds the translated buffers.

mod classify;
mod input_layout;
mod manager;

pub use classify::{StorageClass, classify_attribute};
pub use input_layout::{InputLayoutCache, LayoutFlags, PackedAttribute, PackedInputLayoutKey};
pub use manager::{TranslatedAttribute, VertexDataManager, element_count};
