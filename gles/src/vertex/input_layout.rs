//! Device input layout cache and vertex buffer slot tracking.
//!
//! Input layouts are expensive device objects. The cache keys them by a
//! [`PackedInputLayoutKey`] built in the program's semantic order, so two
//! draws that feed the same shader inputs with the same formats share one
//! layout no matter which attribute locations the data came from.
//!
//! The cache also remembers what each vertex buffer slot was last bound to
//! and only reissues the bind call for the smallest contiguous range of
//! slots that changed.

use std::collections::BTreeMap;
use std::sync::Arc;

use bitflags::bitflags;

use crate::backend::{GpuInputLayout, VertexBufferBinding};
use crate::device::GlesDevice;
use crate::error::{GlesError, Result};
use crate::format::VertexFormat;
use crate::resources::Buffer;
use crate::types::{
    BufferDescriptor, BufferUsage, IndexFormat, InputElement, InputSemantic, InputStepRate,
    PrimitiveMode, ShaderInputType, ShaderProgram,
};
use crate::vertex::TranslatedAttribute;

bitflags! {
    /// Backend emulation modes recorded in a layout key.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LayoutFlags: u8 {
        /// The program uses instanced point-sprite emulation.
        const USES_INSTANCED_SPRITES = 1 << 0;
        /// The first per-vertex element was swapped into slot 0.
        const MOVE_FIRST_INDEXED = 1 << 1;
        /// Points are being drawn with instanced point-sprite emulation.
        const INSTANCED_SPRITES_ACTIVE = 1 << 2;
    }
}

/// Stride of one point-sprite quad vertex (position xyz + texcoord uv).
const SPRITE_VERTEX_STRIDE: u32 = 20;

#[rustfmt::skip]
const SPRITE_VERTICES: [f32; 30] = [
    // position        texcoord
    -1.0, -1.0, 0.0,   0.0, 1.0,
    -1.0,  1.0, 0.0,   0.0, 0.0,
     1.0,  1.0, 0.0,   1.0, 0.0,
     1.0, -1.0, 0.0,   1.0, 1.0,
    -1.0, -1.0, 0.0,   0.0, 1.0,
     1.0,  1.0, 0.0,   1.0, 0.0,
];

const SPRITE_INDICES: [u16; 6] = [0, 1, 2, 3, 4, 5];

/// One attribute as recorded in a layout key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackedAttribute {
    /// Component class the shader reads.
    pub input_type: ShaderInputType,
    /// Shader semantic index.
    pub semantic_index: u32,
    /// Native format of the bound data.
    pub format: VertexFormat,
    /// Instancing divisor.
    pub divisor: u32,
}

/// Structural key of a device input layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackedInputLayoutKey {
    flags: u8,
    attributes: Vec<PackedAttribute>,
}

impl PackedInputLayoutKey {
    /// Get the emulation flags.
    pub fn flags(&self) -> LayoutFlags {
        LayoutFlags::from_bits_truncate(self.flags)
    }

    /// Get the attributes in semantic order.
    pub fn attributes(&self) -> &[PackedAttribute] {
        &self.attributes
    }

    /// Number of application attributes.
    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }
}

/// Last binding of one vertex buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotBinding {
    serial: Option<u64>,
    stride: u32,
    offset: u32,
}

impl SlotBinding {
    /// Never equal to a real binding.
    const UNKNOWN: Self = Self {
        serial: None,
        stride: u32::MAX,
        offset: u32::MAX,
    };
}

/// Caches device input layouts and applies vertex buffer bindings.
pub struct InputLayoutCache {
    device: Arc<GlesDevice>,
    layouts: BTreeMap<PackedInputLayoutKey, Arc<GpuInputLayout>>,
    capacity: usize,
    current_layout: Option<Arc<GpuInputLayout>>,
    current_bindings: Vec<SlotBinding>,
    sprite_vertices: Option<Arc<Buffer>>,
    sprite_indices: Option<Arc<Buffer>>,
    hits: u64,
    misses: u64,
}

impl InputLayoutCache {
    /// Create a cache holding at most `capacity` layouts.
    pub fn new(device: &Arc<GlesDevice>, capacity: usize) -> Self {
        let slots = device.capabilities().max_vertex_buffer_slots as usize;
        Self {
            device: Arc::clone(device),
            layouts: BTreeMap::new(),
            capacity: capacity.max(1),
            current_layout: None,
            current_bindings: vec![SlotBinding::UNKNOWN; slots],
            sprite_vertices: None,
            sprite_indices: None,
            hits: 0,
            misses: 0,
        }
    }

    /// Number of cached layouts.
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// Whether the cache holds no layouts.
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// Maximum number of cached layouts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lookups answered from the cache.
    pub fn cache_hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that created a new layout.
    pub fn cache_misses(&self) -> u64 {
        self.misses
    }

    /// Forget the current layout and slot bindings.
    ///
    /// The next apply rebinds every slot.
    pub fn mark_dirty(&mut self) {
        self.current_layout = None;
        self.current_bindings.fill(SlotBinding::UNKNOWN);
    }

    /// Drop every cached layout.
    pub fn clear(&mut self) {
        self.layouts.clear();
        self.mark_dirty();
    }

    /// Make the input layout for `attributes` current and bind their buffers.
    ///
    /// `attributes` is indexed by attribute location, as returned by
    /// [`VertexDataManager::prepare_vertex_data`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the attributes need more slots than the
    /// backend has or an offset does not fit a binding, and the backend's
    /// error if the layout cannot be created.
    ///
    /// [`VertexDataManager::prepare_vertex_data`]: crate::vertex::VertexDataManager::prepare_vertex_data
    pub fn apply_vertex_buffers(
        &mut self,
        attributes: &[TranslatedAttribute],
        mode: PrimitiveMode,
        program: &ShaderProgram,
    ) -> Result<()> {
        crate::profile_function!();

        let caps = self.device.capabilities();
        let uses_sprites = caps.instanced_point_sprite_emulation && program.uses_point_size();
        let sprites_active = uses_sprites && mode == PrimitiveMode::Points;
        let move_to_slot_zero = caps.requires_non_instanced_slot_zero;
        let max_slots = self.current_bindings.len();

        let mut sorted: Vec<_> = attributes
            .iter()
            .enumerate()
            .filter(|(_, attribute)| attribute.active)
            .filter_map(|(location, attribute)| {
                program
                    .attribute_at(location as u32)
                    .map(|shader| (shader, attribute))
            })
            .collect();
        sorted.sort_by_key(|(shader, _)| shader.semantic_index);

        let sprite_slot = sorted.len();
        if sprite_slot + uses_sprites as usize > max_slots {
            return Err(GlesError::InvalidOperation(format!(
                "{} vertex inputs exceed {max_slots} vertex buffer slots",
                sprite_slot + uses_sprites as usize
            )));
        }

        let mut flags = LayoutFlags::empty();
        flags.set(LayoutFlags::USES_INSTANCED_SPRITES, uses_sprites);
        flags.set(LayoutFlags::INSTANCED_SPRITES_ACTIVE, sprites_active);

        let steps: Vec<InputStepRate> = sorted
            .iter()
            .map(|(_, attribute)| {
                if sprites_active {
                    InputStepRate::PerInstance(attribute.divisor.max(1))
                } else if attribute.divisor > 0 {
                    InputStepRate::PerInstance(attribute.divisor)
                } else {
                    InputStepRate::PerVertex
                }
            })
            .collect();

        // Slot 0 must stay per-vertex on some backends.
        let mut slots: Vec<u32> = (0..sorted.len() as u32).collect();
        if move_to_slot_zero
            && steps.first().is_some_and(|step| *step != InputStepRate::PerVertex)
            && let Some(indexed) = steps.iter().position(|step| *step == InputStepRate::PerVertex)
        {
            slots.swap(0, indexed);
            flags |= LayoutFlags::MOVE_FIRST_INDEXED;
        }

        let mut key = PackedInputLayoutKey {
            flags: flags.bits(),
            attributes: Vec::with_capacity(sorted.len()),
        };
        let mut elements = Vec::with_capacity(sorted.len() + 2);
        for (i, (shader, attribute)) in sorted.iter().enumerate() {
            key.attributes.push(PackedAttribute {
                input_type: shader.input_type,
                semantic_index: shader.semantic_index,
                format: attribute.format,
                divisor: attribute.divisor,
            });
            elements.push(InputElement::new(
                InputSemantic::TexCoord(shader.semantic_index),
                attribute.format,
                slots[i],
                steps[i],
            ));
        }
        if uses_sprites {
            let slot = sprite_slot as u32;
            elements.push(InputElement::new(
                InputSemantic::SpritePosition,
                VertexFormat::Float32x3,
                slot,
                InputStepRate::PerVertex,
            ));
            elements.push(
                InputElement::new(
                    InputSemantic::SpriteTexCoord,
                    VertexFormat::Float32x2,
                    slot,
                    InputStepRate::PerVertex,
                )
                .with_offset(12),
            );
        }

        // Everything fallible runs before the device state changes.
        let mut next: Vec<(Option<Arc<Buffer>>, u32, u32)> = vec![(None, 0, 0); max_slots];
        for (i, (_, attribute)) in sorted.iter().enumerate() {
            let offset = u32::try_from(attribute.offset).map_err(|_| {
                GlesError::InvalidOperation(format!(
                    "vertex buffer offset {} exceeds 32 bits",
                    attribute.offset
                ))
            })?;
            next[slots[i] as usize] = (attribute.buffer.clone(), attribute.stride, offset);
        }

        let mut sprite_indices = None;
        if uses_sprites {
            let (vertices, indices) = self.sprite_buffers()?;
            next[sprite_slot] = (Some(vertices), SPRITE_VERTEX_STRIDE, 0);
            if sprites_active {
                sprite_indices = Some(indices);
            }
        }

        let layout = self.layout_for(key, &elements, program)?;
        if !self
            .current_layout
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &layout))
        {
            self.device.backend().set_input_layout(&layout);
            self.current_layout = Some(layout);
        }

        if let Some(indices) = sprite_indices {
            self.device
                .backend()
                .set_index_buffer(indices.raw(), IndexFormat::Uint16, 0);
        }

        self.bind_changed_slots(&next);
        Ok(())
    }

    fn layout_for(
        &mut self,
        key: PackedInputLayoutKey,
        elements: &[InputElement],
        program: &ShaderProgram,
    ) -> Result<Arc<GpuInputLayout>> {
        if let Some(layout) = self.layouts.get(&key) {
            self.hits += 1;
            return Ok(Arc::clone(layout));
        }

        let layout = Arc::new(self.device.backend().create_input_layout(elements, program)?);
        self.misses += 1;
        log::debug!(
            "Created input layout with {} elements ({:?})",
            elements.len(),
            key.flags()
        );

        self.make_room();
        self.layouts.insert(key, Arc::clone(&layout));
        Ok(layout)
    }

    /// Evict before an insert so the cache never exceeds its capacity.
    fn make_room(&mut self) {
        if self.layouts.len() < self.capacity {
            return;
        }

        log::debug!(
            "Input layout cache reached {} entries, purging half",
            self.capacity
        );
        let evicted: Vec<PackedInputLayoutKey> =
            self.layouts.keys().skip(1).step_by(2).cloned().collect();
        for key in &evicted {
            self.layouts.remove(key);
        }
        while self.layouts.len() >= self.capacity {
            if self.layouts.pop_first().is_none() {
                break;
            }
        }
    }

    fn sprite_buffers(&mut self) -> Result<(Arc<Buffer>, Arc<Buffer>)> {
        if let (Some(vertices), Some(indices)) = (&self.sprite_vertices, &self.sprite_indices) {
            return Ok((Arc::clone(vertices), Arc::clone(indices)));
        }

        let vertices = self.device.create_buffer_with_data(
            &BufferDescriptor::new(std::mem::size_of_val(&SPRITE_VERTICES) as u64, BufferUsage::VERTEX)
                .with_label("point_sprite_vertices"),
            bytemuck::cast_slice(&SPRITE_VERTICES),
        )?;
        let indices = self.device.create_buffer_with_data(
            &BufferDescriptor::new(std::mem::size_of_val(&SPRITE_INDICES) as u64, BufferUsage::INDEX)
                .with_label("point_sprite_indices"),
            bytemuck::cast_slice(&SPRITE_INDICES),
        )?;
        log::debug!("Created point sprite emulation buffers");

        self.sprite_vertices = Some(Arc::clone(&vertices));
        self.sprite_indices = Some(Arc::clone(&indices));
        Ok((vertices, indices))
    }

    fn bind_changed_slots(&mut self, next: &[(Option<Arc<Buffer>>, u32, u32)]) {
        let mut dirty: Option<(usize, usize)> = None;
        for (slot, (buffer, stride, offset)) in next.iter().enumerate() {
            let binding = SlotBinding {
                serial: buffer.as_ref().map(|buffer| buffer.serial()),
                stride: *stride,
                offset: *offset,
            };
            if self.current_bindings[slot] != binding {
                self.current_bindings[slot] = binding;
                dirty = Some(dirty.map_or((slot, slot), |(first, _)| (first, slot)));
            }
        }

        let Some((first, last)) = dirty else {
            return;
        };
        let bindings: Vec<VertexBufferBinding<'_>> = next[first..=last]
            .iter()
            .map(|(buffer, stride, offset)| VertexBufferBinding {
                buffer: buffer.as_ref().map(|buffer| buffer.raw()),
                stride: *stride,
                offset: *offset,
            })
            .collect();
        self.device
            .backend()
            .bind_vertex_buffers(first as u32, &bindings);
    }
}

impl std::fmt::Debug for InputLayoutCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputLayoutCache")
            .field("len", &self.layouts.len())
            .field("capacity", &self.capacity)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}
