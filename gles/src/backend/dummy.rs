//! Dummy device backend for testing and development.
//!
//! This backend keeps buffer contents in host memory and records every call
//! in [`DummyStats`], so tests can observe exactly how many writes, discards
//! and binds a draw produced without requiring GPU hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::types::{
    BufferDescriptor, IndexFormat, InputElement, InputSemantic, InputStepRate, MapHint,
    ShaderProgram,
};

use super::{
    BackendCapabilities, BackendError, GpuBackend, GpuBuffer, GpuInputLayout, VertexBufferBinding,
};

/// Host-memory buffer of the dummy backend.
#[derive(Clone)]
pub struct DummyBuffer {
    id: u64,
    data: Arc<Mutex<Vec<u8>>>,
}

impl DummyBuffer {
    /// Backend-local buffer identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Allocation size in bytes.
    pub fn size(&self) -> u64 {
        self.data.lock().len() as u64
    }
}

impl std::fmt::Debug for DummyBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBuffer")
            .field("id", &self.id)
            .field("size", &self.size())
            .finish()
    }
}

/// Slot state recorded by the last vertex buffer bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedBinding {
    /// Buffer id, `None` for an unbound slot.
    pub buffer: Option<u64>,
    /// Byte stride.
    pub stride: u32,
    /// Byte offset.
    pub offset: u32,
}

/// Call counters of the dummy backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DummyStats {
    /// Buffers created.
    pub buffers_created: u64,
    /// Buffers destroyed.
    pub buffers_destroyed: u64,
    /// Bytes currently allocated.
    pub live_bytes: u64,
    /// Map/unmap write pairs.
    pub map_writes: u64,
    /// Bytes written through `map_write`.
    pub bytes_written: u64,
    /// Map writes that used the no-overwrite hint.
    pub no_overwrite_writes: u64,
    /// Whole-buffer discards.
    pub discards: u64,
    /// Input layouts created.
    pub input_layouts_created: u64,
    /// Input layout changes.
    pub input_layout_sets: u64,
    /// Vertex buffer bind calls.
    pub vertex_buffer_binds: u64,
    /// First slot and slot count of the last vertex buffer bind.
    pub last_bind_range: Option<(u32, u32)>,
    /// Index buffer bind calls.
    pub index_buffer_binds: u64,
}

/// Dummy device backend.
pub struct DummyBackend {
    capabilities: BackendCapabilities,
    memory_budget: Option<u64>,
    next_id: AtomicU64,
    stats: Mutex<DummyStats>,
    slots: Mutex<Vec<RecordedBinding>>,
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyBackend {
    /// Create a new dummy backend with default capabilities.
    pub fn new() -> Self {
        Self::with_capabilities(BackendCapabilities::default())
    }

    /// Create a dummy backend that reports the given capabilities.
    pub fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        let slots = vec![
            RecordedBinding {
                buffer: None,
                stride: 0,
                offset: 0,
            };
            capabilities.max_vertex_buffer_slots as usize
        ];
        Self {
            capabilities,
            memory_budget: None,
            next_id: AtomicU64::new(1),
            stats: Mutex::new(DummyStats::default()),
            slots: Mutex::new(slots),
        }
    }

    /// Fail buffer creation once `budget` bytes are live.
    pub fn with_memory_budget(mut self, budget: u64) -> Self {
        self.memory_budget = Some(budget);
        self
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> DummyStats {
        self.stats.lock().clone()
    }

    /// Reset all call counters except live allocation bytes.
    pub fn reset_stats(&self) {
        let mut stats = self.stats.lock();
        let live_bytes = stats.live_bytes;
        *stats = DummyStats {
            live_bytes,
            ..DummyStats::default()
        };
    }

    /// Current binding of a vertex buffer slot.
    pub fn bound_slot(&self, slot: u32) -> Option<RecordedBinding> {
        self.slots.lock().get(slot as usize).copied()
    }

    fn dummy_buffer<'a>(&self, buffer: &'a GpuBuffer) -> Result<&'a DummyBuffer, BackendError> {
        match buffer {
            GpuBuffer::Dummy(buffer) => Ok(buffer),
            #[allow(unreachable_patterns)]
            _ => Err(BackendError::ForeignHandle("buffer")),
        }
    }
}

impl std::fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyBackend")
            .field("memory_budget", &self.memory_budget)
            .field("stats", &*self.stats.lock())
            .finish()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, BackendError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );

        let mut stats = self.stats.lock();
        if let Some(budget) = self.memory_budget
            && stats.live_bytes.saturating_add(descriptor.size) > budget
        {
            return Err(BackendError::OutOfMemory {
                requested: descriptor.size,
            });
        }
        let size = usize::try_from(descriptor.size).map_err(|_| BackendError::OutOfMemory {
            requested: descriptor.size,
        })?;

        stats.buffers_created += 1;
        stats.live_bytes += descriptor.size;

        Ok(GpuBuffer::Dummy(DummyBuffer {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            data: Arc::new(Mutex::new(vec![0u8; size])),
        }))
    }

    fn map_write(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
        hint: MapHint,
        writer: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), BackendError> {
        let buffer = self.dummy_buffer(buffer)?;
        log::trace!(
            "DummyBackend: map_write buffer {} [{}, {}) {:?}",
            buffer.id,
            offset,
            offset + size,
            hint
        );

        {
            let mut data = buffer.data.lock();
            let end = offset
                .checked_add(size)
                .filter(|&end| end <= data.len() as u64)
                .ok_or_else(|| {
                    BackendError::InvalidParameter(format!(
                        "map range [{offset}, +{size}) exceeds buffer size {}",
                        data.len()
                    ))
                })?;
            writer(&mut data[offset as usize..end as usize]);
        }

        let mut stats = self.stats.lock();
        stats.map_writes += 1;
        stats.bytes_written += size;
        if hint == MapHint::NoOverwrite {
            stats.no_overwrite_writes += 1;
        }
        Ok(())
    }

    fn discard(&self, buffer: &GpuBuffer) -> Result<(), BackendError> {
        let buffer = self.dummy_buffer(buffer)?;
        log::trace!("DummyBackend: discarding buffer {}", buffer.id);
        self.stats.lock().discards += 1;
        Ok(())
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8> {
        let Ok(buffer) = self.dummy_buffer(buffer) else {
            return vec![0u8; size as usize];
        };
        let data = buffer.data.lock();
        let start = (offset as usize).min(data.len());
        let end = (offset.saturating_add(size) as usize).min(data.len());
        data[start..end].to_vec()
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        if let Ok(buffer) = self.dummy_buffer(buffer) {
            log::trace!("DummyBackend: destroying buffer {}", buffer.id);
            let size = buffer.size();
            let mut stats = self.stats.lock();
            stats.buffers_destroyed += 1;
            stats.live_bytes = stats.live_bytes.saturating_sub(size);
        }
    }

    fn create_input_layout(
        &self,
        elements: &[InputElement],
        program: &ShaderProgram,
    ) -> Result<GpuInputLayout, BackendError> {
        for element in elements {
            if element.slot >= self.capabilities.max_vertex_buffer_slots {
                return Err(BackendError::InvalidParameter(format!(
                    "input slot {} exceeds {} slots",
                    element.slot, self.capabilities.max_vertex_buffer_slots
                )));
            }
            if let InputStepRate::PerInstance(rate) = element.step
                && rate > 1
                && !self.capabilities.instance_step_rates
            {
                return Err(BackendError::UnsupportedLayout(format!(
                    "instance step rate {rate}"
                )));
            }
            if let InputSemantic::TexCoord(index) = element.semantic
                && !program.attributes().iter().any(|a| a.semantic_index == index)
            {
                return Err(BackendError::InvalidParameter(format!(
                    "program {:?} has no input for semantic {index}",
                    program.label()
                )));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "DummyBackend: creating input layout {} ({} elements)",
            id,
            elements.len()
        );
        self.stats.lock().input_layouts_created += 1;

        Ok(GpuInputLayout::Dummy {
            id,
            elements: elements.to_vec(),
        })
    }

    fn set_input_layout(&self, layout: &GpuInputLayout) {
        log::trace!("DummyBackend: set input layout {:?}", layout);
        self.stats.lock().input_layout_sets += 1;
    }

    fn bind_vertex_buffers(&self, first_slot: u32, bindings: &[VertexBufferBinding<'_>]) {
        log::trace!(
            "DummyBackend: binding vertex buffers [{}, {})",
            first_slot,
            first_slot as usize + bindings.len()
        );

        let mut slots = self.slots.lock();
        for (i, binding) in bindings.iter().enumerate() {
            if let Some(slot) = slots.get_mut(first_slot as usize + i) {
                *slot = RecordedBinding {
                    buffer: binding.buffer.and_then(|b| self.dummy_buffer(b).ok()).map(|b| b.id),
                    stride: binding.stride,
                    offset: binding.offset,
                };
            }
        }

        let mut stats = self.stats.lock();
        stats.vertex_buffer_binds += 1;
        stats.last_bind_range = Some((first_slot, bindings.len() as u32));
    }

    fn set_index_buffer(&self, buffer: &GpuBuffer, format: IndexFormat, offset: u64) {
        log::trace!(
            "DummyBackend: set index buffer {:?} ({:?}, offset {})",
            buffer,
            format,
            offset
        );
        self.stats.lock().index_buffer_binds += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::VertexFormat;
    use crate::types::{BufferUsage, ShaderAttribute, ShaderInputType};

    #[test]
    fn test_buffer_write_and_read() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX))
            .unwrap();

        backend
            .map_write(&buffer, 4, 4, MapHint::NoOverwrite, &mut |dst| {
                dst.copy_from_slice(&[1, 2, 3, 4])
            })
            .unwrap();

        assert_eq!(backend.read_buffer(&buffer, 4, 4), vec![1, 2, 3, 4]);
        let stats = backend.stats();
        assert_eq!(stats.map_writes, 1);
        assert_eq!(stats.no_overwrite_writes, 1);
        assert_eq!(stats.bytes_written, 4);
    }

    #[test]
    fn test_map_out_of_range() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(8, BufferUsage::VERTEX))
            .unwrap();
        let result = backend.map_write(&buffer, 4, 8, MapHint::Write, &mut |_| {});
        assert!(matches!(result, Err(BackendError::InvalidParameter(_))));
    }

    #[test]
    fn test_memory_budget() {
        let backend = DummyBackend::new().with_memory_budget(100);
        let first = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        let result = backend.create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX));
        assert_eq!(result.unwrap_err(), BackendError::OutOfMemory { requested: 64 });

        backend.destroy_buffer(&first);
        assert_eq!(backend.stats().live_bytes, 0);
        assert!(
            backend
                .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
                .is_ok()
        );
    }

    #[test]
    fn test_input_layout_validation() {
        let backend = DummyBackend::with_capabilities(BackendCapabilities {
            instance_step_rates: false,
            ..Default::default()
        });
        let program = ShaderProgram::new()
            .with_attribute(ShaderAttribute::new("a_position", 0, ShaderInputType::Float));

        let element = InputElement::new(
            InputSemantic::TexCoord(0),
            VertexFormat::Float32x3,
            0,
            InputStepRate::PerVertex,
        );
        assert!(backend.create_input_layout(&[element], &program).is_ok());

        let missing = InputElement {
            semantic: InputSemantic::TexCoord(5),
            ..element
        };
        assert!(backend.create_input_layout(&[missing], &program).is_err());

        let stepped = InputElement {
            step: InputStepRate::PerInstance(3),
            ..element
        };
        assert!(matches!(
            backend.create_input_layout(&[stepped], &program),
            Err(BackendError::UnsupportedLayout(_))
        ));
        assert_eq!(backend.stats().input_layouts_created, 1);
    }

    #[test]
    fn test_bind_records_slots() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::VERTEX))
            .unwrap();
        backend.bind_vertex_buffers(
            2,
            &[
                VertexBufferBinding {
                    buffer: Some(&buffer),
                    stride: 12,
                    offset: 16,
                },
                VertexBufferBinding {
                    buffer: None,
                    stride: 0,
                    offset: 0,
                },
            ],
        );

        let slot = backend.bound_slot(2).unwrap();
        assert_eq!(slot.stride, 12);
        assert_eq!(slot.offset, 16);
        assert!(slot.buffer.is_some());
        assert_eq!(backend.bound_slot(3).unwrap().buffer, None);
        assert_eq!(backend.stats().last_bind_range, Some((2, 2)));
    }
}
