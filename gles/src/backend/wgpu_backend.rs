//! wgpu device backend implementation.
//!
//! wgpu fixes the vertex buffer stride in the render pipeline, so an input
//! layout here only records per-slot attributes and step modes; the strides
//! come from the current bindings when a renderer asks for
//! [`WgpuBackend::vertex_buffer_layouts`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::format::VertexFormat;
use crate::types::{
    BufferDescriptor, BufferUsage, IndexFormat, InputElement, InputSemantic, InputStepRate,
    MapHint, ShaderProgram,
};

use super::{
    BackendCapabilities, BackendError, GpuBackend, GpuBuffer, GpuInputLayout, VertexBufferBinding,
};

/// Owned per-slot part of a wgpu vertex buffer layout.
#[derive(Debug, Clone)]
pub struct WgpuSlotLayout {
    /// Step mode of the slot.
    pub step_mode: wgpu::VertexStepMode,
    /// Attributes read from the slot.
    pub attributes: Vec<wgpu::VertexAttribute>,
}

/// Input layout object of the wgpu backend.
#[derive(Debug, Clone)]
pub struct WgpuInputLayout {
    /// Slot layouts, indexed by vertex buffer slot.
    pub slots: Vec<WgpuSlotLayout>,
}

/// Owned vertex buffer layout, ready to be borrowed into a pipeline descriptor.
#[derive(Debug, Clone)]
pub struct VertexBufferLayoutOwned {
    pub array_stride: wgpu::BufferAddress,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl VertexBufferLayoutOwned {
    /// Borrow as a wgpu layout.
    pub fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }
}

#[derive(Debug, Clone)]
struct BoundVertexBuffer {
    buffer: Arc<wgpu::Buffer>,
    stride: u32,
    offset: u32,
}

#[derive(Debug, Default)]
struct BindState {
    layout: Option<WgpuInputLayout>,
    vertex_buffers: Vec<Option<BoundVertexBuffer>>,
    index_buffer: Option<(Arc<wgpu::Buffer>, wgpu::IndexFormat, u64)>,
}

/// wgpu-based device backend.
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    capabilities: BackendCapabilities,
    state: Mutex<BindState>,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .finish()
    }
}

impl WgpuBackend {
    /// Create a new wgpu backend.
    pub fn new() -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| BackendError::InitializationFailed(format!("No compatible GPU adapter: {e}")))?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("RedLilium GLES Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| BackendError::InitializationFailed(format!("Device creation failed: {e}")))?;

        let limits = device.limits();
        let capabilities = BackendCapabilities {
            direct_binding: true,
            single_component_formats: false,
            packed_10_10_10_2: true,
            integer_attributes: true,
            instance_step_rates: false,
            instanced_point_sprite_emulation: false,
            requires_non_instanced_slot_zero: false,
            max_vertex_buffer_slots: limits.max_vertex_buffers,
            min_binding_alignment: wgpu::COPY_BUFFER_ALIGNMENT as u32,
        };

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            capabilities,
            state: Mutex::new(BindState::default()),
        })
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Vertex buffer layouts for a pipeline matching the current input
    /// layout and bindings.
    pub fn vertex_buffer_layouts(&self) -> Vec<VertexBufferLayoutOwned> {
        let state = self.state.lock();
        let Some(layout) = &state.layout else {
            return Vec::new();
        };
        layout
            .slots
            .iter()
            .enumerate()
            .map(|(slot, slot_layout)| VertexBufferLayoutOwned {
                array_stride: state
                    .vertex_buffers
                    .get(slot)
                    .and_then(|b| b.as_ref())
                    .map_or(0, |b| b.stride as wgpu::BufferAddress),
                step_mode: slot_layout.step_mode,
                attributes: slot_layout.attributes.clone(),
            })
            .collect()
    }

    /// Record the current vertex and index buffers into a render pass.
    pub fn set_buffers_on_pass(&self, pass: &mut wgpu::RenderPass<'_>) {
        let state = self.state.lock();
        for (slot, bound) in state.vertex_buffers.iter().enumerate() {
            if let Some(bound) = bound {
                pass.set_vertex_buffer(slot as u32, bound.buffer.slice(bound.offset as u64..));
            }
        }
        if let Some((buffer, format, offset)) = &state.index_buffer {
            pass.set_index_buffer(buffer.slice(*offset..), *format);
        }
    }

    fn wgpu_buffer<'a>(buffer: &'a GpuBuffer) -> Result<&'a Arc<wgpu::Buffer>, BackendError> {
        match buffer {
            GpuBuffer::Wgpu(buffer) => Ok(buffer),
            GpuBuffer::Dummy(_) => Err(BackendError::ForeignHandle("buffer")),
        }
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, BackendError> {
        let size = descriptor.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size,
            usage: convert_buffer_usage(descriptor.usage),
            mapped_at_creation: false,
        });

        Ok(GpuBuffer::Wgpu(Arc::new(buffer)))
    }

    fn map_write(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
        _hint: MapHint,
        writer: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), BackendError> {
        let buffer = Self::wgpu_buffer(buffer)?;
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(BackendError::InvalidParameter(format!(
                "write offset {offset} is not 4-byte aligned"
            )));
        }
        let padded = size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        if offset + padded > buffer.size() {
            return Err(BackendError::InvalidParameter(format!(
                "write range [{offset}, +{size}) exceeds buffer size {}",
                buffer.size()
            )));
        }

        // Queue writes are ordered before any later submission, which gives
        // the no-overwrite and discard contracts for free.
        let mut staging = vec![0u8; padded as usize];
        writer(&mut staging[..size as usize]);
        self.queue.write_buffer(buffer, offset, &staging);
        Ok(())
    }

    fn discard(&self, buffer: &GpuBuffer) -> Result<(), BackendError> {
        Self::wgpu_buffer(buffer).map(|_| ())
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8> {
        let Ok(buffer) = Self::wgpu_buffer(buffer) else {
            return vec![0u8; size as usize];
        };
        let padded = size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Read Staging Buffer"),
            size: padded,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Read Buffer Encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, offset, &staging, 0, padded);
        let idx = self.queue.submit(std::iter::once(encoder.finish()));

        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: Some(idx),
            timeout: Some(std::time::Duration::from_secs(10)),
        });

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        if !matches!(rx.recv(), Ok(Ok(()))) {
            return vec![0u8; size as usize];
        }

        let mut data = slice.get_mapped_range().to_vec();
        staging.unmap();
        data.truncate(size as usize);
        data
    }

    fn destroy_buffer(&self, buffer: &GpuBuffer) {
        if let GpuBuffer::Wgpu(buffer) = buffer {
            buffer.destroy();
        }
    }

    fn create_input_layout(
        &self,
        elements: &[InputElement],
        program: &ShaderProgram,
    ) -> Result<GpuInputLayout, BackendError> {
        let slot_count = elements.iter().map(|e| e.slot + 1).max().unwrap_or(0) as usize;
        let mut slots = vec![
            WgpuSlotLayout {
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: Vec::new(),
            };
            slot_count
        ];

        for element in elements {
            let InputSemantic::TexCoord(semantic_index) = element.semantic else {
                return Err(BackendError::UnsupportedLayout(
                    "point-sprite emulation inputs".to_string(),
                ));
            };
            if !program.attributes().iter().any(|a| a.semantic_index == semantic_index) {
                return Err(BackendError::InvalidParameter(format!(
                    "program {:?} has no input for semantic {semantic_index}",
                    program.label()
                )));
            }
            let format = convert_vertex_format(element.format)
                .ok_or(BackendError::UnsupportedFormat(element.format))?;

            let slot = &mut slots[element.slot as usize];
            slot.step_mode = match element.step {
                InputStepRate::PerVertex => wgpu::VertexStepMode::Vertex,
                InputStepRate::PerInstance(1) => wgpu::VertexStepMode::Instance,
                InputStepRate::PerInstance(rate) => {
                    return Err(BackendError::UnsupportedLayout(format!(
                        "instance step rate {rate}"
                    )));
                }
            };
            slot.attributes.push(wgpu::VertexAttribute {
                format,
                offset: element.offset as wgpu::BufferAddress,
                shader_location: semantic_index,
            });
        }

        Ok(GpuInputLayout::Wgpu(WgpuInputLayout { slots }))
    }

    fn set_input_layout(&self, layout: &GpuInputLayout) {
        if let GpuInputLayout::Wgpu(layout) = layout {
            self.state.lock().layout = Some(layout.clone());
        }
    }

    fn bind_vertex_buffers(&self, first_slot: u32, bindings: &[VertexBufferBinding<'_>]) {
        let mut state = self.state.lock();
        let end = first_slot as usize + bindings.len();
        if state.vertex_buffers.len() < end {
            state.vertex_buffers.resize(end, None);
        }
        for (i, binding) in bindings.iter().enumerate() {
            state.vertex_buffers[first_slot as usize + i] = binding
                .buffer
                .and_then(|b| Self::wgpu_buffer(b).ok())
                .map(|buffer| BoundVertexBuffer {
                    buffer: Arc::clone(buffer),
                    stride: binding.stride,
                    offset: binding.offset,
                });
        }
    }

    fn set_index_buffer(&self, buffer: &GpuBuffer, format: IndexFormat, offset: u64) {
        if let Ok(buffer) = Self::wgpu_buffer(buffer) {
            let format = match format {
                IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
                IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
            };
            self.state.lock().index_buffer = Some((Arc::clone(buffer), format, offset));
        }
    }
}

fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::COPY_SRC;

    if usage.contains(BufferUsage::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.intersects(BufferUsage::COPY_DST | BufferUsage::MAP_WRITE | BufferUsage::STREAMING) {
        result |= wgpu::BufferUsages::COPY_DST;
    }

    result
}

/// Convert a native vertex format; `None` for formats wgpu lacks.
pub fn convert_vertex_format(format: VertexFormat) -> Option<wgpu::VertexFormat> {
    use VertexFormat as F;
    use wgpu::VertexFormat as W;

    Some(match format {
        F::Unorm8x2 => W::Unorm8x2,
        F::Unorm8x4 => W::Unorm8x4,
        F::Snorm8x2 => W::Snorm8x2,
        F::Snorm8x4 => W::Snorm8x4,
        F::Uint8x2 => W::Uint8x2,
        F::Uint8x4 => W::Uint8x4,
        F::Sint8x2 => W::Sint8x2,
        F::Sint8x4 => W::Sint8x4,
        F::Unorm16x2 => W::Unorm16x2,
        F::Unorm16x4 => W::Unorm16x4,
        F::Snorm16x2 => W::Snorm16x2,
        F::Snorm16x4 => W::Snorm16x4,
        F::Uint16x2 => W::Uint16x2,
        F::Uint16x4 => W::Uint16x4,
        F::Sint16x2 => W::Sint16x2,
        F::Sint16x4 => W::Sint16x4,
        F::Float16x2 => W::Float16x2,
        F::Float16x4 => W::Float16x4,
        F::Float32 => W::Float32,
        F::Float32x2 => W::Float32x2,
        F::Float32x3 => W::Float32x3,
        F::Float32x4 => W::Float32x4,
        F::Uint32 => W::Uint32,
        F::Uint32x2 => W::Uint32x2,
        F::Uint32x3 => W::Uint32x3,
        F::Uint32x4 => W::Uint32x4,
        F::Sint32 => W::Sint32,
        F::Sint32x2 => W::Sint32x2,
        F::Sint32x3 => W::Sint32x3,
        F::Sint32x4 => W::Sint32x4,
        F::Unorm10_10_10_2 => W::Unorm10_10_10_2,
        F::Unorm8
        | F::Snorm8
        | F::Uint8
        | F::Sint8
        | F::Unorm16
        | F::Snorm16
        | F::Uint16
        | F::Sint16
        | F::Float16
        | F::Uint10_10_10_2 => return None,
    })
}
