//! Per-draw vertex data translation.
//!
//! [`VertexDataManager::prepare_vertex_data`] runs two passes over the
//! attributes of a draw. The first pass classifies every attribute and sums
//! the streaming space the dynamic ones need, so the streaming buffer grows
//! or recycles at most once per draw. The second pass converts and stores
//! every attribute into its target buffer. Any failure aborts the draw
//! before anything is bound.

use std::sync::Arc;

use crate::device::GlesDevice;
use crate::error::{GlesError, Result};
use crate::format::{FormatTable, NativeFormatDescriptor, VertexFormat};
use crate::resources::{Buffer, SourceBuffer, StreamAllocation, StreamingBuffer};
use crate::types::{AttributeDescriptor, CurrentValue, MAX_VERTEX_ATTRIBS, ShaderProgram};
use crate::vertex::{StorageClass, classify_attribute};

/// Size of one stored current value (four 32-bit components).
const CURRENT_VALUE_SIZE: u64 = 16;

/// Device-ready description of one attribute for one draw.
///
/// `offset` addresses the element read for the first vertex (or the first
/// instance) of the draw, so the draw itself always starts at vertex 0.
#[derive(Debug, Clone)]
pub struct TranslatedAttribute {
    /// The program reads this attribute.
    pub active: bool,
    /// How the data reached the device.
    pub storage: StorageClass,
    /// Native format of the bound data.
    pub format: VertexFormat,
    /// Byte stride; 0 for current values.
    pub stride: u32,
    /// Bound device buffer.
    pub buffer: Option<Arc<Buffer>>,
    /// Byte offset into `buffer`.
    pub offset: u64,
    /// Instancing divisor.
    pub divisor: u32,
    /// Serial of `buffer`.
    pub serial: u64,
}

impl TranslatedAttribute {
    fn inactive() -> Self {
        Self {
            active: false,
            storage: StorageClass::CurrentValue,
            format: VertexFormat::Float32x4,
            stride: 0,
            buffer: None,
            offset: 0,
            divisor: 0,
            serial: 0,
        }
    }
}

#[derive(Default)]
struct CurrentValueState {
    buffer: Option<StreamingBuffer>,
    last: Option<CurrentValue>,
    offset: u64,
}

#[derive(Clone, Copy)]
enum Plan {
    Inactive,
    CurrentValue,
    Enabled(StorageClass, NativeFormatDescriptor),
}

/// Translates attribute state into bindable device data, one draw at a time.
///
/// Owns the streaming buffer and the per-slot current value buffers of one
/// rendering context.
pub struct VertexDataManager {
    device: Arc<GlesDevice>,
    format_table: FormatTable,
    streaming: StreamingBuffer,
    current_values: Vec<CurrentValueState>,
}

impl VertexDataManager {
    /// Create a manager with the device's configured streaming size.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the streaming buffer cannot be allocated.
    pub fn new(device: &Arc<GlesDevice>) -> Result<Self> {
        let streaming = StreamingBuffer::new(
            device,
            device.config().initial_streaming_buffer_size,
            "vertex_data",
        )?;

        Ok(Self {
            device: Arc::clone(device),
            format_table: FormatTable::new(device.capabilities().format_caps()),
            streaming,
            current_values: (0..MAX_VERTEX_ATTRIBS)
                .map(|_| CurrentValueState::default())
                .collect(),
        })
    }

    /// Get the streaming buffer used for dynamic attributes.
    pub fn streaming_buffer(&self) -> &StreamingBuffer {
        &self.streaming
    }

    /// Get the memoized format table.
    pub fn format_table(&self) -> &FormatTable {
        &self.format_table
    }

    /// Translate every attribute for a draw of `count` vertices from `start`
    /// and `instances` instances (0 for a non-instanced draw).
    ///
    /// The result is indexed by attribute location. Attributes the program
    /// does not read are returned inactive.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if a buffer cannot be allocated or a size
    /// overflows, `InvalidOperation` if an enabled attribute has no data or
    /// reads past the end of it, and `Unimplemented` if a format is not
    /// supported by the backend.
    pub fn prepare_vertex_data(
        &mut self,
        attributes: &[AttributeDescriptor],
        current_values: &[CurrentValue],
        program: &ShaderProgram,
        start: u32,
        count: u32,
        instances: u32,
    ) -> Result<Vec<TranslatedAttribute>> {
        crate::profile_function!();

        if attributes.len() > MAX_VERTEX_ATTRIBS {
            return Err(GlesError::InvalidOperation(format!(
                "{} attributes exceed the maximum of {MAX_VERTEX_ATTRIBS}",
                attributes.len()
            )));
        }

        // Pass 1: classify and size the streaming reservation.
        let mut plans = Vec::with_capacity(attributes.len());
        let mut reserve = 0u64;
        for (index, attribute) in attributes.iter().enumerate() {
            if !program.is_attribute_active(index as u32) {
                plans.push(Plan::Inactive);
                continue;
            }
            if !attribute.enabled {
                plans.push(Plan::CurrentValue);
                continue;
            }
            if attribute.buffer.is_none() && attribute.client_data.is_none() {
                return Err(GlesError::InvalidOperation(format!(
                    "enabled attribute {index} has neither a buffer nor client data"
                )));
            }

            let descriptor = self.format_table.get(attribute.format_key())?;
            let storage = classify_attribute(attribute, &descriptor, self.device.capabilities());
            if storage == StorageClass::Dynamic {
                let elements = element_count(attribute, count, instances);
                let space = self
                    .streaming
                    .aligned_size(descriptor.space_required(elements)?)?;
                reserve = reserve.checked_add(space).ok_or_else(|| {
                    GlesError::OutOfMemory("streaming reservation overflows".to_string())
                })?;
            }
            plans.push(Plan::Enabled(storage, descriptor));
        }

        if reserve > 0 {
            self.streaming.reserve_space(reserve)?;
        }

        // Pass 2: store enabled attributes, then current values.
        let mut translated = vec![TranslatedAttribute::inactive(); attributes.len()];
        for (index, (attribute, plan)) in attributes.iter().zip(&plans).enumerate() {
            let Plan::Enabled(storage, descriptor) = *plan else {
                continue;
            };
            let first = first_element(attribute, start);
            let elements = element_count(attribute, count, instances);
            translated[index] = match storage {
                StorageClass::Direct => self.store_direct(attribute, &descriptor, first, elements)?,
                StorageClass::Static => self.store_static(attribute, &descriptor, first, elements)?,
                StorageClass::Dynamic => self.store_dynamic(attribute, &descriptor, first, elements)?,
                StorageClass::CurrentValue => {
                    return Err(GlesError::InvalidOperation(format!(
                        "enabled attribute {index} classified as a current value"
                    )));
                }
            };
        }

        for (index, plan) in plans.iter().enumerate() {
            if matches!(plan, Plan::CurrentValue) {
                let value = current_values.get(index).copied().unwrap_or_default();
                translated[index] = self.store_current_value(index, &value)?;
            }
        }

        let factor = self.device.config().static_promotion_factor;
        for (attribute, plan) in attributes.iter().zip(&plans) {
            if let (Plan::Enabled(..), Some(buffer)) = (plan, &attribute.buffer) {
                let used = element_count(attribute, count, instances)
                    .saturating_mul(attribute.element_size() as u64);
                buffer.promote_static_usage(used, factor);
            }
        }

        Ok(translated)
    }

    fn store_direct(
        &self,
        attribute: &AttributeDescriptor,
        descriptor: &NativeFormatDescriptor,
        first: u64,
        elements: u64,
    ) -> Result<TranslatedAttribute> {
        let source = buffer_of(attribute)?;
        let offset = check_source_range(attribute, first, elements, source.size())?;
        let native = source.native_buffer(&self.device)?;

        Ok(TranslatedAttribute {
            active: true,
            storage: StorageClass::Direct,
            format: descriptor.format,
            stride: attribute.effective_stride(),
            serial: native.serial(),
            buffer: Some(native),
            offset,
            divisor: attribute.divisor,
        })
    }

    fn store_static(
        &self,
        attribute: &AttributeDescriptor,
        descriptor: &NativeFormatDescriptor,
        first: u64,
        elements: u64,
    ) -> Result<TranslatedAttribute> {
        let source = buffer_of(attribute)?;
        check_source_range(attribute, first, elements, source.size())?;
        let converted = source.static_buffer_for(&self.device, attribute, descriptor)?;

        let out_stride = descriptor.output_element_size() as u64;
        let first_in_buffer = attribute.offset / attribute.effective_stride() as u64;
        let offset = first_in_buffer
            .checked_add(first)
            .and_then(|element| element.checked_mul(out_stride))
            .ok_or_else(|| GlesError::OutOfMemory("static offset overflows".to_string()))?;

        Ok(TranslatedAttribute {
            active: true,
            storage: StorageClass::Static,
            format: descriptor.format,
            stride: descriptor.output_element_size(),
            serial: converted.serial(),
            buffer: Some(converted),
            offset,
            divisor: attribute.divisor,
        })
    }

    fn store_dynamic(
        &mut self,
        attribute: &AttributeDescriptor,
        descriptor: &NativeFormatDescriptor,
        first: u64,
        elements: u64,
    ) -> Result<TranslatedAttribute> {
        let streaming = &mut self.streaming;
        let allocation = match (&attribute.buffer, &attribute.client_data) {
            (Some(buffer), _) => buffer.with_data(|data| {
                stream_attribute(streaming, data, attribute, descriptor, first, elements)
            })?,
            (None, Some(data)) => {
                stream_attribute(streaming, data, attribute, descriptor, first, elements)?
            }
            (None, None) => {
                return Err(GlesError::InvalidOperation(
                    "dynamic attribute has no data".to_string(),
                ));
            }
        };

        Ok(TranslatedAttribute {
            active: true,
            storage: StorageClass::Dynamic,
            format: descriptor.format,
            stride: descriptor.output_element_size(),
            buffer: Some(Arc::clone(self.streaming.buffer())),
            offset: allocation.offset,
            divisor: attribute.divisor,
            serial: self.streaming.serial(),
        })
    }

    fn store_current_value(&mut self, index: usize, value: &CurrentValue) -> Result<TranslatedAttribute> {
        let size = self.device.config().current_value_buffer_size;
        let state = &mut self.current_values[index];

        let stream = match state.buffer.take() {
            Some(stream) => stream,
            None => StreamingBuffer::new(&self.device, size, &format!("current_value_{index}"))?,
        };
        let stream = state.buffer.insert(stream);

        if !state.last.is_some_and(|last| last.bitwise_eq(value)) {
            let bytes = value.to_bytes();
            stream.reserve_space(CURRENT_VALUE_SIZE)?;
            let allocation = stream.store(CURRENT_VALUE_SIZE, &mut |dst| dst.copy_from_slice(&bytes))?;
            state.offset = allocation.offset;
            state.last = Some(*value);
            log::trace!("Current value {index} written at offset {}", allocation.offset);
        }

        Ok(TranslatedAttribute {
            active: true,
            storage: StorageClass::CurrentValue,
            format: value.format(),
            stride: 0,
            buffer: Some(Arc::clone(stream.buffer())),
            offset: state.offset,
            divisor: 0,
            serial: stream.serial(),
        })
    }
}

impl std::fmt::Debug for VertexDataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexDataManager")
            .field("streaming", &self.streaming)
            .field("formats", &self.format_table.len())
            .finish()
    }
}

/// Number of elements a draw reads from an attribute.
///
/// Instanced attributes advance once every `divisor` instances.
pub fn element_count(attribute: &AttributeDescriptor, count: u32, instances: u32) -> u64 {
    if instances > 0 && attribute.divisor > 0 {
        instances.div_ceil(attribute.divisor) as u64
    } else {
        count as u64
    }
}

/// Index of the first element read; instanced data always starts at 0.
fn first_element(attribute: &AttributeDescriptor, start: u32) -> u64 {
    if attribute.divisor > 0 { 0 } else { start as u64 }
}

fn buffer_of(attribute: &AttributeDescriptor) -> Result<&Arc<SourceBuffer>> {
    attribute
        .buffer
        .as_ref()
        .ok_or_else(|| GlesError::InvalidOperation("attribute has no bound buffer".to_string()))
}

/// Check that `count` elements from element `first` lie inside `len` bytes
/// and return the byte offset of the first one.
fn check_source_range(attribute: &AttributeDescriptor, first: u64, count: u64, len: u64) -> Result<u64> {
    let overflow = || GlesError::OutOfMemory("attribute range overflows".to_string());
    let stride = attribute.effective_stride() as u64;
    let start = first
        .checked_mul(stride)
        .and_then(|bytes| bytes.checked_add(attribute.offset))
        .ok_or_else(overflow)?;
    if count == 0 {
        return Ok(start);
    }

    let end = (count - 1)
        .checked_mul(stride)
        .and_then(|bytes| bytes.checked_add(start))
        .and_then(|bytes| bytes.checked_add(attribute.element_size() as u64))
        .ok_or_else(overflow)?;
    if end > len {
        return Err(GlesError::InvalidOperation(format!(
            "attribute reads [{start}, {end}) past the end of {len} bytes of data"
        )));
    }
    Ok(start)
}

fn stream_attribute(
    streaming: &mut StreamingBuffer,
    data: &[u8],
    attribute: &AttributeDescriptor,
    descriptor: &NativeFormatDescriptor,
    first: u64,
    elements: u64,
) -> Result<StreamAllocation> {
    let start = check_source_range(attribute, first, elements, data.len() as u64)?;
    let bytes = descriptor.space_required(elements)?;
    let count = usize::try_from(elements)
        .map_err(|_| GlesError::OutOfMemory("element count overflows".to_string()))?;
    let source = usize::try_from(start)
        .ok()
        .and_then(|start| data.get(start..))
        .unwrap_or(&[]);
    let stride = attribute.effective_stride() as usize;

    streaming.store(bytes, &mut |dst| descriptor.convert(source, stride, count, dst))
}
