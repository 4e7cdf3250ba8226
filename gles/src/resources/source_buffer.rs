//! Application vertex data buffers.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::BackendCapabilities;
use crate::device::GlesDevice;
use crate::error::{GlesError, Result};
use crate::format::NativeFormatDescriptor;
use crate::resources::{Buffer, StaticVertexBuffer};
use crate::types::{AttributeDescriptor, BufferDescriptor, BufferUsage, MapHint, UsageHint};

struct SourceState {
    data: Vec<u8>,
    usage: UsageHint,
    promoted: bool,
    unmodified_data_use: u64,
    static_buffer: Option<StaticVertexBuffer>,
    native: Option<Arc<Buffer>>,
    native_dirty: bool,
    static_conversions: u64,
}

/// A buffer object holding application vertex data.
///
/// The bytes live on the host. Device copies are derived from them on
/// demand: a converted static copy (one signature at a time) and a native
/// copy for zero-copy binding. Both are invalidated whenever the bytes are
/// rewritten, which every vertex data manager referencing the buffer sees.
pub struct SourceBuffer {
    id: u64,
    state: RwLock<SourceState>,
}

impl SourceBuffer {
    /// Create a source buffer (called by GlesDevice).
    pub(crate) fn new(id: u64, data: Vec<u8>, usage: UsageHint) -> Self {
        Self {
            id,
            state: RwLock::new(SourceState {
                data,
                usage,
                promoted: false,
                unmodified_data_use: 0,
                static_buffer: None,
                native: None,
                native_dirty: true,
                static_conversions: 0,
            }),
        }
    }

    /// Get the buffer id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the data size in bytes.
    pub fn size(&self) -> u64 {
        self.state.read().data.len() as u64
    }

    /// Get the usage hint supplied by the application.
    pub fn usage(&self) -> UsageHint {
        self.state.read().usage
    }

    /// Get the usage the buffer currently behaves as.
    ///
    /// A dynamic buffer that has been drawn from often enough without being
    /// modified is treated as static until its next rewrite.
    pub fn effective_usage(&self) -> UsageHint {
        let state = self.state.read();
        if state.promoted {
            UsageHint::Static
        } else {
            state.usage
        }
    }

    /// Whether the buffer can be bound to the device without conversion.
    pub fn supports_direct_binding(&self, caps: &BackendCapabilities) -> bool {
        caps.direct_binding && self.effective_usage() == UsageHint::Static
    }

    /// Replace the whole contents (`glBufferData`).
    pub fn set_data(&self, data: impl Into<Vec<u8>>, usage: UsageHint) {
        let mut state = self.state.write();
        state.data = data.into();
        state.usage = usage;
        Self::invalidate(&mut state);
    }

    /// Overwrite a byte range (`glBufferSubData`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the range exceeds the buffer.
    pub fn sub_data(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        let len = state.data.len() as u64;
        let range = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= len)
            .map(|end| offset as usize..end as usize)
            .ok_or_else(|| {
                GlesError::InvalidOperation(format!(
                    "sub data [{offset}, +{}) exceeds buffer size {len}",
                    data.len()
                ))
            })?;
        state.data[range].copy_from_slice(data);
        Self::invalidate(&mut state);
        Ok(())
    }

    /// Drop all derived device data after the contents changed.
    pub fn invalidate_static_data(&self) {
        Self::invalidate(&mut self.state.write());
    }

    fn invalidate(state: &mut SourceState) {
        state.static_buffer = None;
        state.unmodified_data_use = 0;
        state.promoted = false;
        state.native_dirty = true;
    }

    /// Report `bytes` of draw usage without intervening modification.
    ///
    /// Returns true when this call promoted the buffer to static usage.
    pub fn promote_static_usage(&self, bytes: u64, factor: u64) -> bool {
        let mut state = self.state.write();
        if state.promoted || state.usage == UsageHint::Static {
            return false;
        }

        state.unmodified_data_use = state.unmodified_data_use.saturating_add(bytes);
        let threshold = factor.saturating_mul(state.data.len() as u64);
        if state.unmodified_data_use > threshold {
            state.promoted = true;
            log::debug!(
                "Source buffer {} promoted to static usage after {} bytes of use",
                self.id,
                state.unmodified_data_use
            );
            return true;
        }
        false
    }

    /// Run `f` on the current contents.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.state.read().data)
    }

    /// Get the device copy used for direct binding, uploading it if stale.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the upload buffer cannot be allocated.
    pub fn native_buffer(&self, device: &Arc<GlesDevice>) -> Result<Arc<Buffer>> {
        let mut state = self.state.write();
        if let Some(native) = &state.native
            && !state.native_dirty
        {
            return Ok(Arc::clone(native));
        }

        let size = (state.data.len() as u64).max(4);
        let buffer = device.create_buffer(
            &BufferDescriptor::new(size, BufferUsage::VERTEX | BufferUsage::COPY_DST)
                .with_label(format!("source_{}", self.id)),
        )?;
        if !state.data.is_empty() {
            let data = &state.data;
            buffer.map_write(0, data.len() as u64, MapHint::Discard, &mut |dst| {
                dst.copy_from_slice(data)
            })?;
        }

        log::trace!("Source buffer {} uploaded for direct binding", self.id);
        state.native = Some(Arc::clone(&buffer));
        state.native_dirty = false;
        Ok(buffer)
    }

    /// Get the static copy converted for `attribute`, converting on a miss.
    ///
    /// A slot with a different signature is dropped and replaced.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the conversion buffer cannot be allocated.
    pub fn static_buffer_for(
        &self,
        device: &Arc<GlesDevice>,
        attribute: &AttributeDescriptor,
        descriptor: &NativeFormatDescriptor,
    ) -> Result<Arc<Buffer>> {
        let mut state = self.state.write();

        if let Some(slot) = &state.static_buffer {
            if slot.matches(attribute)
                && slot.format() == descriptor.format
                && let Some(buffer) = slot.buffer()
            {
                return Ok(Arc::clone(buffer));
            }
            log::debug!(
                "Source buffer {}: static signature changed, replacing {:?}",
                self.id,
                slot.signature()
            );
        }

        let mut slot = StaticVertexBuffer::new(attribute, descriptor);
        let buffer = slot.convert(device, &state.data, attribute, descriptor)?;
        state.static_buffer = Some(slot);
        state.static_conversions += 1;
        Ok(buffer)
    }

    /// Get the number of static conversions performed so far.
    pub fn static_conversions(&self) -> u64 {
        self.state.read().static_conversions
    }
}

impl std::fmt::Debug for SourceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SourceBuffer")
            .field("id", &self.id)
            .field("size", &state.data.len())
            .field("usage", &state.usage)
            .field("promoted", &state.promoted)
            .field("static_buffer", &state.static_buffer)
            .finish()
    }
}

// Ensure SourceBuffer is Send + Sync
static_assertions::assert_impl_all!(SourceBuffer: Send, Sync);
