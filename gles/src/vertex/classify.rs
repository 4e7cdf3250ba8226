//! Attribute storage classification.

use crate::backend::BackendCapabilities;
use crate::format::NativeFormatDescriptor;
use crate::types::{AttributeDescriptor, UsageHint};

/// How an attribute's data reaches the device for one draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// Disabled attribute reading its constant current value.
    CurrentValue,
    /// Application buffer bound as is.
    Direct,
    /// Cached converted copy of an unchanging buffer.
    Static,
    /// Converted into the streaming buffer on every draw.
    Dynamic,
}

/// Decide the storage class of one attribute.
///
/// Depends only on the attribute state, the source buffer's usage, the
/// format conversion and the backend capabilities, so the same inputs
/// always give the same class.
pub fn classify_attribute(
    attribute: &AttributeDescriptor,
    descriptor: &NativeFormatDescriptor,
    caps: &BackendCapabilities,
) -> StorageClass {
    if !attribute.enabled {
        return StorageClass::CurrentValue;
    }

    let Some(buffer) = &attribute.buffer else {
        return StorageClass::Dynamic;
    };

    let alignment = descriptor.output_element_size().min(4) as u64;
    let aligned = alignment == 0
        || (attribute.effective_stride() as u64 % alignment == 0
            && attribute.offset % alignment == 0);

    if descriptor.identity && aligned && buffer.supports_direct_binding(caps) {
        StorageClass::Direct
    } else if buffer.effective_usage() == UsageHint::Static {
        StorageClass::Static
    } else {
        StorageClass::Dynamic
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::DeviceConfig;
    use crate::device::GlesDevice;
    use crate::format::{FormatCaps, lookup};
    use crate::types::ComponentType;

    fn classify(attr: &AttributeDescriptor, caps: &BackendCapabilities) -> StorageClass {
        let desc = lookup(attr.format_key(), &FormatCaps::default()).unwrap();
        classify_attribute(attr, &desc, caps)
    }

    fn buffered(ty: ComponentType, size: u32, usage: UsageHint) -> AttributeDescriptor {
        let device = GlesDevice::new(DeviceConfig::default()).unwrap();
        AttributeDescriptor {
            component_type: ty,
            size,
            buffer: Some(device.create_source_buffer(vec![0u8; 64], usage)),
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_is_current_value() {
        let mut attr = buffered(ComponentType::Float, 4, UsageHint::Static);
        attr.enabled = false;
        assert_eq!(classify(&attr, &BackendCapabilities::default()), StorageClass::CurrentValue);
    }

    #[test]
    fn test_client_pointer_is_dynamic() {
        let attr = AttributeDescriptor {
            client_data: Some(Arc::from(vec![0u8; 16])),
            enabled: true,
            ..Default::default()
        };
        assert_eq!(classify(&attr, &BackendCapabilities::default()), StorageClass::Dynamic);
    }

    #[test]
    fn test_identity_static_buffer_is_direct() {
        let caps = BackendCapabilities::default();
        let attr = buffered(ComponentType::Float, 3, UsageHint::Static);
        assert_eq!(classify(&attr, &caps), StorageClass::Direct);

        let no_direct = BackendCapabilities {
            direct_binding: false,
            ..Default::default()
        };
        assert_eq!(classify(&attr, &no_direct), StorageClass::Static);
    }

    #[test]
    fn test_misaligned_offset_is_not_direct() {
        let mut attr = buffered(ComponentType::Float, 2, UsageHint::Static);
        attr.offset = 2;
        assert_eq!(classify(&attr, &BackendCapabilities::default()), StorageClass::Static);

        // Byte formats only need byte alignment below four bytes.
        let mut bytes = buffered(ComponentType::UnsignedByte, 2, UsageHint::Static);
        bytes.normalized = true;
        bytes.offset = 2;
        assert_eq!(classify(&bytes, &BackendCapabilities::default()), StorageClass::Direct);
    }

    #[test]
    fn test_conversion_on_static_buffer_is_static() {
        let mut attr = buffered(ComponentType::UnsignedByte, 3, UsageHint::Static);
        attr.normalized = true;
        assert_eq!(classify(&attr, &BackendCapabilities::default()), StorageClass::Static);
    }

    #[test]
    fn test_dynamic_buffer_is_dynamic() {
        let attr = buffered(ComponentType::Float, 4, UsageHint::Dynamic);
        assert_eq!(classify(&attr, &BackendCapabilities::default()), StorageClass::Dynamic);
        let attr = buffered(ComponentType::Float, 4, UsageHint::Stream);
        assert_eq!(classify(&attr, &BackendCapabilities::default()), StorageClass::Dynamic);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let caps = BackendCapabilities::default();
        for usage in [UsageHint::Static, UsageHint::Dynamic] {
            for ty in [ComponentType::Byte, ComponentType::Float, ComponentType::Fixed] {
                let attr = buffered(ty, 3, usage);
                assert_eq!(classify(&attr, &caps), classify(&attr, &caps));
            }
        }
    }
}
