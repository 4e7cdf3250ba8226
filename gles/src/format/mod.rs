//! Client-to-native vertex format conversion table.
//!
//! A client attribute is described by its [`FormatKey`]: component type,
//! component count, normalization and whether the shader reads it as a pure
//! integer. [`lookup`] maps a key to the [`NativeFormatDescriptor`] the device
//! consumes, together with the converter that produces it. The mapping depends
//! only on the key and the backend's [`FormatCaps`], so results are cached by
//! value in a [`FormatTable`].
//!
//! # Rules
//!
//! - Normalized 8/16-bit integers and half floats use native formats of the
//!   same width. Three-component inputs widen to four; the appended w is the
//!   normalized maximum (1.0) or integer 1.
//! - One-component 8/16-bit inputs pad to two components when the backend
//!   has no single-component narrow formats.
//! - Unnormalized integers, 32-bit integers and 16.16 fixed point expand to
//!   32-bit floats unless the shader reads them as pure integers.
//! - Packed 2-10-10-10 data expands to four floats except unsigned normalized
//!   data on backends with a native 10-10-10-2 format.

pub mod convert;

use std::collections::HashMap;

use half::f16;

use crate::error::{GlesError, Result};
use crate::types::ComponentType;

use convert::{
    ConvertFn, copy_components, fixed_to_float, packed_to_float, packed_to_int, to_float,
};

/// Native vertex formats understood by device backends.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexFormat {
    Unorm8,
    Unorm8x2,
    Unorm8x4,
    Snorm8,
    Snorm8x2,
    Snorm8x4,
    Uint8,
    Uint8x2,
    Uint8x4,
    Sint8,
    Sint8x2,
    Sint8x4,
    Unorm16,
    Unorm16x2,
    Unorm16x4,
    Snorm16,
    Snorm16x2,
    Snorm16x4,
    Uint16,
    Uint16x2,
    Uint16x4,
    Sint16,
    Sint16x2,
    Sint16x4,
    Float16,
    Float16x2,
    Float16x4,
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Uint32x2,
    Uint32x3,
    Uint32x4,
    Sint32,
    Sint32x2,
    Sint32x3,
    Sint32x4,
    /// Packed unsigned normalized 10-10-10-2.
    Unorm10_10_10_2,
    /// Packed unsigned integer 10-10-10-2.
    Uint10_10_10_2,
}

impl VertexFormat {
    /// Number of components per element.
    pub fn components(self) -> u32 {
        use VertexFormat::*;
        match self {
            Unorm8 | Snorm8 | Uint8 | Sint8 | Unorm16 | Snorm16 | Uint16 | Sint16 | Float16
            | Float32 | Uint32 | Sint32 => 1,
            Unorm8x2 | Snorm8x2 | Uint8x2 | Sint8x2 | Unorm16x2 | Snorm16x2 | Uint16x2
            | Sint16x2 | Float16x2 | Float32x2 | Uint32x2 | Sint32x2 => 2,
            Float32x3 | Uint32x3 | Sint32x3 => 3,
            Unorm8x4 | Snorm8x4 | Uint8x4 | Sint8x4 | Unorm16x4 | Snorm16x4 | Uint16x4
            | Sint16x4 | Float16x4 | Float32x4 | Uint32x4 | Sint32x4 | Unorm10_10_10_2
            | Uint10_10_10_2 => 4,
        }
    }

    /// Size of one element in bytes.
    pub fn size(self) -> u32 {
        use VertexFormat::*;
        match self {
            Unorm10_10_10_2 | Uint10_10_10_2 => 4,
            Unorm8 | Unorm8x2 | Unorm8x4 | Snorm8 | Snorm8x2 | Snorm8x4 | Uint8 | Uint8x2
            | Uint8x4 | Sint8 | Sint8x2 | Sint8x4 => self.components(),
            Unorm16 | Unorm16x2 | Unorm16x4 | Snorm16 | Snorm16x2 | Snorm16x4 | Uint16
            | Uint16x2 | Uint16x4 | Sint16 | Sint16x2 | Sint16x4 | Float16 | Float16x2
            | Float16x4 => 2 * self.components(),
            _ => 4 * self.components(),
        }
    }

    /// Whether the shader reads this format as integers.
    pub fn is_integer(self) -> bool {
        use VertexFormat::*;
        matches!(
            self,
            Uint8 | Uint8x2 | Uint8x4 | Sint8 | Sint8x2 | Sint8x4 | Uint16 | Uint16x2
                | Uint16x4 | Sint16 | Sint16x2 | Sint16x4 | Uint32 | Uint32x2 | Uint32x3
                | Uint32x4 | Sint32 | Sint32x2 | Sint32x3 | Sint32x4 | Uint10_10_10_2
        )
    }

    /// Whether this is a one-component format narrower than 32 bits.
    pub fn is_narrow_single(self) -> bool {
        self.components() == 1 && self.size() < 4
    }
}

/// Key identifying a client attribute format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatKey {
    /// Client component type.
    pub component_type: ComponentType,
    /// Component count, 1..=4.
    pub size: u32,
    /// Fixed-point data is normalized to [0, 1] or [-1, 1].
    pub normalized: bool,
    /// The shader reads the attribute as integers.
    pub pure_integer: bool,
}

impl FormatKey {
    /// Create a new format key.
    pub fn new(component_type: ComponentType, size: u32, normalized: bool, pure_integer: bool) -> Self {
        Self {
            component_type,
            size,
            normalized,
            pure_integer,
        }
    }
}

/// Backend format support consulted by the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatCaps {
    /// One-component 8/16-bit formats are available.
    pub single_component_formats: bool,
    /// Unsigned 10-10-10-2 formats are available.
    pub packed_10_10_10_2: bool,
    /// Integer vertex inputs are available.
    pub integer_attributes: bool,
}

impl Default for FormatCaps {
    fn default() -> Self {
        Self {
            single_component_formats: true,
            packed_10_10_10_2: true,
            integer_attributes: true,
        }
    }
}

/// Native format chosen for a client format.
#[derive(Debug, Clone, Copy)]
pub struct NativeFormatDescriptor {
    /// Native format the device reads.
    pub format: VertexFormat,
    /// Converter producing `format` from client data.
    pub converter: ConvertFn,
    /// Client bytes are already in the native layout.
    pub identity: bool,
}

impl NativeFormatDescriptor {
    fn new(format: VertexFormat, converter: ConvertFn, identity: bool) -> Self {
        Self {
            format,
            converter,
            identity,
        }
    }

    /// Size of one converted element in bytes.
    pub fn output_element_size(&self) -> u32 {
        self.format.size()
    }

    /// Bytes needed to store `count` converted elements.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` if the size overflows.
    pub fn space_required(&self, count: u64) -> Result<u64> {
        count
            .checked_mul(self.output_element_size() as u64)
            .ok_or_else(|| {
                GlesError::OutOfMemory(format!(
                    "{count} elements of {:?} overflow the address space",
                    self.format
                ))
            })
    }

    /// Run the converter.
    pub fn convert(&self, input: &[u8], stride: usize, count: usize, output: &mut [u8]) {
        (self.converter)(input, stride, count, output)
    }
}

/// Native format choices for a one/two/four component narrow family.
type NarrowFamily = [VertexFormat; 3];

fn narrow<T: convert::Component, const NORMALIZED_FILL: bool>(
    size: u32,
    caps: &FormatCaps,
    [single, double, quad]: NarrowFamily,
) -> NativeFormatDescriptor {
    match size {
        1 if caps.single_component_formats => {
            NativeFormatDescriptor::new(single, copy_components::<T, 1, 1, NORMALIZED_FILL>, true)
        }
        1 => NativeFormatDescriptor::new(double, copy_components::<T, 1, 2, NORMALIZED_FILL>, false),
        2 => NativeFormatDescriptor::new(double, copy_components::<T, 2, 2, NORMALIZED_FILL>, true),
        3 => NativeFormatDescriptor::new(quad, copy_components::<T, 3, 4, NORMALIZED_FILL>, false),
        _ => NativeFormatDescriptor::new(quad, copy_components::<T, 4, 4, NORMALIZED_FILL>, true),
    }
}

fn expand_to_float<T: convert::Component, const NORMALIZED: bool>(size: u32) -> NativeFormatDescriptor {
    use VertexFormat::*;
    match size {
        1 => NativeFormatDescriptor::new(Float32, to_float::<T, 1, NORMALIZED>, false),
        2 => NativeFormatDescriptor::new(Float32x2, to_float::<T, 2, NORMALIZED>, false),
        3 => NativeFormatDescriptor::new(Float32x3, to_float::<T, 3, NORMALIZED>, false),
        _ => NativeFormatDescriptor::new(Float32x4, to_float::<T, 4, NORMALIZED>, false),
    }
}

fn expand_to_float_by_normalization<T: convert::Component>(
    size: u32,
    normalized: bool,
) -> NativeFormatDescriptor {
    if normalized {
        expand_to_float::<T, true>(size)
    } else {
        expand_to_float::<T, false>(size)
    }
}

fn identity_32<T: convert::Component>(size: u32, family: [VertexFormat; 4]) -> NativeFormatDescriptor {
    match size {
        1 => NativeFormatDescriptor::new(family[0], copy_components::<T, 1, 1, false>, true),
        2 => NativeFormatDescriptor::new(family[1], copy_components::<T, 2, 2, false>, true),
        3 => NativeFormatDescriptor::new(family[2], copy_components::<T, 3, 3, false>, true),
        _ => NativeFormatDescriptor::new(family[3], copy_components::<T, 4, 4, false>, true),
    }
}

fn float_format(key: FormatKey, caps: &FormatCaps) -> NativeFormatDescriptor {
    use ComponentType::*;
    use VertexFormat::*;

    let FormatKey {
        component_type,
        size,
        normalized,
        ..
    } = key;

    match (component_type, normalized) {
        (Byte, true) => narrow::<i8, true>(size, caps, [Snorm8, Snorm8x2, Snorm8x4]),
        (UnsignedByte, true) => narrow::<u8, true>(size, caps, [Unorm8, Unorm8x2, Unorm8x4]),
        (Short, true) => narrow::<i16, true>(size, caps, [Snorm16, Snorm16x2, Snorm16x4]),
        (UnsignedShort, true) => {
            narrow::<u16, true>(size, caps, [Unorm16, Unorm16x2, Unorm16x4])
        }
        (Byte, false) => expand_to_float::<i8, false>(size),
        (UnsignedByte, false) => expand_to_float::<u8, false>(size),
        (Short, false) => expand_to_float::<i16, false>(size),
        (UnsignedShort, false) => expand_to_float::<u16, false>(size),
        (Int, _) => expand_to_float_by_normalization::<i32>(size, normalized),
        (UnsignedInt, _) => expand_to_float_by_normalization::<u32>(size, normalized),
        (Fixed, _) => match size {
            1 => NativeFormatDescriptor::new(Float32, fixed_to_float::<1>, false),
            2 => NativeFormatDescriptor::new(Float32x2, fixed_to_float::<2>, false),
            3 => NativeFormatDescriptor::new(Float32x3, fixed_to_float::<3>, false),
            _ => NativeFormatDescriptor::new(Float32x4, fixed_to_float::<4>, false),
        },
        (HalfFloat, _) => narrow::<f16, true>(size, caps, [Float16, Float16x2, Float16x4]),
        (Float, _) => identity_32::<f32>(size, [Float32, Float32x2, Float32x3, Float32x4]),
        (Int2101010Rev, true) => NativeFormatDescriptor::new(Float32x4, packed_to_float::<true, true>, false),
        (Int2101010Rev, false) => NativeFormatDescriptor::new(Float32x4, packed_to_float::<true, false>, false),
        (UnsignedInt2101010Rev, true) if caps.packed_10_10_10_2 => NativeFormatDescriptor::new(
            Unorm10_10_10_2,
            copy_components::<u32, 1, 1, false>,
            true,
        ),
        (UnsignedInt2101010Rev, true) => NativeFormatDescriptor::new(Float32x4, packed_to_float::<false, true>, false),
        (UnsignedInt2101010Rev, false) => NativeFormatDescriptor::new(Float32x4, packed_to_float::<false, false>, false),
    }
}

fn integer_format(key: FormatKey, caps: &FormatCaps) -> Result<NativeFormatDescriptor> {
    use ComponentType::*;
    use VertexFormat::*;

    if !caps.integer_attributes {
        return Err(GlesError::Unimplemented(format!(
            "integer vertex attributes are not supported by this backend ({:?})",
            key.component_type
        )));
    }

    let size = key.size;
    let descriptor = match key.component_type {
        Byte => narrow::<i8, false>(size, caps, [Sint8, Sint8x2, Sint8x4]),
        UnsignedByte => narrow::<u8, false>(size, caps, [Uint8, Uint8x2, Uint8x4]),
        Short => narrow::<i16, false>(size, caps, [Sint16, Sint16x2, Sint16x4]),
        UnsignedShort => narrow::<u16, false>(size, caps, [Uint16, Uint16x2, Uint16x4]),
        Int => identity_32::<i32>(size, [Sint32, Sint32x2, Sint32x3, Sint32x4]),
        UnsignedInt => identity_32::<u32>(size, [Uint32, Uint32x2, Uint32x3, Uint32x4]),
        Int2101010Rev => NativeFormatDescriptor::new(Sint16x4, packed_to_int::<true>, false),
        UnsignedInt2101010Rev if caps.packed_10_10_10_2 => NativeFormatDescriptor::new(
            Uint10_10_10_2,
            copy_components::<u32, 1, 1, false>,
            true,
        ),
        UnsignedInt2101010Rev => NativeFormatDescriptor::new(Uint16x4, packed_to_int::<false>, false),
        Fixed | HalfFloat | Float => {
            return Err(GlesError::Unimplemented(format!(
                "{:?} cannot be read as a pure integer attribute",
                key.component_type
            )));
        }
    };
    Ok(descriptor)
}

/// Map a client format to its native format and converter.
///
/// # Errors
///
/// Returns `InvalidOperation` for component counts outside 1..=4 (or packed
/// formats with a count other than 4) and `Unimplemented` for integer
/// attributes the backend cannot read.
pub fn lookup(key: FormatKey, caps: &FormatCaps) -> Result<NativeFormatDescriptor> {
    if !(1..=4).contains(&key.size) || (key.component_type.is_packed() && key.size != 4) {
        return Err(GlesError::InvalidOperation(format!(
            "invalid component count {} for {:?}",
            key.size, key.component_type
        )));
    }

    if key.pure_integer {
        integer_format(key, caps)
    } else {
        Ok(float_format(key, caps))
    }
}

/// Memoizing front end for [`lookup`].
#[derive(Debug)]
pub struct FormatTable {
    caps: FormatCaps,
    entries: HashMap<FormatKey, NativeFormatDescriptor>,
}

impl FormatTable {
    /// Create an empty table for the given backend caps.
    pub fn new(caps: FormatCaps) -> Self {
        Self {
            caps,
            entries: HashMap::new(),
        }
    }

    /// Get the backend caps this table was built for.
    pub fn caps(&self) -> &FormatCaps {
        &self.caps
    }

    /// Look up a key, computing and caching the descriptor on first use.
    pub fn get(&mut self, key: FormatKey) -> Result<NativeFormatDescriptor> {
        if let Some(descriptor) = self.entries.get(&key) {
            return Ok(*descriptor);
        }
        let descriptor = lookup(key, &self.caps)?;
        self.entries.insert(key, descriptor);
        Ok(descriptor)
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no descriptor has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(component_type: ComponentType, size: u32, normalized: bool) -> FormatKey {
        FormatKey::new(component_type, size, normalized, false)
    }

    #[test]
    fn test_normalized_ubyte3_widens() {
        let desc = lookup(key(ComponentType::UnsignedByte, 3, true), &FormatCaps::default()).unwrap();
        assert_eq!(desc.format, VertexFormat::Unorm8x4);
        assert!(!desc.identity);
        assert_eq!(desc.output_element_size(), 4);
    }

    #[test]
    fn test_normalized_ubyte4_is_identity() {
        let desc = lookup(key(ComponentType::UnsignedByte, 4, true), &FormatCaps::default()).unwrap();
        assert_eq!(desc.format, VertexFormat::Unorm8x4);
        assert!(desc.identity);
    }

    #[test]
    fn test_single_component_padding_without_caps() {
        let caps = FormatCaps {
            single_component_formats: false,
            ..FormatCaps::default()
        };
        let desc = lookup(key(ComponentType::Short, 1, true), &caps).unwrap();
        assert_eq!(desc.format, VertexFormat::Snorm16x2);
        assert!(!desc.identity);

        let desc = lookup(key(ComponentType::Short, 1, true), &FormatCaps::default()).unwrap();
        assert_eq!(desc.format, VertexFormat::Snorm16);
        assert!(desc.identity);
    }

    #[test]
    fn test_unnormalized_integers_expand_to_float() {
        let desc = lookup(key(ComponentType::Short, 2, false), &FormatCaps::default()).unwrap();
        assert_eq!(desc.format, VertexFormat::Float32x2);
        assert!(!desc.identity);
    }

    #[test]
    fn test_float_is_identity_at_every_width() {
        for size in 1..=4 {
            let desc = lookup(key(ComponentType::Float, size, false), &FormatCaps::default()).unwrap();
            assert!(desc.identity);
            assert_eq!(desc.output_element_size(), 4 * size);
        }
    }

    #[test]
    fn test_packed_formats() {
        let caps = FormatCaps::default();
        let desc = lookup(key(ComponentType::UnsignedInt2101010Rev, 4, true), &caps).unwrap();
        assert_eq!(desc.format, VertexFormat::Unorm10_10_10_2);
        assert!(desc.identity);

        let desc = lookup(key(ComponentType::Int2101010Rev, 4, true), &caps).unwrap();
        assert_eq!(desc.format, VertexFormat::Float32x4);

        let no_packed = FormatCaps {
            packed_10_10_10_2: false,
            ..caps
        };
        let desc = lookup(key(ComponentType::UnsignedInt2101010Rev, 4, true), &no_packed).unwrap();
        assert_eq!(desc.format, VertexFormat::Float32x4);
        assert!(!desc.identity);
    }

    #[test]
    fn test_pure_integer_formats() {
        let caps = FormatCaps::default();
        let desc = lookup(FormatKey::new(ComponentType::UnsignedByte, 3, false, true), &caps).unwrap();
        assert_eq!(desc.format, VertexFormat::Uint8x4);
        assert!(desc.format.is_integer());

        let desc = lookup(FormatKey::new(ComponentType::Int, 3, false, true), &caps).unwrap();
        assert_eq!(desc.format, VertexFormat::Sint32x3);
        assert!(desc.identity);

        let desc = lookup(FormatKey::new(ComponentType::Int2101010Rev, 4, false, true), &caps).unwrap();
        assert_eq!(desc.format, VertexFormat::Sint16x4);
    }

    #[test]
    fn test_pure_integer_float_is_unimplemented() {
        let result = lookup(
            FormatKey::new(ComponentType::Float, 4, false, true),
            &FormatCaps::default(),
        );
        assert!(matches!(result, Err(GlesError::Unimplemented(_))));

        let caps = FormatCaps {
            integer_attributes: false,
            ..FormatCaps::default()
        };
        let result = lookup(FormatKey::new(ComponentType::Int, 4, false, true), &caps);
        assert!(matches!(result, Err(GlesError::Unimplemented(_))));
    }

    #[test]
    fn test_invalid_component_count() {
        let caps = FormatCaps::default();
        assert!(lookup(key(ComponentType::Float, 0, false), &caps).is_err());
        assert!(lookup(key(ComponentType::Float, 5, false), &caps).is_err());
        assert!(lookup(key(ComponentType::Int2101010Rev, 3, true), &caps).is_err());
    }

    #[test]
    fn test_space_required_overflow() {
        let desc = lookup(key(ComponentType::Float, 4, false), &FormatCaps::default()).unwrap();
        assert_eq!(desc.space_required(10).unwrap(), 160);
        assert!(matches!(
            desc.space_required(u64::MAX),
            Err(GlesError::OutOfMemory(_))
        ));
    }

    #[test]
    fn test_format_table_memoizes() {
        let mut table = FormatTable::new(FormatCaps::default());
        assert!(table.is_empty());
        let a = table.get(key(ComponentType::Fixed, 2, false)).unwrap();
        let b = table.get(key(ComponentType::Fixed, 2, false)).unwrap();
        assert_eq!(a.format, b.format);
        assert_eq!(table.len(), 1);
    }
}
