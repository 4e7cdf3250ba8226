//! Per-element converters from client vertex data to native layouts.
//!
//! Every converter has the [`ConvertFn`] signature: it reads `count` elements
//! starting at the beginning of `input`, stepping `stride` bytes between
//! elements, and writes tightly packed native elements into `output`.
//! Source data may be arbitrarily aligned.

use bytemuck::Pod;
use half::f16;

/// Signature shared by all converters.
pub type ConvertFn = fn(input: &[u8], stride: usize, count: usize, output: &mut [u8]);

/// A scalar vertex component type.
pub trait Component: Pod {
    /// Fill value for missing y/z components.
    const ZERO: Self;
    /// Fill value for a missing w component of an integer attribute.
    const ONE: Self;
    /// Fill value for a missing w component of a normalized attribute.
    const NORMALIZED_ONE: Self;

    /// Convert to float, optionally applying normalization.
    fn to_float(self, normalized: bool) -> f32;
}

macro_rules! impl_signed_component {
    ($($ty:ty),*) => {$(
        impl Component for $ty {
            const ZERO: Self = 0;
            const ONE: Self = 1;
            const NORMALIZED_ONE: Self = <$ty>::MAX;

            fn to_float(self, normalized: bool) -> f32 {
                if normalized {
                    // (2v + 1) / (2^bits - 1)
                    ((2.0 * self as f64 + 1.0) / (2.0 * <$ty>::MAX as f64 + 1.0)) as f32
                } else {
                    self as f32
                }
            }
        }
    )*};
}

macro_rules! impl_unsigned_component {
    ($($ty:ty),*) => {$(
        impl Component for $ty {
            const ZERO: Self = 0;
            const ONE: Self = 1;
            const NORMALIZED_ONE: Self = <$ty>::MAX;

            fn to_float(self, normalized: bool) -> f32 {
                if normalized {
                    (self as f64 / <$ty>::MAX as f64) as f32
                } else {
                    self as f32
                }
            }
        }
    )*};
}

impl_signed_component!(i8, i16, i32);
impl_unsigned_component!(u8, u16, u32);

impl Component for f16 {
    const ZERO: Self = f16::ZERO;
    const ONE: Self = f16::ONE;
    const NORMALIZED_ONE: Self = f16::ONE;

    fn to_float(self, _normalized: bool) -> f32 {
        self.to_f32()
    }
}

impl Component for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const NORMALIZED_ONE: Self = 1.0;

    fn to_float(self, _normalized: bool) -> f32 {
        self
    }
}

#[inline]
fn read<T: Pod>(bytes: &[u8], index: usize) -> T {
    let size = std::mem::size_of::<T>();
    bytemuck::pod_read_unaligned(&bytes[index * size..(index + 1) * size])
}

#[inline]
fn write<T: Pod>(bytes: &mut [u8], index: usize, value: T) {
    let size = std::mem::size_of::<T>();
    bytes[index * size..(index + 1) * size].copy_from_slice(bytemuck::bytes_of(&value));
}

/// Copy `IN` components per element and pad up to `OUT` components.
///
/// Padding follows the GL defaults `(0, 0, 0, 1)`; the w component is the
/// normalized maximum when `NORMALIZED_FILL` is set.
pub fn copy_components<T: Component, const IN: usize, const OUT: usize, const NORMALIZED_FILL: bool>(
    input: &[u8],
    stride: usize,
    count: usize,
    output: &mut [u8],
) {
    let component_size = std::mem::size_of::<T>();
    let in_size = component_size * IN;
    let out_size = component_size * OUT;

    if IN == OUT && stride == in_size {
        let len = count * out_size;
        output[..len].copy_from_slice(&input[..len]);
        return;
    }

    for (i, out) in output.chunks_exact_mut(out_size).take(count).enumerate() {
        let start = i * stride;
        out[..in_size].copy_from_slice(&input[start..start + in_size]);
        for c in IN..OUT {
            let fill = if c == 3 {
                if NORMALIZED_FILL { T::NORMALIZED_ONE } else { T::ONE }
            } else {
                T::ZERO
            };
            write(out, c, fill);
        }
    }
}

/// Expand `N` components of `T` to `N` 32-bit floats.
pub fn to_float<T: Component, const N: usize, const NORMALIZED: bool>(
    input: &[u8],
    stride: usize,
    count: usize,
    output: &mut [u8],
) {
    let in_size = std::mem::size_of::<T>() * N;
    for (i, out) in output.chunks_exact_mut(4 * N).take(count).enumerate() {
        let src = &input[i * stride..i * stride + in_size];
        for c in 0..N {
            write(out, c, read::<T>(src, c).to_float(NORMALIZED));
        }
    }
}

/// Convert `N` 16.16 fixed-point components to 32-bit floats.
pub fn fixed_to_float<const N: usize>(input: &[u8], stride: usize, count: usize, output: &mut [u8]) {
    for (i, out) in output.chunks_exact_mut(4 * N).take(count).enumerate() {
        let src = &input[i * stride..i * stride + 4 * N];
        for c in 0..N {
            write(out, c, read::<i32>(src, c) as f32 / 65536.0);
        }
    }
}

/// Unpack the four fields of a 2-10-10-10 reversed word, x in the low bits.
#[inline]
fn unpack_fields<const SIGNED: bool>(word: u32) -> [i32; 4] {
    let mut fields = [0i32; 4];
    for (c, field) in fields.iter_mut().take(3).enumerate() {
        let bits = (word >> (10 * c)) & 0x3ff;
        *field = if SIGNED {
            ((bits << 22) as i32) >> 22
        } else {
            bits as i32
        };
    }
    let alpha = (word >> 30) & 0x3;
    fields[3] = if SIGNED {
        [0, 1, -2, -1][alpha as usize]
    } else {
        alpha as i32
    };
    fields
}

/// Expand a packed 2-10-10-10 element to four 32-bit floats.
pub fn packed_to_float<const SIGNED: bool, const NORMALIZED: bool>(
    input: &[u8],
    stride: usize,
    count: usize,
    output: &mut [u8],
) {
    for (i, out) in output.chunks_exact_mut(16).take(count).enumerate() {
        let word = read::<u32>(&input[i * stride..i * stride + 4], 0);
        let fields = unpack_fields::<SIGNED>(word);
        for (c, &field) in fields.iter().enumerate() {
            let value = field as f32;
            let value = match (NORMALIZED, SIGNED, c) {
                (false, _, _) => value,
                (true, true, 3) => value.max(-1.0),
                (true, true, _) => (value / 511.0).max(-1.0),
                (true, false, 3) => value / 3.0,
                (true, false, _) => value / 1023.0,
            };
            write(out, c, value);
        }
    }
}

/// Expand a packed 2-10-10-10 element to four 16-bit integers.
pub fn packed_to_int<const SIGNED: bool>(
    input: &[u8],
    stride: usize,
    count: usize,
    output: &mut [u8],
) {
    for (i, out) in output.chunks_exact_mut(8).take(count).enumerate() {
        let word = read::<u32>(&input[i * stride..i * stride + 4], 0);
        for (c, field) in unpack_fields::<SIGNED>(word).into_iter().enumerate() {
            if SIGNED {
                write(out, c, field as i16);
            } else {
                write(out, c, field as u16);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect()
    }

    #[test]
    fn test_copy_widens_with_normalized_one() {
        let input = [10u8, 20, 30, 40, 50, 60];
        let mut output = [0u8; 8];
        copy_components::<u8, 3, 4, true>(&input, 3, 2, &mut output);
        assert_eq!(output, [10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_copy_pads_integer_with_zero() {
        let input = [7u8, 9];
        let mut output = [0xAAu8; 4];
        copy_components::<u8, 1, 2, false>(&input, 1, 2, &mut output);
        assert_eq!(output, [7, 0, 9, 0]);
    }

    #[test]
    fn test_copy_honors_stride() {
        // Two float2 elements with 4 bytes of interleaved padding.
        let mut input = Vec::new();
        for v in [1.0f32, 2.0, 99.0, 3.0, 4.0, 99.0] {
            input.extend_from_slice(&v.to_le_bytes());
        }
        let mut output = [0u8; 16];
        copy_components::<f32, 2, 2, false>(&input, 12, 2, &mut output);
        assert_eq!(floats(&output), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_normalized_unsigned_to_float() {
        let input = [0u8, 255];
        let mut output = [0u8; 8];
        to_float::<u8, 1, true>(&input, 1, 2, &mut output);
        assert_eq!(floats(&output), vec![0.0, 1.0]);
    }

    #[test]
    fn test_normalized_signed_to_float_is_symmetric() {
        let input = bytemuck::cast_slice::<i16, u8>(&[i16::MAX, i16::MIN]).to_vec();
        let mut output = [0u8; 8];
        to_float::<i16, 1, true>(&input, 2, 2, &mut output);
        assert_eq!(floats(&output), vec![1.0, -1.0]);
    }

    #[test]
    fn test_unnormalized_to_float() {
        let input = [200u8, 3];
        let mut output = [0u8; 8];
        to_float::<u8, 2, false>(&input, 2, 1, &mut output);
        assert_eq!(floats(&output), vec![200.0, 3.0]);
    }

    #[test]
    fn test_fixed_to_float() {
        let input = bytemuck::cast_slice::<i32, u8>(&[65536, -32768]).to_vec();
        let mut output = [0u8; 8];
        fixed_to_float::<2>(&input, 8, 1, &mut output);
        assert_eq!(floats(&output), vec![1.0, -0.5]);
    }

    fn pack(x: u32, y: u32, z: u32, w: u32) -> [u8; 4] {
        (x | (y << 10) | (z << 20) | (w << 30)).to_le_bytes()
    }

    #[test]
    fn test_packed_signed_normalized() {
        // x = -512 clamps to -1, y = 511 -> 1, z = 0, w = 2 (-2) clamps to -1.
        let input = pack(0x200, 0x1ff, 0, 2);
        let mut output = [0u8; 16];
        packed_to_float::<true, true>(&input, 4, 1, &mut output);
        assert_eq!(floats(&output), vec![-1.0, 1.0, 0.0, -1.0]);
    }

    #[test]
    fn test_packed_signed_alpha_lookup() {
        let mut output = [0u8; 16];
        for (w, expected) in [(0u32, 0.0f32), (1, 1.0), (2, -2.0), (3, -1.0)] {
            packed_to_float::<true, false>(&pack(0, 0, 0, w), 4, 1, &mut output);
            assert_eq!(floats(&output)[3], expected);
        }
    }

    #[test]
    fn test_packed_unsigned_normalized() {
        let input = pack(1023, 0, 1023, 3);
        let mut output = [0u8; 16];
        packed_to_float::<false, true>(&input, 4, 1, &mut output);
        assert_eq!(floats(&output), vec![1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_packed_to_int() {
        let input = pack(0x3ff, 5, 0, 3);
        let mut output = [0u8; 8];
        packed_to_int::<true>(&input, 4, 1, &mut output);
        let values: Vec<i16> = output
            .chunks_exact(2)
            .map(bytemuck::pod_read_unaligned::<i16>)
            .collect();
        assert_eq!(values, vec![-1, 5, 0, -1]);
    }

    #[test]
    fn test_half_widen_fills_one() {
        let input = bytemuck::cast_slice::<f16, u8>(&[f16::from_f32(0.5); 3]).to_vec();
        let mut output = [0u8; 8];
        copy_components::<f16, 3, 4, true>(&input, 6, 1, &mut output);
        let values: Vec<f32> = output
            .chunks_exact(2)
            .map(|c| bytemuck::pod_read_unaligned::<f16>(c).to_f32())
            .collect();
        assert_eq!(values, vec![0.5, 0.5, 0.5, 1.0]);
    }
}
