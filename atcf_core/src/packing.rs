//! Pack/unpack/decay routines for every sample format.
//!
//! "Decay" is pack-then-unpack without emitting bytes: the value a decoder
//! would reconstruct. Every decay routine factors through the same
//! fixed-point intermediates as the corresponding pack/unpack pair, so the
//! two are bit-identical — the bit-rate search scores exactly what the
//! final encode produces.

use glam::{Quat, Vec4};

// ── Scalar fixed-point helpers ─────────────────────────────────────────────

/// Quantize `value` in [0,1] to `num_bits` bits: `round(x * (2^N - 1))`.
/// Out-of-range inputs clamp; quantization never fails.
#[inline]
pub(crate) fn quantize_unsigned(value: f32, num_bits: u32) -> u32 {
    debug_assert!((1..=32).contains(&num_bits));
    let max_value = max_fixed_point(num_bits);
    let scaled = (value.clamp(0.0, 1.0) as f64 * max_value as f64).round();
    scaled as u32
}

/// Inverse of [`quantize_unsigned`].
#[inline]
fn dequantize_unsigned(quantized: u32, num_bits: u32) -> f32 {
    debug_assert!((1..=32).contains(&num_bits));
    let max_value = max_fixed_point(num_bits);
    (quantized as f64 / max_value as f64) as f32
}

#[inline]
fn max_fixed_point(num_bits: u32) -> u32 {
    if num_bits == 32 {
        u32::MAX
    } else {
        (1u32 << num_bits) - 1
    }
}

/// Map [-1,1] onto [0,1] for signed quantization.
#[inline]
fn to_unsigned_space(value: f32) -> f32 {
    (value + 1.0) * 0.5
}

#[inline]
fn from_unsigned_space(value: f32) -> f32 {
    value * 2.0 - 1.0
}

// ── Bit stream helpers ─────────────────────────────────────────────────────

/// Write the low `num_bits` of `value` into `buf` starting at `bit_offset`,
/// most significant bit first. Returns the bit offset past the written bits.
pub fn write_bits(buf: &mut [u8], bit_offset: usize, value: u32, num_bits: u32) -> usize {
    debug_assert!((1..=32).contains(&num_bits));
    debug_assert!(num_bits == 32 || value < (1u32 << num_bits));

    let mut remaining = num_bits;
    let mut offset = bit_offset;
    while remaining > 0 {
        let byte_index = offset / 8;
        let bit_in_byte = (offset % 8) as u32;
        let available = 8 - bit_in_byte;
        let take = remaining.min(available);

        // Bits of `value` still to be written, highest first.
        let chunk = (value >> (remaining - take)) & ((1u32 << take) - 1);
        let shift = available - take;
        buf[byte_index] &= !((((1u32 << take) - 1) << shift) as u8);
        buf[byte_index] |= (chunk << shift) as u8;

        offset += take as usize;
        remaining -= take;
    }
    offset
}

/// Read `num_bits` starting at `bit_offset`, most significant bit first.
pub fn read_bits(buf: &[u8], bit_offset: usize, num_bits: u32) -> u32 {
    debug_assert!((1..=32).contains(&num_bits));

    let mut value = 0u32;
    let mut remaining = num_bits;
    let mut offset = bit_offset;
    while remaining > 0 {
        let byte_index = offset / 8;
        let bit_in_byte = (offset % 8) as u32;
        let available = 8 - bit_in_byte;
        let take = remaining.min(available);

        let shift = available - take;
        let chunk = (u32::from(buf[byte_index]) >> shift) & ((1u32 << take) - 1);
        value = (value << take) | chunk;

        offset += take as usize;
        remaining -= take;
    }
    value
}

// ── Full precision ─────────────────────────────────────────────────────────

pub fn pack_vector4_128(value: Vec4, out: &mut [u8]) {
    out[0..4].copy_from_slice(&value.x.to_le_bytes());
    out[4..8].copy_from_slice(&value.y.to_le_bytes());
    out[8..12].copy_from_slice(&value.z.to_le_bytes());
    out[12..16].copy_from_slice(&value.w.to_le_bytes());
}

pub fn unpack_vector4_128(data: &[u8]) -> Vec4 {
    Vec4::new(
        f32::from_le_bytes(data[0..4].try_into().unwrap()),
        f32::from_le_bytes(data[4..8].try_into().unwrap()),
        f32::from_le_bytes(data[8..12].try_into().unwrap()),
        f32::from_le_bytes(data[12..16].try_into().unwrap()),
    )
}

pub fn pack_vector3_96(value: Vec4, out: &mut [u8]) {
    out[0..4].copy_from_slice(&value.x.to_le_bytes());
    out[4..8].copy_from_slice(&value.y.to_le_bytes());
    out[8..12].copy_from_slice(&value.z.to_le_bytes());
}

pub fn unpack_vector3_96(data: &[u8]) -> Vec4 {
    Vec4::new(
        f32::from_le_bytes(data[0..4].try_into().unwrap()),
        f32::from_le_bytes(data[4..8].try_into().unwrap()),
        f32::from_le_bytes(data[8..12].try_into().unwrap()),
        0.0,
    )
}

// ── 48 bit: [16,16,16] ─────────────────────────────────────────────────────

pub fn pack_vector3_u48(value: Vec4, out: &mut [u8]) {
    let x = quantize_unsigned(value.x, 16) as u16;
    let y = quantize_unsigned(value.y, 16) as u16;
    let z = quantize_unsigned(value.z, 16) as u16;
    out[0..2].copy_from_slice(&x.to_le_bytes());
    out[2..4].copy_from_slice(&y.to_le_bytes());
    out[4..6].copy_from_slice(&z.to_le_bytes());
}

pub fn unpack_vector3_u48(data: &[u8]) -> Vec4 {
    let x = u16::from_le_bytes(data[0..2].try_into().unwrap());
    let y = u16::from_le_bytes(data[2..4].try_into().unwrap());
    let z = u16::from_le_bytes(data[4..6].try_into().unwrap());
    Vec4::new(
        dequantize_unsigned(u32::from(x), 16),
        dequantize_unsigned(u32::from(y), 16),
        dequantize_unsigned(u32::from(z), 16),
        0.0,
    )
}

pub fn pack_vector3_s48(value: Vec4, out: &mut [u8]) {
    let unsigned = Vec4::new(
        to_unsigned_space(value.x),
        to_unsigned_space(value.y),
        to_unsigned_space(value.z),
        0.0,
    );
    pack_vector3_u48(unsigned, out);
}

pub fn unpack_vector3_s48(data: &[u8]) -> Vec4 {
    let unsigned = unpack_vector3_u48(data);
    Vec4::new(
        from_unsigned_space(unsigned.x),
        from_unsigned_space(unsigned.y),
        from_unsigned_space(unsigned.z),
        0.0,
    )
}

/// Pack-then-unpack through [16,16,16] bits, normalized [0,1] inputs.
pub fn decay_vector3_u48(value: Vec4) -> Vec4 {
    Vec4::new(
        dequantize_unsigned(quantize_unsigned(value.x, 16), 16),
        dequantize_unsigned(quantize_unsigned(value.y, 16), 16),
        dequantize_unsigned(quantize_unsigned(value.z, 16), 16),
        0.0,
    )
}

/// Pack-then-unpack through [16,16,16] bits, signed [-1,1] inputs.
pub fn decay_vector3_s48(value: Vec4) -> Vec4 {
    Vec4::new(
        from_unsigned_space(dequantize_unsigned(
            quantize_unsigned(to_unsigned_space(value.x), 16),
            16,
        )),
        from_unsigned_space(dequantize_unsigned(
            quantize_unsigned(to_unsigned_space(value.y), 16),
            16,
        )),
        from_unsigned_space(dequantize_unsigned(
            quantize_unsigned(to_unsigned_space(value.z), 16),
            16,
        )),
        0.0,
    )
}

// ── 32 bit: [11,11,10] ─────────────────────────────────────────────────────

/// Pack into one little-endian u32 word: x in the high 11 bits, y in the
/// next 11, z in the low 10.
pub fn pack_vector3_32(value: Vec4, is_normalized: bool, out: &mut [u8]) {
    let value = if is_normalized {
        value
    } else {
        Vec4::new(
            to_unsigned_space(value.x),
            to_unsigned_space(value.y),
            to_unsigned_space(value.z),
            0.0,
        )
    };
    let x = quantize_unsigned(value.x, 11);
    let y = quantize_unsigned(value.y, 11);
    let z = quantize_unsigned(value.z, 10);
    let word = (x << 21) | (y << 10) | z;
    out[0..4].copy_from_slice(&word.to_le_bytes());
}

pub fn unpack_vector3_32(data: &[u8], is_normalized: bool) -> Vec4 {
    let word = u32::from_le_bytes(data[0..4].try_into().unwrap());
    let x = dequantize_unsigned(word >> 21, 11);
    let y = dequantize_unsigned((word >> 10) & 0x7FF, 11);
    let z = dequantize_unsigned(word & 0x3FF, 10);
    if is_normalized {
        Vec4::new(x, y, z, 0.0)
    } else {
        Vec4::new(
            from_unsigned_space(x),
            from_unsigned_space(y),
            from_unsigned_space(z),
            0.0,
        )
    }
}

/// Pack-then-unpack through [11,11,10] bits.
pub fn decay_vector3_32(value: Vec4, is_normalized: bool) -> Vec4 {
    let mut scratch = [0u8; 4];
    pack_vector3_32(value, is_normalized, &mut scratch);
    unpack_vector3_32(&scratch, is_normalized)
}

// ── Variable bit rate: [N,N,N] ─────────────────────────────────────────────

/// Pack three `num_bits`-bit fields starting at `bit_offset`, normalized
/// [0,1] inputs. Returns the bit offset past the packed fields.
pub fn pack_vector3_uxx(
    value: Vec4,
    num_bits: u32,
    out: &mut [u8],
    bit_offset: usize,
) -> usize {
    let offset = write_bits(out, bit_offset, quantize_unsigned(value.x, num_bits), num_bits);
    let offset = write_bits(out, offset, quantize_unsigned(value.y, num_bits), num_bits);
    write_bits(out, offset, quantize_unsigned(value.z, num_bits), num_bits)
}

pub fn unpack_vector3_uxx(num_bits: u32, data: &[u8], bit_offset: usize) -> Vec4 {
    let x = read_bits(data, bit_offset, num_bits);
    let y = read_bits(data, bit_offset + num_bits as usize, num_bits);
    let z = read_bits(data, bit_offset + 2 * num_bits as usize, num_bits);
    Vec4::new(
        dequantize_unsigned(x, num_bits),
        dequantize_unsigned(y, num_bits),
        dequantize_unsigned(z, num_bits),
        0.0,
    )
}

/// Signed variant of [`pack_vector3_uxx`], for [-1,1] inputs.
pub fn pack_vector3_sxx(
    value: Vec4,
    num_bits: u32,
    out: &mut [u8],
    bit_offset: usize,
) -> usize {
    let unsigned = Vec4::new(
        to_unsigned_space(value.x),
        to_unsigned_space(value.y),
        to_unsigned_space(value.z),
        0.0,
    );
    pack_vector3_uxx(unsigned, num_bits, out, bit_offset)
}

pub fn unpack_vector3_sxx(num_bits: u32, data: &[u8], bit_offset: usize) -> Vec4 {
    let unsigned = unpack_vector3_uxx(num_bits, data, bit_offset);
    Vec4::new(
        from_unsigned_space(unsigned.x),
        from_unsigned_space(unsigned.y),
        from_unsigned_space(unsigned.z),
        0.0,
    )
}

/// Pack-then-unpack through [N,N,N] bits, normalized inputs.
pub fn decay_vector3_uxx(value: Vec4, num_bits: u32) -> Vec4 {
    Vec4::new(
        dequantize_unsigned(quantize_unsigned(value.x, num_bits), num_bits),
        dequantize_unsigned(quantize_unsigned(value.y, num_bits), num_bits),
        dequantize_unsigned(quantize_unsigned(value.z, num_bits), num_bits),
        0.0,
    )
}

/// Pack-then-unpack through [N,N,N] bits, signed inputs.
pub fn decay_vector3_sxx(value: Vec4, num_bits: u32) -> Vec4 {
    Vec4::new(
        from_unsigned_space(dequantize_unsigned(
            quantize_unsigned(to_unsigned_space(value.x), num_bits),
            num_bits,
        )),
        from_unsigned_space(dequantize_unsigned(
            quantize_unsigned(to_unsigned_space(value.y), num_bits),
            num_bits,
        )),
        from_unsigned_space(dequantize_unsigned(
            quantize_unsigned(to_unsigned_space(value.z), num_bits),
            num_bits,
        )),
        0.0,
    )
}

// ── Quaternion reconstruction ──────────────────────────────────────────────

/// Rebuild a unit quaternion from its xyz components under the drop-W
/// convention: `w = +sqrt(1 - x^2 - y^2 - z^2)`.
#[inline]
pub fn quat_from_positive_w(value: Vec4) -> Quat {
    let w_squared = 1.0 - value.x * value.x - value.y * value.y - value.z * value.z;
    // Quantization noise can push the sum of squares past 1.
    let w = w_squared.max(0.0).sqrt();
    Quat::from_xyzw(value.x, value.y, value.z, w)
}

/// Flip a quaternion into the w >= 0 hemisphere (q and -q encode the same
/// rotation), the storage convention of every drop-W format.
#[inline]
pub fn quat_ensure_positive_w(value: Vec4) -> Vec4 {
    if value.w < 0.0 {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.000001; // 2^-20 ballpark

    fn lsb(num_bits: u32) -> f32 {
        1.0 / max_fixed_point(num_bits) as f32
    }

    #[test]
    fn bit_stream_round_trips_at_odd_offsets() {
        let mut buf = [0u8; 16];
        let mut offset = 0;
        let fields: [(u32, u32); 5] = [(0b101, 3), (0x5AB, 11), (0x3FF, 10), (1, 1), (0xDEADBEEF, 32)];
        for &(value, bits) in &fields {
            offset = write_bits(&mut buf, offset, value, bits);
        }
        let mut offset = 0;
        for &(value, bits) in &fields {
            assert_eq!(read_bits(&buf, offset, bits), value);
            offset += bits as usize;
        }
    }

    #[test]
    fn pack_unpack_is_identity_on_valid_bit_patterns() {
        // Law: pack(unpack(b)) == b for every fixed format. Sweep a spread
        // of 16-bit lanes and full 32-bit words.
        for lane in [0u16, 1, 2, 0x7FFF, 0x8000, 0xFFFE, 0xFFFF] {
            let mut data = [0u8; 6];
            data[0..2].copy_from_slice(&lane.to_le_bytes());
            data[2..4].copy_from_slice(&lane.wrapping_add(1).to_le_bytes());
            data[4..6].copy_from_slice(&lane.wrapping_mul(3).to_le_bytes());

            let mut repacked = [0u8; 6];
            pack_vector3_u48(unpack_vector3_u48(&data), &mut repacked);
            assert_eq!(repacked, data);

            let mut repacked = [0u8; 6];
            pack_vector3_s48(unpack_vector3_s48(&data), &mut repacked);
            assert_eq!(repacked, data);
        }

        for word in [0u32, 1, 0x8000_0000, 0xFFFF_FFFF, 0x1234_5678, 0x7FF << 21] {
            let data = word.to_le_bytes();
            let mut repacked = [0u8; 4];
            pack_vector3_32(unpack_vector3_32(&data, true), true, &mut repacked);
            assert_eq!(repacked, data);
        }
    }

    #[test]
    fn decay_matches_pack_then_unpack() {
        let samples = [
            Vec4::new(0.0, 0.5, 1.0, 0.0),
            Vec4::new(0.123, 0.456, 0.789, 0.0),
            Vec4::new(0.999, 0.001, 0.25, 0.0),
        ];
        for &sample in &samples {
            let mut buf = [0u8; 6];
            pack_vector3_u48(sample, &mut buf);
            assert_eq!(decay_vector3_u48(sample), unpack_vector3_u48(&buf));

            let mut buf = [0u8; 4];
            pack_vector3_32(sample, true, &mut buf);
            assert_eq!(decay_vector3_32(sample, true), unpack_vector3_32(&buf, true));

            for num_bits in [3u32, 8, 11, 19] {
                let mut buf = [0u8; 16];
                pack_vector3_uxx(sample, num_bits, &mut buf, 0);
                assert_eq!(
                    decay_vector3_uxx(sample, num_bits),
                    unpack_vector3_uxx(num_bits, &buf, 0)
                );
            }
        }
    }

    #[test]
    fn decay_error_is_within_half_lsb() {
        let sample = Vec4::new(0.3333, 0.6667, 0.0421, 0.0);
        for num_bits in [3u32, 5, 8, 10, 16, 19] {
            let decayed = decay_vector3_uxx(sample, num_bits);
            let max_error = (decayed - sample).abs().max_element();
            assert!(
                max_error <= lsb(num_bits) * 0.5 + EPSILON,
                "{num_bits} bits: error {max_error}"
            );
        }
    }

    #[test]
    fn eight_bit_decay_hits_exact_grid_point() {
        // Stored normalized 0.5 at 8 bits must decode to round(0.5*255)/255.
        let decayed = decay_vector3_uxx(Vec4::new(0.5, 0.5, 0.5, 0.0), 8);
        let expected = (0.5f32 * 255.0).round() / 255.0;
        assert_eq!(decayed, Vec4::new(expected, expected, expected, 0.0));
    }

    #[test]
    fn signed_decay_round_trips_signed_space() {
        let sample = Vec4::new(-1.0, 0.0, 1.0, 0.0);
        let decayed = decay_vector3_sxx(sample, 16);
        assert!((decayed - sample).abs().max_element() <= lsb(16) + EPSILON);
    }

    #[test]
    fn positive_w_reconstruction() {
        let q = Quat::from_xyzw(0.1, -0.2, 0.3, 0.927361).normalize();
        let rebuilt = quat_from_positive_w(Vec4::new(q.x, q.y, q.z, 0.0));
        assert!((rebuilt.w - q.w).abs() <= EPSILON);

        // Sum of squares slightly over 1 must not NaN.
        let rebuilt = quat_from_positive_w(Vec4::new(0.8, 0.6, 0.01, 0.0));
        assert_eq!(rebuilt.w, 0.0);
    }

    #[test]
    fn ensure_positive_w_flips_the_whole_quat() {
        let flipped = quat_ensure_positive_w(Vec4::new(0.1, 0.2, 0.3, -0.9));
        assert_eq!(flipped, Vec4::new(-0.1, -0.2, -0.3, 0.9));
        let kept = quat_ensure_positive_w(Vec4::new(0.1, 0.2, 0.3, 0.9));
        assert_eq!(kept, Vec4::new(0.1, 0.2, 0.3, 0.9));
    }
}
