use half::f16;
use std::sync::OnceLock;

/// Convert a linear-light value in [0, 1] to an sRGB-encoded byte in [0, 255].
///
/// IEC 61966-2-1 transfer function: linear segment below 0.0031308, 2.4
/// gamma segment above it.
pub(crate) fn linear_to_srgb_u8(v: f32) -> u8 {
    let c = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
    let srgb = if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (srgb * 255.0 + 0.5).floor().clamp(0.0, 255.0) as u8
}

fn unorm_to_u8(v: f32) -> u8 {
    let c = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
    (c * 255.0 + 0.5).floor() as u8
}

/// Lookup table from every f16 bit pattern to its sRGB byte (64 KB).
fn srgb_lut() -> &'static [u8; 65536] {
    static LUT: OnceLock<Box<[u8; 65536]>> = OnceLock::new();
    LUT.get_or_init(|| {
        let mut table = Box::new([0u8; 65536]);
        for (bits, slot) in table.iter_mut().enumerate() {
            *slot = linear_to_srgb_u8(f16::from_bits(bits as u16).to_f32());
        }
        table
    })
}

#[inline(always)]
fn read_f16_bits(px: &[u8], channel: usize) -> u16 {
    u16::from_le_bytes([px[channel * 2], px[channel * 2 + 1]])
}

/// Convert one row of little-endian RGBA16F pixels. Color channels are
/// treated as linear and sRGB-encoded; alpha is stored linearly.
pub(crate) fn convert_f16_row(src: &[u8], dst: &mut [u8], channels: usize) {
    let lut = srgb_lut();
    for (px, out) in src.chunks_exact(8).zip(dst.chunks_exact_mut(channels)) {
        out[0] = lut[read_f16_bits(px, 0) as usize];
        out[1] = lut[read_f16_bits(px, 1) as usize];
        out[2] = lut[read_f16_bits(px, 2) as usize];
        if channels == 4 {
            out[3] = unorm_to_u8(f16::from_bits(read_f16_bits(px, 3)).to_f32());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(r: f32, g: f32, b: f32, a: f32) -> Vec<u8> {
        [r, g, b, a]
            .iter()
            .flat_map(|v| f16::from_f32(*v).to_bits().to_le_bytes())
            .collect()
    }

    #[test]
    fn endpoints_map_to_byte_range() {
        assert_eq!(linear_to_srgb_u8(0.0), 0);
        assert_eq!(linear_to_srgb_u8(1.0), 255);
        assert_eq!(linear_to_srgb_u8(4.0), 255);
        assert_eq!(linear_to_srgb_u8(f32::NAN), 0);
    }

    #[test]
    fn mid_grey_is_gamma_encoded() {
        // 0.214 linear is roughly 50% in sRGB.
        let v = linear_to_srgb_u8(0.214);
        assert!((126..=129).contains(&v), "got {v}");
    }

    #[test]
    fn row_conversion_keeps_alpha_linear() {
        let src = pixel(1.0, 0.0, 0.0, 0.5);
        let mut rgba = [0u8; 4];
        convert_f16_row(&src, &mut rgba, 4);
        assert_eq!(rgba, [255, 0, 0, 128]);

        let mut rgb = [0u8; 3];
        convert_f16_row(&src, &mut rgb, 3);
        assert_eq!(rgb, [255, 0, 0]);
    }
}
