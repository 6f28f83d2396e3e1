//! sRGB to CIE L*a*b* conversion (D65 white point)
//!
//! Every downstream distance computation runs on the converted samples, so the
//! whole image is converted once per invocation and kept in a [`LabImage`].

use crate::types::{ColorSample, LabSample, RasterBuffer};

const WHITE_X: f64 = 0.950_47;
const WHITE_Y: f64 = 1.0;
const WHITE_Z: f64 = 1.088_83;

/// (6/29)^3
const EPSILON: f64 = 216.0 / 24389.0;
/// 3 * (6/29)^2
const LINEAR_SLOPE: f64 = 108.0 / 841.0;
const DELTA: f64 = 6.0 / 29.0;

/// L*a*b* samples for every pixel of a raster, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct LabImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<LabSample>,
}

impl LabImage {
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> LabSample {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Convert every pixel of the buffer; alpha is ignored
#[must_use]
pub fn convert_buffer(buffer: &RasterBuffer) -> LabImage {
    LabImage {
        width: buffer.width(),
        height: buffer.height(),
        pixels: buffer.colors().map(srgb_to_lab).collect(),
    }
}

fn decode_gamma(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn encode_gamma(linear: f64) -> u8 {
    let c = if linear <= 0.003_130_8 {
        linear * 12.92
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    };
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}

fn lab_f(t: f64) -> f64 {
    if t > EPSILON {
        t.cbrt()
    } else {
        t / LINEAR_SLOPE + 4.0 / 29.0
    }
}

fn lab_f_inverse(f: f64) -> f64 {
    if f > DELTA {
        f * f * f
    } else {
        LINEAR_SLOPE * (f - 4.0 / 29.0)
    }
}

/// Convert one sRGB colour to L*a*b*
#[must_use]
pub fn srgb_to_lab(color: ColorSample) -> LabSample {
    let r = decode_gamma(color.r);
    let g = decode_gamma(color.g);
    let b = decode_gamma(color.b);

    let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b;
    let z = 0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b;

    let fx = lab_f(x / WHITE_X);
    let fy = lab_f(y / WHITE_Y);
    let fz = lab_f(z / WHITE_Z);

    LabSample::new(
        (116.0 * fy - 16.0) as f32,
        (500.0 * (fx - fy)) as f32,
        (200.0 * (fy - fz)) as f32,
    )
}

/// Convert L*a*b* back to the nearest sRGB colour, clamping out-of-gamut values
#[must_use]
pub fn lab_to_srgb(lab: LabSample) -> ColorSample {
    let fy = (f64::from(lab.l) + 16.0) / 116.0;
    let fx = fy + f64::from(lab.a) / 500.0;
    let fz = fy - f64::from(lab.b) / 200.0;

    let x = lab_f_inverse(fx) * WHITE_X;
    let y = lab_f_inverse(fy) * WHITE_Y;
    let z = lab_f_inverse(fz) * WHITE_Z;

    let r = 3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z;
    let g = -0.969_266_0 * x + 1.876_010_8 * y + 0.041_556_0 * z;
    let b = 0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z;

    ColorSample::new(
        encode_gamma(r.max(0.0)),
        encode_gamma(g.max(0.0)),
        encode_gamma(b.max(0.0)),
    )
}
