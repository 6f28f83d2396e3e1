//! Multi-scale Sobel edge detection

use crate::types::{EdgeMap, RasterBuffer};
use ndarray::Array2;

/// Tap spacings at which the Sobel kernel is evaluated
pub const EDGE_SCALES: [usize; 3] = [1, 2, 3];

/// Rec. 601 luma plane, shape `(height, width)`
#[must_use]
pub fn luminance_plane(buffer: &RasterBuffer) -> Array2<f32> {
    let width = buffer.width() as usize;
    let height = buffer.height() as usize;
    Array2::from_shape_fn((height, width), |(y, x)| {
        buffer.color_at(y * width + x).luminance()
    })
}

/// Normalised gradient magnitude at a single tap spacing
///
/// Pixels closer than `scale` to any image border stay at 0.
#[must_use]
pub fn sobel_at_scale(luma: &Array2<f32>, scale: usize) -> EdgeMap {
    let (height, width) = luma.dim();
    let mut out = Array2::<f32>::zeros((height, width));
    if width <= 2 * scale || height <= 2 * scale {
        return out;
    }
    let norm = 255.0 * scale as f32;

    for y in scale..height - scale {
        for x in scale..width - scale {
            let (l, r) = (x - scale, x + scale);
            let (t, b) = (y - scale, y + scale);

            let gx = (luma[[t, r]] + 2.0 * luma[[y, r]] + luma[[b, r]])
                - (luma[[t, l]] + 2.0 * luma[[y, l]] + luma[[b, l]]);
            let gy = (luma[[b, l]] + 2.0 * luma[[b, x]] + luma[[b, r]])
                - (luma[[t, l]] + 2.0 * luma[[t, x]] + luma[[t, r]]);

            out[[y, x]] = ((gx * gx + gy * gy).sqrt() / norm).min(1.0);
        }
    }
    out
}

/// Per-pixel maximum of the Sobel magnitude across [`EDGE_SCALES`], in [0,1]
#[must_use]
pub fn detect_edges(buffer: &RasterBuffer) -> EdgeMap {
    let luma = luminance_plane(buffer);
    let mut edges = Array2::<f32>::zeros(luma.dim());
    for scale in EDGE_SCALES {
        let response = sobel_at_scale(&luma, scale);
        edges.zip_mut_with(&response, |e, &r| *e = e.max(r));
    }
    edges
}
