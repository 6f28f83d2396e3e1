//! Morphological cleanup of the alpha mask
//!
//! Opening (erosion then dilation with a 3x3 square), isolated-pixel removal,
//! likelihood-gated hole filling and 4-connected component pruning.
//! Neighbourhoods are clipped at the image border; out-of-bounds pixels take
//! no part in a min or max.

use crate::types::{AlphaMask, OPAQUE_CUTOFF};

/// Opaque share of the 5x5 neighbourhood below which a pixel is isolated
pub const ISOLATION_RATIO: f32 = 0.3;
/// Opaque 8-neighbours needed before a hole pixel is filled
pub const HOLE_NEIGHBORS: usize = 6;
/// Foreground likelihood a hole pixel must exceed to be filled
pub const HOLE_LIKELIHOOD: f32 = 0.4;

pub const MIN_COMPONENT_FLOOR: usize = 16;
pub const MIN_COMPONENT_CAP: usize = 500;

fn window_extreme(mask: &AlphaMask, pick: fn(u8, u8) -> u8, init: u8) -> AlphaMask {
    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let mut out = vec![init; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let mut v = init;
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    v = pick(v, mask.data[ny * width + nx]);
                }
            }
            out[y * width + x] = v;
        }
    }
    AlphaMask::new(out, mask.dimensions)
}

/// Grayscale erosion: minimum over the 3x3 neighbourhood
#[must_use]
pub fn erode(mask: &AlphaMask) -> AlphaMask {
    window_extreme(mask, u8::min, u8::MAX)
}

/// Grayscale dilation: maximum over the 3x3 neighbourhood
#[must_use]
pub fn dilate(mask: &AlphaMask) -> AlphaMask {
    window_extreme(mask, u8::max, u8::MIN)
}

/// `iterations` erosions followed by as many dilations
#[must_use]
pub fn open(mask: &AlphaMask, iterations: usize) -> AlphaMask {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = erode(&out);
    }
    for _ in 0..iterations {
        out = dilate(&out);
    }
    out
}

/// Clear opaque pixels with too few opaque pixels in their 5x5 neighbourhood
#[must_use]
pub fn remove_isolated_pixels(mask: &AlphaMask) -> AlphaMask {
    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let mut out = mask.clone();
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            if !mask.is_opaque_at(i) {
                continue;
            }
            let mut total = 0usize;
            let mut opaque = 0usize;
            for ny in y.saturating_sub(2)..=(y + 2).min(height - 1) {
                for nx in x.saturating_sub(2)..=(x + 2).min(width - 1) {
                    if nx == x && ny == y {
                        continue;
                    }
                    total += 1;
                    if mask.is_opaque_at(ny * width + nx) {
                        opaque += 1;
                    }
                }
            }
            if total > 0 && (opaque as f32) < ISOLATION_RATIO * total as f32 {
                out.data[i] = 0;
            }
        }
    }
    out
}

/// Fill transparent pixels surrounded by foreground when they are likely foreground
#[must_use]
pub fn fill_holes(mask: &AlphaMask, likelihood: &[f32]) -> AlphaMask {
    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let mut out = mask.clone();
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            if mask.is_opaque_at(i) || likelihood.get(i).copied().unwrap_or(0.0) <= HOLE_LIKELIHOOD
            {
                continue;
            }
            let mut opaque = 0usize;
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    if (nx != x || ny != y) && mask.is_opaque_at(ny * width + nx) {
                        opaque += 1;
                    }
                }
            }
            if opaque >= HOLE_NEIGHBORS {
                out.data[i] = 255;
            }
        }
    }
    out
}

/// Smallest component kept for an image with `total_pixels` pixels
#[must_use]
pub fn min_component_size(total_pixels: usize) -> usize {
    (total_pixels / 400).clamp(MIN_COMPONENT_FLOOR, MIN_COMPONENT_CAP)
}

/// Erase 4-connected opaque components smaller than `min_size`
#[must_use]
pub fn prune_components(mask: &AlphaMask, min_size: usize) -> AlphaMask {
    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let mut out = mask.clone();
    let mut visited = vec![false; mask.len()];
    let mut stack = Vec::new();
    let mut component = Vec::new();

    for start in 0..mask.len() {
        if visited[start] || !mask.is_opaque_at(start) {
            continue;
        }
        component.clear();
        stack.push(start);
        visited[start] = true;

        while let Some(i) = stack.pop() {
            component.push(i);
            let (x, y) = (i % width, i / width);
            let mut visit = |n: usize| {
                if !visited[n] && mask.is_opaque_at(n) {
                    visited[n] = true;
                    stack.push(n);
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < width {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - width);
            }
            if y + 1 < height {
                visit(i + width);
            }
        }

        if component.len() < min_size {
            for &i in &component {
                out.data[i] = 0;
            }
        }
    }
    out
}

/// Full cleanup sequence used by the advanced path
#[must_use]
pub fn clean(mask: &AlphaMask, likelihood: &[f32], iterations: usize) -> AlphaMask {
    let opened = open(mask, iterations);
    let isolated = remove_isolated_pixels(&opened);
    let filled = fill_holes(&isolated, likelihood);
    let pruned = prune_components(&filled, min_component_size(mask.len()));
    log::debug!(
        "Morphology: {} -> {} foreground pixels",
        mask.data.iter().filter(|&&a| a >= OPAQUE_CUTOFF).count(),
        pruned.data.iter().filter(|&&a| a >= OPAQUE_CUTOFF).count()
    );
    pruned
}
