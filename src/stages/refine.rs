//! Greedy energy relaxation of a binary mask
//!
//! Each interior pixel compares the energy of its current label with the
//! flipped label and keeps the lower one. The energy is an intensity prior plus
//! a contrast-sensitive 8-neighbour smoothness term. This is a local search,
//! not an exact min-cut, and only reaches a local optimum.

use crate::error::{BgRemovalError, Result};
use crate::stages::color::LabImage;
use crate::types::{AlphaMask, EdgeMap, OPAQUE_CUTOFF};

pub const PASSES: usize = 3;

const DATA_WEIGHT: f32 = 0.6;
/// Colour difference at which a neighbour's pull is halved
const COLOR_SCALE: f32 = 100.0;
/// Share of the smoothness pull removed on a full-strength edge
const EDGE_DAMPING: f32 = 0.5;

const NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Intensity prior: foreground is penalised on dark pixels, background on bright ones
#[must_use]
pub fn data_term(lightness: f32, foreground: bool) -> f32 {
    let intensity = (lightness / 100.0).clamp(0.0, 1.0);
    if foreground {
        DATA_WEIGHT * (1.0 - intensity)
    } else {
        DATA_WEIGHT * intensity
    }
}

/// Pull between two neighbours; similar colours away from edges pull hardest
#[must_use]
pub fn neighbor_weight(color_difference: f32, edge: f32) -> f32 {
    (1.0 / (1.0 + color_difference / COLOR_SCALE)) * (1.0 - EDGE_DAMPING * edge.clamp(0.0, 1.0))
}

/// Run [`PASSES`] relaxation passes over the interior of the mask
///
/// Pixels whose label ends up flipped become fully opaque or fully transparent;
/// all other alpha values are kept.
///
/// # Errors
/// - `AlgorithmFailure` if an energy evaluates to a non-finite value
pub fn refine(mask: &AlphaMask, lab: &LabImage, edges: &EdgeMap) -> Result<AlphaMask> {
    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let initial: Vec<bool> = mask.data.iter().map(|&a| a >= OPAQUE_CUTOFF).collect();
    if width < 3 || height < 3 {
        return Ok(mask.clone());
    }

    let mut current = initial.clone();
    let mut next = initial.clone();

    for pass in 0..PASSES {
        let mut flips = 0usize;
        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let i = y * width + x;
                let center = lab.pixels[i];
                let edge = edges[[y, x]];
                let label = current[i];

                let mut disagree = 0.0f32;
                let mut agree = 0.0f32;
                for (dx, dy) in NEIGHBORS {
                    let n = (y as isize + dy) as usize * width + (x as isize + dx) as usize;
                    let w = neighbor_weight(center.distance(lab.pixels[n]), edge);
                    if current[n] == label {
                        agree += w;
                    } else {
                        disagree += w;
                    }
                }

                let keep = data_term(center.l, label) + disagree;
                let flip = data_term(center.l, !label) + agree;
                if !keep.is_finite() || !flip.is_finite() {
                    return Err(BgRemovalError::algorithm_failure(format!(
                        "non-finite energy at ({}, {}) in refinement pass {}",
                        x,
                        y,
                        pass + 1
                    )));
                }

                next[i] = if flip < keep {
                    flips += 1;
                    !label
                } else {
                    label
                };
            }
        }
        // border labels never change, so both buffers agree outside the interior
        std::mem::swap(&mut current, &mut next);
        log::trace!("Refinement pass {}: {} pixels flipped", pass + 1, flips);
    }

    let data = mask
        .data
        .iter()
        .zip(initial.iter().zip(current.iter()))
        .map(|(&alpha, (&before, &after))| match (before, after) {
            (false, true) => 255,
            (true, false) => 0,
            _ => alpha,
        })
        .collect();
    Ok(AlphaMask::new(data, mask.dimensions))
}
