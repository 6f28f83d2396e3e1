//! Boundary-only alpha smoothing
//!
//! Only pixels with a transparent 8-neighbour are touched. Their 3x3 mean is
//! snapped to a binary value: clear means snap directly, the ambiguous middle
//! band is settled by a vote of the pixel and its 4-neighbours. Straight edges
//! and convex corners survive intact while one-pixel spurs and notches are
//! evened out.

use crate::types::{AlphaMask, OPAQUE_CUTOFF};

/// Mean above which a boundary pixel becomes fully opaque
pub const SNAP_OPAQUE: u32 = 200;
/// Mean below which a boundary pixel becomes fully transparent
pub const SNAP_TRANSPARENT: u32 = 50;

/// 3x3 window statistics for one boundary pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Window {
    /// Sum of alpha over the clipped 3x3 window
    pub sum: u32,
    /// Pixels in the clipped 3x3 window
    pub count: u32,
    /// Opaque pixels among the centre and its 4-neighbours
    pub votes: u32,
    /// Centre plus in-bounds 4-neighbours
    pub voters: u32,
}

/// New alpha for a boundary pixel
#[must_use]
pub fn rebinarize(window: Window) -> u8 {
    let avg = window.sum / window.count.max(1);
    if avg > SNAP_OPAQUE {
        255
    } else if avg < SNAP_TRANSPARENT {
        0
    } else if 2 * window.votes > window.voters {
        255
    } else {
        0
    }
}

/// One smoothing pass, reading `src` and returning a fresh mask
#[must_use]
pub fn smooth_pass(src: &AlphaMask) -> AlphaMask {
    let (width, height) = (src.width() as usize, src.height() as usize);
    let mut out = src.clone();
    for y in 0..height {
        for x in 0..width {
            let mut boundary = false;
            let mut window = Window::default();
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    let a = src.data[ny * width + nx];
                    let opaque = a >= OPAQUE_CUTOFF;
                    window.sum += u32::from(a);
                    window.count += 1;
                    // centre or edge-adjacent
                    if nx == x || ny == y {
                        window.voters += 1;
                        window.votes += u32::from(opaque);
                    }
                    if !opaque && (nx != x || ny != y) {
                        boundary = true;
                    }
                }
            }
            if boundary {
                out.data[y * width + x] = rebinarize(window);
            }
        }
    }
    out
}

/// Apply `passes` smoothing passes
#[must_use]
pub fn smooth_edges(mask: &AlphaMask, passes: usize) -> AlphaMask {
    let mut current = mask.clone();
    for _ in 0..passes {
        current = smooth_pass(&current);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_plane() -> AlphaMask {
        let mut mask = AlphaMask::filled(12, 6, 0);
        for y in 0..6 {
            for x in 6..12 {
                mask.set(x, y, 255);
            }
        }
        mask
    }

    fn window(sum: u32, count: u32, votes: u32, voters: u32) -> Window {
        Window {
            sum,
            count,
            votes,
            voters,
        }
    }

    #[test]
    fn test_rebinarize_rules() {
        assert_eq!(rebinarize(window(9 * 210, 9, 1, 5)), 255);
        assert_eq!(rebinarize(window(9 * 40, 9, 4, 5)), 0);
        // middle band is always snapped to a binary value
        assert_eq!(rebinarize(window(6 * 255, 9, 4, 5)), 255);
        assert_eq!(rebinarize(window(3 * 255, 9, 1, 5)), 0);
        assert_eq!(rebinarize(window(4 * 255, 9, 3, 5)), 255);
        assert_eq!(rebinarize(window(9 * 150, 9, 2, 5)), 0);
        assert_eq!(rebinarize(window(4 * 150, 4, 2, 3)), 255);
    }

    #[test]
    fn test_straight_edge_stays_sharp() {
        let smoothed = smooth_edges(&half_plane(), 2);
        assert_eq!(smoothed, half_plane());
    }

    #[test]
    fn test_square_corners_survive() {
        let mut mask = AlphaMask::filled(20, 20, 0);
        for y in 5..15 {
            for x in 5..15 {
                mask.set(x, y, 255);
            }
        }
        for passes in 1..=5 {
            let smoothed = smooth_edges(&mask, passes);
            assert_eq!(smoothed, mask, "passes = {passes}");
        }
    }

    #[test]
    fn test_spur_and_notch_are_removed() {
        let mut mask = half_plane();
        // one-pixel spur sticking out of the edge
        mask.set(5, 2, 255);
        // one-pixel notch cut into the edge
        mask.set(6, 4, 0);
        let smoothed = smooth_edges(&mask, 1);
        assert_eq!(smoothed.get(5, 2), 0);
        assert_eq!(smoothed.get(6, 4), 255);
        assert!(smoothed.data.iter().all(|&a| a == 0 || a == 255));
    }

    #[test]
    fn test_soft_ramp_becomes_binary() {
        let mut mask = AlphaMask::filled(10, 3, 0);
        for y in 0..3 {
            for (x, a) in [(3, 60), (4, 120), (5, 180), (6, 255), (7, 255), (8, 255), (9, 255)] {
                mask.set(x, y, a);
            }
        }
        let smoothed = smooth_edges(&mask, 2);
        for y in 0..3 {
            assert_eq!(smoothed.get(0, y), 0);
            assert_eq!(smoothed.get(9, y), 255);
            for x in 0..10 {
                let a = smoothed.get(x, y);
                assert!(a == 0 || a == 255, "({x},{y}) = {a}");
            }
        }
    }

    #[test]
    fn test_zero_passes_is_identity() {
        let mask = half_plane();
        assert_eq!(smooth_edges(&mask, 0), mask);
    }

    #[test]
    fn test_uniform_masks_stable() {
        let clear = AlphaMask::filled(5, 5, 0);
        assert_eq!(smooth_edges(&clear, 3), clear);
        let solid = AlphaMask::filled(5, 5, 255);
        assert_eq!(smooth_edges(&solid, 3), solid);
    }
}
