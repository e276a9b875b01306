//! Axial hex-grid geometry
//!
//! Tiles are addressed by axial coordinates `(q, r)`. The implicit third cube
//! coordinate is `s = -q - r`, which is why distance sums three absolute
//! differences and halves the result.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Axial coordinate of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HexCoord {
    pub q: i32,
    pub r: i32,
}

impl HexCoord {
    pub const ORIGIN: HexCoord = HexCoord { q: 0, r: 0 };

    pub fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Hex distance: `(|dq| + |dq + dr| + |dr|) / 2`.
    pub fn distance(self, other: HexCoord) -> u32 {
        let dq = i64::from(self.q) - i64::from(other.q);
        let dr = i64::from(self.r) - i64::from(other.r);
        ((dq.unsigned_abs() + (dq + dr).unsigned_abs() + dr.unsigned_abs()) / 2) as u32
    }

    /// Whether `self` lies within `radius` hex steps of `center` (inclusive).
    pub fn is_within(self, center: HexCoord, radius: u32) -> bool {
        self.distance(center) <= radius
    }

    /// Every coordinate at hex distance `<= radius`, center included.
    ///
    /// For each `dq` in `[-k, k]`, `dr` runs over
    /// `[max(-k, -dq - k), min(k, -dq + k)]`, which yields exactly
    /// [`neighborhood_size`]`(k)` coordinates with no duplicates.
    pub fn coords_in_radius(self, radius: u32) -> Vec<HexCoord> {
        let k = radius as i32;
        let mut coords = Vec::with_capacity(neighborhood_size(radius));
        for dq in -k..=k {
            let lo = (-k).max(-dq - k);
            let hi = k.min(-dq + k);
            for dr in lo..=hi {
                coords.push(HexCoord::new(self.q + dq, self.r + dr));
            }
        }
        coords
    }
}

impl fmt::Display for HexCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.q, self.r)
    }
}

/// Number of tiles in a radius-`k` neighborhood: `3k² + 3k + 1`.
pub fn neighborhood_size(radius: u32) -> usize {
    let k = radius as usize;
    3 * k * k + 3 * k + 1
}

/// Axis-aligned `(q, r)` bounding box around a hex neighborhood.
///
/// Stores use this to fetch candidate tiles with an indexed range query and
/// then filter by [`HexCoord::is_within`]; the box is a superset of the hexagon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexWindow {
    pub min_q: i32,
    pub max_q: i32,
    pub min_r: i32,
    pub max_r: i32,
}

impl HexWindow {
    pub fn around(center: HexCoord, radius: u32) -> Self {
        let k = radius as i32;
        Self {
            min_q: center.q.saturating_sub(k),
            max_q: center.q.saturating_add(k),
            min_r: center.r.saturating_sub(k),
            max_r: center.r.saturating_add(k),
        }
    }

    pub fn contains(&self, coord: HexCoord) -> bool {
        (self.min_q..=self.max_q).contains(&coord.q) && (self.min_r..=self.max_r).contains(&coord.r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn distance_matches_axial_formula() {
        let a = HexCoord::new(0, 0);
        assert_eq!(a.distance(HexCoord::new(1, 0)), 1);
        assert_eq!(a.distance(HexCoord::new(1, -1)), 1);
        assert_eq!(a.distance(HexCoord::new(2, -1)), 2);
        assert_eq!(a.distance(HexCoord::new(-3, 3)), 3);
        assert_eq!(a.distance(HexCoord::new(2, 2)), 4);
        assert_eq!(HexCoord::new(5, -2).distance(HexCoord::new(5, -2)), 0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = HexCoord::new(3, -7);
        let b = HexCoord::new(-2, 4);
        assert_eq!(a.distance(b), b.distance(a));
    }

    #[test]
    fn radius_enumeration_has_exact_size_and_bounds() {
        for k in 0..=6 {
            let center = HexCoord::new(4, -9);
            let coords = center.coords_in_radius(k);
            let distinct: HashSet<_> = coords.iter().copied().collect();

            assert_eq!(coords.len(), neighborhood_size(k), "radius {k}");
            assert_eq!(distinct.len(), coords.len(), "duplicates at radius {k}");
            assert!(distinct.contains(&center));
            assert!(coords.iter().all(|c| c.distance(center) <= k));
        }
    }

    #[test]
    fn radius_one_is_center_plus_six_neighbours() {
        let coords = HexCoord::ORIGIN.coords_in_radius(1);
        assert_eq!(coords.len(), 7);
        let ring: Vec<_> = coords
            .iter()
            .filter(|c| **c != HexCoord::ORIGIN)
            .collect();
        assert_eq!(ring.len(), 6);
        assert!(ring.iter().all(|c| c.distance(HexCoord::ORIGIN) == 1));
    }

    #[test]
    fn window_covers_every_coordinate_in_radius() {
        let center = HexCoord::new(-3, 2);
        let window = HexWindow::around(center, 3);
        assert!(center.coords_in_radius(3).iter().all(|c| window.contains(*c)));
        assert!(!window.contains(HexCoord::new(1, 2)));
    }
}
