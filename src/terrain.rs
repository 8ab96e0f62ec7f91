//! Height-field terrain model.
//!
//! The arena floor is a bounded grid where each cell stores a solid terrain
//! height and, optionally, the height of a one-unit-thick elevated platform.
//! All spatial queries are fail-closed: coordinates outside the grid are
//! treated as solid and heights resolve to a sentinel, so probe-based
//! algorithms degrade to "unknown space is blocked" instead of reading out
//! of bounds.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Height returned for out-of-range cells, signaling "no physical landing
/// possible here" to callers.
pub const OUT_OF_RANGE_HEIGHT: i32 = 666;

/// Bounded grid of solid-terrain heights plus a parallel grid of elevated
/// platform heights. `platform[i] > 0` denotes a one-unit-thick band whose
/// underside is at `platform[i] - 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightField {
    pub size_x: usize,
    pub size_z: usize,
    /// Solid terrain heights (row-major, `z * size_x + x`).
    solid: Vec<i32>,
    /// Elevated platform heights; 0 means no platform.
    platform: Vec<i32>,
}

impl HeightField {
    /// Create a flat field of the given extents.
    pub fn new(size_x: usize, size_z: usize) -> Self {
        Self {
            size_x,
            size_z,
            solid: vec![0; size_x * size_z],
            platform: vec![0; size_x * size_z],
        }
    }

    fn cell_index(&self, x: f32, z: f32) -> Option<usize> {
        let gx = x.floor() as i64;
        let gz = z.floor() as i64;
        if gx < 0 || gz < 0 || gx >= self.size_x as i64 || gz >= self.size_z as i64 {
            None
        } else {
            Some(gz as usize * self.size_x + gx as usize)
        }
    }

    /// Set a cell's solid height by grid coordinates.
    pub fn set_solid(&mut self, gx: usize, gz: usize, height: i32) {
        if gx < self.size_x && gz < self.size_z {
            self.solid[gz * self.size_x + gx] = height;
        }
    }

    /// Set a cell's platform height by grid coordinates.
    pub fn set_platform(&mut self, gx: usize, gz: usize, height: i32) {
        if gx < self.size_x && gz < self.size_z {
            self.platform[gz * self.size_x + gx] = height;
        }
    }

    /// True if the point is inside solid terrain: below the cell's solid
    /// height, or within the one-unit band under a nonzero platform height.
    /// Out-of-range points are always solid.
    pub fn is_solid_at(&self, x: f32, y: f32, z: f32) -> bool {
        let Some(idx) = self.cell_index(x, z) else {
            return true;
        };
        if y < self.solid[idx] as f32 {
            return true;
        }
        let p = self.platform[idx];
        p > 0 && y >= (p - 1) as f32 && y < p as f32
    }

    /// True if the point is NOT above the solid height. Used to tell
    /// "about to land" from "still falling".
    pub fn is_fall_through(&self, x: f32, y: f32, z: f32) -> bool {
        let Some(idx) = self.cell_index(x, z) else {
            return true;
        };
        y <= self.solid[idx] as f32
    }

    /// Platform-only landing test: true if `y + offset_y` reaches into a
    /// platform band at this cell. Out-of-range points have no platform.
    pub fn is_on_platform(&self, x: f32, y: f32, z: f32, offset_y: f32) -> bool {
        let Some(idx) = self.cell_index(x, z) else {
            return false;
        };
        let p = self.platform[idx];
        p > 0 && y + offset_y >= (p - 1) as f32 && y <= p as f32
    }

    /// Solid height at a cell, or [`OUT_OF_RANGE_HEIGHT`] outside the grid.
    pub fn height(&self, x: f32, z: f32) -> i32 {
        match self.cell_index(x, z) {
            Some(idx) => self.solid[idx],
            None => OUT_OF_RANGE_HEIGHT,
        }
    }

    /// Platform height at a cell, or [`OUT_OF_RANGE_HEIGHT`] outside the grid.
    pub fn platform_height(&self, x: f32, z: f32) -> i32 {
        match self.cell_index(x, z) {
            Some(idx) => self.platform[idx],
            None => OUT_OF_RANGE_HEIGHT,
        }
    }

    /// Whether a ground point lies inside the playable rectangle.
    pub fn in_bounds(&self, x: f32, z: f32) -> bool {
        x >= 0.0 && z >= 0.0 && x < self.size_x as f32 && z < self.size_z as f32
    }

    /// Height of the surface a grounded unit at `(x, y, z)` should rest on:
    /// the platform top when the unit is up on a platform band, otherwise
    /// the solid terrain height.
    pub fn surface_height(&self, x: f32, y: f32, z: f32) -> f32 {
        if self.is_on_platform(x, y, z, 0.5) {
            self.platform_height(x, z) as f32
        } else {
            self.height(x, z) as f32
        }
    }
}

/// Resource wrapper sharing the height field between the arena facade (which
/// swaps it on level load) and the collision directory / resolver passes.
#[derive(Resource, Clone)]
pub struct TerrainHandle(pub Arc<RwLock<HeightField>>);

impl TerrainHandle {
    pub fn new(field: HeightField) -> Self {
        Self(Arc::new(RwLock::new(field)))
    }

    /// Replace the whole field (level load).
    pub fn replace(&self, field: HeightField) {
        if let Ok(mut guard) = self.0.write() {
            *guard = field;
        }
    }

    /// Read-only access; a poisoned lock resolves to the fail-closed default.
    pub fn is_solid_at(&self, x: f32, y: f32, z: f32) -> bool {
        self.0.read().map(|f| f.is_solid_at(x, y, z)).unwrap_or(true)
    }

    pub fn is_fall_through(&self, x: f32, y: f32, z: f32) -> bool {
        self.0
            .read()
            .map(|f| f.is_fall_through(x, y, z))
            .unwrap_or(true)
    }

    pub fn is_on_platform(&self, x: f32, y: f32, z: f32, offset_y: f32) -> bool {
        self.0
            .read()
            .map(|f| f.is_on_platform(x, y, z, offset_y))
            .unwrap_or(false)
    }

    pub fn height(&self, x: f32, z: f32) -> i32 {
        self.0
            .read()
            .map(|f| f.height(x, z))
            .unwrap_or(OUT_OF_RANGE_HEIGHT)
    }

    pub fn platform_height(&self, x: f32, z: f32) -> i32 {
        self.0
            .read()
            .map(|f| f.platform_height(x, z))
            .unwrap_or(OUT_OF_RANGE_HEIGHT)
    }

    pub fn in_bounds(&self, x: f32, z: f32) -> bool {
        self.0.read().map(|f| f.in_bounds(x, z)).unwrap_or(false)
    }

    pub fn surface_height(&self, x: f32, y: f32, z: f32) -> f32 {
        self.0
            .read()
            .map(|f| f.surface_height(x, y, z))
            .unwrap_or(OUT_OF_RANGE_HEIGHT as f32)
    }
}

impl Default for TerrainHandle {
    fn default() -> Self {
        Self::new(HeightField::new(128, 128))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_is_always_solid() {
        let field = HeightField::new(16, 16);
        assert!(field.is_solid_at(-0.5, 0.0, 4.0));
        assert!(field.is_solid_at(4.0, 0.0, -0.5));
        assert!(field.is_solid_at(16.0, 0.0, 4.0));
        assert!(field.is_solid_at(4.0, 0.0, 16.0));
        assert!(field.is_solid_at(1000.0, 50.0, 1000.0));
    }

    #[test]
    fn test_solid_below_height() {
        let mut field = HeightField::new(16, 16);
        field.set_solid(3, 3, 4);
        assert!(field.is_solid_at(3.5, 0.0, 3.5));
        assert!(field.is_solid_at(3.5, 3.9, 3.5));
        assert!(!field.is_solid_at(3.5, 4.0, 3.5));
        assert!(!field.is_solid_at(3.5, 10.0, 3.5));
    }

    #[test]
    fn test_platform_underside_band() {
        let mut field = HeightField::new(16, 16);
        field.set_platform(5, 5, 3);
        // Band is [2, 3): standing on or inside the platform's underside.
        assert!(!field.is_solid_at(5.5, 1.9, 5.5));
        assert!(field.is_solid_at(5.5, 2.0, 5.5));
        assert!(field.is_solid_at(5.5, 2.9, 5.5));
        assert!(!field.is_solid_at(5.5, 3.0, 5.5));
    }

    #[test]
    fn test_height_sentinel_out_of_range() {
        let field = HeightField::new(16, 16);
        assert_eq!(field.height(-1.0, 4.0), OUT_OF_RANGE_HEIGHT);
        assert_eq!(field.platform_height(4.0, 99.0), OUT_OF_RANGE_HEIGHT);
        assert_eq!(field.height(4.0, 4.0), 0);
    }

    #[test]
    fn test_fall_through() {
        let mut field = HeightField::new(16, 16);
        field.set_solid(2, 2, 3);
        assert!(field.is_fall_through(2.5, 3.0, 2.5));
        assert!(field.is_fall_through(2.5, 1.0, 2.5));
        assert!(!field.is_fall_through(2.5, 3.1, 2.5));
    }

    #[test]
    fn test_handle_shares_mutations() {
        let handle = TerrainHandle::new(HeightField::new(8, 8));
        let clone = handle.clone();
        {
            let mut field = HeightField::new(8, 8);
            field.set_solid(1, 1, 5);
            handle.replace(field);
        }
        assert_eq!(clone.height(1.5, 1.5), 5);
    }
}
