//! Minimal spatial types for area and bounds checks.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// A point or offset in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Same value on every axis.
    pub fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Axis-aligned box described by its centre and half-size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub center: Vec3,
    pub half_extent: Vec3,
}

impl Aabb {
    pub fn new(center: Vec3, half_extent: Vec3) -> Self {
        Self { center, half_extent }
    }

    /// Returns a copy grown by `margin` on every side.
    pub fn grown(&self, margin: f32) -> Self {
        Self {
            center: self.center,
            half_extent: self.half_extent + Vec3::splat(margin),
        }
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: Vec3) -> bool {
        let d = point - self.center;
        d.x.abs() <= self.half_extent.x
            && d.y.abs() <= self.half_extent.y
            && d.z.abs() <= self.half_extent.z
    }
}
