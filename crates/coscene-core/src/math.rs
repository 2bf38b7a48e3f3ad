//! Minimal vector and quaternion types for scene transforms
//!
//! Both serialize as plain arrays (`[x, y, z]` and `[x, y, z, w]`) which is
//! the shape the wire format uses.

use serde::{Deserialize, Serialize};

/// A 3D vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Vec3> for [f32; 3] {
    fn from(v: Vec3) -> Self {
        v.to_array()
    }
}

/// A rotation quaternion, stored as `(x, y, z, w)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Largest per-component difference between two quaternions.
    ///
    /// `q` and `-q` encode the same rotation, so the smaller of the two
    /// comparisons is returned.
    pub fn max_component_delta(&self, other: &Quat) -> f32 {
        let direct = (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
            .max((self.w - other.w).abs());
        let flipped = (self.x + other.x)
            .abs()
            .max((self.y + other.y).abs())
            .max((self.z + other.z).abs())
            .max((self.w + other.w).abs());
        direct.min(flipped)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<[f32; 4]> for Quat {
    fn from([x, y, z, w]: [f32; 4]) -> Self {
        Self { x, y, z, w }
    }
}

impl From<Quat> for [f32; 4] {
    fn from(q: Quat) -> Self {
        q.to_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 0.0);
        assert!((a.distance(&b) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_vec3_serializes_as_array() {
        let v = Vec3::new(1.0, 2.0, -1.0);
        assert_eq!(serde_json::to_string(&v).unwrap(), "[1.0,2.0,-1.0]");
        let back: Vec3 = serde_json::from_str("[1.0,2.0,-1.0]").unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_quat_sign_flip_is_same_rotation() {
        let q = Quat::new(0.0, 0.7071, 0.0, 0.7071);
        let neg = Quat::new(0.0, -0.7071, 0.0, -0.7071);
        assert!(q.max_component_delta(&neg) < 1e-6);
    }

    #[test]
    fn test_quat_default_is_identity() {
        assert_eq!(Quat::default(), Quat::IDENTITY);
    }
}
