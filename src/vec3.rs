//! Vec3: Vector in 3D space

use cast::f32;
use core::ops::{Add, Mul};

/// Vector in 3D space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vec3<T> {
    /// X component
    pub x: T,
    /// Y component
    pub y: T,
    /// Z component
    pub z: T,
}

impl<T: Default> Default for Vec3<T> {
    fn default() -> Self {
        Vec3 { x: T::default(),
               y: T::default(),
               z: T::default(), }
    }
}

impl<T> Add for Vec3<T> where T: Add<T, Output = T>
{
    type Output = Vec3<T>;

    fn add(self, rhs: Vec3<T>) -> Vec3<T> {
        Vec3 { x: self.x + rhs.x,
               y: self.y + rhs.y,
               z: self.z + rhs.z, }
    }
}

/// Scale
pub trait Scale<RHS = Self> {
    /// Scale vector
    fn scale(self, rhs: RHS) -> Self;
}

impl<T> Scale for Vec3<T> where T: Mul<T, Output = T>
{
    fn scale(self, rhs: Vec3<T>) -> Vec3<T> {
        Vec3 { x: self.x * rhs.x,
               y: self.y * rhs.y,
               z: self.z * rhs.z, }
    }
}

impl<T> Scale<T> for Vec3<T> where T: Mul<T, Output = T> + Copy
{
    fn scale(self, rhs: T) -> Vec3<T> {
        Vec3 { x: self.x * rhs,
               y: self.y * rhs,
               z: self.z * rhs, }
    }
}

impl Vec3<i16> {
    /// Converts Vec<i16> to Vec<f32>
    pub fn f32(self) -> Vec3<f32> {
        Vec3 { x: f32(self.x),
               y: f32(self.y),
               z: f32(self.z), }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_scale() {
        let v = Vec3 { x: 1i16, y: -2, z: 3 };
        let scaled = v.f32().scale(0.5);
        assert_eq!(scaled, Vec3 { x: 0.5, y: -1.0, z: 1.5 });
    }

    #[test]
    fn add_componentwise() {
        let a = Vec3 { x: 1, y: 2, z: 3 };
        let b = Vec3 { x: 10, y: 20, z: 30 };
        assert_eq!(a + b, Vec3 { x: 11, y: 22, z: 33 });
    }
}
