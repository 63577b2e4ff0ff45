//! Minimal 3D value types shared by the client model and the host document.

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Coordinates are compared with this tolerance (host model units).
pub const TOLERANCE: f64 = 1e-6;

/// A point in model space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A direction or displacement in model space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const ORIGIN: Point3 = Point3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Point3) -> f64 {
        (*other - *self).length()
    }

    /// Equal within [`TOLERANCE`] on every axis.
    pub fn almost_eq(&self, other: &Point3) -> bool {
        (self.x - other.x).abs() <= TOLERANCE
            && (self.y - other.y).abs() <= TOLERANCE
            && (self.z - other.z).abs() <= TOLERANCE
    }

    pub fn offset_z(&self, dz: f64) -> Point3 {
        Point3::new(self.x, self.y, self.z + dz)
    }
}

impl Vector3 {
    pub const BASIS_Z: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 1.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn cross(&self, other: &Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// True when the vector lies in the XY plane.
    pub fn is_horizontal(&self) -> bool {
        self.z.abs() <= TOLERANCE
    }

    /// Rotation about +Z that takes +X onto this vector's XY projection.
    pub fn plan_angle(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

impl Sub for Point3 {
    type Output = Vector3;

    fn sub(self, rhs: Point3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Add<Vector3> for Point3 {
    type Output = Point3;

    fn add(self, rhs: Vector3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3,
    pub max: Point3,
}

impl BoundingBox {
    /// Smallest box enclosing every point, or `None` for an empty slice.
    pub fn from_points(points: &[Point3]) -> Option<BoundingBox> {
        let first = points.first()?;
        let mut bbox = BoundingBox {
            min: *first,
            max: *first,
        };
        for p in &points[1..] {
            bbox.min.x = bbox.min.x.min(p.x);
            bbox.min.y = bbox.min.y.min(p.y);
            bbox.min.z = bbox.min.z.min(p.z);
            bbox.max.x = bbox.max.x.max(p.x);
            bbox.max.y = bbox.max.y.max(p.y);
            bbox.max.z = bbox.max.z.max(p.z);
        }
        Some(bbox)
    }

    /// Grow the box by `xy` horizontally and by `below`/`above` vertically.
    pub fn expand(&self, xy: f64, below: f64, above: f64) -> BoundingBox {
        BoundingBox {
            min: Point3::new(self.min.x - xy, self.min.y - xy, self.min.z - below),
            max: Point3::new(self.max.x + xy, self.max.y + xy, self.max.z + above),
        }
    }

    /// Closed-interval overlap on all three axes.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains(&self, p: &Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}
