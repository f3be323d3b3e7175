//! Axis-Aligned Bounding Box used for spatial indexing and contact tests

use crate::foundation::math::{Mat4, Point3, Vec3};

/// Tolerance below which two regions are considered touching when merging
/// awake regions
pub const MERGE_EPSILON: f32 = 1e-6;

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Get the full size of the AABB
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Whether the box has (near) zero volume
    pub fn is_empty(&self, epsilon: f32) -> bool {
        let size = self.size();
        size.x <= epsilon || size.y <= epsilon || size.z <= epsilon
    }

    /// Check if this AABB intersects another, with tolerance
    ///
    /// A positive epsilon makes boxes that are close but not touching count
    /// as intersecting.
    pub fn intersects_epsilon(&self, other: &Self, epsilon: f32) -> bool {
        self.min.x <= other.max.x + epsilon
            && self.max.x >= other.min.x - epsilon
            && self.min.y <= other.max.y + epsilon
            && self.max.y >= other.min.y - epsilon
            && self.min.z <= other.max.z + epsilon
            && self.max.z >= other.min.z - epsilon
    }

    /// Check overlap along a single axis (0 = x, 1 = y, 2 = z), with tolerance
    pub fn overlaps_on_axis(&self, other: &Self, axis: usize, epsilon: f32) -> bool {
        self.min[axis] <= other.max[axis] + epsilon && self.max[axis] >= other.min[axis] - epsilon
    }

    /// Grow this box in place to also enclose `other`
    pub fn merge(&mut self, other: &Self) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Union of two boxes
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = *self;
        result.merge(other);
        result
    }

    /// Enlargement of surface needed to also enclose `other`
    ///
    /// Measured as the growth in half-perimeter, used to pick an insertion
    /// subtree.
    pub fn enlargement(&self, other: &Self) -> f32 {
        let merged = self.merged(other);
        let a = merged.size();
        let b = self.size();
        (a.x + a.y + a.z) - (b.x + b.y + b.z)
    }

    /// Box expanded by a uniform margin on all faces
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec3::new(margin, margin, margin),
            max: self.max + Vec3::new(margin, margin, margin),
        }
    }

    /// Box translated by an offset
    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// World-space AABB of this box under a transformation matrix
    ///
    /// Transforms the 8 corners and takes their bounds.
    pub fn transformed(&self, m: &Mat4) -> Self {
        let mut min = Vec3::new(f32::MAX, f32::MAX, f32::MAX);
        let mut max = Vec3::new(f32::MIN, f32::MIN, f32::MIN);
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 4 != 0 { self.max.z } else { self.min.z },
            );
            let p = m.transform_point(&corner);
            min = min.inf(&p.coords);
            max = max.sup(&p.coords);
        }
        Self { min, max }
    }

    /// Index of the longest axis (0 = x, 1 = y, 2 = z)
    pub fn longest_axis(&self) -> usize {
        let size = self.size();
        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }
}
