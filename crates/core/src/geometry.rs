//! Project-coordinate geometry: points, bounding boxes and block sizes

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A point in project coordinates (easting, northing, elevation).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean distance to another point
    #[inline]
    pub fn dist_sq(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Euclidean distance to another point
    #[inline]
    pub fn dist(&self, other: &Point3) -> f64 {
        self.dist_sq(other).sqrt()
    }

    /// Coordinate along axis 0 (x), 1 (y) or 2 (z).
    #[inline]
    pub fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

/// Axis-aligned bounding box of a block model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl BoundingBox {
    pub fn new(min: Point3, max: Point3) -> Self {
        Self {
            x_min: min.x,
            x_max: max.x,
            y_min: min.y,
            y_max: max.y,
            z_min: min.z,
            z_max: max.z,
        }
    }

    pub fn min(&self) -> Point3 {
        Point3::new(self.x_min, self.y_min, self.z_min)
    }

    pub fn max(&self) -> Point3 {
        Point3::new(self.x_max, self.y_max, self.z_max)
    }

    /// Extent along each axis (max - min).
    pub fn extent(&self) -> [f64; 3] {
        [
            self.x_max - self.x_min,
            self.y_max - self.y_min,
            self.z_max - self.z_min,
        ]
    }

    /// Reject non-finite coordinates and empty or inverted axes.
    pub fn validate(&self) -> Result<()> {
        let axes = [
            ("x", self.x_min, self.x_max),
            ("y", self.y_min, self.y_max),
            ("z", self.z_min, self.z_max),
        ];
        for (axis, lo, hi) in axes {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(Error::InvalidParameter {
                    name: "bbox",
                    value: format!("{axis}: [{lo}, {hi}]"),
                    reason: "coordinates must be finite".into(),
                });
            }
            if hi <= lo {
                return Err(Error::InvalidParameter {
                    name: "bbox",
                    value: format!("{axis}: [{lo}, {hi}]"),
                    reason: "max must be greater than min".into(),
                });
            }
        }
        Ok(())
    }
}

/// Block dimensions along x, y and z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockSize {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BlockSize {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Volume of a single block.
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("block_size_x", self.x), ("block_size_y", self.y), ("block_size_z", self.z)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(Error::InvalidParameter {
                    name,
                    value: v.to_string(),
                    reason: "block size must be positive".into(),
                });
            }
        }
        Ok(())
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self::new(10.0, 10.0, 5.0)
    }
}
