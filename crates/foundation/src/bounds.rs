use serde::{Deserialize, Serialize};

/// Geographic position in WGS84 degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        LngLat { lng, lat }
    }

    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }

    /// Finite and inside the WGS84 domain.
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.lat.abs() <= 90.0 && self.lng.abs() <= 180.0
    }
}

/// Axis-aligned geographic bounding box.
///
/// `west > east` means the box crosses the antimeridian.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl LngLatBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        LngLatBounds {
            west,
            south,
            east,
            north,
        }
    }

    pub fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    pub fn spans_antimeridian(&self) -> bool {
        self.west > self.east
    }

    pub fn contains(&self, p: LngLat) -> bool {
        if p.lat < self.south || p.lat > self.north {
            return false;
        }
        if self.spans_antimeridian() {
            p.lng >= self.west || p.lng <= self.east
        } else {
            p.lng >= self.west && p.lng <= self.east
        }
    }

    /// Overlap test for boxes that do not cross the antimeridian.
    pub fn intersects(&self, other: &LngLatBounds) -> bool {
        self.west <= other.east
            && self.east >= other.west
            && self.south <= other.north
            && self.north >= other.south
    }

    pub fn center(&self) -> LngLat {
        let lat = (self.south + self.north) * 0.5;
        if self.spans_antimeridian() {
            let span = self.east + 360.0 - self.west;
            let mut lng = self.west + span * 0.5;
            if lng > 180.0 {
                lng -= 360.0;
            }
            LngLat::new(lng, lat)
        } else {
            LngLat::new((self.west + self.east) * 0.5, lat)
        }
    }

    /// `west,south,east,north`, the form used by bbox query parameters.
    pub fn to_bbox_param(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

#[cfg(test)]
mod tests {
    use super::{LngLat, LngLatBounds};

    #[test]
    fn contains_handles_antimeridian() {
        let b = LngLatBounds::new(170.0, -10.0, -170.0, 10.0);
        assert!(b.spans_antimeridian());
        assert!(b.contains(LngLat::new(175.0, 0.0)));
        assert!(b.contains(LngLat::new(-175.0, 0.0)));
        assert!(!b.contains(LngLat::new(0.0, 0.0)));
    }

    #[test]
    fn bbox_param_is_west_south_east_north() {
        let b = LngLatBounds::new(-75.6, 39.7, -75.5, 39.8);
        assert_eq!(b.to_bbox_param(), "-75.6,39.7,-75.5,39.8");
    }

    #[test]
    fn center_of_wrapped_box() {
        let b = LngLatBounds::new(170.0, 0.0, -170.0, 10.0);
        let c = b.center();
        assert!((c.lng - 180.0).abs() < 1e-9 || (c.lng + 180.0).abs() < 1e-9);
        assert!((c.lat - 5.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_positions_are_rejected() {
        assert!(!LngLat::new(f64::NAN, 0.0).is_valid());
        assert!(!LngLat::new(0.0, 91.0).is_valid());
        assert!(LngLat::new(-75.54, 39.74).is_valid());
    }
}
