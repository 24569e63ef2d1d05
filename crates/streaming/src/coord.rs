use foundation::bounds::LngLatBounds;
use foundation::math::projection::{lat_to_unit_y, lng_to_unit_x};
use serde::{Deserialize, Serialize};

/// Tile coordinate in ZXY scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at `z`.
    pub fn tiles_per_axis(z: u8) -> u64 {
        1u64 << z.min(31)
    }

    /// Geographic bounds of this tile.
    pub fn bounds(&self) -> LngLatBounds {
        let n = Self::tiles_per_axis(self.z) as f64;
        let west = (self.x as f64 / n) * 360.0 - 180.0;
        let east = ((self.x + 1) as f64 / n) * 360.0 - 180.0;
        let north = tile_y_to_lat(self.y as f64, n);
        let south = tile_y_to_lat((self.y + 1) as f64, n);
        LngLatBounds::new(west, south, east, north)
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

fn tile_y_to_lat(y: f64, n: f64) -> f64 {
    let m = std::f64::consts::PI - 2.0 * std::f64::consts::PI * y / n;
    m.sinh().atan().to_degrees()
}

/// Tiles intersecting `bounds` at zoom `z`, sorted by `(x, y)`.
///
/// Unwrapped longitudes are folded back into the tile grid; a view wider
/// than the world yields every column once.
pub fn tiles_covering(bounds: &LngLatBounds, z: u8) -> Vec<TileCoord> {
    if !(bounds.west.is_finite()
        && bounds.east.is_finite()
        && bounds.south.is_finite()
        && bounds.north.is_finite())
    {
        return Vec::new();
    }
    let n = TileCoord::tiles_per_axis(z) as i64;
    let max = n - 1;
    let east = if bounds.spans_antimeridian() {
        bounds.east + 360.0
    } else {
        bounds.east
    };

    let x0 = (lng_to_unit_x(bounds.west) * n as f64).floor() as i64;
    let x1 = (lng_to_unit_x(east) * n as f64).floor() as i64;
    let y0 = ((lat_to_unit_y(bounds.north) * n as f64).floor() as i64).clamp(0, max);
    let y1 = ((lat_to_unit_y(bounds.south) * n as f64).floor() as i64).clamp(0, max);

    let columns: Vec<i64> = if x1 - x0 + 1 >= n {
        (0..n).collect()
    } else {
        let mut cols: Vec<i64> = (x0..=x1).map(|x| x.rem_euclid(n)).collect();
        cols.sort_unstable();
        cols.dedup();
        cols
    };

    let mut out = Vec::with_capacity(columns.len() * (y1 - y0 + 1).max(0) as usize);
    for x in columns {
        for y in y0..=y1 {
            out.push(TileCoord::new(z, x as u32, y as u32));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{TileCoord, tiles_covering};
    use foundation::bounds::LngLatBounds;

    #[test]
    fn zoom_zero_is_one_tile() {
        let tiles = tiles_covering(&LngLatBounds::world(), 0);
        assert_eq!(tiles, vec![TileCoord::new(0, 0, 0)]);
    }

    #[test]
    fn tile_bounds_cover_quadrant() {
        let b = TileCoord::new(1, 0, 0).bounds();
        assert_eq!(b.west, -180.0);
        assert_eq!(b.east, 0.0);
        assert!(b.south.abs() < 1e-9);
        assert!(b.north > 85.0);
    }

    #[test]
    fn covering_a_city_view_is_small() {
        let b = LngLatBounds::new(-75.6, 39.7, -75.5, 39.8);
        let tiles = tiles_covering(&b, 12);
        assert!(!tiles.is_empty() && tiles.len() <= 4);
        assert!(tiles.iter().all(|t| t.z == 12));
    }

    #[test]
    fn antimeridian_views_wrap_columns() {
        let b = LngLatBounds::new(179.0, -1.0, 181.0, 1.0);
        let xs: Vec<u32> = tiles_covering(&b, 2).iter().map(|t| t.x).collect();
        assert!(xs.contains(&0));
        assert!(xs.contains(&3));
    }
}
