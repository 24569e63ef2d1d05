use serde::{Deserialize, Serialize};

use crate::coord::TileCoord;

const MAPBOX_API: &str = "https://api.mapbox.com";

const MAPBOX_ATTRIBUTION: &str = "© OpenStreetMap contributors • © Mapbox";
const OSM_ATTRIBUTION: &str = "© OpenStreetMap contributors";

/// URL template and grid parameters of a raster tile source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileTemplate {
    /// URL with `{s}`, `{z}`, `{x}`, `{y}` and `{r}` placeholders.
    pub url_template: String,
    pub tile_size: u32,
    /// Added to the view zoom to get the tile zoom.
    pub zoom_offset: i8,
    pub max_zoom: u8,
    pub subdomains: Vec<String>,
    pub attribution: String,
    /// Request `@2x` tiles.
    pub retina: bool,
}

impl TileTemplate {
    /// Mapbox styled raster tiles for `style`.
    pub fn mapbox(style: &str, token: &str) -> Self {
        Self {
            url_template: format!(
                "{MAPBOX_API}/{}/tiles/512/{{z}}/{{x}}/{{y}}{{r}}?access_token={token}",
                normalize_style_path(style)
            ),
            tile_size: 512,
            zoom_offset: -1,
            max_zoom: 22,
            subdomains: Vec::new(),
            attribution: MAPBOX_ATTRIBUTION.to_string(),
            retina: false,
        }
    }

    /// Public OpenStreetMap tiles.
    pub fn osm() -> Self {
        Self {
            url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            tile_size: 256,
            zoom_offset: 0,
            max_zoom: 19,
            subdomains: ["a", "b", "c"].iter().map(|s| s.to_string()).collect(),
            attribution: OSM_ATTRIBUTION.to_string(),
            retina: false,
        }
    }

    pub fn with_retina(mut self, retina: bool) -> Self {
        self.retina = retina;
        self
    }

    /// Tile zoom used for a view at `view_zoom`.
    pub fn tile_zoom(&self, view_zoom: f64) -> u8 {
        let z = view_zoom.round() as i64 + i64::from(self.zoom_offset);
        z.clamp(0, i64::from(self.max_zoom)) as u8
    }

    pub fn url_for(&self, coord: TileCoord) -> String {
        let subdomain = if self.subdomains.is_empty() {
            ""
        } else {
            let i = (coord.x as usize + coord.y as usize) % self.subdomains.len();
            self.subdomains[i].as_str()
        };
        self.url_template
            .replace("{s}", subdomain)
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
            .replace("{r}", if self.retina { "@2x" } else { "" })
    }
}

/// `styles/v1/<owner>/<id>` for a bare `<owner>/<id>` style id.
pub fn normalize_style_path(style: &str) -> String {
    if style.starts_with("styles/v1/") {
        style.to_string()
    } else {
        format!("styles/v1/{style}")
    }
}

/// Style document URL of a Mapbox style.
pub fn mapbox_style_url(style: &str, token: &str) -> String {
    format!(
        "{MAPBOX_API}/{}?access_token={token}",
        normalize_style_path(style)
    )
}
