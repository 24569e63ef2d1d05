//! `bizmap`: headless host for the map stack.
//!
//! Environment:
//! - `BIZMAP_API_BASE`: entity API base URL (default `http://localhost:8000`)
//! - `MAPBOX_TOKEN`: enables the vector map and Mapbox geocoding
//! - `NOMINATIM_EMAIL`: contact address sent to Nominatim
//! - `BIZMAP_STYLE`: default map style (catalog name or `owner/name`)
//! - `BIZMAP_PREFS`: preferences file (default `bizmap-prefs.json`)
//! - `BIZMAP_WIDTH` / `BIZMAP_HEIGHT`: simulated view size in pixels

use std::env;
use std::time::Duration;

use catalog::{
    DEFAULT_LIMIT, EntityQuery, EntitySource, HttpEntityConfig, HttpEntitySource,
    JsonFilePreferencesStore, PreferencesStore, RADIUS_CHOICES_MILES, filter_by_text,
    load_entities, nearby,
};
use clap::{Parser, Subcommand};
use cluster::{ClusterOptions, IndexedPoint, SpatialIndex};
use foundation::bounds::{LngLat, LngLatBounds};
use foundation::ids::EntityId;
use foundation::math::geodesy::miles_to_km;
use geocode::{GeocoderConfig, SearchConfig, SearchService, default_provider};
use render::{BackendKind, STYLE_CATALOG, StyleId};
use session::{DEFAULT_CENTER, MapSessionController, SessionConfig, TileBackendFactory};
use streaming::{HttpLoaderConfig, HttpTileLoader, ScriptedTileLoader, TileFailure, TileLoader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Business map: clustering, geocoding and map sessions")]
struct Args {
    /// Entity API base URL (overrides BIZMAP_API_BASE)
    #[arg(long)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch entities and print the clustered features for a view
    Clusters {
        /// Bounding box: west,south,east,north
        #[arg(long)]
        bbox: Option<String>,

        #[arg(long, default_value_t = 12)]
        zoom: u8,

        /// Search radius in miles around the bbox center; 0 uses the bbox
        #[arg(long)]
        radius: Option<f64>,

        /// Text filter on name, description and address
        #[arg(long)]
        what: Option<String>,
    },

    /// List entities nearest to a point
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long, default_value_t = 10)]
        count: usize,
    },

    /// Address suggestions for a query
    Search { query: String },

    /// Label for a dropped pin
    Reverse {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },

    /// Run a simulated map view against live tile servers
    Session {
        /// How long to run the view
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,

        /// Entity to fly to once loaded
        #[arg(long)]
        focus: Option<i64>,

        /// Style name or id; saved to the preferences file
        #[arg(long)]
        style: Option<String>,

        /// Search radius in miles; saved to the preferences file
        #[arg(long)]
        radius: Option<f64>,
    },

    /// List the style catalog
    Styles,
}

fn main() {
    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<(), String> {
    let api = HttpEntityConfig {
        base_url: args
            .api_base
            .or_else(|| env_var_string("BIZMAP_API_BASE"))
            .unwrap_or_else(|| HttpEntityConfig::default().base_url),
        ..HttpEntityConfig::default()
    };
    match args.command {
        Command::Clusters {
            bbox,
            zoom,
            radius,
            what,
        } => cmd_clusters(api, bbox, zoom, radius, what).await,
        Command::Nearby { lat, lng, count } => cmd_nearby(api, LngLat::new(lng, lat), count).await,
        Command::Search { query } => cmd_search(&query).await,
        Command::Reverse { lat, lng } => cmd_reverse(LngLat::new(lng, lat)).await,
        Command::Session {
            seconds,
            focus,
            style,
            radius,
        } => cmd_session(api, seconds, focus.map(EntityId), style, radius).await,
        Command::Styles => {
            for (name, id) in STYLE_CATALOG {
                println!("{name:<20} {id}");
            }
            Ok(())
        }
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_var_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_bbox(raw: &str) -> Result<LngLatBounds, String> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid bbox {raw:?}: {e}"))?;
    match parts.as_slice() {
        [w, s, e, n] => Ok(LngLatBounds::new(*w, *s, *e, *n)),
        _ => Err(format!("bbox needs four numbers, got {raw:?}")),
    }
}

fn geocoder_config() -> GeocoderConfig {
    GeocoderConfig {
        mapbox_token: env_var_string("MAPBOX_TOKEN"),
        nominatim_email: env_var_string("NOMINATIM_EMAIL"),
        ..GeocoderConfig::default()
    }
}

fn prefs_store() -> JsonFilePreferencesStore {
    JsonFilePreferencesStore::new(
        env_var_string("BIZMAP_PREFS").unwrap_or_else(|| "bizmap-prefs.json".to_string()),
    )
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

async fn cmd_clusters(
    api: HttpEntityConfig,
    bbox: Option<String>,
    zoom: u8,
    radius: Option<f64>,
    what: Option<String>,
) -> Result<(), String> {
    let prefs = prefs_store().load().map_err(|e| e.to_string())?;
    let bbox = match bbox {
        Some(raw) => parse_bbox(&raw)?,
        None => LngLatBounds::new(
            DEFAULT_CENTER.lng - 0.2,
            DEFAULT_CENTER.lat - 0.15,
            DEFAULT_CENTER.lng + 0.2,
            DEFAULT_CENTER.lat + 0.15,
        ),
    };
    let radius = radius.unwrap_or(prefs.radius_miles);
    let what = what.unwrap_or(prefs.what);
    let query = if radius > 0.0 {
        EntityQuery::Near {
            center: bbox.center(),
            radius_km: miles_to_km(radius),
            limit: DEFAULT_LIMIT,
        }
    } else {
        EntityQuery::Bounds {
            bbox,
            limit: DEFAULT_LIMIT,
        }
    };

    let source = HttpEntitySource::new(api);
    let batch = load_entities(&source, query)
        .await
        .map_err(|e| format!("failed to load businesses: {e}"))?;
    if batch.is_fallback() {
        warn!("showing unfiltered businesses");
    }
    let points: Vec<IndexedPoint> = filter_by_text(&batch.entities, &what)
        .into_iter()
        .filter_map(|e| {
            let p = e.coordinates()?;
            Some(IndexedPoint::new(e.id, p.lng, p.lat))
        })
        .collect();
    let index = SpatialIndex::with_options(points, ClusterOptions::default());
    let features = index.query(&bbox, zoom);
    info!(points = index.len(), features = features.len(), "clustered");
    println!("{}", to_json(&features)?);
    Ok(())
}

async fn cmd_nearby(api: HttpEntityConfig, center: LngLat, count: usize) -> Result<(), String> {
    let source = HttpEntitySource::new(api);
    let query = EntityQuery::Near {
        center,
        radius_km: miles_to_km(RADIUS_CHOICES_MILES[RADIUS_CHOICES_MILES.len() - 1]),
        limit: DEFAULT_LIMIT,
    };
    let entities = source
        .fetch(query)
        .await
        .map_err(|e| format!("failed to load businesses: {e}"))?;
    for n in nearby(center, &entities).into_iter().take(count) {
        println!(
            "{:>8.2} mi  {:<6} {}",
            n.miles,
            n.entity.id,
            n.entity.display_name()
        );
    }
    Ok(())
}

async fn cmd_search(query: &str) -> Result<(), String> {
    let provider = default_provider(&geocoder_config());
    let config = SearchConfig::default();
    let wait = config.debounce + Duration::from_secs(10);
    let search = SearchService::current(provider, config).map_err(|e| e.to_string())?;
    let mut updates = search.subscribe();
    search.set_query(query);

    let settled = tokio::time::timeout(wait, async {
        loop {
            if updates.changed().await.is_err() {
                break;
            }
            let state = updates.borrow_and_update().clone();
            if !state.fetching && (state.error.is_some() || state.open) {
                break;
            }
        }
    })
    .await;
    if settled.is_err() {
        warn!("search timed out");
    }
    let state = search.state();
    if let Some(err) = state.error {
        return Err(err.to_string());
    }
    println!("{}", to_json(&state.suggestions)?);
    Ok(())
}

async fn cmd_reverse(point: LngLat) -> Result<(), String> {
    let provider = default_provider(&geocoder_config());
    let search =
        SearchService::current(provider, SearchConfig::default()).map_err(|e| e.to_string())?;
    let label = search.reverse_geocode(point).await.map_err(|e| e.to_string())?;
    println!("{}", to_json(&label)?);
    Ok(())
}

fn tile_loader(kind: BackendKind) -> Box<dyn TileLoader> {
    match HttpTileLoader::current(HttpLoaderConfig::default()) {
        Ok(loader) => Box::new(loader),
        Err(e) => {
            warn!(backend = %kind, "tile loader unavailable: {e}");
            let failing = ScriptedTileLoader::new();
            failing.fail_matching("", TileFailure::Transport(e.to_string()));
            Box::new(failing)
        }
    }
}

async fn cmd_session(
    api: HttpEntityConfig,
    seconds: f64,
    focus: Option<EntityId>,
    style: Option<String>,
    radius: Option<f64>,
) -> Result<(), String> {
    let mut store = prefs_store();
    let mut prefs = store.load().map_err(|e| e.to_string())?;
    if let Some(style) = style {
        prefs.style = Some(style);
    }
    if let Some(radius) = radius {
        prefs.radius_miles = radius;
    }
    let style_name = prefs
        .style
        .clone()
        .or_else(|| env_var_string("BIZMAP_STYLE"));
    let style = match style_name.as_deref() {
        Some(name) => StyleId::from_catalog(name)
            .or_else(|_| StyleId::parse(name))
            .map_err(|e| e.to_string())?,
        None => StyleId::default(),
    };

    let config = SessionConfig {
        access_token: env_var_string("MAPBOX_TOKEN"),
        style,
        width_px: env_var_u32("BIZMAP_WIDTH", 1024),
        height_px: env_var_u32("BIZMAP_HEIGHT", 768),
        ..SessionConfig::default()
    };
    let mut session = MapSessionController::new(config, Box::new(TileBackendFactory::new(tile_loader)))
        .map_err(|e| e.to_string())?;

    let source = HttpEntitySource::new(api);
    let ticket = session.begin_load();
    if let Some(query) = session.entity_query(prefs.radius_miles, DEFAULT_LIMIT) {
        let result = load_entities(&source, query).await;
        session.finish_load(ticket, result);
    }
    if let Some(id) = focus {
        if !session.focus_entity(id).map_err(|e| e.to_string())? {
            warn!(entity = %id, "entity has no location, not focusing");
        }
    }

    let dt = 1.0 / 30.0;
    let steps = (seconds.max(0.0) / dt).ceil() as usize;
    print_status(&mut session);
    for _ in 0..steps {
        tokio::time::sleep(Duration::from_secs_f64(dt)).await;
        session.tick(dt).map_err(|e| e.to_string())?;
        print_status(&mut session);
    }

    println!(
        "backend: {}  markers: {}  businesses: {}",
        session
            .backend_kind()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "none".to_string()),
        session.rendered().len(),
        session.entities().len(),
    );
    session.unmount();

    store.save(&prefs).map_err(|e| e.to_string())?;
    Ok(())
}

fn print_status(session: &mut MapSessionController) {
    for event in session.drain_status() {
        println!("[frame {:>5}] {:?}: {}", event.frame_index, event.kind, event.message);
    }
}
