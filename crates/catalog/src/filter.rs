use foundation::bounds::LngLat;
use foundation::math::geodesy::haversine_miles;
use foundation::math::precision::stable_total_cmp_f64;

use crate::entity::LocatedEntity;

/// Search radius options in miles; 0 means "current view".
pub const RADIUS_CHOICES_MILES: [f64; 6] = [0.0, 1.0, 3.0, 5.0, 10.0, 25.0];

/// Entities whose name, description, location, city, state or zip contains
/// `what` (case-insensitive). Blank `what` keeps everything.
pub fn filter_by_text<'a>(entities: &'a [LocatedEntity], what: &str) -> Vec<&'a LocatedEntity> {
    let needle = what.trim().to_lowercase();
    if needle.is_empty() {
        return entities.iter().collect();
    }
    entities
        .iter()
        .filter(|e| {
            [&e.name, &e.description, &e.location, &e.city, &e.state, &e.zip]
                .into_iter()
                .map(|f| f.as_deref().unwrap_or(""))
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()
                .contains(&needle)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyEntity<'a> {
    pub entity: &'a LocatedEntity,
    pub miles: f64,
}

/// Entities with coordinates, nearest first. Ties keep id order.
pub fn nearby(center: LngLat, entities: &[LocatedEntity]) -> Vec<NearbyEntity<'_>> {
    let mut out: Vec<NearbyEntity<'_>> = entities
        .iter()
        .filter_map(|e| {
            let miles = haversine_miles(center, e.coordinates()?)?;
            Some(NearbyEntity { entity: e, miles })
        })
        .collect();
    out.sort_by(|a, b| {
        stable_total_cmp_f64(a.miles, b.miles).then_with(|| a.entity.id.cmp(&b.entity.id))
    });
    out
}
