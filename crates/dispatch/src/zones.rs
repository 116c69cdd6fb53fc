//! Static named-zone table. No geocoding — zones are a short fixed list of
//! approximate bounding boxes built from a center point and a radius.

use model::collaborators::Zone;

const ZONES: &[(&str, f64, f64, f64)] = &[
    ("hamra", 33.8965, 35.4825, 1.0),
    ("achrafieh", 33.8900, 35.5240, 1.2),
    ("bchara-el-khoury", 33.8878, 35.5065, 0.9),
    ("forn-el-chebak", 33.8690, 35.5180, 1.0),
];

pub fn find_zone(name: &str) -> Option<Zone> {
    let needle = name.to_lowercase().replace(' ', "-");
    ZONES
        .iter()
        .find(|(zone_name, _, _, _)| *zone_name == needle)
        .map(|(zone_name, lat, lng, radius_km)| Zone::from_center(zone_name, *lat, *lng, *radius_km))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_zone_contains_its_own_center() {
        let zone = find_zone("Hamra").expect("hamra is a known zone");
        assert!(zone.contains(33.8965, 35.4825));
    }

    #[test]
    fn unknown_zone_is_none() {
        assert!(find_zone("atlantis").is_none());
    }
}
