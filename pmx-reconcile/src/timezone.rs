//! Coordinate → timezone lookup
//!
//! The lookup is built once by the caller and shared read-only (`Arc`) by
//! every pipeline run. An unknown location is `None`, which the datetime and
//! fallback steps treat the same as "no GPS information".

use chrono_tz::Tz;
use std::str::FromStr;
use tracing::debug;
use tzf_rs::DefaultFinder;

/// Resolves the IANA timezone at a coordinate
pub trait TimezoneLookup: Send + Sync {
    fn timezone_at(&self, latitude: f64, longitude: f64) -> Option<Tz>;
}

/// Polygon lookup backed by tzf-rs embedded data
pub struct TzfLookup {
    finder: DefaultFinder,
}

impl TzfLookup {
    /// Loads the embedded timezone polygons (expensive; build once and share)
    pub fn new() -> Self {
        Self {
            finder: DefaultFinder::new(),
        }
    }
}

impl Default for TzfLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl TimezoneLookup for TzfLookup {
    fn timezone_at(&self, latitude: f64, longitude: f64) -> Option<Tz> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        let name = self.finder.get_tz_name(longitude, latitude);
        if name.is_empty() {
            debug!(latitude, longitude, "No timezone found for coordinates");
            return None;
        }
        Tz::from_str(name).ok()
    }
}

/// Same timezone everywhere, or none at all
#[derive(Debug, Clone, Copy)]
pub struct FixedTimezone(pub Option<Tz>);

impl TimezoneLookup for FixedTimezone {
    fn timezone_at(&self, _latitude: f64, _longitude: f64) -> Option<Tz> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tzf_lookup_known_cities() {
        let lookup = TzfLookup::new();
        assert_eq!(lookup.timezone_at(52.52, 13.405), Some(Tz::Europe__Berlin));
        assert_eq!(lookup.timezone_at(35.6762, 139.6503), Some(Tz::Asia__Tokyo));
    }

    #[test]
    fn test_tzf_lookup_rejects_nan() {
        let lookup = TzfLookup::new();
        assert_eq!(lookup.timezone_at(f64::NAN, 13.4), None);
    }

    #[test]
    fn test_fixed_timezone() {
        assert_eq!(
            FixedTimezone(Some(Tz::Europe__Berlin)).timezone_at(0.0, 0.0),
            Some(Tz::Europe__Berlin)
        );
        assert_eq!(FixedTimezone(None).timezone_at(52.5, 13.4), None);
    }
}
