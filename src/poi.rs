//! Points of interest that reminders can be attached to.
//!
//! Fetching points over the network is the host's job. This module owns the
//! JSON shape, the built-in fallback list, and the fallback policy itself.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A named place a reminder can be created for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub category: String,
}

impl PointOfInterest {
    fn new(id: &str, name: &str, lat: f64, lon: f64, category: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            lat,
            lon,
            category: category.to_string(),
        }
    }
}

/// Where a point list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointSource {
    /// Returned by the fetch.
    Fetched,
    /// The bundled fallback list.
    BuiltIn,
}

/// Decodes a JSON array of points.
pub fn parse_points_of_interest(json: &[u8]) -> Result<Vec<PointOfInterest>, serde_json::Error> {
    serde_json::from_slice(json)
}

/// Runs `fetch` and falls back to the built-in list if it fails.
///
/// The fetch error is logged; callers that want to show it can inspect the
/// returned `PointSource`.
pub fn load_points_of_interest<F, E>(fetch: F) -> (Vec<PointOfInterest>, PointSource)
where
    F: FnOnce() -> Result<Vec<PointOfInterest>, E>,
    E: std::fmt::Display,
{
    match fetch() {
        Ok(points) => (points, PointSource::Fetched),
        Err(e) => {
            warn!(error = %e, "point-of-interest fetch failed; using built-in list");
            (builtin_points_of_interest(), PointSource::BuiltIn)
        }
    }
}

/// Fixed fallback list around Cupertino, CA.
#[must_use]
pub fn builtin_points_of_interest() -> Vec<PointOfInterest> {
    vec![
        PointOfInterest::new("1", "Apple Park", 37.334722, -122.008889, "Landmark"),
        PointOfInterest::new("2", "Homestead High School", 37.341936, -122.011394, "Education"),
        PointOfInterest::new("3", "Cupertino Middle School", 37.345548, -122.027970, "Education"),
        PointOfInterest::new("4", "Monta Vista High School", 37.336567, -122.001053, "Education"),
        PointOfInterest::new("5", "Cupertino Country Club", 37.341258, -121.995845, "Recreation"),
        PointOfInterest::new("6", "Whole Foods Market", 37.322111, -121.994631, "Shopping"),
        PointOfInterest::new("7", "Vallco Town Center", 37.325700, -122.000800, "Shopping"),
        PointOfInterest::new("8", "Cupertino Library", 37.323267, -122.004073, "Education"),
        PointOfInterest::new("9", "Kaiser Permanente", 37.323069, -121.998879, "Healthcare"),
        PointOfInterest::new("10", "Main Street Cupertino", 37.323640, -122.012658, "Landmark"),
        PointOfInterest::new("11", "De Anza College", 37.319447, -122.044870, "Education"),
        PointOfInterest::new("12", "Cupertino Memorial Park", 37.319979, -122.035945, "Park"),
        PointOfInterest::new("13", "Rancho San Antonio Park", 37.319600, -122.086200, "Park"),
        PointOfInterest::new("14", "Foothill Expressway", 37.335100, -122.067200, "Road"),
        PointOfInterest::new("15", "Stevens Creek County Park", 37.342100, -122.067800, "Park"),
        PointOfInterest::new("16", "HP Building", 37.344521, -122.040121, "Office"),
        PointOfInterest::new("17", "Infinite Loop", 37.331800, -122.028928, "Landmark"),
        PointOfInterest::new("18", "Starbucks Cupertino", 37.325940, -122.033012, "Cafe"),
        PointOfInterest::new("19", "Peet's Coffee", 37.336710, -122.030670, "Cafe"),
        PointOfInterest::new("20", "Philz Coffee", 37.329365, -121.982550, "Cafe"),
        PointOfInterest::new("21", "Apple Visitor Center", 37.332600, -122.007456, "Landmark"),
        PointOfInterest::new("22", "Tantau Park", 37.337830, -122.005824, "Park"),
        PointOfInterest::new("23", "Civic Center Plaza", 37.323200, -122.029700, "Landmark"),
        PointOfInterest::new("24", "Cupertino City Hall", 37.323490, -122.029870, "Government"),
    ]
}
