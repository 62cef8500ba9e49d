//! Reminder records and their validation.
//!
//! A `Reminder` is the persisted definition of a geofence: a circle around a
//! point of interest plus the text the user wants to see when crossing it.
//! Reminders are plain immutable values; every change goes through the
//! reminder store and comes back as a fresh value.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::poi::PointOfInterest;

/// Largest radius accepted for a geofence, in meters.
pub const MAX_RADIUS_METERS: f64 = 200_000.0;

/// Maximum length of the free-text note.
pub const MAX_NOTE_LENGTH: usize = 4096;

/// Stable reminder identifier.
///
/// The same value doubles as the identifier of the monitored region, so a
/// boundary callback can be mapped back to its reminder without a lookup
/// table.
///
/// # Examples
///
/// ```
/// use geofence::ReminderId;
///
/// let id = ReminderId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReminderId(Uuid);

impl ReminderId {
    /// Creates a new random reminder ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a reminder ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Parses the hyphenated string form used as an OS region identifier.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for ReminderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReminderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ReminderId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Mean Earth radius used for great-circle distances.
    pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

    /// Creates a validated coordinate.
    ///
    /// # Errors
    ///
    /// Returns an error if either component is not finite or is outside
    /// its valid range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::LatitudeOutOfRange { value: latitude });
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::LongitudeOutOfRange { value: longitude });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Great-circle distance in meters (haversine).
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().min(1.0).asin();
        Self::EARTH_RADIUS_METERS * c
    }
}

/// Draft of a reminder, validated before it reaches the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReminder {
    pub location_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
    pub category: String,
    pub note: String,
}

impl NewReminder {
    /// Builds a draft for a geofence around a point of interest.
    #[must_use]
    pub fn for_point(point: &PointOfInterest, radius: f64, note: impl Into<String>) -> Self {
        Self {
            location_id: point.id.clone(),
            name: point.name.clone(),
            latitude: point.lat,
            longitude: point.lon,
            radius,
            category: point.category.clone(),
            note: note.into(),
        }
    }

    /// Checks the geometric and textual invariants of a reminder.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.location_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "location_id".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "name".to_string(),
            });
        }
        if self.note.len() > MAX_NOTE_LENGTH {
            return Err(ValidationError::FieldTooLong {
                field: "note".to_string(),
                max_length: MAX_NOTE_LENGTH,
            });
        }
        validate_radius(self.radius)?;
        Coordinate::new(self.latitude, self.longitude)?;
        Ok(())
    }

    /// Turns the draft into a stored record with a fresh id.
    ///
    /// Stores call this after `validate` so every backend assigns ids and
    /// creation times the same way.
    #[must_use]
    pub fn into_reminder(self, created_at: DateTime<Utc>) -> Reminder {
        Reminder {
            id: ReminderId::new(),
            location_id: self.location_id,
            name: self.name,
            latitude: self.latitude,
            longitude: self.longitude,
            radius: self.radius,
            category: self.category,
            note: self.note,
            is_active: true,
            created_at,
        }
    }
}

/// Checks `0 < radius <= MAX_RADIUS_METERS`.
pub fn validate_radius(radius: f64) -> Result<(), ValidationError> {
    if !radius.is_finite() || radius <= 0.0 || radius > MAX_RADIUS_METERS {
        return Err(ValidationError::RadiusOutOfRange {
            radius,
            max: MAX_RADIUS_METERS,
        });
    }
    Ok(())
}

/// A persisted geofence reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    /// Identifier of the point of interest this reminder was created from.
    pub location_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Radius in meters.
    pub radius: f64,
    pub category: String,
    pub note: String,
    pub is_active: bool,
    /// Creation time; newer reminders win when region capacity runs out.
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    /// Center of the geofence.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Returns a copy with the active flag replaced.
    #[must_use]
    pub fn with_active(&self, is_active: bool) -> Self {
        Self {
            is_active,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> NewReminder {
        NewReminder {
            location_id: "1".to_string(),
            name: "Apple Park".to_string(),
            latitude: 37.3347,
            longitude: -122.0089,
            radius: 100.0,
            category: "Landmark".to_string(),
            note: "pick up badge".to_string(),
        }
    }

    #[test]
    fn reminder_id_round_trips_through_region_identifier() {
        let id = ReminderId::new();
        let parsed = ReminderId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn valid_draft_passes() {
        draft().validate().unwrap();
    }

    #[test]
    fn zero_and_negative_radius_rejected() {
        for radius in [0.0, -1.0, f64::NAN, MAX_RADIUS_METERS + 1.0] {
            let mut d = draft();
            d.radius = radius;
            assert!(
                matches!(d.validate(), Err(ValidationError::RadiusOutOfRange { .. })),
                "radius {radius} should be rejected"
            );
        }
    }

    #[test]
    fn max_radius_is_inclusive() {
        let mut d = draft();
        d.radius = MAX_RADIUS_METERS;
        d.validate().unwrap();
    }

    #[test]
    fn out_of_range_coordinates_rejected() {
        let mut d = draft();
        d.latitude = 91.0;
        assert!(matches!(d.validate(), Err(ValidationError::LatitudeOutOfRange { .. })));

        let mut d = draft();
        d.longitude = -180.5;
        assert!(matches!(d.validate(), Err(ValidationError::LongitudeOutOfRange { .. })));
    }

    #[test]
    fn blank_name_rejected() {
        let mut d = draft();
        d.name = "   ".to_string();
        assert_eq!(
            d.validate(),
            Err(ValidationError::MissingField {
                field: "name".to_string()
            })
        );
    }

    #[test]
    fn into_reminder_starts_active() {
        let now = Utc::now();
        let r = draft().into_reminder(now);
        assert!(r.is_active);
        assert_eq!(r.created_at, now);
        assert_eq!(r.radius, 100.0);
        assert!(!r.with_active(false).is_active);
    }

    #[test]
    fn haversine_distance_is_plausible() {
        let apple_park = Coordinate::new(37.334722, -122.008889).unwrap();
        let visitor_center = Coordinate::new(37.332600, -122.007456).unwrap();
        let d = apple_park.distance_to(&visitor_center);
        assert!((200.0..300.0).contains(&d), "got {d}");
        assert!(apple_park.distance_to(&apple_park).abs() < 1e-6);
    }
}
