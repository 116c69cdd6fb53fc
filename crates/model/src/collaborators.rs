//! Contract-only collaborator entities.
//!
//! These are owned by other subsystems (auth, the user/ride store) outside
//! the hard core; the core only needs the fields named here.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use utility::id::HasId;

use crate::status::{DriverLocationState, Gender, RideStatus};

pub struct User;
impl HasId for User {}
pub type UserId = utility::id::Id<User>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub name: String,
    pub gender: Option<Gender>,
    pub is_driver: bool,
    pub area: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub avg_rating_driver: f64,
    pub rides_count_driver: i64,
    pub avg_rating_rider: f64,
    pub rides_count_rider: i64,
    pub driver_location_state: DriverLocationState,
    pub schedule: Schedule,
    /// Populated by the store's `online_drivers` join against `sessions`;
    /// `None` for a user fetched outside that join.
    pub current_session_token: Option<SessionToken>,
}

/// A driver's weekly schedule, keyed by weekday (0 = Monday), as a fixed
/// array rather than a dynamic per-day map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    pub days: [Option<ScheduleWindow>; 7],
}

impl Schedule {
    pub fn window_for_weekday(&self, weekday: chrono::Weekday) -> Option<&ScheduleWindow> {
        self.days[weekday.num_days_from_monday() as usize].as_ref()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduleWindow {
    #[serde(with = "utility::serde::hhmm")]
    pub start: NaiveTime,
    #[serde(with = "utility::serde::hhmm")]
    pub end: NaiveTime,
}

/// Opaque token issued by the external auth collaborator; the core only ever
/// resolves it to a `UserId` and, for display, an `(ip, port)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: SessionToken,
    pub user_id: UserId,
    pub ip: String,
    pub port: u16,
}

pub struct Ride;
impl HasId for Ride {}
pub type RideId = utility::id::Id<Ride>;

/// Write-heavy sink for the core once a request converts into a ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRecord {
    pub id: RideId,
    pub rider_id: UserId,
    pub driver_id: UserId,
    pub pickup_area: String,
    pub destination: String,
    pub requested_time: chrono::DateTime<chrono::Local>,
    pub status: RideStatus,
    pub rider_session_token: SessionToken,
    pub driver_session_token: SessionToken,
    pub accepted_at: chrono::DateTime<chrono::Local>,
}

/// A named, rectangular geofence used for the selector's `zone_filter`.
/// Built from a center point and a radius rather than hand-maintained
/// min/max pairs.
#[derive(Debug, Clone)]
pub struct Zone {
    pub name: &'static str,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Zone {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    /// Approximates a circular radius around `(lat, lng)` as a rectangular
    /// bounding box. A degree of latitude is a near-constant arc length; a
    /// degree of longitude shrinks with `cos(latitude)`, so the east/west
    /// half-width widens to compensate.
    pub fn from_center(name: &'static str, lat: f64, lng: f64, radius_km: f64) -> Self {
        let lat_delta = (radius_km / Self::EARTH_RADIUS_KM).to_degrees();
        let lng_delta = (radius_km / (Self::EARTH_RADIUS_KM * lat.to_radians().cos())).to_degrees();
        Self {
            name,
            min_lat: lat - lat_delta,
            max_lat: lat + lat_delta,
            min_lng: lng - lng_delta,
            max_lng: lng + lng_delta,
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat)
            && (self.min_lng..=self.max_lng).contains(&lng)
    }
}
