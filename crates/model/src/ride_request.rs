//! The hard-core aggregate: a rider's `RideRequest` and the fan-out of
//! `RideRequestCandidate` rows it spawns.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use utility::id::HasId;

use crate::{
    collaborators::{RideId, SessionToken, UserId},
    status::{CandidateStatus, Gender, RideRequestStatus},
};

pub struct RideRequest;
impl HasId for RideRequest {}
pub type RideRequestId = utility::id::Id<RideRequest>;

pub struct RideRequestCandidate;
impl HasId for RideRequestCandidate {}
pub type CandidateId = utility::id::Id<RideRequestCandidate>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupLocation {
    pub area_label: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub label: String,
    pub is_campus: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Rider profile frozen at request creation, for driver-facing display.
/// Flat columns rather than a nested blob, so a row decodes without a
/// second lookup against the users table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderSnapshot {
    pub name: String,
    pub username: String,
    pub gender: Option<Gender>,
    pub avg_rating_rider: f64,
    pub rides_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequestRecord {
    pub id: RideRequestId,
    pub rider_id: UserId,
    pub rider_session_token: SessionToken,
    pub pickup: PickupLocation,
    pub destination: Destination,
    pub requested_time: DateTime<Local>,
    pub min_rating: f64,
    pub preferred_gender: Option<Gender>,
    pub status: RideRequestStatus,
    pub current_candidate_sequence: i32,
    pub current_driver_id: Option<UserId>,
    pub current_driver_session_token: Option<SessionToken>,
    pub rider_snapshot: RiderSnapshot,
    pub message: Option<String>,
    pub ride_id: Option<RideId>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    pub last_driver_response_at: Option<DateTime<Local>>,
}

impl RideRequestRecord {
    /// Invariant I4: `ride_id` is non-null iff status = COMPLETED.
    pub fn ride_id_matches_status(&self) -> bool {
        (self.status == RideRequestStatus::Completed) == self.ride_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub id: CandidateId,
    pub request_id: RideRequestId,
    pub sequence: i32,
    pub driver_id: UserId,
    pub driver_session_token: SessionToken,
    pub driver_name: String,
    pub driver_username: String,
    pub driver_rating: f64,
    pub driver_completed_rides: i64,
    pub driver_area: Option<String>,
    pub duration_min: f64,
    pub distance_km: f64,
    pub maps_url: String,
    pub status: CandidateStatus,
    pub assigned_at: Option<DateTime<Local>>,
    pub responded_at: Option<DateTime<Local>>,
    pub message: Option<String>,
}
