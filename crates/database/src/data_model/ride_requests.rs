use chrono::{DateTime, Local};
use model::{
    collaborators::SessionToken,
    ride_request::{Destination, PickupLocation, RideRequestRecord, RiderSnapshot},
    status::{Gender, RideRequestStatus},
};
use sqlx::prelude::FromRow;
use utility::id::Id;

use super::unknown_variant;

#[derive(Debug, Clone, FromRow)]
pub struct RideRequestRow {
    pub id: i64,
    pub rider_id: i64,
    pub rider_session_token: String,
    pub pickup_area_label: String,
    pub pickup_lat: Option<f64>,
    pub pickup_lng: Option<f64>,
    pub destination_label: String,
    pub destination_is_campus: bool,
    pub destination_lat: Option<f64>,
    pub destination_lng: Option<f64>,
    pub requested_time: DateTime<Local>,
    pub min_rating: f64,
    pub preferred_gender: Option<String>,
    pub status: String,
    pub current_candidate_sequence: i32,
    pub current_driver_id: Option<i64>,
    pub current_driver_session_token: Option<String>,
    pub rider_snapshot_name: String,
    pub rider_snapshot_username: String,
    pub rider_snapshot_gender: Option<String>,
    pub rider_snapshot_avg_rating: f64,
    pub rider_snapshot_rides_count: i64,
    pub message: Option<String>,
    pub ride_id: Option<i64>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    pub last_driver_response_at: Option<DateTime<Local>>,
}

impl RideRequestRow {
    pub fn to_model(self) -> Result<RideRequestRecord, sqlx::Error> {
        Ok(RideRequestRecord {
            id: Id::new(self.id),
            rider_id: Id::new(self.rider_id),
            rider_session_token: SessionToken(self.rider_session_token),
            pickup: PickupLocation {
                area_label: self.pickup_area_label,
                latitude: self.pickup_lat,
                longitude: self.pickup_lng,
            },
            destination: Destination {
                label: self.destination_label,
                is_campus: self.destination_is_campus,
                latitude: self.destination_lat,
                longitude: self.destination_lng,
            },
            requested_time: self.requested_time,
            min_rating: self.min_rating,
            preferred_gender: parse_gender(self.preferred_gender.as_deref())?,
            status: parse_request_status(&self.status)?,
            current_candidate_sequence: self.current_candidate_sequence,
            current_driver_id: self.current_driver_id.map(Id::new),
            current_driver_session_token: self.current_driver_session_token.map(SessionToken),
            rider_snapshot: RiderSnapshot {
                name: self.rider_snapshot_name,
                username: self.rider_snapshot_username,
                gender: parse_gender(self.rider_snapshot_gender.as_deref())?,
                avg_rating_rider: self.rider_snapshot_avg_rating,
                rides_count: self.rider_snapshot_rides_count,
            },
            message: self.message,
            ride_id: self.ride_id.map(Id::new),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_driver_response_at: self.last_driver_response_at,
        })
    }
}

pub fn request_status_to_sql(status: RideRequestStatus) -> &'static str {
    match status {
        RideRequestStatus::DriverPending => "driver_pending",
        RideRequestStatus::AwaitingRider => "awaiting_rider",
        RideRequestStatus::Completed => "completed",
        RideRequestStatus::Exhausted => "exhausted",
        RideRequestStatus::Canceled => "canceled",
    }
}

fn parse_request_status(value: &str) -> Result<RideRequestStatus, sqlx::Error> {
    match value {
        "driver_pending" => Ok(RideRequestStatus::DriverPending),
        "awaiting_rider" => Ok(RideRequestStatus::AwaitingRider),
        "completed" => Ok(RideRequestStatus::Completed),
        "exhausted" => Ok(RideRequestStatus::Exhausted),
        "canceled" => Ok(RideRequestStatus::Canceled),
        other => Err(sqlx::Error::Decode(Box::new(unknown_variant("status", other)))),
    }
}

fn parse_gender(value: Option<&str>) -> Result<Option<Gender>, sqlx::Error> {
    match value {
        None => Ok(None),
        Some("male") => Ok(Some(Gender::Male)),
        Some("female") => Ok(Some(Gender::Female)),
        Some(other) => Err(sqlx::Error::Decode(Box::new(unknown_variant("gender", other)))),
    }
}
