use chrono::{DateTime, Local};
use model::{
    collaborators::{RideRecord, SessionToken},
    status::RideStatus,
};
use sqlx::prelude::FromRow;
use utility::id::Id;

use super::unknown_variant;

#[derive(Debug, Clone, FromRow)]
pub struct RideRow {
    pub id: i64,
    pub rider_id: i64,
    pub driver_id: i64,
    pub pickup_area: String,
    pub destination: String,
    pub requested_time: DateTime<Local>,
    pub status: String,
    pub rider_session_token: String,
    pub driver_session_token: String,
    pub accepted_at: DateTime<Local>,
}

impl RideRow {
    pub fn to_model(self) -> Result<RideRecord, sqlx::Error> {
        Ok(RideRecord {
            id: Id::new(self.id),
            rider_id: Id::new(self.rider_id),
            driver_id: Id::new(self.driver_id),
            pickup_area: self.pickup_area,
            destination: self.destination,
            requested_time: self.requested_time,
            status: parse_ride_status(&self.status)?,
            rider_session_token: SessionToken(self.rider_session_token),
            driver_session_token: SessionToken(self.driver_session_token),
            accepted_at: self.accepted_at,
        })
    }
}

pub fn ride_status_to_sql(status: RideStatus) -> &'static str {
    match status {
        RideStatus::Pending => "pending",
        RideStatus::Complete => "complete",
        RideStatus::Canceled => "canceled",
    }
}

fn parse_ride_status(value: &str) -> Result<RideStatus, sqlx::Error> {
    match value {
        "pending" => Ok(RideStatus::Pending),
        "complete" => Ok(RideStatus::Complete),
        "canceled" => Ok(RideStatus::Canceled),
        other => Err(sqlx::Error::Decode(Box::new(unknown_variant("status", other)))),
    }
}
