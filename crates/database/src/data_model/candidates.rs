use chrono::{DateTime, Local};
use model::{
    collaborators::SessionToken,
    ride_request::CandidateRecord,
    status::CandidateStatus,
};
use sqlx::prelude::FromRow;
use utility::id::Id;

use super::unknown_variant;

#[derive(Debug, Clone, FromRow)]
pub struct CandidateRow {
    pub id: i64,
    pub request_id: i64,
    pub sequence: i32,
    pub driver_id: i64,
    pub driver_session_token: String,
    pub driver_name: String,
    pub driver_username: String,
    pub driver_rating: f64,
    pub driver_completed_rides: i64,
    pub driver_area: Option<String>,
    pub duration_min: f64,
    pub distance_km: f64,
    pub maps_url: String,
    pub status: String,
    pub assigned_at: Option<DateTime<Local>>,
    pub responded_at: Option<DateTime<Local>>,
    pub message: Option<String>,
}

impl CandidateRow {
    pub fn to_model(self) -> Result<CandidateRecord, sqlx::Error> {
        Ok(CandidateRecord {
            id: Id::new(self.id),
            request_id: Id::new(self.request_id),
            sequence: self.sequence,
            driver_id: Id::new(self.driver_id),
            driver_session_token: SessionToken(self.driver_session_token),
            driver_name: self.driver_name,
            driver_username: self.driver_username,
            driver_rating: self.driver_rating,
            driver_completed_rides: self.driver_completed_rides,
            driver_area: self.driver_area,
            duration_min: self.duration_min,
            distance_km: self.distance_km,
            maps_url: self.maps_url,
            status: parse_candidate_status(&self.status)?,
            assigned_at: self.assigned_at,
            responded_at: self.responded_at,
            message: self.message,
        })
    }
}

pub fn candidate_status_to_sql(status: CandidateStatus) -> &'static str {
    match status {
        CandidateStatus::Waiting => "waiting",
        CandidateStatus::Pending => "pending",
        CandidateStatus::Accepted => "accepted",
        CandidateStatus::Rejected => "rejected",
        CandidateStatus::Skipped => "skipped",
    }
}

fn parse_candidate_status(value: &str) -> Result<CandidateStatus, sqlx::Error> {
    match value {
        "waiting" => Ok(CandidateStatus::Waiting),
        "pending" => Ok(CandidateStatus::Pending),
        "accepted" => Ok(CandidateStatus::Accepted),
        "rejected" => Ok(CandidateStatus::Rejected),
        "skipped" => Ok(CandidateStatus::Skipped),
        other => Err(sqlx::Error::Decode(Box::new(unknown_variant("status", other)))),
    }
}
