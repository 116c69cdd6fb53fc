use chrono::{DateTime, Local};
use model::{
    collaborators::{RideRecord, SessionToken, UserId},
    error::StoreResult,
    ride_request::{CandidateRecord, RideRequestId, RideRequestRecord},
    status::RideStatus,
};
use sqlx::{prelude::FromRow, Executor, Postgres};
use utility::id::Id;

use crate::data_model::{
    candidates::{candidate_status_to_sql, CandidateRow},
    unknown_variant,
};

use super::{convert_error, ride_requests::row_to_request};

const CANDIDATE_COLUMNS: &str = "
    id, request_id, sequence, driver_id, driver_session_token, driver_name, driver_username,
    driver_rating, driver_completed_rides, driver_area, duration_min, distance_km, maps_url,
    status, assigned_at, responded_at, message
";

pub async fn for_request<'c, E>(executor: E, request_id: RideRequestId) -> StoreResult<Vec<CandidateRecord>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<CandidateRow> = sqlx::query_as(&format!(
        "SELECT {CANDIDATE_COLUMNS} FROM ride_request_candidates WHERE request_id = $1 ORDER BY sequence;"
    ))
    .bind(request_id.raw())
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;

    rows.into_iter().map(CandidateRow::to_model).collect::<Result<Vec<_>, _>>().map_err(convert_error)
}

pub async fn by_request_and_driver<'c, E>(
    executor: E,
    request_id: RideRequestId,
    driver_id: UserId,
) -> StoreResult<Option<CandidateRecord>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<CandidateRow> = sqlx::query_as(&format!(
        "SELECT {CANDIDATE_COLUMNS} FROM ride_request_candidates WHERE request_id = $1 AND driver_id = $2;"
    ))
    .bind(request_id.raw())
    .bind(driver_id.raw())
    .fetch_optional(executor)
    .await
    .map_err(convert_error)?;

    row.map(CandidateRow::to_model).transpose().map_err(convert_error)
}

pub async fn update<'c, E>(executor: E, candidate: &CandidateRecord) -> StoreResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        UPDATE ride_request_candidates
        SET status = $2, assigned_at = $3, responded_at = $4, message = $5
        WHERE id = $1;
        ",
    )
    .bind(candidate.id.raw())
    .bind(candidate_status_to_sql(candidate.status))
    .bind(candidate.assigned_at)
    .bind(candidate.responded_at)
    .bind(&candidate.message)
    .execute(executor)
    .await
    .map_err(convert_error)?;
    Ok(())
}

/// Flattened projection backing both queue views below: candidate columns
/// followed by the joined request's columns under a `req_` prefix.
#[derive(Debug, Clone, FromRow)]
struct QueueRow {
    id: i64,
    request_id: i64,
    sequence: i32,
    driver_id: i64,
    driver_session_token: String,
    driver_name: String,
    driver_username: String,
    driver_rating: f64,
    driver_completed_rides: i64,
    driver_area: Option<String>,
    duration_min: f64,
    distance_km: f64,
    maps_url: String,
    status: String,
    assigned_at: Option<DateTime<Local>>,
    responded_at: Option<DateTime<Local>>,
    message: Option<String>,

    req_id: i64,
    req_rider_id: i64,
    req_rider_session_token: String,
    req_pickup_area_label: String,
    req_pickup_lat: Option<f64>,
    req_pickup_lng: Option<f64>,
    req_destination_label: String,
    req_destination_is_campus: bool,
    req_destination_lat: Option<f64>,
    req_destination_lng: Option<f64>,
    req_requested_time: DateTime<Local>,
    req_min_rating: f64,
    req_preferred_gender: Option<String>,
    req_status: String,
    req_current_candidate_sequence: i32,
    req_current_driver_id: Option<i64>,
    req_current_driver_session_token: Option<String>,
    req_rider_snapshot_name: String,
    req_rider_snapshot_username: String,
    req_rider_snapshot_gender: Option<String>,
    req_rider_snapshot_avg_rating: f64,
    req_rider_snapshot_rides_count: i64,
    req_message: Option<String>,
    req_ride_id: Option<i64>,
    req_created_at: DateTime<Local>,
    req_updated_at: DateTime<Local>,
    req_last_driver_response_at: Option<DateTime<Local>>,
}

impl QueueRow {
    fn split(self) -> Result<(CandidateRecord, RideRequestRecord), sqlx::Error> {
        let candidate = CandidateRow {
            id: self.id,
            request_id: self.request_id,
            sequence: self.sequence,
            driver_id: self.driver_id,
            driver_session_token: self.driver_session_token,
            driver_name: self.driver_name,
            driver_username: self.driver_username,
            driver_rating: self.driver_rating,
            driver_completed_rides: self.driver_completed_rides,
            driver_area: self.driver_area,
            duration_min: self.duration_min,
            distance_km: self.distance_km,
            maps_url: self.maps_url,
            status: self.status,
            assigned_at: self.assigned_at,
            responded_at: self.responded_at,
            message: self.message,
        }
        .to_model()?;

        let request = row_to_request(
            self.req_id,
            self.req_rider_id,
            self.req_rider_session_token,
            self.req_pickup_area_label,
            self.req_pickup_lat,
            self.req_pickup_lng,
            self.req_destination_label,
            self.req_destination_is_campus,
            self.req_destination_lat,
            self.req_destination_lng,
            self.req_requested_time,
            self.req_min_rating,
            self.req_preferred_gender,
            self.req_status,
            self.req_current_candidate_sequence,
            self.req_current_driver_id,
            self.req_current_driver_session_token,
            self.req_rider_snapshot_name,
            self.req_rider_snapshot_username,
            self.req_rider_snapshot_gender,
            self.req_rider_snapshot_avg_rating,
            self.req_rider_snapshot_rides_count,
            self.req_message,
            self.req_ride_id,
            self.req_created_at,
            self.req_updated_at,
            self.req_last_driver_response_at,
        )?;

        Ok((candidate, request))
    }
}

const QUEUE_SELECT: &str = "
    c.id, c.request_id, c.sequence, c.driver_id, c.driver_session_token, c.driver_name,
    c.driver_username, c.driver_rating, c.driver_completed_rides, c.driver_area,
    c.duration_min, c.distance_km, c.maps_url, c.status, c.assigned_at, c.responded_at, c.message,
    r.id AS req_id, r.rider_id AS req_rider_id, r.rider_session_token AS req_rider_session_token,
    r.pickup_area_label AS req_pickup_area_label, r.pickup_lat AS req_pickup_lat,
    r.pickup_lng AS req_pickup_lng, r.destination_label AS req_destination_label,
    r.destination_is_campus AS req_destination_is_campus, r.destination_lat AS req_destination_lat,
    r.destination_lng AS req_destination_lng, r.requested_time AS req_requested_time,
    r.min_rating AS req_min_rating, r.preferred_gender AS req_preferred_gender,
    r.status AS req_status, r.current_candidate_sequence AS req_current_candidate_sequence,
    r.current_driver_id AS req_current_driver_id,
    r.current_driver_session_token AS req_current_driver_session_token,
    r.rider_snapshot_name AS req_rider_snapshot_name,
    r.rider_snapshot_username AS req_rider_snapshot_username,
    r.rider_snapshot_gender AS req_rider_snapshot_gender,
    r.rider_snapshot_avg_rating AS req_rider_snapshot_avg_rating,
    r.rider_snapshot_rides_count AS req_rider_snapshot_rides_count,
    r.message AS req_message, r.ride_id AS req_ride_id, r.created_at AS req_created_at,
    r.updated_at AS req_updated_at, r.last_driver_response_at AS req_last_driver_response_at
";

/// `PENDING` candidates assigned to `driver_id` — the pending half of the
/// driver queue.
pub async fn pending_queue<'c, E>(
    executor: E,
    driver_id: UserId,
) -> StoreResult<Vec<(CandidateRecord, RideRequestRecord)>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<QueueRow> = sqlx::query_as(&format!(
        "
        SELECT {QUEUE_SELECT}
        FROM ride_request_candidates c
        JOIN ride_requests r ON r.id = c.request_id
        WHERE c.driver_id = $1 AND c.status = 'pending'
        ORDER BY c.assigned_at;
        "
    ))
    .bind(driver_id.raw())
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;

    rows.into_iter().map(QueueRow::split).collect::<Result<Vec<_>, _>>().map_err(convert_error)
}

/// `ACCEPTED`/`SKIPPED` candidates assigned to `driver_id`, joined against
/// the ride row when one has been created — the active half of the driver
/// queue.
pub async fn active_queue<'c, E>(
    executor: E,
    driver_id: UserId,
) -> StoreResult<Vec<(CandidateRecord, RideRequestRecord, Option<RideRecord>)>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<(QueueRow, Option<RideOnlyRow>)> = sqlx::query_as(&format!(
        "
        SELECT {QUEUE_SELECT},
            ride.id AS ride_id_col, ride.rider_id AS ride_rider_id, ride.driver_id AS ride_driver_id,
            ride.pickup_area AS ride_pickup_area, ride.destination AS ride_destination,
            ride.requested_time AS ride_requested_time, ride.status AS ride_status,
            ride.rider_session_token AS ride_rider_session_token,
            ride.driver_session_token AS ride_driver_session_token, ride.accepted_at AS ride_accepted_at
        FROM ride_request_candidates c
        JOIN ride_requests r ON r.id = c.request_id
        LEFT JOIN rides ride ON ride.id = r.ride_id
        WHERE c.driver_id = $1 AND c.status IN ('accepted', 'skipped');
        "
    ))
    .bind(driver_id.raw())
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;

    rows.into_iter()
        .map(|(queue, ride)| {
            let (candidate, request) = queue.split()?;
            let ride = ride.map(RideOnlyRow::to_model).transpose()?;
            Ok((candidate, request, ride))
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()
        .map_err(convert_error)
}

#[derive(Debug, Clone, FromRow)]
struct RideOnlyRow {
    ride_id_col: i64,
    ride_rider_id: i64,
    ride_driver_id: i64,
    ride_pickup_area: String,
    ride_destination: String,
    ride_requested_time: DateTime<Local>,
    ride_status: String,
    ride_rider_session_token: String,
    ride_driver_session_token: String,
    ride_accepted_at: DateTime<Local>,
}

impl RideOnlyRow {
    fn to_model(self) -> Result<RideRecord, sqlx::Error> {
        Ok(RideRecord {
            id: Id::new(self.ride_id_col),
            rider_id: Id::new(self.ride_rider_id),
            driver_id: Id::new(self.ride_driver_id),
            pickup_area: self.ride_pickup_area,
            destination: self.ride_destination,
            requested_time: self.ride_requested_time,
            status: parse_ride_status(&self.ride_status)?,
            rider_session_token: SessionToken(self.ride_rider_session_token),
            driver_session_token: SessionToken(self.ride_driver_session_token),
            accepted_at: self.ride_accepted_at,
        })
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
