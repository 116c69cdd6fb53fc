use chrono::{DateTime, Local};
use model::{
    collaborators::UserId,
    error::StoreResult,
    ride_request::{RideRequestId, RideRequestRecord},
};
use sqlx::{Executor, Postgres, Transaction};

use dispatch::store::{NewCandidateRow, NewRideRequestRow};

use crate::data_model::{
    candidates::candidate_status_to_sql,
    ride_requests::{request_status_to_sql, RideRequestRow},
    users::gender_to_sql,
};

use super::convert_error;

pub(crate) const REQUEST_COLUMNS: &str = "
    id, rider_id, rider_session_token, pickup_area_label, pickup_lat, pickup_lng,
    destination_label, destination_is_campus, destination_lat, destination_lng,
    requested_time, min_rating, preferred_gender, status, current_candidate_sequence,
    current_driver_id, current_driver_session_token, rider_snapshot_name,
    rider_snapshot_username, rider_snapshot_gender, rider_snapshot_avg_rating,
    rider_snapshot_rides_count, message, ride_id, created_at, updated_at, last_driver_response_at
";

/// Re-assembles a [`RideRequestRecord`] from positional columns, shared by
/// the plain `ride_requests` reads and the driver-queue join projections
/// that carry the same columns under a `req_` prefix.
#[allow(clippy::too_many_arguments)]
pub(crate) fn row_to_request(
    id: i64,
    rider_id: i64,
    rider_session_token: String,
    pickup_area_label: String,
    pickup_lat: Option<f64>,
    pickup_lng: Option<f64>,
    destination_label: String,
    destination_is_campus: bool,
    destination_lat: Option<f64>,
    destination_lng: Option<f64>,
    requested_time: DateTime<Local>,
    min_rating: f64,
    preferred_gender: Option<String>,
    status: String,
    current_candidate_sequence: i32,
    current_driver_id: Option<i64>,
    current_driver_session_token: Option<String>,
    rider_snapshot_name: String,
    rider_snapshot_username: String,
    rider_snapshot_gender: Option<String>,
    rider_snapshot_avg_rating: f64,
    rider_snapshot_rides_count: i64,
    message: Option<String>,
    ride_id: Option<i64>,
    created_at: DateTime<Local>,
    updated_at: DateTime<Local>,
    last_driver_response_at: Option<DateTime<Local>>,
) -> Result<RideRequestRecord, sqlx::Error> {
    RideRequestRow {
        id,
        rider_id,
        rider_session_token,
        pickup_area_label,
        pickup_lat,
        pickup_lng,
        destination_label,
        destination_is_campus,
        destination_lat,
        destination_lng,
        requested_time,
        min_rating,
        preferred_gender,
        status,
        current_candidate_sequence,
        current_driver_id,
        current_driver_session_token,
        rider_snapshot_name,
        rider_snapshot_username,
        rider_snapshot_gender,
        rider_snapshot_avg_rating,
        rider_snapshot_rides_count,
        message,
        ride_id,
        created_at,
        updated_at,
        last_driver_response_at,
    }
    .to_model()
}

pub async fn get<'c, E>(executor: E, id: RideRequestId) -> StoreResult<Option<RideRequestRecord>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<RideRequestRow> = sqlx::query_as(&format!(
        "SELECT {REQUEST_COLUMNS} FROM ride_requests WHERE id = $1;"
    ))
    .bind(id.raw())
    .fetch_optional(executor)
    .await
    .map_err(convert_error)?;

    row.map(RideRequestRow::to_model).transpose().map_err(convert_error)
}

pub async fn latest_for_rider<'c, E>(executor: E, rider_id: UserId) -> StoreResult<Option<RideRequestRecord>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<RideRequestRow> = sqlx::query_as(&format!(
        "SELECT {REQUEST_COLUMNS} FROM ride_requests WHERE rider_id = $1 ORDER BY created_at DESC LIMIT 1;"
    ))
    .bind(rider_id.raw())
    .fetch_optional(executor)
    .await
    .map_err(convert_error)?;

    row.map(RideRequestRow::to_model).transpose().map_err(convert_error)
}

/// `SELECT ... FOR UPDATE`, giving every orchestrator operation
/// linearizability per request. Only meaningful inside a transaction.
pub async fn lock<'a>(
    tx: &mut Transaction<'a, Postgres>,
    id: RideRequestId,
) -> StoreResult<RideRequestRecord> {
    let row: RideRequestRow = sqlx::query_as(&format!(
        "SELECT {REQUEST_COLUMNS} FROM ride_requests WHERE id = $1 FOR UPDATE;"
    ))
    .bind(id.raw())
    .fetch_one(&mut **tx)
    .await
    .map_err(convert_error)?;

    row.to_model().map_err(convert_error)
}

pub async fn update<'c, E>(executor: E, request: &RideRequestRecord) -> StoreResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        UPDATE ride_requests
        SET status = $2, current_candidate_sequence = $3, current_driver_id = $4,
            current_driver_session_token = $5, message = $6, ride_id = $7,
            updated_at = $8, last_driver_response_at = $9
        WHERE id = $1;
        ",
    )
    .bind(request.id.raw())
    .bind(request_status_to_sql(request.status))
    .bind(request.current_candidate_sequence)
    .bind(request.current_driver_id.map(|id| id.raw()))
    .bind(request.current_driver_session_token.as_ref().map(|t| t.as_str()))
    .bind(&request.message)
    .bind(request.ride_id.map(|id| id.raw()))
    .bind(request.updated_at)
    .bind(request.last_driver_response_at)
    .execute(executor)
    .await
    .map_err(convert_error)?;
    Ok(())
}

pub async fn stale_pending<'c, E>(executor: E, cutoff: DateTime<Local>) -> StoreResult<Vec<RideRequestId>>
where
    E: Executor<'c, Database = Postgres>,
{
    ids_with_status_before(executor, "driver_pending", cutoff).await
}

pub async fn stale_confirm<'c, E>(executor: E, cutoff: DateTime<Local>) -> StoreResult<Vec<RideRequestId>>
where
    E: Executor<'c, Database = Postgres>,
{
    ids_with_status_before(executor, "awaiting_rider", cutoff).await
}

async fn ids_with_status_before<'c, E>(
    executor: E,
    status: &str,
    cutoff: DateTime<Local>,
) -> StoreResult<Vec<RideRequestId>>
where
    E: Executor<'c, Database = Postgres>,
{
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT id FROM ride_requests WHERE status = $1 AND updated_at < $2;",
    )
    .bind(status)
    .bind(cutoff)
    .fetch_all(executor)
    .await
    .map_err(convert_error)?;

    Ok(rows.into_iter().map(|(id,)| utility::id::Id::new(id)).collect())
}

/// Inserts the request row followed by each candidate row, within the
/// caller's transaction; create runs this as the first write of an
/// already-open transaction.
pub async fn insert_with_candidates<'a>(
    tx: &mut Transaction<'a, Postgres>,
    request: NewRideRequestRow,
    candidates: Vec<NewCandidateRow>,
) -> StoreResult<RideRequestId> {
    let row: (i64,) = sqlx::query_as(
        "
        INSERT INTO ride_requests (
            rider_id, rider_session_token, pickup_area_label, pickup_lat, pickup_lng,
            destination_label, destination_is_campus, destination_lat, destination_lng,
            requested_time, min_rating, preferred_gender, status, current_candidate_sequence,
            current_driver_id, current_driver_session_token, rider_snapshot_name,
            rider_snapshot_username, rider_snapshot_gender, rider_snapshot_avg_rating,
            rider_snapshot_rides_count, created_at, updated_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'driver_pending', 1,
            $13, $14, $15, $16, $17, $18, $19, now(), now()
        )
        RETURNING id;
        ",
    )
    .bind(request.rider_id.raw())
    .bind(request.rider_session_token.as_str())
    .bind(&request.pickup.area_label)
    .bind(request.pickup.latitude)
    .bind(request.pickup.longitude)
    .bind(&request.destination.label)
    .bind(request.destination.is_campus)
    .bind(request.destination.latitude)
    .bind(request.destination.longitude)
    .bind(request.requested_time)
    .bind(request.min_rating)
    .bind(gender_to_sql(request.preferred_gender))
    .bind(request.current_driver_id.raw())
    .bind(request.current_driver_session_token.as_str())
    .bind(&request.rider_snapshot.name)
    .bind(&request.rider_snapshot.username)
    .bind(gender_to_sql(request.rider_snapshot.gender))
    .bind(request.rider_snapshot.avg_rating_rider)
    .bind(request.rider_snapshot.rides_count)
    .fetch_one(&mut **tx)
    .await
    .map_err(convert_error)?;

    let request_id: RideRequestId = utility::id::Id::new(row.0);

    for candidate in candidates {
        sqlx::query(
            "
            INSERT INTO ride_request_candidates (
                request_id, sequence, driver_id, driver_session_token, driver_name,
                driver_username, driver_rating, driver_completed_rides, driver_area,
                duration_min, distance_km, maps_url, status, assigned_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14);
            ",
        )
        .bind(request_id.raw())
        .bind(candidate.sequence)
        .bind(candidate.driver_id.raw())
        .bind(candidate.driver_session_token.as_str())
        .bind(&candidate.driver_name)
        .bind(&candidate.driver_username)
        .bind(candidate.driver_rating)
        .bind(candidate.driver_completed_rides)
        .bind(&candidate.driver_area)
        .bind(candidate.duration_min)
        .bind(candidate.distance_km)
        .bind(&candidate.maps_url)
        .bind(candidate_status_to_sql(candidate.status))
        .bind(candidate.assigned_at)
        .execute(&mut **tx)
        .await
        .map_err(convert_error)?;
    }

    Ok(request_id)
}
