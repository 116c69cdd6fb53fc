use model::{collaborators::RideId, error::StoreResult};
use sqlx::{Executor, Postgres, Transaction};

use dispatch::store::NewRideRow;

use crate::data_model::rides::{ride_status_to_sql, RideRow};

use super::convert_error;

const RIDE_COLUMNS: &str = "
    id, rider_id, driver_id, pickup_area, destination, requested_time, status,
    rider_session_token, driver_session_token, accepted_at
";

pub async fn get<'c, E>(executor: E, id: RideId) -> StoreResult<Option<model::collaborators::RideRecord>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<RideRow> = sqlx::query_as(&format!("SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1;"))
        .bind(id.raw())
        .fetch_optional(executor)
        .await
        .map_err(convert_error)?;

    row.map(RideRow::to_model).transpose().map_err(convert_error)
}

/// Inserts the ride and links it back onto the originating request, within
/// the caller's transaction so confirm writes both rows atomically.
pub async fn insert<'a>(tx: &mut Transaction<'a, Postgres>, ride: NewRideRow) -> StoreResult<RideId> {
    let row: (i64,) = sqlx::query_as(
        "
        INSERT INTO rides (
            rider_id, driver_id, pickup_area, destination, requested_time, status,
            rider_session_token, driver_session_token, accepted_at
        )
        VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, now())
        RETURNING id;
        ",
    )
    .bind(ride.rider_id.raw())
    .bind(ride.driver_id.raw())
    .bind(&ride.pickup_area)
    .bind(&ride.destination)
    .bind(ride.requested_time)
    .bind(ride.rider_session_token.as_str())
    .bind(ride.driver_session_token.as_str())
    .fetch_one(&mut **tx)
    .await
    .map_err(convert_error)?;

    Ok(utility::id::Id::new(row.0))
}

pub async fn update_status<'c, E>(executor: E, id: RideId, status: model::status::RideStatus) -> StoreResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query("UPDATE rides SET status = $2 WHERE id = $1;")
        .bind(id.raw())
        .bind(ride_status_to_sql(status))
        .execute(executor)
        .await
        .map_err(convert_error)?;
    Ok(())
}
