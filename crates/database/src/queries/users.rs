use dispatch::store::DriverFilter;
use model::{collaborators::UserId, error::StoreResult};
use sqlx::{Executor, Postgres};

use crate::data_model::users::{gender_to_sql, UserRow};

use super::convert_error;

const USER_COLUMNS: &str = "
    id, username, name, gender, is_driver, area, latitude, longitude,
    avg_rating_driver, rides_count_driver, avg_rating_rider, rides_count_rider,
    driver_location_state, schedule, NULL::text AS current_session_token
";

pub async fn get<'c, E>(executor: E, id: UserId) -> StoreResult<Option<model::collaborators::UserRecord>>
where
    E: Executor<'c, Database = Postgres>,
{
    let row: Option<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1;"
    ))
    .bind(id.raw())
    .fetch_optional(executor)
    .await
    .map_err(convert_error)?;

    row.map(UserRow::to_model).transpose().map_err(convert_error)
}

/// Online drivers joined against their most recent session; `DISTINCT ON`
/// keeps one row per driver even if several sessions are fresher than the
/// heartbeat cutoff.
pub async fn online_drivers<'c, E>(
    executor: E,
    filter: &DriverFilter,
) -> StoreResult<Vec<model::collaborators::UserRecord>>
where
    E: Executor<'c, Database = Postgres>,
{
    let mut query = String::from(
        "
        SELECT DISTINCT ON (u.id)
            u.id, u.username, u.name, u.gender, u.is_driver, u.area, u.latitude, u.longitude,
            u.avg_rating_driver, u.rides_count_driver, u.avg_rating_rider, u.rides_count_rider,
            u.driver_location_state, u.schedule, s.token AS current_session_token
        FROM users u
        JOIN sessions s ON s.user_id = u.id
        WHERE u.is_driver
          AND u.avg_rating_driver >= $1
          AND s.created_at >= $2
        ",
    );
    let mut next_param = 3;
    if filter.preferred_gender.is_some() {
        query.push_str(&format!(" AND u.gender = ${next_param}"));
        next_param += 1;
    }
    if filter.zone.is_some() {
        query.push_str(&format!(
            " AND u.latitude BETWEEN ${next_param} AND ${} AND u.longitude BETWEEN ${} AND ${}",
            next_param + 1,
            next_param + 2,
            next_param + 3
        ));
    }
    query.push_str(" ORDER BY u.id, s.created_at DESC;");

    let mut built = sqlx::query_as(&query).bind(filter.min_rating).bind(filter.heartbeat_cutoff);
    if let Some(gender) = filter.preferred_gender {
        built = built.bind(gender_to_sql(Some(gender)));
    }
    if let Some((min_lat, max_lat, min_lng, max_lng)) = filter.zone {
        built = built.bind(min_lat).bind(max_lat).bind(min_lng).bind(max_lng);
    }

    let rows: Vec<UserRow> = built.fetch_all(executor).await.map_err(convert_error)?;
    rows.into_iter()
        .map(UserRow::to_model)
        .collect::<Result<Vec<_>, _>>()
        .map_err(convert_error)
}

pub async fn update_driver_rating<'c, E>(executor: E, driver_id: UserId, rating: f64) -> StoreResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        UPDATE users
        SET avg_rating_driver = (avg_rating_driver * rides_count_driver + $2) / (rides_count_driver + 1),
            rides_count_driver = rides_count_driver + 1
        WHERE id = $1;
        ",
    )
    .bind(driver_id.raw())
    .bind(rating)
    .execute(executor)
    .await
    .map_err(convert_error)?;
    Ok(())
}

pub async fn update_rider_rating<'c, E>(executor: E, rider_id: UserId, rating: f64) -> StoreResult<()>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query(
        "
        UPDATE users
        SET avg_rating_rider = (avg_rating_rider * rides_count_rider + $2) / (rides_count_rider + 1),
            rides_count_rider = rides_count_rider + 1
        WHERE id = $1;
        ",
    )
    .bind(rider_id.raw())
    .bind(rating)
    .execute(executor)
    .await
    .map_err(convert_error)?;
    Ok(())
}
