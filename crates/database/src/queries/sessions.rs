use model::{collaborators::SessionToken, error::StoreResult};
use sqlx::{Executor, Postgres};

use crate::data_model::sessions::SessionRow;

use super::convert_error;

pub async fn resolve<'c, E>(
    executor: E,
    token: &SessionToken,
) -> StoreResult<Option<model::collaborators::SessionRecord>>
where
    E: Executor<'c, Database = Postgres>,
{
    sqlx::query_as(
        "
        SELECT token, user_id, ip, port
        FROM sessions
        WHERE token = $1;
        ",
    )
    .bind(token.as_str())
    .fetch_optional(executor)
    .await
    .map_err(convert_error)
    .map(|row: Option<SessionRow>| row.map(SessionRow::to_model))
}
