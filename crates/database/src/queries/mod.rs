use model::error::StoreError;

pub mod candidates;
pub mod ride_requests;
pub mod rides;
pub mod sessions;
pub mod users;

pub(crate) fn convert_error(why: sqlx::Error) -> StoreError {
    match why {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.constraint().is_some() => StoreError::Conflict,
        _ => StoreError::Other(Box::new(why)),
    }
}
