use model::{
    collaborators::{Schedule, SessionToken, UserRecord},
    status::{DriverLocationState, Gender},
};
use sqlx::{prelude::FromRow, types::Json};
use utility::id::Id;

use super::unknown_variant;

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub gender: Option<String>,
    pub is_driver: bool,
    pub area: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub avg_rating_driver: f64,
    pub rides_count_driver: i64,
    pub avg_rating_rider: f64,
    pub rides_count_rider: i64,
    pub driver_location_state: String,
    pub schedule: Json<Schedule>,
    /// Present only on rows produced by the `online_drivers` join against
    /// `sessions`; absent for a plain `users` lookup.
    pub current_session_token: Option<String>,
}

impl UserRow {
    pub fn to_model(self) -> Result<UserRecord, sqlx::Error> {
        Ok(UserRecord {
            id: Id::new(self.id),
            username: self.username,
            name: self.name,
            gender: parse_gender(self.gender.as_deref())?,
            is_driver: self.is_driver,
            area: self.area,
            latitude: self.latitude,
            longitude: self.longitude,
            avg_rating_driver: self.avg_rating_driver,
            rides_count_driver: self.rides_count_driver,
            avg_rating_rider: self.avg_rating_rider,
            rides_count_rider: self.rides_count_rider,
            driver_location_state: parse_driver_location_state(&self.driver_location_state)?,
            schedule: self.schedule.0,
            current_session_token: self.current_session_token.map(SessionToken),
        })
    }
}

pub fn gender_to_sql(gender: Option<Gender>) -> Option<&'static str> {
    gender.map(|gender| match gender {
        Gender::Male => "male",
        Gender::Female => "female",
    })
}

fn parse_gender(value: Option<&str>) -> Result<Option<Gender>, sqlx::Error> {
    match value {
        None => Ok(None),
        Some("male") => Ok(Some(Gender::Male)),
        Some("female") => Ok(Some(Gender::Female)),
        Some(other) => Err(sqlx::Error::Decode(Box::new(unknown_variant("gender", other)))),
    }
}

pub fn driver_location_state_to_sql(state: DriverLocationState) -> &'static str {
    match state {
        DriverLocationState::Home => "home",
        DriverLocationState::Campus => "campus",
        DriverLocationState::Unset => "unset",
    }
}

fn parse_driver_location_state(value: &str) -> Result<DriverLocationState, sqlx::Error> {
    match value {
        "home" => Ok(DriverLocationState::Home),
        "campus" => Ok(DriverLocationState::Campus),
        "unset" => Ok(DriverLocationState::Unset),
        other => Err(sqlx::Error::Decode(Box::new(unknown_variant(
            "driver_location_state",
            other,
        )))),
    }
}
