//! Candidate Selector: ranks and fans candidate drivers out to a request.

use chrono::{DateTime, Datelike, Duration, Local};
use futures::future::join_all;
use model::{
    collaborators::{SessionToken, UserId, UserRecord},
    error::{OrchestratorError, OrchestratorResult},
    status::{Direction, DriverLocationState, Gender},
};

use crate::{
    map_adapter::{Coordinates, MapAdapter, MapError},
    store::{DriverFilter, StoreOperations},
};

/// The 5-minute grace window added to a driver's schedule start.
pub const SCHEDULE_GRACE: Duration = Duration::minutes(5);

/// Drivers whose session heartbeat is older than this are not "online".
pub const ONLINE_STALENESS: Duration = Duration::minutes(5);

pub struct SelectionRequest {
    pub rider_lat: f64,
    pub rider_lng: f64,
    pub destination_lat: Option<f64>,
    pub destination_lng: Option<f64>,
    pub direction: Direction,
    pub requested_time: DateTime<Local>,
    pub min_rating: f64,
    pub preferred_gender: Option<Gender>,
    /// Already-resolved zone bounding box (min_lat, max_lat, min_lng, max_lng).
    pub zone: Option<(f64, f64, f64, f64)>,
    pub limit: usize,
}

impl SelectionRequest {
    pub const DEFAULT_LIMIT: usize = 10;
}

#[derive(Debug, Clone)]
pub struct SelectedDriver {
    pub driver_id: UserId,
    pub session_token: SessionToken,
    pub name: String,
    pub username: String,
    pub gender: Option<Gender>,
    pub avg_rating_driver: f64,
    pub completed_rides: i64,
    pub distance_km: f64,
    pub duration_min: f64,
    pub maps_url: String,
    pub area: Option<String>,
}

pub async fn select_candidates<S, M>(
    store: &mut S,
    map: &M,
    request: &SelectionRequest,
) -> OrchestratorResult<Vec<SelectedDriver>>
where
    S: StoreOperations,
    M: MapAdapter,
{
    let now = Local::now();
    let filter = DriverFilter {
        min_rating: request.min_rating,
        preferred_gender: request.preferred_gender,
        zone: request.zone,
        direction: request.direction,
        heartbeat_cutoff: now - ONLINE_STALENESS,
    };

    let drivers = store
        .online_drivers(&filter)
        .await
        .map_err(|why| OrchestratorError::SelectorFailed(why.to_string()))?;

    let drivers: Vec<UserRecord> = drivers
        .into_iter()
        .filter(|driver| direction_compatible(request.direction, driver.driver_location_state))
        .collect();

    let rider_coords = Coordinates {
        lat: request.rider_lat,
        lng: request.rider_lng,
    };

    let rider_to_dest = if request.direction == Direction::ToCampus {
        match (request.destination_lat, request.destination_lng) {
            (Some(lat), Some(lng)) => {
                match map.route(rider_coords, Coordinates { lat, lng }).await {
                    Ok(route) => Some(route.duration_min),
                    Err(_) => None,
                }
            }
            _ => None,
        }
    } else {
        None
    };

    let routed = join_all(drivers.into_iter().map(|driver| {
        let rider_coords = rider_coords;
        async move {
            let driver_coords = match (driver.latitude, driver.longitude) {
                (Some(lat), Some(lng)) => Coordinates { lat, lng },
                _ => return None,
            };
            match map.route(driver_coords, rider_coords).await {
                Ok(route) => Some((driver, route)),
                Err(MapError::MapUnavailable(_)) | Err(MapError::NoRoute(_)) => None,
            }
        }
    }))
    .await;

    let mut enriched: Vec<SelectedDriver> = Vec::new();
    for (driver, route) in routed.into_iter().flatten() {
        if request.direction == Direction::ToCampus {
            if let Some(rider_to_dest_min) = rider_to_dest {
                if let Some(window) = driver.schedule.window_for_weekday(request.requested_time.weekday()) {
                    let arrival = request.requested_time
                        + Duration::minutes(route.duration_min.round() as i64)
                        + Duration::minutes(rider_to_dest_min.round() as i64);
                    let deadline = request
                        .requested_time
                        .date_naive()
                        .and_time(window.start)
                        .and_local_timezone(Local)
                        .single()
                        .map(|deadline| deadline + SCHEDULE_GRACE);
                    if let Some(deadline) = deadline {
                        if arrival > deadline {
                            continue;
                        }
                    }
                }
            }
        }

        enriched.push(SelectedDriver {
            driver_id: driver.id,
            session_token: driver_session_token(&driver),
            name: driver.name,
            username: driver.username,
            gender: driver.gender,
            avg_rating_driver: driver.avg_rating_driver,
            completed_rides: driver.rides_count_driver,
            distance_km: route.distance_km,
            duration_min: route.duration_min,
            maps_url: route.maps_url,
            area: driver.area,
        });
    }

    enriched.sort_by(|a, b| {
        a.duration_min
            .partial_cmp(&b.duration_min)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.avg_rating_driver.partial_cmp(&a.avg_rating_driver).unwrap())
            .then_with(|| a.driver_id.raw().cmp(&b.driver_id.raw()))
    });
    enriched.truncate(request.limit);

    Ok(enriched)
}

fn direction_compatible(direction: Direction, state: DriverLocationState) -> bool {
    match direction {
        Direction::ToCampus => {
            matches!(state, DriverLocationState::Home | DriverLocationState::Unset)
        }
        Direction::FromCampus => {
            matches!(state, DriverLocationState::Campus | DriverLocationState::Unset)
        }
        Direction::Unknown => true,
    }
}

/// Session token lookup against the user store is a separate collaborator
/// call in the original; here we require callers to populate it on the
/// `UserRecord` they return from `online_drivers` (the store joins
/// `sessions` for exactly this reason).
fn driver_session_token(driver: &UserRecord) -> SessionToken {
    driver
        .current_session_token
        .clone()
        .unwrap_or_else(|| SessionToken(String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryStore;
    use model::collaborators::ScheduleWindow;
    use model::status::DriverLocationState;

    fn request(direction: Direction, dest: Option<(f64, f64)>) -> SelectionRequest {
        SelectionRequest {
            rider_lat: 33.90,
            rider_lng: 35.48,
            destination_lat: dest.map(|(lat, _)| lat),
            destination_lng: dest.map(|(_, lng)| lng),
            direction,
            requested_time: Local::now(),
            min_rating: 0.0,
            preferred_gender: None,
            zone: None,
            limit: SelectionRequest::DEFAULT_LIMIT,
        }
    }

    #[tokio::test]
    async fn schedule_filter_drops_driver_whose_arrival_misses_grace() {
        let store = InMemoryStore::new();
        let map = crate::map_adapter::FakeMapAdapter::new();
        let rider = Coordinates { lat: 33.90, lng: 35.48 };
        let dest = Coordinates { lat: 33.80, lng: 35.40 };
        map.set_route(
            rider,
            dest,
            Ok(crate::map_adapter::RouteInfo {
                distance_km: 10.0,
                duration_min: 25.0,
                maps_url: "u".into(),
            }),
        );

        let driver_a = store.add_online_driver("driver-a", 33.91, 35.47, DriverLocationState::Home);
        let driver_a_coords = Coordinates { lat: 33.91, lng: 35.47 };
        map.set_route(
            driver_a_coords,
            rider,
            Ok(crate::map_adapter::RouteInfo {
                distance_km: 2.0,
                duration_min: 10.0,
                maps_url: "u".into(),
            }),
        );
        store.set_schedule_window(
            driver_a,
            ScheduleWindow {
                start: chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                end: chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            },
        );

        let driver_b = store.add_online_driver("driver-b", 33.92, 35.46, DriverLocationState::Home);
        let driver_b_coords = Coordinates { lat: 33.92, lng: 35.46 };
        map.set_route(
            driver_b_coords,
            rider,
            Ok(crate::map_adapter::RouteInfo {
                distance_km: 2.0,
                duration_min: 10.0,
                maps_url: "u".into(),
            }),
        );
        store.set_schedule_window(
            driver_b,
            ScheduleWindow {
                start: chrono::NaiveTime::from_hms_opt(7, 50, 0).unwrap(),
                end: chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            },
        );

        let mut req = request(Direction::ToCampus, Some((33.80, 35.40)));
        req.requested_time = Local::now()
            .date_naive()
            .and_hms_opt(7, 30, 0)
            .unwrap()
            .and_local_timezone(Local)
            .unwrap();

        let mut store = store;
        let result = select_candidates(&mut store, &map, &req).await.unwrap();
        let ids: Vec<i64> = result.iter().map(|d| d.driver_id.raw()).collect();
        assert!(ids.contains(&driver_a.raw()));
        assert!(!ids.contains(&driver_b.raw()));
    }
}
