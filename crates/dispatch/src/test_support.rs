//! In-memory fakes for dispatch unit tests. Not built for concurrency
//! correctness, only for exercising the orchestrator and selector logic
//! without a database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use model::{
    collaborators::{RideId, RideRecord, Schedule, ScheduleWindow, SessionRecord, SessionToken, UserId, UserRecord},
    error::{StoreError, StoreResult},
    ride_request::{CandidateId, CandidateRecord, RideRequestId, RideRequestRecord},
    status::{CandidateStatus, DriverLocationState, RideRequestStatus, RideStatus},
};

use crate::store::{
    DriverFilter, NewCandidateRow, NewRideRequestRow, NewRideRow, Store, StoreAutocommit, StoreReads,
    StoreTransaction, StoreWrites,
};

#[derive(Default)]
struct Inner {
    next_user_id: i64,
    next_request_id: i64,
    next_candidate_id: i64,
    next_ride_id: i64,
    users: HashMap<i64, UserRecord>,
    requests: HashMap<i64, RideRequestRecord>,
    candidates: HashMap<i64, CandidateRecord>,
    rides: HashMap<i64, RideRecord>,
    sessions: HashMap<String, SessionRecord>,
}

#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn add_online_driver(
        &self,
        username: &str,
        lat: f64,
        lng: f64,
        state: DriverLocationState,
    ) -> UserId {
        let mut inner = self.inner.lock().unwrap();
        inner.next_user_id += 1;
        let id = UserId::new(inner.next_user_id);
        let token = SessionToken(format!("tok-{}", id.raw()));
        inner.sessions.insert(
            token.as_str().to_owned(),
            SessionRecord {
                token: token.clone(),
                user_id: id,
                ip: "127.0.0.1".to_owned(),
                port: 0,
            },
        );
        inner.users.insert(
            id.raw(),
            UserRecord {
                id,
                username: username.to_owned(),
                name: username.to_owned(),
                gender: None,
                is_driver: true,
                area: None,
                latitude: Some(lat),
                longitude: Some(lng),
                avg_rating_driver: 5.0,
                rides_count_driver: 0,
                avg_rating_rider: 5.0,
                rides_count_rider: 0,
                driver_location_state: state,
                schedule: Schedule::default(),
                current_session_token: Some(token),
            },
        );
        id
    }

    pub fn set_schedule_window(&self, driver_id: UserId, window: ScheduleWindow) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.get_mut(&driver_id.raw()) {
            for day in user.schedule.days.iter_mut() {
                *day = Some(window);
            }
        }
    }

    pub fn user_snapshot(&self, id: UserId) -> UserRecord {
        self.inner.lock().unwrap().users.get(&id.raw()).cloned().unwrap()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreReads for InMemoryStore {
    async fn resolve_session(&mut self, token: &SessionToken) -> StoreResult<Option<SessionRecord>> {
        Ok(self.inner.lock().unwrap().sessions.get(token.as_str()).cloned())
    }

    async fn user(&mut self, id: UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.inner.lock().unwrap().users.get(&id.raw()).cloned())
    }

    async fn online_drivers(&mut self, filter: &DriverFilter) -> StoreResult<Vec<UserRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .values()
            .filter(|u| u.is_driver)
            .filter(|u| u.avg_rating_driver >= filter.min_rating)
            .filter(|u| filter.preferred_gender.map_or(true, |g| u.gender == Some(g)))
            .filter(|u| match filter.zone {
                Some((min_lat, max_lat, min_lng, max_lng)) => match (u.latitude, u.longitude) {
                    (Some(lat), Some(lng)) => {
                        (min_lat..=max_lat).contains(&lat) && (min_lng..=max_lng).contains(&lng)
                    }
                    _ => false,
                },
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn latest_request_for_rider(&mut self, rider_id: UserId) -> StoreResult<Option<RideRequestRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .requests
            .values()
            .filter(|r| r.rider_id == rider_id)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn request(&mut self, id: RideRequestId) -> StoreResult<Option<RideRequestRecord>> {
        Ok(self.inner.lock().unwrap().requests.get(&id.raw()).cloned())
    }

    async fn candidates_for_request(&mut self, request_id: RideRequestId) -> StoreResult<Vec<CandidateRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<CandidateRecord> = inner
            .candidates
            .values()
            .filter(|c| c.request_id == request_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.sequence);
        Ok(rows)
    }

    async fn candidate_by_request_and_driver(
        &mut self,
        request_id: RideRequestId,
        driver_id: UserId,
    ) -> StoreResult<Option<CandidateRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .candidates
            .values()
            .find(|c| c.request_id == request_id && c.driver_id == driver_id)
            .cloned())
    }

    async fn ride(&mut self, id: RideId) -> StoreResult<Option<RideRecord>> {
        Ok(self.inner.lock().unwrap().rides.get(&id.raw()).cloned())
    }

    async fn driver_pending_queue(
        &mut self,
        driver_id: UserId,
    ) -> StoreResult<Vec<(CandidateRecord, RideRequestRecord)>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .candidates
            .values()
            .filter(|c| c.driver_id == driver_id && c.status == CandidateStatus::Pending)
            .filter_map(|c| {
                inner
                    .requests
                    .get(&c.request_id.raw())
                    .map(|r| (c.clone(), r.clone()))
            })
            .collect())
    }

    async fn driver_active_queue(
        &mut self,
        driver_id: UserId,
    ) -> StoreResult<Vec<(CandidateRecord, RideRequestRecord, Option<RideRecord>)>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .candidates
            .values()
            .filter(|c| {
                c.driver_id == driver_id
                    && matches!(c.status, CandidateStatus::Accepted | CandidateStatus::Skipped)
            })
            .filter_map(|c| {
                inner.requests.get(&c.request_id.raw()).map(|r| {
                    let ride = r.ride_id.and_then(|rid| inner.rides.get(&rid.raw()).cloned());
                    (c.clone(), r.clone(), ride)
                })
            })
            .collect())
    }

    async fn requests_with_stale_pending(&mut self, cutoff: DateTime<Local>) -> StoreResult<Vec<RideRequestId>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .requests
            .values()
            .filter(|r| r.status == RideRequestStatus::DriverPending && r.updated_at < cutoff)
            .map(|r| r.id)
            .collect())
    }

    async fn requests_with_stale_confirm(&mut self, cutoff: DateTime<Local>) -> StoreResult<Vec<RideRequestId>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .requests
            .values()
            .filter(|r| r.status == RideRequestStatus::AwaitingRider && r.updated_at < cutoff)
            .map(|r| r.id)
            .collect())
    }
}

#[async_trait]
impl StoreWrites for InMemoryStore {
    async fn lock_request(&mut self, id: RideRequestId) -> StoreResult<RideRequestRecord> {
        self.inner
            .lock()
            .unwrap()
            .requests
            .get(&id.raw())
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert_request_with_candidates(
        &mut self,
        request: NewRideRequestRow,
        candidates: Vec<NewCandidateRow>,
    ) -> StoreResult<RideRequestId> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_request_id += 1;
        let request_id = RideRequestId::new(inner.next_request_id);
        let now = Local::now();
        inner.requests.insert(
            request_id.raw(),
            RideRequestRecord {
                id: request_id,
                rider_id: request.rider_id,
                rider_session_token: request.rider_session_token,
                pickup: request.pickup,
                destination: request.destination,
                requested_time: request.requested_time,
                min_rating: request.min_rating,
                preferred_gender: request.preferred_gender,
                status: RideRequestStatus::DriverPending,
                current_candidate_sequence: 1,
                current_driver_id: Some(request.current_driver_id),
                current_driver_session_token: Some(request.current_driver_session_token),
                rider_snapshot: request.rider_snapshot,
                message: None,
                ride_id: None,
                created_at: now,
                updated_at: now,
                last_driver_response_at: None,
            },
        );
        for row in candidates {
            inner.next_candidate_id += 1;
            let candidate_id = CandidateId::new(inner.next_candidate_id);
            inner.candidates.insert(
                candidate_id.raw(),
                CandidateRecord {
                    id: candidate_id,
                    request_id,
                    sequence: row.sequence,
                    driver_id: row.driver_id,
                    driver_session_token: row.driver_session_token,
                    driver_name: row.driver_name,
                    driver_username: row.driver_username,
                    driver_rating: row.driver_rating,
                    driver_completed_rides: row.driver_completed_rides,
                    driver_area: row.driver_area,
                    duration_min: row.duration_min,
                    distance_km: row.distance_km,
                    maps_url: row.maps_url,
                    status: row.status,
                    assigned_at: row.assigned_at,
                    responded_at: None,
                    message: None,
                },
            );
        }
        Ok(request_id)
    }

    async fn update_request(&mut self, request: &RideRequestRecord) -> StoreResult<()> {
        self.inner.lock().unwrap().requests.insert(request.id.raw(), request.clone());
        Ok(())
    }

    async fn update_candidate(&mut self, candidate: &CandidateRecord) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .candidates
            .insert(candidate.id.raw(), candidate.clone());
        Ok(())
    }

    async fn insert_ride(&mut self, ride: NewRideRow) -> StoreResult<RideId> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_ride_id += 1;
        let id = RideId::new(inner.next_ride_id);
        inner.rides.insert(
            id.raw(),
            RideRecord {
                id,
                rider_id: ride.rider_id,
                driver_id: ride.driver_id,
                pickup_area: ride.pickup_area,
                destination: ride.destination,
                requested_time: ride.requested_time,
                status: RideStatus::Pending,
                rider_session_token: ride.rider_session_token,
                driver_session_token: ride.driver_session_token,
                accepted_at: Local::now(),
            },
        );
        Ok(id)
    }

    async fn update_ride_status(&mut self, id: RideId, status: RideStatus) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ride) = inner.rides.get_mut(&id.raw()) {
            ride.status = status;
        }
        Ok(())
    }

    async fn update_driver_rating(&mut self, driver_id: UserId, rating: f64) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.get_mut(&driver_id.raw()) {
            let n = user.rides_count_driver as f64;
            user.avg_rating_driver = (user.avg_rating_driver * n + rating) / (n + 1.0);
            user.rides_count_driver += 1;
        }
        Ok(())
    }

    async fn update_rider_rating(&mut self, rider_id: UserId, rating: f64) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.get_mut(&rider_id.raw()) {
            let n = user.rides_count_rider as f64;
            user.avg_rating_rider = (user.avg_rating_rider * n + rating) / (n + 1.0);
            user.rides_count_rider += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryStore {
    async fn commit(self) -> StoreResult<()> {
        Ok(())
    }
}

impl StoreAutocommit for InMemoryStore {}

#[async_trait]
impl Store for InMemoryStore {
    type Transaction = InMemoryStore;
    type Autocommit = InMemoryStore;

    fn auto(&self) -> Self::Autocommit {
        self.clone()
    }

    async fn transaction(&self) -> StoreResult<Self::Transaction> {
        Ok(self.clone())
    }

    async fn perform_transaction<T, E, F>(&self, action: F) -> Result<T, E>
    where
        T: Send,
        E: From<StoreError> + Send,
        F: for<'a> FnOnce(&'a mut Self::Transaction) -> futures::future::BoxFuture<'a, Result<T, E>> + Send,
    {
        let mut txn = self.clone();
        action(&mut txn).await
    }
}
