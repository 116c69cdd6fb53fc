//! The persistence boundary, split into autocommit and transaction handles
//! so that every orchestrator operation can run under a single
//! serializable transaction that touches both the request and candidate
//! tables, while plain reads use the autocommit handle.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use model::{
    collaborators::{RideId, RideRecord, SessionRecord, SessionToken, UserId, UserRecord},
    error::{StoreError, StoreResult},
    ride_request::{CandidateId, CandidateRecord, RideRequestId, RideRequestRecord},
    status::{Direction, Gender, RideStatus},
};

/// Filter applied by the candidate selector's online-driver query: online +
/// rating + gender + zone are plain `WHERE` predicates; direction
/// compatibility is folded in here too since it is just another predicate
/// over `driver_location_state`.
#[derive(Debug, Clone)]
pub struct DriverFilter {
    pub min_rating: f64,
    pub preferred_gender: Option<Gender>,
    pub zone: Option<(f64, f64, f64, f64)>,
    pub direction: Direction,
    pub heartbeat_cutoff: DateTime<Local>,
}

pub struct NewCandidateRow {
    pub sequence: i32,
    pub driver_id: UserId,
    pub driver_session_token: SessionToken,
    pub driver_name: String,
    pub driver_username: String,
    pub driver_rating: f64,
    pub driver_completed_rides: i64,
    pub driver_area: Option<String>,
    pub duration_min: f64,
    pub distance_km: f64,
    pub maps_url: String,
    pub status: model::status::CandidateStatus,
    pub assigned_at: Option<DateTime<Local>>,
}

pub struct NewRideRequestRow {
    pub rider_id: UserId,
    pub rider_session_token: SessionToken,
    pub pickup: model::ride_request::PickupLocation,
    pub destination: model::ride_request::Destination,
    pub requested_time: DateTime<Local>,
    pub min_rating: f64,
    pub preferred_gender: Option<Gender>,
    pub rider_snapshot: model::ride_request::RiderSnapshot,
    pub current_driver_id: UserId,
    pub current_driver_session_token: SessionToken,
}

pub struct NewRideRow {
    pub rider_id: UserId,
    pub driver_id: UserId,
    pub pickup_area: String,
    pub destination: String,
    pub requested_time: DateTime<Local>,
    pub rider_session_token: SessionToken,
    pub driver_session_token: SessionToken,
}

#[async_trait]
pub trait StoreReads: Send {
    async fn resolve_session(&mut self, token: &SessionToken) -> StoreResult<Option<SessionRecord>>;
    async fn user(&mut self, id: UserId) -> StoreResult<Option<UserRecord>>;
    async fn online_drivers(&mut self, filter: &DriverFilter) -> StoreResult<Vec<UserRecord>>;
    async fn latest_request_for_rider(
        &mut self,
        rider_id: UserId,
    ) -> StoreResult<Option<RideRequestRecord>>;
    async fn request(&mut self, id: RideRequestId) -> StoreResult<Option<RideRequestRecord>>;
    async fn candidates_for_request(
        &mut self,
        request_id: RideRequestId,
    ) -> StoreResult<Vec<CandidateRecord>>;
    async fn candidate_by_request_and_driver(
        &mut self,
        request_id: RideRequestId,
        driver_id: UserId,
    ) -> StoreResult<Option<CandidateRecord>>;
    async fn ride(&mut self, id: RideId) -> StoreResult<Option<RideRecord>>;
    async fn driver_pending_queue(
        &mut self,
        driver_id: UserId,
    ) -> StoreResult<Vec<(CandidateRecord, RideRequestRecord)>>;
    async fn driver_active_queue(
        &mut self,
        driver_id: UserId,
    ) -> StoreResult<Vec<(CandidateRecord, RideRequestRecord, Option<RideRecord>)>>;
    /// Requests currently `DRIVER_PENDING` with a candidate `PENDING` since
    /// before `cutoff` — sweep target for the `T_pending` timeout.
    async fn requests_with_stale_pending(
        &mut self,
        cutoff: DateTime<Local>,
    ) -> StoreResult<Vec<RideRequestId>>;
    /// Requests `AWAITING_RIDER` since before `cutoff` — sweep target for
    /// the `T_confirm` timeout.
    async fn requests_with_stale_confirm(
        &mut self,
        cutoff: DateTime<Local>,
    ) -> StoreResult<Vec<RideRequestId>>;
}

#[async_trait]
pub trait StoreWrites: Send {
    /// Locks the request row for the duration of the transaction (`SELECT
    /// ... FOR UPDATE`), giving every orchestrator operation linearizability
    /// per request.
    async fn lock_request(&mut self, id: RideRequestId) -> StoreResult<RideRequestRecord>;
    async fn insert_request_with_candidates(
        &mut self,
        request: NewRideRequestRow,
        candidates: Vec<NewCandidateRow>,
    ) -> StoreResult<RideRequestId>;
    async fn update_request(&mut self, request: &RideRequestRecord) -> StoreResult<()>;
    async fn update_candidate(&mut self, candidate: &CandidateRecord) -> StoreResult<()>;
    async fn insert_ride(&mut self, ride: NewRideRow) -> StoreResult<RideId>;
    async fn update_ride_status(&mut self, id: RideId, status: RideStatus) -> StoreResult<()>;
    async fn update_driver_rating(&mut self, driver_id: UserId, rating: f64) -> StoreResult<()>;
    async fn update_rider_rating(&mut self, rider_id: UserId, rating: f64) -> StoreResult<()>;
}

pub trait StoreOperations: StoreReads + StoreWrites {}
impl<T: StoreReads + StoreWrites> StoreOperations for T {}

#[async_trait]
pub trait StoreTransaction: StoreOperations {
    async fn commit(self) -> StoreResult<()>;
}

pub trait StoreAutocommit: StoreOperations {}

#[async_trait]
pub trait Store: Clone + Send + Sync + Sized + 'static {
    type Transaction: StoreTransaction + Send;
    type Autocommit: StoreAutocommit + Send;

    fn auto(&self) -> Self::Autocommit;

    async fn transaction(&self) -> StoreResult<Self::Transaction>;

    /// Runs `action` inside a fresh transaction and commits it. `action`'s
    /// error type is generic over anything a `StoreError` converts into, so
    /// orchestrator operations can return `OrchestratorError` straight out
    /// of the closure instead of translating twice.
    async fn perform_transaction<T, E, F>(&self, action: F) -> Result<T, E>
    where
        T: Send,
        E: From<StoreError> + Send,
        F: for<'a> FnOnce(&'a mut Self::Transaction) -> futures::future::BoxFuture<'a, Result<T, E>> + Send;
}
