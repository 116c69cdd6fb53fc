//! Postgres-backed [`dispatch::store::Store`]: autocommit reads go straight
//! through the pool; every write the hard core makes goes through
//! `perform_transaction` against `PgStoreTransaction`.

use std::env;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use dispatch::store::{
    DriverFilter, NewCandidateRow, NewRideRequestRow, NewRideRow, Store, StoreAutocommit, StoreReads,
    StoreTransaction, StoreWrites,
};
use model::{
    collaborators::{RideId, RideRecord, SessionRecord, SessionToken, UserId, UserRecord},
    error::{StoreError, StoreResult},
    ride_request::{CandidateRecord, RideRequestId, RideRequestRecord},
    status::RideStatus,
};
use sqlx::Transaction;

pub mod data_model;
pub mod queries;

pub struct DatabaseConnectionInfo {
    pub username: String,
    pub password: String,
    pub hostname: String,
    pub port: u16,
    pub database: String,
}

impl DatabaseConnectionInfo {
    pub fn from_env() -> Option<Self> {
        let username = env::var("DATABASE_USER").ok()?;
        let password = env::var("DATABASE_PASSWORD").ok()?;
        let hostname = env::var("DATABASE_HOST").ok()?;
        let port: u16 = env::var("DATABASE_PORT").ok()?.parse().ok()?;
        let database = env::var("DATABASE_NAME").ok()?;
        Some(Self {
            username,
            password,
            hostname,
            port,
            database,
        })
    }

    fn postgres_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.hostname, self.port, self.database
        )
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub async fn connect(info: &DatabaseConnectionInfo) -> Result<Self, Box<dyn std::error::Error>> {
        Self::connect_url(&info.postgres_url()).await
    }

    /// Connects from a bare Postgres DSN, for callers (the gateway CLI) that
    /// take the connection target as a single `--db-path` argument rather
    /// than the discrete `DATABASE_*` variables `from_env` expects.
    pub async fn connect_url(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let pool = sqlx::postgres::PgPool::connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

pub struct PgStoreTransaction<'a> {
    tx: Transaction<'a, sqlx::Postgres>,
}

#[async_trait]
impl<'a> StoreTransaction for PgStoreTransaction<'a> {
    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(queries::convert_error)
    }
}

pub struct PgStoreAutocommit {
    pool: sqlx::PgPool,
}

impl StoreAutocommit for PgStoreAutocommit {}

#[async_trait]
impl Store for PgStore {
    type Transaction = PgStoreTransaction<'static>;
    type Autocommit = PgStoreAutocommit;

    fn auto(&self) -> Self::Autocommit {
        PgStoreAutocommit { pool: self.pool.clone() }
    }

    async fn transaction(&self) -> StoreResult<Self::Transaction> {
        let tx = self.pool.begin().await.map_err(queries::convert_error)?;
        Ok(PgStoreTransaction { tx })
    }

    async fn perform_transaction<T, E, F>(&self, action: F) -> Result<T, E>
    where
        T: Send,
        E: From<StoreError> + Send,
        F: for<'a> FnOnce(&'a mut Self::Transaction) -> futures::future::BoxFuture<'a, Result<T, E>> + Send,
    {
        let tx = self.pool.begin().await.map_err(queries::convert_error)?;
        let mut tx = PgStoreTransaction { tx };
        let result = action(&mut tx).await;
        tx.tx.commit().await.map_err(queries::convert_error)?;
        result
    }
}

#[async_trait]
impl StoreReads for PgStoreAutocommit {
    async fn resolve_session(&mut self, token: &SessionToken) -> StoreResult<Option<SessionRecord>> {
        queries::sessions::resolve(&self.pool, token).await
    }

    async fn user(&mut self, id: UserId) -> StoreResult<Option<UserRecord>> {
        queries::users::get(&self.pool, id).await
    }

    async fn online_drivers(&mut self, filter: &DriverFilter) -> StoreResult<Vec<UserRecord>> {
        queries::users::online_drivers(&self.pool, filter).await
    }

    async fn latest_request_for_rider(&mut self, rider_id: UserId) -> StoreResult<Option<RideRequestRecord>> {
        queries::ride_requests::latest_for_rider(&self.pool, rider_id).await
    }

    async fn request(&mut self, id: RideRequestId) -> StoreResult<Option<RideRequestRecord>> {
        queries::ride_requests::get(&self.pool, id).await
    }

    async fn candidates_for_request(&mut self, request_id: RideRequestId) -> StoreResult<Vec<CandidateRecord>> {
        queries::candidates::for_request(&self.pool, request_id).await
    }

    async fn candidate_by_request_and_driver(
        &mut self,
        request_id: RideRequestId,
        driver_id: UserId,
    ) -> StoreResult<Option<CandidateRecord>> {
        queries::candidates::by_request_and_driver(&self.pool, request_id, driver_id).await
    }

    async fn ride(&mut self, id: RideId) -> StoreResult<Option<RideRecord>> {
        queries::rides::get(&self.pool, id).await
    }

    async fn driver_pending_queue(
        &mut self,
        driver_id: UserId,
    ) -> StoreResult<Vec<(CandidateRecord, RideRequestRecord)>> {
        queries::candidates::pending_queue(&self.pool, driver_id).await
    }

    async fn driver_active_queue(
        &mut self,
        driver_id: UserId,
    ) -> StoreResult<Vec<(CandidateRecord, RideRequestRecord, Option<RideRecord>)>> {
        queries::candidates::active_queue(&self.pool, driver_id).await
    }

    async fn requests_with_stale_pending(&mut self, cutoff: DateTime<Local>) -> StoreResult<Vec<RideRequestId>> {
        queries::ride_requests::stale_pending(&self.pool, cutoff).await
    }

    async fn requests_with_stale_confirm(&mut self, cutoff: DateTime<Local>) -> StoreResult<Vec<RideRequestId>> {
        queries::ride_requests::stale_confirm(&self.pool, cutoff).await
    }
}

#[async_trait]
impl<'a> StoreReads for PgStoreTransaction<'a> {
    async fn resolve_session(&mut self, token: &SessionToken) -> StoreResult<Option<SessionRecord>> {
        queries::sessions::resolve(&mut *self.tx, token).await
    }

    async fn user(&mut self, id: UserId) -> StoreResult<Option<UserRecord>> {
        queries::users::get(&mut *self.tx, id).await
    }

    async fn online_drivers(&mut self, filter: &DriverFilter) -> StoreResult<Vec<UserRecord>> {
        queries::users::online_drivers(&mut *self.tx, filter).await
    }

    async fn latest_request_for_rider(&mut self, rider_id: UserId) -> StoreResult<Option<RideRequestRecord>> {
        queries::ride_requests::latest_for_rider(&mut *self.tx, rider_id).await
    }

    async fn request(&mut self, id: RideRequestId) -> StoreResult<Option<RideRequestRecord>> {
        queries::ride_requests::get(&mut *self.tx, id).await
    }

    async fn candidates_for_request(&mut self, request_id: RideRequestId) -> StoreResult<Vec<CandidateRecord>> {
        queries::candidates::for_request(&mut *self.tx, request_id).await
    }

    async fn candidate_by_request_and_driver(
        &mut self,
        request_id: RideRequestId,
        driver_id: UserId,
    ) -> StoreResult<Option<CandidateRecord>> {
        queries::candidates::by_request_and_driver(&mut *self.tx, request_id, driver_id).await
    }

    async fn ride(&mut self, id: RideId) -> StoreResult<Option<RideRecord>> {
        queries::rides::get(&mut *self.tx, id).await
    }

    async fn driver_pending_queue(
        &mut self,
        driver_id: UserId,
    ) -> StoreResult<Vec<(CandidateRecord, RideRequestRecord)>> {
        queries::candidates::pending_queue(&mut *self.tx, driver_id).await
    }

    async fn driver_active_queue(
        &mut self,
        driver_id: UserId,
    ) -> StoreResult<Vec<(CandidateRecord, RideRequestRecord, Option<RideRecord>)>> {
        queries::candidates::active_queue(&mut *self.tx, driver_id).await
    }

    async fn requests_with_stale_pending(&mut self, cutoff: DateTime<Local>) -> StoreResult<Vec<RideRequestId>> {
        queries::ride_requests::stale_pending(&mut *self.tx, cutoff).await
    }

    async fn requests_with_stale_confirm(&mut self, cutoff: DateTime<Local>) -> StoreResult<Vec<RideRequestId>> {
        queries::ride_requests::stale_confirm(&mut *self.tx, cutoff).await
    }
}

#[async_trait]
impl StoreWrites for PgStoreAutocommit {
    async fn lock_request(&mut self, _id: RideRequestId) -> StoreResult<RideRequestRecord> {
        Err(StoreError::other(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "locking a request requires an open transaction",
        )))
    }

    async fn insert_request_with_candidates(
        &mut self,
        request: NewRideRequestRow,
        candidates: Vec<NewCandidateRow>,
    ) -> StoreResult<RideRequestId> {
        let mut tx = self.pool.begin().await.map_err(queries::convert_error)?;
        let id = queries::ride_requests::insert_with_candidates(&mut tx, request, candidates).await?;
        tx.commit().await.map_err(queries::convert_error)?;
        Ok(id)
    }

    async fn update_request(&mut self, request: &RideRequestRecord) -> StoreResult<()> {
        queries::ride_requests::update(&self.pool, request).await
    }

    async fn update_candidate(&mut self, candidate: &CandidateRecord) -> StoreResult<()> {
        queries::candidates::update(&self.pool, candidate).await
    }

    async fn insert_ride(&mut self, ride: NewRideRow) -> StoreResult<RideId> {
        let mut tx = self.pool.begin().await.map_err(queries::convert_error)?;
        let id = queries::rides::insert(&mut tx, ride).await?;
        tx.commit().await.map_err(queries::convert_error)?;
        Ok(id)
    }

    async fn update_ride_status(&mut self, id: RideId, status: RideStatus) -> StoreResult<()> {
        queries::rides::update_status(&self.pool, id, status).await
    }

    async fn update_driver_rating(&mut self, driver_id: UserId, rating: f64) -> StoreResult<()> {
        queries::users::update_driver_rating(&self.pool, driver_id, rating).await
    }

    async fn update_rider_rating(&mut self, rider_id: UserId, rating: f64) -> StoreResult<()> {
        queries::users::update_rider_rating(&self.pool, rider_id, rating).await
    }
}

#[async_trait]
impl<'a> StoreWrites for PgStoreTransaction<'a> {
    async fn lock_request(&mut self, id: RideRequestId) -> StoreResult<RideRequestRecord> {
        queries::ride_requests::lock(&mut self.tx, id).await
    }

    async fn insert_request_with_candidates(
        &mut self,
        request: NewRideRequestRow,
        candidates: Vec<NewCandidateRow>,
    ) -> StoreResult<RideRequestId> {
        queries::ride_requests::insert_with_candidates(&mut self.tx, request, candidates).await
    }

    async fn update_request(&mut self, request: &RideRequestRecord) -> StoreResult<()> {
        queries::ride_requests::update(&mut *self.tx, request).await
    }

    async fn update_candidate(&mut self, candidate: &CandidateRecord) -> StoreResult<()> {
        queries::candidates::update(&mut *self.tx, candidate).await
    }

    async fn insert_ride(&mut self, ride: NewRideRow) -> StoreResult<RideId> {
        queries::rides::insert(&mut self.tx, ride).await
    }

    async fn update_ride_status(&mut self, id: RideId, status: RideStatus) -> StoreResult<()> {
        queries::rides::update_status(&mut *self.tx, id, status).await
    }

    async fn update_driver_rating(&mut self, driver_id: UserId, rating: f64) -> StoreResult<()> {
        queries::users::update_driver_rating(&mut *self.tx, driver_id, rating).await
    }

    async fn update_rider_rating(&mut self, rider_id: UserId, rating: f64) -> StoreResult<()> {
        queries::users::update_rider_rating(&mut *self.tx, rider_id, rating).await
    }
}
