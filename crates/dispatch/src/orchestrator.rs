//! The Request Orchestrator — the hard core. Owns every transition of the
//! `RideRequest` / `RideRequestCandidate` pair and executes each one under
//! a single store transaction that locks the request row first.

use chrono::{DateTime, Duration, Local};
use serde::Serialize;

use model::{
    collaborators::{RideId, SessionToken, UserId},
    error::{OrchestratorError, OrchestratorResult},
    ride_request::{CandidateRecord, Destination, PickupLocation, RideRequestId, RideRequestRecord, RiderSnapshot},
    status::{CandidateStatus, Direction, DriverDecisionKind, Gender, RideRequestStatus, RideStatus},
};

use crate::{
    map_adapter::{Coordinates, MapAdapter},
    selector::{select_candidates, SelectedDriver, SelectionRequest},
    store::{NewCandidateRow, NewRideRequestRow, NewRideRow, Store, StoreOperations, StoreReads, StoreWrites},
};

/// Fan-out width, candidate timeout, and confirmation timeout, pinned as
/// single global values rather than per-deployment knobs.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub fanout_width: usize,
    pub pending_timeout: Duration,
    pub confirm_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fanout_width: 3,
            pending_timeout: Duration::seconds(60),
            confirm_timeout: Duration::seconds(120),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverView {
    pub driver_id: UserId,
    pub name: String,
    pub username: String,
    pub gender: Option<Gender>,
    pub avg_rating_driver: f64,
    pub distance_km: f64,
    pub duration_min: f64,
    pub maps_url: String,
    pub area: Option<String>,
}

impl DriverView {
    fn from_selected(driver: &SelectedDriver) -> Self {
        Self {
            driver_id: driver.driver_id,
            name: driver.name.clone(),
            username: driver.username.clone(),
            gender: driver.gender,
            avg_rating_driver: driver.avg_rating_driver,
            distance_km: driver.distance_km,
            duration_min: driver.duration_min,
            maps_url: driver.maps_url.clone(),
            area: driver.area.clone(),
        }
    }

    fn from_candidate(candidate: &CandidateRecord) -> Self {
        Self {
            driver_id: candidate.driver_id,
            name: candidate.driver_name.clone(),
            username: candidate.driver_username.clone(),
            gender: None,
            avg_rating_driver: candidate.driver_rating,
            distance_km: candidate.distance_km,
            duration_min: candidate.duration_min,
            maps_url: candidate.maps_url.clone(),
            area: candidate.driver_area.clone(),
        }
    }
}

pub struct CreateInput {
    pub rider_session_token: SessionToken,
    pub pickup: PickupLocation,
    pub destination: Destination,
    pub direction: Direction,
    pub requested_time: DateTime<Local>,
    pub min_rating: f64,
    pub preferred_gender: Option<Gender>,
    pub zone: Option<(f64, f64, f64, f64)>,
}

pub struct CreateOutput {
    pub request_id: RideRequestId,
    pub status: RideRequestStatus,
    pub current_driver: Option<DriverView>,
    pub drivers_total: usize,
    pub message: Option<String>,
}

pub struct DriverQueueOutput {
    pub pending: Vec<PendingEntry>,
    pub active: Vec<ActiveEntry>,
}

pub struct PendingEntry {
    pub request_id: RideRequestId,
    pub sequence: i32,
    pub assigned_at: Option<DateTime<Local>>,
    pub rider_snapshot: RiderSnapshot,
    pub duration_min: f64,
    pub distance_km: f64,
}

pub struct ActiveEntry {
    pub request_id: RideRequestId,
    pub sequence: i32,
    pub request_status: RideRequestStatus,
    pub rider_snapshot: RiderSnapshot,
    pub responded_at: Option<DateTime<Local>>,
    pub maps_url: Option<String>,
}

pub struct DriverDecisionInput {
    pub driver_session_token: SessionToken,
    pub request_id: RideRequestId,
    pub decision: DriverDecisionKind,
    pub note: Option<String>,
}

pub struct DriverDecisionOutput {
    pub request_id: RideRequestId,
    pub status: RideRequestStatus,
    pub current_driver: Option<DriverView>,
}

pub struct RiderConfirmInput {
    pub rider_session_token: SessionToken,
    pub request_id: RideRequestId,
}

pub struct RiderConfirmOutput {
    pub request_id: RideRequestId,
    pub ride_id: RideId,
    pub maps_url: String,
}

pub struct RiderCancelInput {
    pub rider_session_token: SessionToken,
    pub request_id: RideRequestId,
    pub note: Option<String>,
}

pub struct RiderCancelOutput {
    pub request_id: RideRequestId,
    pub status: RideRequestStatus,
}

pub struct RiderStatusOutput {
    pub request: RideRequestRecord,
    pub current_driver: Option<DriverView>,
    pub ride_status: Option<RideStatus>,
}

pub struct RequestOrchestrator<S: Store, M: MapAdapter> {
    store: S,
    map: M,
    config: OrchestratorConfig,
}

impl<S: Store, M: MapAdapter> RequestOrchestrator<S, M> {
    pub fn new(store: S, map: M, config: OrchestratorConfig) -> Self {
        Self { store, map, config }
    }

    async fn resolve_session_user(&self, token: &SessionToken) -> OrchestratorResult<UserId> {
        let mut auto = self.store.auto();
        let session = auto
            .resolve_session(token)
            .await?
            .ok_or(OrchestratorError::AuthRequired)?;
        Ok(session.user_id)
    }

    /// Creates a request and fans it out to the first `fanout_width` candidates.
    pub async fn create(&self, input: CreateInput) -> OrchestratorResult<CreateOutput> {
        let mut auto = self.store.auto();
        let session = auto
            .resolve_session(&input.rider_session_token)
            .await?
            .ok_or(OrchestratorError::AuthRequired)?;
        let rider_id = session.user_id;

        if let Some(existing) = auto.latest_request_for_rider(rider_id).await? {
            if !existing.status.is_terminal() {
                return Err(OrchestratorError::RequestInFlight);
            }
        }

        let rider = auto
            .user(rider_id)
            .await?
            .ok_or(OrchestratorError::AuthRequired)?;

        let selection = SelectionRequest {
            rider_lat: input.pickup.latitude.unwrap_or_default(),
            rider_lng: input.pickup.longitude.unwrap_or_default(),
            destination_lat: input.destination.latitude,
            destination_lng: input.destination.longitude,
            direction: input.direction,
            requested_time: input.requested_time,
            min_rating: input.min_rating,
            preferred_gender: input.preferred_gender,
            zone: input.zone,
            limit: SelectionRequest::DEFAULT_LIMIT,
        };
        let candidates = select_candidates(&mut auto, &self.map, &selection).await?;
        if candidates.is_empty() {
            return Err(OrchestratorError::NoDriversAvailable);
        }

        let rider_snapshot = RiderSnapshot {
            name: rider.name.clone(),
            username: rider.username.clone(),
            gender: rider.gender,
            avg_rating_rider: rider.avg_rating_rider,
            rides_count: rider.rides_count_rider,
        };

        let now = Local::now();
        let drivers_total = candidates.len();
        let active_count = self.config.fanout_width.min(drivers_total);

        let rows: Vec<NewCandidateRow> = candidates
            .iter()
            .enumerate()
            .map(|(index, driver)| {
                let is_active = index < active_count;
                NewCandidateRow {
                    sequence: (index + 1) as i32,
                    driver_id: driver.driver_id,
                    driver_session_token: driver.session_token.clone(),
                    driver_name: driver.name.clone(),
                    driver_username: driver.username.clone(),
                    driver_rating: driver.avg_rating_driver,
                    driver_completed_rides: driver.completed_rides,
                    driver_area: driver.area.clone(),
                    duration_min: driver.duration_min,
                    distance_km: driver.distance_km,
                    maps_url: driver.maps_url.clone(),
                    status: if is_active {
                        CandidateStatus::Pending
                    } else {
                        CandidateStatus::Waiting
                    },
                    assigned_at: if is_active { Some(now) } else { None },
                }
            })
            .collect();

        let first = &candidates[0];
        let new_request = NewRideRequestRow {
            rider_id,
            rider_session_token: input.rider_session_token,
            pickup: input.pickup,
            destination: input.destination,
            requested_time: input.requested_time,
            min_rating: input.min_rating,
            preferred_gender: input.preferred_gender,
            rider_snapshot,
            current_driver_id: first.driver_id,
            current_driver_session_token: first.session_token.clone(),
        };
        let current_driver = DriverView::from_selected(first);

        let request_id = self
            .store
            .perform_transaction(move |txn| Box::pin(async move { txn.insert_request_with_candidates(new_request, rows).await }))
            .await?;

        Ok(CreateOutput {
            request_id,
            status: RideRequestStatus::DriverPending,
            current_driver: Some(current_driver),
            drivers_total,
            message: None,
        })
    }

    /// Lists a driver's pending and active candidate queue.
    pub async fn driver_queue(&self, driver_session_token: &SessionToken) -> OrchestratorResult<DriverQueueOutput> {
        let driver_id = self.resolve_session_user(driver_session_token).await?;
        let mut auto = self.store.auto();

        let mut pending: Vec<PendingEntry> = auto
            .driver_pending_queue(driver_id)
            .await?
            .into_iter()
            .filter(|(candidate, request)| {
                candidate.status == CandidateStatus::Pending && request.status == RideRequestStatus::DriverPending
            })
            .map(|(candidate, request)| PendingEntry {
                request_id: request.id,
                sequence: candidate.sequence,
                assigned_at: candidate.assigned_at,
                rider_snapshot: request.rider_snapshot,
                duration_min: candidate.duration_min,
                distance_km: candidate.distance_km,
            })
            .collect();
        // assigned_at ASC NULLS LAST, request_id DESC.
        pending.sort_by(|a, b| match (a.assigned_at, b.assigned_at) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| b.request_id.raw().cmp(&a.request_id.raw())),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.request_id.raw().cmp(&a.request_id.raw()),
        });

        let active: Vec<ActiveEntry> = auto
            .driver_active_queue(driver_id)
            .await?
            .into_iter()
            .filter(|(candidate, request, ride)| {
                matches!(candidate.status, CandidateStatus::Accepted | CandidateStatus::Skipped)
                    && matches!(request.status, RideRequestStatus::AwaitingRider | RideRequestStatus::Completed)
                    && !matches!(ride.as_ref().map(|r| r.status), Some(RideStatus::Complete))
            })
            .map(|(candidate, request, _ride)| ActiveEntry {
                request_id: request.id,
                sequence: candidate.sequence,
                request_status: request.status,
                maps_url: (request.status == RideRequestStatus::Completed).then(|| candidate.maps_url.clone()),
                responded_at: candidate.responded_at,
                rider_snapshot: request.rider_snapshot,
            })
            .collect();

        Ok(DriverQueueOutput { pending, active })
    }

    /// Records a driver's accept/reject decision on a pending candidate.
    pub async fn driver_decision(&self, input: DriverDecisionInput) -> OrchestratorResult<DriverDecisionOutput> {
        let driver_id = self.resolve_session_user(&input.driver_session_token).await?;
        let fanout_width = self.config.fanout_width;

        self.store
            .perform_transaction(move |txn| Box::pin(async move {
                let mut request = txn.lock_request(input.request_id).await?;
                let candidate = txn
                    .candidate_by_request_and_driver(input.request_id, driver_id)
                    .await?
                    .ok_or(OrchestratorError::NotFound("candidate not found for this driver"))?;
                if candidate.status != CandidateStatus::Pending {
                    return Err(OrchestratorError::StaleAssignment);
                }

                let now = Local::now();
                let current_driver = match input.decision {
                    DriverDecisionKind::Accept => {
                        let mut accepted = candidate.clone();
                        accepted.status = CandidateStatus::Accepted;
                        accepted.responded_at = Some(now);
                        accepted.message = input.note.clone();
                        txn.update_candidate(&accepted).await?;

                        for mut other in txn.candidates_for_request(request.id).await? {
                            if other.id == accepted.id {
                                continue;
                            }
                            if matches!(
                                other.status,
                                CandidateStatus::Pending | CandidateStatus::Waiting | CandidateStatus::Rejected
                            ) {
                                other.status = CandidateStatus::Skipped;
                                if other.responded_at.is_none() {
                                    other.responded_at = Some(now);
                                }
                                txn.update_candidate(&other).await?;
                            }
                        }

                        request.status = RideRequestStatus::AwaitingRider;
                        request.current_candidate_sequence = accepted.sequence;
                        request.current_driver_id = Some(accepted.driver_id);
                        request.current_driver_session_token = Some(accepted.driver_session_token.clone());
                        request.last_driver_response_at = Some(now);
                        request.updated_at = now;
                        Some(DriverView::from_candidate(&accepted))
                    }
                    DriverDecisionKind::Reject => {
                        let mut rejected = candidate.clone();
                        rejected.status = CandidateStatus::Rejected;
                        rejected.responded_at = Some(now);
                        rejected.message = input.note.clone();
                        txn.update_candidate(&rejected).await?;

                        promote_and_advance(txn, &mut request, now, fanout_width).await?
                    }
                };

                txn.update_request(&request).await?;

                Ok(DriverDecisionOutput {
                    request_id: request.id,
                    status: request.status,
                    current_driver,
                })
            }))
            .await
    }

    /// Confirms the accepted candidate and creates the ride.
    pub async fn rider_confirm(&self, input: RiderConfirmInput) -> OrchestratorResult<RiderConfirmOutput> {
        let rider_id = self.resolve_session_user(&input.rider_session_token).await?;
        let map = &self.map;

        self.store
            .perform_transaction(move |txn| Box::pin(async move {
                let mut request = txn.lock_request(input.request_id).await?;
                if request.rider_id != rider_id {
                    return Err(OrchestratorError::NotFound("request not found"));
                }
                if request.status != RideRequestStatus::AwaitingRider {
                    return Err(OrchestratorError::InvalidState("confirm requires AWAITING_RIDER"));
                }

                let mut accepted = txn
                    .candidates_for_request(request.id)
                    .await?
                    .into_iter()
                    .find(|c| c.status == CandidateStatus::Accepted)
                    .ok_or(OrchestratorError::InvalidState("no accepted candidate on this request"))?;

                let driver = txn
                    .user(accepted.driver_id)
                    .await?
                    .ok_or(OrchestratorError::NotFound("driver not found"))?;
                let driver_coords = Coordinates {
                    lat: driver.latitude.unwrap_or_default(),
                    lng: driver.longitude.unwrap_or_default(),
                };
                let pickup_coords = Coordinates {
                    lat: request.pickup.latitude.unwrap_or_default(),
                    lng: request.pickup.longitude.unwrap_or_default(),
                };
                let route = map
                    .route(driver_coords, pickup_coords)
                    .await
                    .map_err(|why| OrchestratorError::MapUnavailable(why.to_string()))?;

                let now = Local::now();
                let ride_id = txn
                    .insert_ride(NewRideRow {
                        rider_id: request.rider_id,
                        driver_id: accepted.driver_id,
                        pickup_area: request.pickup.area_label.clone(),
                        destination: request.destination.label.clone(),
                        requested_time: request.requested_time,
                        rider_session_token: request.rider_session_token.clone(),
                        driver_session_token: accepted.driver_session_token.clone(),
                    })
                    .await?;

                accepted.maps_url = route.maps_url.clone();
                txn.update_candidate(&accepted).await?;

                request.status = RideRequestStatus::Completed;
                request.ride_id = Some(ride_id);
                request.message = Some("Ride confirmed".to_owned());
                request.updated_at = now;
                txn.update_request(&request).await?;

                Ok(RiderConfirmOutput {
                    request_id: request.id,
                    ride_id,
                    maps_url: route.maps_url,
                })
            }))
            .await
    }

    /// Cancels a request on the rider's behalf.
    pub async fn rider_cancel(&self, input: RiderCancelInput) -> OrchestratorResult<RiderCancelOutput> {
        let rider_id = self.resolve_session_user(&input.rider_session_token).await?;

        self.store
            .perform_transaction(move |txn| Box::pin(async move {
                let mut request = txn.lock_request(input.request_id).await?;
                if request.rider_id != rider_id {
                    return Err(OrchestratorError::NotFound("request not found"));
                }
                if request.status.is_terminal() {
                    return Err(OrchestratorError::InvalidState("request is already terminal"));
                }

                let now = Local::now();
                for mut candidate in txn.candidates_for_request(request.id).await? {
                    if matches!(
                        candidate.status,
                        CandidateStatus::Pending | CandidateStatus::Waiting | CandidateStatus::Rejected
                    ) {
                        candidate.status = CandidateStatus::Skipped;
                        candidate.responded_at = Some(now);
                        txn.update_candidate(&candidate).await?;
                    }
                }

                if let Some(ride_id) = request.ride_id {
                    txn.update_ride_status(ride_id, RideStatus::Canceled).await?;
                }

                request.status = RideRequestStatus::Canceled;
                request.message = Some(input.note.unwrap_or_else(|| "Canceled by rider".to_owned()));
                request.updated_at = now;
                txn.update_request(&request).await?;

                Ok(RiderCancelOutput {
                    request_id: request.id,
                    status: request.status,
                })
            }))
            .await
    }

    /// Reports a rider's current request and ride status.
    pub async fn rider_status(&self, rider_session_token: &SessionToken) -> OrchestratorResult<RiderStatusOutput> {
        let rider_id = self.resolve_session_user(rider_session_token).await?;
        let mut auto = self.store.auto();

        let request = auto
            .latest_request_for_rider(rider_id)
            .await?
            .ok_or(OrchestratorError::NotFound("no ride request for this rider"))?;

        let candidates = auto.candidates_for_request(request.id).await?;
        let current = candidates
            .iter()
            .find(|c| c.sequence == request.current_candidate_sequence)
            .or_else(|| candidates.iter().find(|c| c.status == CandidateStatus::Accepted));
        let current_driver = current.map(DriverView::from_candidate);

        let ride_status = match request.ride_id {
            Some(ride_id) => auto.ride(ride_id).await?.map(|ride| ride.status),
            None => None,
        };

        Ok(RiderStatusOutput {
            request,
            current_driver,
            ride_status,
        })
    }

    /// Invoked out-of-band by the Ride collaborator when a ride is marked
    /// complete; never retried on failure (the ride stays complete
    /// regardless of whether the rating fold succeeds).
    pub async fn record_ride_completion(
        &self,
        ride_id: RideId,
        rating_of_driver_by_rider: f64,
        rating_of_rider_by_driver: f64,
    ) -> OrchestratorResult<()> {
        let mut auto = self.store.auto();
        let ride = auto
            .ride(ride_id)
            .await?
            .ok_or(OrchestratorError::NotFound("ride not found"))?;
        auto.update_ride_status(ride_id, RideStatus::Complete).await?;
        auto.update_driver_rating(ride.driver_id, rating_of_driver_by_rider).await?;
        auto.update_rider_rating(ride.rider_id, rating_of_rider_by_driver).await?;
        Ok(())
    }

    /// PENDING half of the timeout sweep: a candidate stuck PENDING past
    /// `T_pending` is treated as an implicit reject.
    pub async fn sweep_stale_pending(&self) -> usize {
        let cutoff = Local::now() - self.config.pending_timeout;
        let ids = match self.store.auto().requests_with_stale_pending(cutoff).await {
            Ok(ids) => ids,
            Err(why) => {
                log::warn!("stale-pending scan failed: {why}");
                return 0;
            }
        };

        let mut swept = 0;
        for request_id in ids {
            match self.sweep_one_pending(request_id, cutoff).await {
                Ok(true) => swept += 1,
                Ok(false) => {}
                Err(why) => log::warn!("stale-pending sweep of request {request_id}: {why}"),
            }
        }
        swept
    }

    async fn sweep_one_pending(&self, request_id: RideRequestId, cutoff: DateTime<Local>) -> OrchestratorResult<bool> {
        let fanout_width = self.config.fanout_width;
        self.store
            .perform_transaction(move |txn| async move {
                let mut request = txn.lock_request(request_id).await?;
                if request.status != RideRequestStatus::DriverPending {
                    return Ok(false);
                }
                let candidates = txn.candidates_for_request(request.id).await?;
                let Some(current) = candidates
                    .iter()
                    .find(|c| c.sequence == request.current_candidate_sequence && c.status == CandidateStatus::Pending)
                else {
                    return Ok(false);
                };
                let Some(assigned_at) = current.assigned_at else {
                    return Ok(false);
                };
                if assigned_at > cutoff {
                    return Ok(false);
                }

                let now = Local::now();
                let mut timed_out = current.clone();
                timed_out.status = CandidateStatus::Rejected;
                timed_out.responded_at = Some(now);
                timed_out.message = Some("Timed out waiting for a response".to_owned());
                txn.update_candidate(&timed_out).await?;

                promote_and_advance(txn, &mut request, now, fanout_width).await?;
                txn.update_request(&request).await?;
                Ok(true)
            })
            .await
    }

    /// CONFIRM half of the timeout sweep: an accepted driver who never gets a rider
    /// confirm within `T_confirm` is withdrawn and the promotion step runs
    /// as if they had rejected.
    pub async fn sweep_stale_confirm(&self) -> usize {
        let cutoff = Local::now() - self.config.confirm_timeout;
        let ids = match self.store.auto().requests_with_stale_confirm(cutoff).await {
            Ok(ids) => ids,
            Err(why) => {
                log::warn!("stale-confirm scan failed: {why}");
                return 0;
            }
        };

        let mut swept = 0;
        for request_id in ids {
            match self.sweep_one_confirm(request_id, cutoff).await {
                Ok(true) => swept += 1,
                Ok(false) => {}
                Err(why) => log::warn!("stale-confirm sweep of request {request_id}: {why}"),
            }
        }
        swept
    }

    async fn sweep_one_confirm(&self, request_id: RideRequestId, cutoff: DateTime<Local>) -> OrchestratorResult<bool> {
        let fanout_width = self.config.fanout_width;
        self.store
            .perform_transaction(move |txn| async move {
                let mut request = txn.lock_request(request_id).await?;
                if request.status != RideRequestStatus::AwaitingRider {
                    return Ok(false);
                }
                if request.updated_at > cutoff {
                    return Ok(false);
                }

                let candidates = txn.candidates_for_request(request.id).await?;
                let Some(accepted) = candidates.iter().find(|c| c.status == CandidateStatus::Accepted) else {
                    return Ok(false);
                };

                let now = Local::now();
                let mut withdrawn = accepted.clone();
                withdrawn.status = CandidateStatus::Skipped;
                if withdrawn.responded_at.is_none() {
                    withdrawn.responded_at = Some(now);
                }
                txn.update_candidate(&withdrawn).await?;

                promote_and_advance(txn, &mut request, now, fanout_width).await?;
                txn.update_request(&request).await?;
                Ok(true)
            })
            .await
    }
}

/// Promotion step shared by explicit reject and both sweep halves: top
/// the PENDING pool back up to `k` from the WAITING queue in
/// sequence order, then advance `current_*` to the next PENDING candidate or
/// exhaust the request if none remain.
async fn promote_and_advance<T: StoreOperations>(
    txn: &mut T,
    request: &mut RideRequestRecord,
    now: DateTime<Local>,
    k: usize,
) -> OrchestratorResult<Option<DriverView>> {
    let mut candidates = txn.candidates_for_request(request.id).await?;
    candidates.sort_by_key(|c| c.sequence);

    let mut pending_count = candidates.iter().filter(|c| c.status == CandidateStatus::Pending).count();
    for candidate in candidates.iter_mut() {
        if pending_count >= k {
            break;
        }
        if candidate.status == CandidateStatus::Waiting {
            candidate.status = CandidateStatus::Pending;
            candidate.assigned_at = Some(now);
            txn.update_candidate(candidate).await?;
            pending_count += 1;
        }
    }

    let next = candidates
        .iter()
        .filter(|c| c.status == CandidateStatus::Pending)
        .min_by_key(|c| c.sequence)
        .cloned();

    match next {
        Some(next) => {
            request.status = RideRequestStatus::DriverPending;
            request.current_candidate_sequence = next.sequence;
            request.current_driver_id = Some(next.driver_id);
            request.current_driver_session_token = Some(next.driver_session_token.clone());
            request.updated_at = now;
            Ok(Some(DriverView::from_candidate(&next)))
        }
        None => {
            request.status = RideRequestStatus::Exhausted;
            request.current_candidate_sequence = 0;
            request.current_driver_id = None;
            request.current_driver_session_token = None;
            request.message = Some("No drivers accepted your request.".to_owned());
            request.updated_at = now;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_adapter::{FakeMapAdapter, RouteInfo};
    use crate::test_support::InMemoryStore;
    use model::status::DriverLocationState;

    type TestOrchestrator = RequestOrchestrator<InMemoryStore, FakeMapAdapter>;

    /// Seeds one rider and `driver_count` drivers, each with a scripted
    /// route to the rider, then creates a request so every boundary-scenario
    /// test starts from the same fan-out.
    async fn seed_request(driver_count: usize) -> (TestOrchestrator, InMemoryStore, SessionToken, RideRequestId) {
        let store = InMemoryStore::new();
        let map = FakeMapAdapter::new();
        let rider_coords = Coordinates { lat: 33.90, lng: 35.48 };

        let rider_id = store.add_online_driver("rider", rider_coords.lat, rider_coords.lng, DriverLocationState::Unset);
        let rider_token = store.user_snapshot(rider_id).current_session_token.unwrap();

        for i in 0..driver_count {
            let coords = Coordinates {
                lat: 33.90 + (i as f64) * 0.001,
                lng: 35.48 + (i as f64) * 0.001,
            };
            store.add_online_driver(&format!("driver-{i}"), coords.lat, coords.lng, DriverLocationState::Home);
            map.set_route(
                coords,
                rider_coords,
                Ok(RouteInfo {
                    distance_km: 1.0 + i as f64,
                    duration_min: 5.0 + i as f64,
                    maps_url: format!("u{i}"),
                }),
            );
        }

        let orchestrator = RequestOrchestrator::new(store.clone(), map, OrchestratorConfig::default());
        let output = orchestrator
            .create(CreateInput {
                rider_session_token: rider_token.clone(),
                pickup: PickupLocation {
                    area_label: "hamra".into(),
                    latitude: Some(rider_coords.lat),
                    longitude: Some(rider_coords.lng),
                },
                destination: Destination {
                    label: "campus".into(),
                    is_campus: true,
                    latitude: None,
                    longitude: None,
                },
                direction: Direction::Unknown,
                requested_time: Local::now(),
                min_rating: 0.0,
                preferred_gender: None,
                zone: None,
            })
            .await
            .unwrap();

        (orchestrator, store, rider_token, output.request_id)
    }

    async fn candidates_of(store: &InMemoryStore, request_id: RideRequestId) -> Vec<CandidateRecord> {
        let mut store = store.clone();
        let mut rows = store.candidates_for_request(request_id).await.unwrap();
        rows.sort_by_key(|c| c.sequence);
        rows
    }

    #[tokio::test]
    async fn fanout_width_respected() {
        let (_orchestrator, store, _rider_token, request_id) = seed_request(7).await;

        let candidates = candidates_of(&store, request_id).await;
        let pending = candidates.iter().filter(|c| c.status == CandidateStatus::Pending).count();
        let waiting = candidates.iter().filter(|c| c.status == CandidateStatus::Waiting).count();
        assert_eq!(pending, 3);
        assert_eq!(waiting, 4);

        let mut auto = store.clone();
        let request = auto.request(request_id).await.unwrap().unwrap();
        assert_eq!(request.current_candidate_sequence, 1);
    }

    #[tokio::test]
    async fn reject_promotes_next_waiting_candidate() {
        let (orchestrator, store, _rider_token, request_id) = seed_request(7).await;

        let seeded = candidates_of(&store, request_id).await;
        let first_driver = seeded[0].driver_id;
        let first_driver_token = store.user_snapshot(first_driver).current_session_token.unwrap();

        let output = orchestrator
            .driver_decision(DriverDecisionInput {
                driver_session_token: first_driver_token,
                request_id,
                decision: DriverDecisionKind::Reject,
                note: None,
            })
            .await
            .unwrap();
        assert_eq!(output.status, RideRequestStatus::DriverPending);

        let candidates = candidates_of(&store, request_id).await;
        let pending = candidates.iter().filter(|c| c.status == CandidateStatus::Pending).count();
        assert_eq!(pending, 3);
        let seq4 = candidates.iter().find(|c| c.sequence == 4).unwrap();
        assert_eq!(seq4.status, CandidateStatus::Pending);
        assert!(seq4.assigned_at.is_some());

        let mut auto = store.clone();
        let request = auto.request(request_id).await.unwrap().unwrap();
        assert_eq!(request.current_candidate_sequence, 2);
    }

    #[tokio::test]
    async fn exhaustion_when_every_candidate_rejects() {
        let (orchestrator, store, _rider_token, request_id) = seed_request(2).await;

        for candidate in candidates_of(&store, request_id).await {
            let token = store.user_snapshot(candidate.driver_id).current_session_token.unwrap();
            let _ = orchestrator
                .driver_decision(DriverDecisionInput {
                    driver_session_token: token,
                    request_id,
                    decision: DriverDecisionKind::Reject,
                    note: None,
                })
                .await;
        }

        let mut auto = store.clone();
        let request = auto.request(request_id).await.unwrap().unwrap();
        assert_eq!(request.status, RideRequestStatus::Exhausted);
        assert_eq!(request.current_candidate_sequence, 0);
        assert_eq!(request.message.as_deref(), Some("No drivers accepted your request."));
    }

    #[tokio::test]
    async fn second_accept_observes_stale_assignment() {
        let (orchestrator, store, _rider_token, request_id) = seed_request(7).await;

        let seeded = candidates_of(&store, request_id).await;
        let token_a = store.user_snapshot(seeded[1].driver_id).current_session_token.unwrap();
        let token_b = store.user_snapshot(seeded[2].driver_id).current_session_token.unwrap();

        let first = orchestrator
            .driver_decision(DriverDecisionInput {
                driver_session_token: token_a,
                request_id,
                decision: DriverDecisionKind::Accept,
                note: None,
            })
            .await;
        assert!(first.is_ok());

        let second = orchestrator
            .driver_decision(DriverDecisionInput {
                driver_session_token: token_b,
                request_id,
                decision: DriverDecisionKind::Accept,
                note: None,
            })
            .await;
        assert!(matches!(second, Err(OrchestratorError::StaleAssignment)));

        let mut auto = store.clone();
        let request = auto.request(request_id).await.unwrap().unwrap();
        assert_eq!(request.status, RideRequestStatus::AwaitingRider);
    }

    #[tokio::test]
    async fn cancel_twice_yields_invalid_state_on_second_call() {
        let (orchestrator, _store, rider_token, request_id) = seed_request(2).await;

        let first = orchestrator
            .rider_cancel(RiderCancelInput {
                rider_session_token: rider_token.clone(),
                request_id,
                note: None,
            })
            .await;
        assert!(first.is_ok());

        let second = orchestrator
            .rider_cancel(RiderCancelInput {
                rider_session_token: rider_token,
                request_id,
                note: None,
            })
            .await;
        assert!(matches!(second, Err(OrchestratorError::InvalidState(_))));
    }

    #[tokio::test]
    async fn accept_then_confirm_completes_request() {
        let (orchestrator, store, rider_token, request_id) = seed_request(2).await;

        let seeded = candidates_of(&store, request_id).await;
        let driver_token = store.user_snapshot(seeded[0].driver_id).current_session_token.unwrap();
        orchestrator
            .driver_decision(DriverDecisionInput {
                driver_session_token: driver_token,
                request_id,
                decision: DriverDecisionKind::Accept,
                note: None,
            })
            .await
            .unwrap();

        let confirmed = orchestrator
            .rider_confirm(RiderConfirmInput {
                rider_session_token: rider_token,
                request_id,
            })
            .await
            .unwrap();

        let mut auto = store.clone();
        let request = auto.request(request_id).await.unwrap().unwrap();
        assert_eq!(request.status, RideRequestStatus::Completed);
        assert_eq!(request.ride_id, Some(confirmed.ride_id));
        assert!(request.ride_id_matches_status());
    }

    #[tokio::test]
    async fn rating_fold_matches_running_mean() {
        let store = InMemoryStore::new();
        let driver_id = store.add_online_driver("driver", 33.9, 35.48, DriverLocationState::Home);

        // Start from avg=4.0, count=2 by folding two seed ratings of 4.0
        // each: (4.0,1) then (4.0,2).
        let mut auto = store.clone();
        auto.update_driver_rating(driver_id, 4.0).await.unwrap();
        auto.update_driver_rating(driver_id, 4.0).await.unwrap();
        assert_eq!(store.user_snapshot(driver_id).rides_count_driver, 2);

        let expected = [4.333333333333333, 4.0, 4.1];
        for (rating, want) in [5.0, 3.0, 4.5].into_iter().zip(expected) {
            auto.update_driver_rating(driver_id, rating).await.unwrap();
            let got = store.user_snapshot(driver_id).avg_rating_driver;
            assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
        }
    }
}
