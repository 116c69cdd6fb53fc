use serde::{Deserialize, Serialize};

/// Lifecycle of a [`crate::ride_request::RideRequest`] aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideRequestStatus {
    DriverPending,
    AwaitingRider,
    Completed,
    Exhausted,
    Canceled,
}

impl RideRequestStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Exhausted | Self::Canceled
        )
    }
}

/// Status of a single (request, driver) pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateStatus {
    Waiting,
    Pending,
    Accepted,
    Rejected,
    Skipped,
}

/// Status of the collaborator `Ride` row once a request converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Pending,
    Complete,
    Canceled,
}

/// A rider's pickup-to-destination hint used by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToCampus,
    FromCampus,
    Unknown,
}

/// Where a driver's vehicle currently is, relative to campus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverLocationState {
    Home,
    Campus,
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverDecisionKind {
    Accept,
    Reject,
}
