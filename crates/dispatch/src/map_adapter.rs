//! Map Adapter: a pure function boundary over an external distance/route
//! service. Stateless — no caching is required, though `HttpMapAdapter`
//! keeps a short-TTL memo since nothing forbids it.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, Copy)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub distance_km: f64,
    pub duration_min: f64,
    pub maps_url: String,
}

#[derive(Debug, Clone)]
pub struct GeocodeHit {
    pub label: String,
    pub lat: f64,
    pub lng: f64,
}

/// `MapUnavailable` is retryable (the caller skips the driver and keeps
/// selecting); `NoRoute` means this particular origin/destination pair has
/// no route and the driver is dropped from this attempt.
#[derive(Debug, Clone)]
pub enum MapError {
    MapUnavailable(String),
    NoRoute(String),
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MapUnavailable(msg) => write!(f, "map service unavailable: {msg}"),
            Self::NoRoute(msg) => write!(f, "no route: {msg}"),
        }
    }
}

impl std::error::Error for MapError {}

pub type MapResult<T> = Result<T, MapError>;

/// The deadline applied to every adapter call: 5s by default.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

#[async_trait]
pub trait MapAdapter: Send + Sync {
    async fn route(&self, origin: Coordinates, destination: Coordinates) -> MapResult<RouteInfo>;

    async fn geocode(&self, text: &str) -> MapResult<Vec<GeocodeHit>>;
}

/// Pure string-formatting routine building a driving-directions link —
/// fully testable without network access.
pub fn build_maps_url(origin: Coordinates, destination: Coordinates) -> String {
    format!(
        "https://www.google.com/maps/dir/?api=1&origin={},{}&destination={},{}&travelmode=driving",
        origin.lat, origin.lng, destination.lat, destination.lng
    )
}

fn round_key(c: Coordinates) -> (i64, i64) {
    ((c.lat * 1_000.0).round() as i64, (c.lng * 1_000.0).round() as i64)
}

#[derive(Deserialize)]
struct RouteResponseBody {
    distance_km: Option<f64>,
    duration_min: Option<f64>,
    error: Option<String>,
}

pub struct HttpMapAdapter {
    client: reqwest::Client,
    base_url: String,
    deadline: Duration,
    memo: Mutex<HashMap<((i64, i64), (i64, i64)), RouteInfo>>,
}

impl HttpMapAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            deadline: DEFAULT_DEADLINE,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

#[async_trait]
impl MapAdapter for HttpMapAdapter {
    async fn route(&self, origin: Coordinates, destination: Coordinates) -> MapResult<RouteInfo> {
        let key = (round_key(origin), round_key(destination));
        if let Some(cached) = self.memo.lock().unwrap().get(&key).cloned() {
            return Ok(cached);
        }

        let url = format!("{}/route", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[
                ("origin_lat", origin.lat),
                ("origin_lng", origin.lng),
                ("dest_lat", destination.lat),
                ("dest_lng", destination.lng),
            ])
            .send();

        let response = tokio::time::timeout(self.deadline, request)
            .await
            .map_err(|_| MapError::MapUnavailable("request timed out".to_owned()))?
            .map_err(|why| MapError::MapUnavailable(why.to_string()))?;

        if !response.status().is_success() {
            return Err(MapError::MapUnavailable(format!(
                "upstream returned {}",
                response.status()
            )));
        }

        let body: RouteResponseBody = response
            .json()
            .await
            .map_err(|why| MapError::MapUnavailable(why.to_string()))?;

        if let Some(error) = body.error {
            return Err(MapError::NoRoute(error));
        }

        let (distance_km, duration_min) = match (body.distance_km, body.duration_min) {
            (Some(d), Some(t)) => (d, t),
            _ => return Err(MapError::NoRoute("incomplete route data".to_owned())),
        };

        let info = RouteInfo {
            distance_km,
            duration_min,
            maps_url: build_maps_url(origin, destination),
        };
        self.memo.lock().unwrap().insert(key, info.clone());
        Ok(info)
    }

    async fn geocode(&self, text: &str) -> MapResult<Vec<GeocodeHit>> {
        let url = format!("{}/geocode", self.base_url);
        let request = self.client.get(&url).query(&[("q", text)]).send();
        let response = tokio::time::timeout(self.deadline, request)
            .await
            .map_err(|_| MapError::MapUnavailable("request timed out".to_owned()))?
            .map_err(|why| MapError::MapUnavailable(why.to_string()))?;

        #[derive(Deserialize)]
        struct Hit {
            label: String,
            lat: f64,
            lng: f64,
        }

        let hits: Vec<Hit> = response
            .json()
            .await
            .map_err(|why| MapError::MapUnavailable(why.to_string()))?;

        Ok(hits
            .into_iter()
            .map(|h| GeocodeHit {
                label: h.label,
                lat: h.lat,
                lng: h.lng,
            })
            .collect())
    }
}

/// Deterministic fake used by the orchestrator/selector unit tests — a
/// scripted substitute so route outcomes never depend on the network.
#[derive(Default)]
pub struct FakeMapAdapter {
    routes: Mutex<HashMap<((i64, i64), (i64, i64)), MapResult<RouteInfo>>>,
}

impl FakeMapAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_route(&self, origin: Coordinates, destination: Coordinates, result: MapResult<RouteInfo>) {
        self.routes
            .lock()
            .unwrap()
            .insert((round_key(origin), round_key(destination)), result);
    }
}

#[async_trait]
impl MapAdapter for FakeMapAdapter {
    async fn route(&self, origin: Coordinates, destination: Coordinates) -> MapResult<RouteInfo> {
        self.routes
            .lock()
            .unwrap()
            .get(&(round_key(origin), round_key(destination)))
            .cloned()
            .unwrap_or_else(|| {
                Err(MapError::MapUnavailable(
                    "no scripted route for this pair".to_owned(),
                ))
            })
    }

    async fn geocode(&self, text: &str) -> MapResult<Vec<GeocodeHit>> {
        Ok(vec![GeocodeHit {
            label: text.to_owned(),
            lat: 0.0,
            lng: 0.0,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_url_embeds_both_endpoints() {
        let origin = Coordinates { lat: 33.90, lng: 35.48 };
        let destination = Coordinates { lat: 33.88, lng: 35.49 };
        let url = build_maps_url(origin, destination);
        assert!(url.contains("origin=33.9,35.48"));
        assert!(url.contains("destination=33.88,35.49"));
    }

    #[tokio::test]
    async fn fake_adapter_returns_scripted_route() {
        let fake = FakeMapAdapter::new();
        let origin = Coordinates { lat: 1.0, lng: 2.0 };
        let destination = Coordinates { lat: 3.0, lng: 4.0 };
        fake.set_route(
            origin,
            destination,
            Ok(RouteInfo {
                distance_km: 5.0,
                duration_min: 10.0,
                maps_url: "http://example".to_owned(),
            }),
        );
        let info = fake.route(origin, destination).await.unwrap();
        assert_eq!(info.distance_km, 5.0);
    }

    #[tokio::test]
    async fn fake_adapter_defaults_to_unavailable() {
        let fake = FakeMapAdapter::new();
        let origin = Coordinates { lat: 1.0, lng: 2.0 };
        let destination = Coordinates { lat: 3.0, lng: 4.0 };
        assert!(matches!(
            fake.route(origin, destination).await,
            Err(MapError::MapUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn fake_adapter_geocodes() {
        let fake = FakeMapAdapter::new();
        let hits = fake.geocode("hamra").await.unwrap();
        assert_eq!(hits[0].label, "hamra");
    }
}
