use derive_more::{AsRef, Deref, Display, From, Into};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point on the ground plane, in world-distance units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A 3-D world position as reported by input collaborators. `y` is up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl WorldPosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Drops the height axis.
    pub fn ground(&self) -> Point {
        Point::new(self.x, self.z)
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Deref, From, Into, AsRef,
)]
#[serde(transparent)]
pub struct PlayerId(String);

crate::impl_string_newtype!(PlayerId);

impl PlayerId {
    /// Identity used when the simulator reflects a participant's own ping back.
    pub fn echo_of(publisher: &PlayerId) -> Self {
        Self(format!("echo:{}", publisher.0))
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Deref, From, Into, AsRef,
)]
#[serde(transparent)]
pub struct Topic(String);

crate::impl_string_newtype!(Topic);

impl Default for Topic {
    fn default() -> Self {
        Self::new("pings")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcousticEvent {
    pub origin: Point,
    pub intensity: f64,
    pub source: PlayerId,
}

impl AcousticEvent {
    pub fn new(origin: Point, intensity: f64, source: PlayerId) -> Self {
        Self {
            origin,
            intensity,
            source,
        }
    }

    pub fn with_source(&self, source: PlayerId) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(&PingPayload::from(self))?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice::<PingPayload>(bytes)?.try_into()
    }
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Non-finite coordinate in payload")]
    NonFiniteOrigin,
    #[error("Invalid intensity {0}")]
    InvalidIntensity(f64),
    #[error("Missing player id")]
    MissingPlayerId,
}

/// Structured body broadcast on the ping topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    pub x: f64,
    pub y: f64,
    pub intensity: f64,
    pub player_id: String,
}

impl From<&AcousticEvent> for PingPayload {
    fn from(event: &AcousticEvent) -> Self {
        Self {
            x: event.origin.x,
            y: event.origin.y,
            intensity: event.intensity,
            player_id: event.source.to_string(),
        }
    }
}

impl TryFrom<PingPayload> for AcousticEvent {
    type Error = WireError;

    fn try_from(payload: PingPayload) -> Result<Self, Self::Error> {
        if !payload.x.is_finite() || !payload.y.is_finite() {
            return Err(WireError::NonFiniteOrigin);
        }
        if !payload.intensity.is_finite() || payload.intensity < 0.0 {
            return Err(WireError::InvalidIntensity(payload.intensity));
        }
        if payload.player_id.trim().is_empty() {
            return Err(WireError::MissingPlayerId);
        }
        Ok(AcousticEvent::new(
            Point::new(payload.x, payload.y),
            payload.intensity,
            PlayerId::new(payload.player_id),
        ))
    }
}
