use crate::event::{AcousticEvent, PlayerId, WorldPosition};
use crate::stats::PlayerStats;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSecondsWithFrac, serde_as};
use std::time::Duration;
use strum::{Display as StrumDisplay, EnumIter};
use tokio::time::Instant;

pub const WALK_THRESHOLD: f64 = 0.2;
pub const SPRINT_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, StrumDisplay)]
pub enum NoiseTier {
    Idle,
    Walk,
    Sprint,
}

impl NoiseTier {
    /// Thresholds are inclusive on the quieter side.
    pub fn classify(magnitude: f64) -> Self {
        let magnitude = sanitize_magnitude(magnitude);
        if magnitude <= WALK_THRESHOLD {
            NoiseTier::Idle
        } else if magnitude <= SPRINT_THRESHOLD {
            NoiseTier::Walk
        } else {
            NoiseTier::Sprint
        }
    }

    pub fn base_intensity(&self) -> f64 {
        match self {
            NoiseTier::Idle => 1.0,
            NoiseTier::Walk => 3.0,
            NoiseTier::Sprint => 5.0,
        }
    }
}

fn sanitize_magnitude(magnitude: f64) -> f64 {
    if magnitude.is_nan() {
        0.0
    } else {
        magnitude.clamp(0.0, 1.0)
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EmissionConfig {
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub movement_interval: Duration,
    pub activity_threshold: f64,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub discharge_cooldown: Duration,
    pub discharge_intensity: f64,
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            movement_interval: Duration::from_millis(500),
            activity_threshold: 0.05,
            discharge_cooldown: Duration::from_millis(500),
            discharge_intensity: 15.0,
        }
    }
}

/// Turns local actions into outbound events.
#[derive(Debug)]
pub struct Emitter {
    config: EmissionConfig,
    source: PlayerId,
    moving_for: Duration,
    last_discharge: Option<Instant>,
}

impl Emitter {
    pub fn new(source: PlayerId, config: EmissionConfig) -> Self {
        Self {
            config,
            source,
            moving_for: Duration::ZERO,
            last_discharge: None,
        }
    }

    pub fn config(&self) -> &EmissionConfig {
        &self.config
    }

    /// Called once per frame with the time elapsed since the previous frame.
    pub fn report_movement(
        &mut self,
        magnitude: f64,
        position: WorldPosition,
        elapsed: Duration,
        stats: &PlayerStats,
    ) -> Option<AcousticEvent> {
        let magnitude = sanitize_magnitude(magnitude);
        if magnitude <= self.config.activity_threshold {
            self.moving_for = Duration::ZERO;
            return None;
        }

        self.moving_for += elapsed;
        if self.moving_for < self.config.movement_interval {
            return None;
        }
        self.moving_for = Duration::ZERO;

        let tier = NoiseTier::classify(magnitude);
        Some(self.event_at(position, tier.base_intensity(), stats))
    }

    /// Returns `None` while the cooldown from the previous discharge is running.
    pub fn fire_discharge(
        &mut self,
        position: WorldPosition,
        now: Instant,
        stats: &PlayerStats,
    ) -> Option<AcousticEvent> {
        if let Some(last) = self.last_discharge
            && now.saturating_duration_since(last) < self.config.discharge_cooldown
        {
            return None;
        }
        self.last_discharge = Some(now);
        Some(self.event_at(position, self.config.discharge_intensity, stats))
    }

    fn event_at(&self, position: WorldPosition, base: f64, stats: &PlayerStats) -> AcousticEvent {
        AcousticEvent::new(
            position.ground(),
            base.max(0.0) * stats.dampening_factor(),
            self.source.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Rank;
    use strum::IntoEnumIterator;

    fn emitter() -> Emitter {
        Emitter::new(PlayerId::from("me"), EmissionConfig::default())
    }

    #[test]
    fn test_classify_boundaries() {
        let cases = [
            (0.0, NoiseTier::Idle),
            (0.2, NoiseTier::Idle),
            (0.2001, NoiseTier::Walk),
            (0.6, NoiseTier::Walk),
            (0.6001, NoiseTier::Sprint),
            (1.0, NoiseTier::Sprint),
            (7.0, NoiseTier::Sprint),
            (f64::NAN, NoiseTier::Idle),
        ];

        for (magnitude, expected) in cases {
            assert_eq!(NoiseTier::classify(magnitude), expected, "{magnitude}");
        }
    }

    #[test]
    fn test_tier_intensities() {
        let values: Vec<f64> = NoiseTier::iter().map(|t| t.base_intensity()).collect();
        assert_eq!(values, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_sustained_movement_rate_limited() {
        let mut emitter = emitter();
        let stats = PlayerStats::default();
        let frame = Duration::from_millis(100);

        let emitted = (0..25)
            .filter_map(|_| emitter.report_movement(0.5, WorldPosition::default(), frame, &stats))
            .count();

        assert_eq!(emitted, 5);
    }

    #[test]
    fn test_long_frame_does_not_double_fire() {
        let mut emitter = emitter();
        let stats = PlayerStats::default();
        let pos = WorldPosition::default();

        assert!(
            emitter
                .report_movement(0.5, pos, Duration::from_millis(990), &stats)
                .is_some()
        );
        assert!(
            emitter
                .report_movement(0.5, pos, Duration::from_millis(10), &stats)
                .is_none()
        );
        assert!(
            emitter
                .report_movement(0.5, pos, Duration::from_millis(480), &stats)
                .is_none()
        );
        assert!(
            emitter
                .report_movement(0.5, pos, Duration::from_millis(10), &stats)
                .is_some()
        );
    }

    #[test]
    fn test_below_threshold_is_silent() {
        let mut emitter = emitter();
        let stats = PlayerStats::default();

        let emitted = (0..1000)
            .filter_map(|_| {
                emitter.report_movement(
                    0.03,
                    WorldPosition::default(),
                    Duration::from_millis(100),
                    &stats,
                )
            })
            .count();

        assert_eq!(emitted, 0);
    }

    #[test]
    fn test_stopping_resets_cadence() {
        let mut emitter = emitter();
        let stats = PlayerStats::default();
        let frame = Duration::from_millis(300);
        let pos = WorldPosition::default();

        assert!(emitter.report_movement(0.5, pos, frame, &stats).is_none());
        assert!(emitter.report_movement(0.0, pos, frame, &stats).is_none());
        assert!(emitter.report_movement(0.5, pos, frame, &stats).is_none());
        assert!(emitter.report_movement(0.5, pos, frame, &stats).is_some());
    }

    #[test]
    fn test_movement_event_shape() {
        let mut emitter = emitter();
        let stats = PlayerStats::new(Rank::from(5), Rank::ZERO);

        let event = emitter
            .report_movement(
                0.9,
                WorldPosition::new(4.0, 1.7, -2.0),
                Duration::from_secs(1),
                &stats,
            )
            .unwrap();

        assert_eq!(event.origin.x, 4.0);
        assert_eq!(event.origin.y, -2.0);
        assert_eq!(event.source, PlayerId::from("me"));
        assert!((event.intensity - 5.0 * stats.dampening_factor()).abs() < 1e-12);
    }

    #[test]
    fn test_discharge_cooldown() {
        let mut emitter = emitter();
        let stats = PlayerStats::default();
        let pos = WorldPosition::default();
        let start = Instant::now();

        assert!(emitter.fire_discharge(pos, start, &stats).is_some());
        assert!(
            emitter
                .fire_discharge(pos, start + Duration::from_millis(200), &stats)
                .is_none()
        );
        assert!(
            emitter
                .fire_discharge(pos, start + Duration::from_millis(500), &stats)
                .is_some()
        );
    }

    #[test]
    fn test_discharge_is_dampened() {
        let mut emitter = emitter();
        let stats = PlayerStats::new(Rank::from(5), Rank::ZERO);

        let event = emitter
            .fire_discharge(WorldPosition::default(), Instant::now(), &stats)
            .unwrap();

        assert!((event.intensity - 15.0 * 0.378_5).abs() < 1e-2);
    }

    #[test]
    fn test_config_from_seconds() {
        let json = r#"{"movement_interval": 0.25, "discharge_cooldown": 2}"#;
        let cfg: EmissionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.movement_interval, Duration::from_millis(250));
        assert_eq!(cfg.discharge_cooldown, Duration::from_secs(2));
        assert_eq!(cfg.activity_threshold, 0.05);
    }
}
