use super::Shared;
use crate::event::{AcousticEvent, PlayerId, Point};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSecondsWithFrac, serde_as};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

pub const SIMULATOR_SOURCE: &str = "simulator";

const MIN_PERIOD: Duration = Duration::from_millis(10);
/// Keeps every sampled span well inside f64 range.
const MAX_MAGNITUDE: f64 = f64::MAX / 8.0;

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub period: Duration,
    /// Half-width of the square around the origin that fake pings land in.
    pub position_bound: f64,
    pub intensity_min: f64,
    pub intensity_max: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(3),
            position_bound: 30.0,
            intensity_min: 1.0,
            intensity_max: 5.0,
        }
    }
}

impl SimulationConfig {
    /// Copy that is always safe to sample from: non-finite values fall back
    /// to the defaults, magnitudes are capped, a reversed intensity range is
    /// swapped and the period has a floor.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let bound = finite_or(self.position_bound, defaults.position_bound)
            .abs()
            .min(MAX_MAGNITUDE);
        let lo = finite_or(self.intensity_min, defaults.intensity_min).clamp(0.0, MAX_MAGNITUDE);
        let hi = finite_or(self.intensity_max, defaults.intensity_max).clamp(0.0, MAX_MAGNITUDE);
        let (intensity_min, intensity_max) = if lo <= hi { (lo, hi) } else { (hi, lo) };

        Self {
            period: self.period.max(MIN_PERIOD),
            position_bound: bound,
            intensity_min,
            intensity_max,
        }
    }

    pub fn fabricate(&self, rng: &mut impl Rng) -> AcousticEvent {
        let sane = self.sanitized();
        let bound = sane.position_bound;
        AcousticEvent::new(
            Point::new(
                rng.gen_range(-bound..=bound),
                rng.gen_range(-bound..=bound),
            ),
            rng.gen_range(sane.intensity_min..=sane.intensity_max),
            PlayerId::new(SIMULATOR_SOURCE),
        )
    }
}

/// Reflects a publish back to local subscribers as if another player made it.
pub(super) fn echo(shared: &Shared, event: &AcousticEvent) {
    shared.deliver(event.with_source(PlayerId::echo_of(&event.source)));
}

pub(super) async fn run_timer(config: SimulationConfig, shared: Arc<Shared>) {
    let sane = config.sanitized();
    if sane != config {
        log::warn!("Simulation settings {:?} out of range, using {:?}", config, sane);
    }
    let config = sane;
    let period = config.period;

    let mut rng = StdRng::from_entropy();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if shared.is_closed() {
            break;
        }
        let event = config.fabricate(&mut rng);
        log::trace!(
            "Simulated ping at ({:.1}, {:.1}) intensity {:.2}",
            event.origin.x,
            event.origin.y,
            event.intensity
        );
        shared.deliver(event);
    }
}
