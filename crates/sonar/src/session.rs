use crate::channel::{ChannelError, EventChannel, Subscription};
use crate::emission::{EmissionConfig, Emitter};
use crate::event::{AcousticEvent, PlayerId, Point, WorldPosition};
use crate::perception::Observer;
use crate::stats::PlayerStats;
use std::time::Duration;
use tokio::time::Instant;

/// Everything one local player needs to emit and hear pings.
pub struct Session {
    player: PlayerId,
    stats: PlayerStats,
    emitter: Emitter,
    position: Point,
    channel: EventChannel,
}

impl Session {
    pub fn new(
        player: PlayerId,
        stats: PlayerStats,
        emission: EmissionConfig,
        channel: EventChannel,
    ) -> Self {
        Self {
            emitter: Emitter::new(player.clone(), emission),
            player,
            stats,
            position: Point::default(),
            channel,
        }
    }

    pub fn player(&self) -> &PlayerId {
        &self.player
    }

    pub fn stats(&self) -> &PlayerStats {
        &self.stats
    }

    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn dampening_factor(&self) -> f64 {
        self.stats.dampening_factor()
    }

    pub fn perception_radius(&self) -> f64 {
        self.stats.perception_radius()
    }

    pub fn set_dampening_rank(&mut self, value: i64) {
        self.stats.set_dampening_rank(value);
        log::info!(
            "{}: dampening rank {} -> factor {:.3}",
            self.player,
            self.stats.dampening_rank(),
            self.stats.dampening_factor()
        );
    }

    pub fn set_range_rank(&mut self, value: i64) {
        self.stats.set_range_rank(value);
        log::info!(
            "{}: range rank {} -> radius {:.1}",
            self.player,
            self.stats.range_rank(),
            self.stats.perception_radius()
        );
    }

    /// Per-frame movement report. Returns the ping if one went out this frame.
    pub async fn report_movement(
        &mut self,
        magnitude: f64,
        position: WorldPosition,
        elapsed: Duration,
    ) -> Option<AcousticEvent> {
        self.position = position.ground();
        let event = self
            .emitter
            .report_movement(magnitude, position, elapsed, &self.stats)?;
        self.publish(&event).await;
        Some(event)
    }

    /// `false` when the discharge is still on cooldown.
    pub async fn fire_discharge(&mut self, position: WorldPosition) -> bool {
        self.position = position.ground();
        let Some(event) = self
            .emitter
            .fire_discharge(position, Instant::now(), &self.stats)
        else {
            log::debug!("{}: discharge rejected, cooling down", self.player);
            return false;
        };
        self.publish(&event).await;
        true
    }

    async fn publish(&self, event: &AcousticEvent) {
        match self.channel.publish(event.clone()).await {
            Ok(()) => log::debug!(
                "{}: ping at ({:.1}, {:.1}) intensity {:.2}",
                self.player,
                event.origin.x,
                event.origin.y,
                event.intensity
            ),
            Err(ChannelError::Closed) => {
                log::debug!("{}: channel closed, ping dropped", self.player)
            }
            Err(e) => log::warn!("{}: failed to publish ping: {}", self.player, e),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.channel.subscribe()
    }

    pub async fn shutdown(&self) {
        self.channel.close().await;
    }
}

impl Observer for Session {
    fn observer_position(&self) -> Point {
        self.position
    }

    fn perception_radius(&self) -> f64 {
        self.stats.perception_radius()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SimulationConfig;
    use crate::perception::PerceptionFilter;
    use crate::stats::Rank;

    fn simulated_session(stats: PlayerStats) -> Session {
        Session::new(
            PlayerId::from("me"),
            stats,
            EmissionConfig::default(),
            EventChannel::simulated(SimulationConfig::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_discharge_cooldown_through_session() {
        let mut session = simulated_session(PlayerStats::default());
        let pos = WorldPosition::default();

        assert!(session.fire_discharge(pos).await);
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!session.fire_discharge(pos).await);
        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(session.fire_discharge(pos).await);

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_echo_passes_distance_check() {
        let mut session = simulated_session(PlayerStats::default());
        let mut sub = session.subscribe();
        let (tx, rx) = async_channel::unbounded();
        let filter = PerceptionFilter::new(tx);

        assert!(
            session
                .fire_discharge(WorldPosition::new(10.0, 0.0, 10.0))
                .await
        );
        let echo = sub.try_recv().unwrap();
        assert!(filter.evaluate(&echo, &session));

        let heard = rx.try_recv().unwrap();
        assert_eq!(heard.source, PlayerId::from("echo:me"));
        assert_eq!(heard.intensity, 15.0);

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_range_rank_widens_hearing() {
        let mut session = simulated_session(PlayerStats::default());
        let (tx, rx) = async_channel::unbounded();
        let filter = PerceptionFilter::new(tx);
        let far = AcousticEvent::new(Point::new(250.0, 0.0), 1.0, PlayerId::from("x"));

        assert!(!filter.evaluate(&far, &session));
        session.set_range_rank(10);
        assert!(filter.evaluate(&far, &session));
        assert_eq!(rx.len(), 1);

        session.set_range_rank(-5);
        assert_eq!(session.stats().range_rank(), Rank::ZERO);
        assert_eq!(session.perception_radius(), 200.0);

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_movement_updates_observer_position() {
        let mut session = simulated_session(PlayerStats::default());

        let sent = session
            .report_movement(0.01, WorldPosition::new(7.0, 3.0, -1.0), Duration::from_secs(1))
            .await;

        assert!(sent.is_none());
        assert_eq!(session.observer_position(), Point::new(7.0, -1.0));
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_after_shutdown_is_quiet() {
        let mut session = simulated_session(PlayerStats::default());
        session.shutdown().await;

        assert!(session.fire_discharge(WorldPosition::default()).await);
        assert!(session.subscribe().try_recv().is_none());
    }
}
