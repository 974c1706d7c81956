use crate::config::{self, Config};
use crate::events::AppEvent;
use crate::presenter;
use async_channel::{Receiver, Sender};
use sonar::channel::{ChannelMode, EventChannel, Subscription};
use sonar::command::{Command, StatKind};
use sonar::event::WorldPosition;
use sonar::perception::{HeardPing, PerceptionFilter};
use sonar::session::Session;
use sonar::stats::PlayerStats;
use sonar::transport::{Transport, UdpTransport, Unconfigured};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::time::{self, Instant, MissedTickBehavior};

const MIN_TICK: Duration = Duration::from_millis(1);

pub fn start_background_services(
    tx: Sender<AppEvent>,
    socket: PathBuf,
    config_path: Option<PathBuf>,
) {
    {
        let tx = tx.clone();
        tokio::spawn(async move {
            crate::sys::server::run_server(&socket, tx).await;
        });
    }

    if let Some(path) = config_path {
        let tx = tx.clone();
        tokio::spawn(async move {
            config::run_async_watcher(path, tx).await;
        });
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(AppEvent::Shutdown).await;
        }
    });
}

/// Picks the backend once, at startup. A transport that can't be brought up
/// leaves the session running with publishes failing.
pub async fn open_channel(config: &Config) -> EventChannel {
    match config.mode {
        ChannelMode::Simulated => EventChannel::simulated(config.simulation.clone()),
        ChannelMode::Transport => {
            let transport: Arc<dyn Transport> = match UdpTransport::bind(&config.udp).await {
                Ok(t) => Arc::new(t),
                Err(e) => {
                    log::error!("Transport unavailable ({}); pings will not be delivered", e);
                    Arc::new(Unconfigured::new(e.to_string()))
                }
            };
            EventChannel::transport(transport, config.topic.clone())
        }
    }
}

pub fn initial_stats(config: &Config) -> PlayerStats {
    let mut stats = PlayerStats::default();
    stats.set_dampening_rank(config.ranks.dampening);
    stats.set_range_rank(config.ranks.range);
    stats
}

#[derive(Debug, Clone, Copy, Default)]
struct MovementInput {
    magnitude: f64,
    position: WorldPosition,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// The session's single timeline: frame ticks, inbound pings and app events
/// are all handled here, one at a time.
pub struct Driver {
    session: Session,
    subscription: Subscription,
    filter: PerceptionFilter,
    input: MovementInput,
    tick: Duration,
    config_path: Option<PathBuf>,
}

impl Driver {
    pub fn new(
        session: Session,
        presenter: Sender<HeardPing>,
        tick: Duration,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            subscription: session.subscribe(),
            session,
            filter: PerceptionFilter::new(presenter),
            input: MovementInput::default(),
            tick: tick.max(MIN_TICK),
            config_path,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn run(mut self, rx: Receiver<AppEvent>) {
        let mut ticker = time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_frame = Instant::now();

        loop {
            tokio::select! {
                now = ticker.tick() => {
                    let elapsed = now.saturating_duration_since(last_frame);
                    last_frame = now;
                    self.session
                        .report_movement(self.input.magnitude, self.input.position, elapsed)
                        .await;
                }
                Some(event) = self.subscription.recv() => {
                    self.filter.evaluate(&event, &self.session);
                }
                event = rx.recv() => {
                    let Ok(event) = event else { break };
                    if self.handle(event).await == Flow::Stop {
                        break;
                    }
                }
            }
        }

        self.session.shutdown().await;
        log::info!("{} left the session", self.session.player());
    }

    async fn handle(&mut self, event: AppEvent) -> Flow {
        match event {
            AppEvent::Input(Command::Move {
                magnitude,
                position,
            }) => {
                self.input = MovementInput {
                    magnitude,
                    position,
                };
            }
            AppEvent::Input(Command::Fire { position }) => {
                if !self.session.fire_discharge(position).await {
                    log::info!("Discharge still cooling down");
                }
            }
            AppEvent::Input(Command::Rank { stat, value }) => match stat {
                StatKind::Dampening => self.session.set_dampening_rank(value),
                StatKind::Range => self.session.set_range_rank(value),
            },
            AppEvent::Input(Command::Quit) | AppEvent::Shutdown => return Flow::Stop,
            AppEvent::ConfigReload => self.reload_ranks(),
        }
        Flow::Continue
    }

    fn reload_ranks(&mut self) {
        let Some(path) = &self.config_path else {
            return;
        };
        match config::load_config(path) {
            Ok(new_config) => {
                let ranks = new_config.ranks;
                let current = *self.session.stats();
                if i64::from(current.dampening_rank().get()) != ranks.dampening {
                    self.session.set_dampening_rank(ranks.dampening);
                }
                if i64::from(current.range_rank().get()) != ranks.range {
                    self.session.set_range_rank(ranks.range);
                }
                log::info!("Configuration reloaded");
            }
            Err(e) => log::error!("Failed to reload config: {}", e),
        }
    }
}

pub fn run(config: Config, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let rt = Runtime::new()?;

    rt.block_on(async move {
        let (tx, rx) = async_channel::bounded(32);
        let (ping_tx, ping_rx) = async_channel::bounded(64);

        start_background_services(tx, config.socket.clone(), config_path.clone());
        tokio::spawn(presenter::run_presenter(ping_rx));

        let channel = open_channel(&config).await;
        let session = Session::new(
            config.player_id.clone(),
            initial_stats(&config),
            config.emission.clone(),
            channel,
        );
        log::info!(
            "{} joined in {} mode (hearing radius {:.1})",
            session.player(),
            session.channel().mode(),
            session.perception_radius()
        );

        Driver::new(session, ping_tx, config.tick, config_path)
            .run(rx)
            .await;
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonar::channel::SimulationConfig;
    use sonar::emission::EmissionConfig;
    use sonar::event::PlayerId;
    use sonar::stats::Rank;

    fn driver(presenter: Sender<HeardPing>, config_path: Option<PathBuf>) -> Driver {
        let session = Session::new(
            PlayerId::from("me"),
            PlayerStats::default(),
            EmissionConfig::default(),
            EventChannel::simulated(SimulationConfig::default()),
        );
        Driver::new(session, presenter, Duration::from_millis(50), config_path)
    }

    #[tokio::test(start_paused = true)]
    async fn test_movement_pings_reach_presenter() {
        let (ping_tx, ping_rx) = async_channel::unbounded();
        let (tx, rx) = async_channel::unbounded();
        let task = tokio::spawn(driver(ping_tx, None).run(rx));

        tx.send(AppEvent::Input(Command::Move {
            magnitude: 0.5,
            position: WorldPosition::new(5.0, 0.0, 5.0),
        }))
        .await
        .unwrap();
        time::sleep(Duration::from_millis(1200)).await;
        tx.send(AppEvent::Input(Command::Quit)).await.unwrap();
        task.await.unwrap();

        let heard: Vec<HeardPing> = std::iter::from_fn(|| ping_rx.try_recv().ok()).collect();
        assert_eq!(heard.len(), 2);
        assert!(heard.iter().all(|p| p.source == PlayerId::from("echo:me")));
        assert!(heard.iter().all(|p| p.intensity == 3.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_pings_near_origin_are_heard() {
        let (ping_tx, ping_rx) = async_channel::unbounded();
        let (tx, rx) = async_channel::unbounded();
        let task = tokio::spawn(driver(ping_tx, None).run(rx));

        time::sleep(Duration::from_millis(9500)).await;
        tx.send(AppEvent::Shutdown).await.unwrap();
        task.await.unwrap();

        let heard: Vec<HeardPing> = std::iter::from_fn(|| ping_rx.try_recv().ok()).collect();
        assert_eq!(heard.len(), 3);
        assert!(heard.iter().all(|p| p.source == PlayerId::from("simulator")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rank_commands_and_cooldown() {
        let (ping_tx, _ping_rx) = async_channel::unbounded();
        let mut driver = driver(ping_tx, None);

        let flow = driver
            .handle(AppEvent::Input(Command::Rank {
                stat: StatKind::Range,
                value: 10,
            }))
            .await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(driver.session().stats().range_rank(), Rank::from(10));

        driver
            .handle(AppEvent::Input(Command::Rank {
                stat: StatKind::Dampening,
                value: -4,
            }))
            .await;
        assert_eq!(driver.session().stats().dampening_rank(), Rank::ZERO);

        assert_eq!(driver.handle(AppEvent::Shutdown).await, Flow::Stop);
        driver.session().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_reload_applies_ranks() {
        let dir = std::env::temp_dir().join(format!("earshot-reload-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[ranks]\ndampening = 4\nrange = 2\n").unwrap();

        let (ping_tx, _ping_rx) = async_channel::unbounded();
        let mut driver = driver(ping_tx, Some(path));
        driver.handle(AppEvent::ConfigReload).await;

        assert_eq!(driver.session().stats().dampening_rank(), Rank::from(4));
        assert_eq!(driver.session().stats().range_rank(), Rank::from(2));

        driver.session().shutdown().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_missing_transport_settings_fall_back() {
        let config = Config {
            mode: ChannelMode::Transport,
            ..Config::default()
        };
        let channel = open_channel(&config).await;
        assert_eq!(channel.mode(), ChannelMode::Transport);
        assert!(channel.subscribe().try_recv().is_none());
        channel.close().await;
    }

    #[test]
    fn test_initial_stats_clamp() {
        let config = Config {
            ranks: crate::config::RankConfig {
                dampening: -1,
                range: 3,
            },
            ..Config::default()
        };
        let stats = initial_stats(&config);
        assert_eq!(stats.dampening_rank(), Rank::ZERO);
        assert_eq!(stats.range_rank(), Rank::from(3));
    }
}
