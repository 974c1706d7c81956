//! Publish/subscribe for acoustic events.
//!
//! One [`EventChannel`] front, two backends picked at startup: the real
//! transport, or a local simulator that echoes publishes and invents
//! background pings on a timer.

mod relay;
mod simulated;

pub use simulated::{SIMULATOR_SOURCE, SimulationConfig};

use crate::event::{AcousticEvent, Topic, WireError};
use crate::transport::{Transport, TransportError};
use parking_lot::Mutex;
use serde::Serialize;
use serde_with::DeserializeFromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::{Display as StrumDisplay, EnumString};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Per-subscriber backlog before the oldest pending events are dropped.
const SUBSCRIBER_BACKLOG: usize = 256;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    DeserializeFromStr,
    EnumString,
    StrumDisplay,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    #[default]
    #[strum(to_string = "simulated", serialize = "sim", serialize = "mock")]
    Simulated,
    #[strum(to_string = "transport", serialize = "live", serialize = "realtime")]
    Transport,
}

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Wire(#[from] WireError),
}

enum Backend {
    Simulated,
    Transport {
        transport: Arc<dyn Transport>,
        topic: Topic,
    },
}

/// Fan-out state shared with the background tasks.
pub(crate) struct Shared {
    sender: Mutex<Option<broadcast::Sender<AcousticEvent>>>,
    closed: AtomicBool,
}

impl Shared {
    fn new() -> Arc<Self> {
        let (sender, _) = broadcast::channel(SUBSCRIBER_BACKLOG);
        Arc::new(Self {
            sender: Mutex::new(Some(sender)),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Hands the event to every current subscriber. Never waits.
    pub(crate) fn deliver(&self, event: AcousticEvent) {
        if self.is_closed() {
            return;
        }
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(event);
        }
    }
}

pub struct EventChannel {
    backend: Backend,
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventChannel {
    /// Must be called from within a tokio runtime.
    pub fn simulated(config: SimulationConfig) -> Self {
        let shared = Shared::new();
        let timer = tokio::spawn(simulated::run_timer(config, shared.clone()));
        log::info!("Event channel running in simulated mode");
        Self {
            backend: Backend::Simulated,
            shared,
            tasks: Mutex::new(vec![timer]),
        }
    }

    /// Must be called from within a tokio runtime. A transport that refuses the
    /// subscription still yields a usable channel; only inbound delivery is lost.
    pub fn transport(transport: Arc<dyn Transport>, topic: Topic) -> Self {
        let shared = Shared::new();
        let tasks = match transport.subscribe(&topic) {
            Ok(inbound) => vec![tokio::spawn(relay::pump(inbound, shared.clone()))],
            Err(e) => {
                log::warn!("Could not subscribe to '{}': {}", topic, e);
                Vec::new()
            }
        };
        log::info!("Event channel using transport on topic '{}'", topic);
        Self {
            backend: Backend::Transport { transport, topic },
            shared,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn mode(&self) -> ChannelMode {
        match self.backend {
            Backend::Simulated => ChannelMode::Simulated,
            Backend::Transport { .. } => ChannelMode::Transport,
        }
    }

    pub async fn publish(&self, event: AcousticEvent) -> Result<(), ChannelError> {
        if self.shared.is_closed() {
            return Err(ChannelError::Closed);
        }
        match &self.backend {
            Backend::Simulated => {
                simulated::echo(&self.shared, &event);
                Ok(())
            }
            Backend::Transport { transport, topic } => {
                transport.send(topic, event.encode()?).await?;
                Ok(())
            }
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let rx = match self.shared.sender.lock().as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).0.subscribe(),
        };
        Subscription {
            rx,
            shared: self.shared.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Stops the timer or transport pump and waits for it to finish. Safe to
    /// call more than once; subscribers see nothing after this returns.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            if let Err(e) = task.await
                && !e.is_cancelled()
            {
                log::error!("Event channel task failed: {}", e);
            }
        }
        if self.shared.sender.lock().take().is_some() {
            log::info!("Event channel closed");
        }
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.tasks.lock().iter().for_each(|t| t.abort());
    }
}

/// One listener's view of the inbound stream.
pub struct Subscription {
    rx: broadcast::Receiver<AcousticEvent>,
    shared: Arc<Shared>,
}

impl Subscription {
    /// `None` once the channel has been closed.
    pub async fn recv(&mut self) -> Option<AcousticEvent> {
        loop {
            if self.shared.is_closed() {
                return None;
            }
            match self.rx.recv().await {
                Ok(event) if !self.shared.is_closed() => return Some(event),
                Ok(_) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Subscriber lagging, skipped {} pings", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-waiting variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<AcousticEvent> {
        loop {
            if self.shared.is_closed() {
                return None;
            }
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    log::warn!("Subscriber lagging, skipped {} pings", n);
                }
                Err(_) => return None,
            }
        }
    }
}
