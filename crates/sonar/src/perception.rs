use crate::event::{AcousticEvent, PlayerId, Point};
use async_channel::{Sender, TrySendError};

/// What a filter needs to know about the listener, read fresh per event.
pub trait Observer {
    fn observer_position(&self) -> Point;
    fn perception_radius(&self) -> f64;
}

/// A ping that passed the distance check, handed to presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct HeardPing {
    pub origin: Point,
    pub intensity: f64,
    pub source: PlayerId,
}

impl From<&AcousticEvent> for HeardPing {
    fn from(event: &AcousticEvent) -> Self {
        Self {
            origin: event.origin,
            intensity: event.intensity,
            source: event.source.clone(),
        }
    }
}

/// Events exactly on the radius are audible.
pub fn is_audible(origin: &Point, observer: &Point, radius: f64) -> bool {
    origin.distance(observer) <= radius
}

pub struct PerceptionFilter {
    sink: Sender<HeardPing>,
}

impl PerceptionFilter {
    pub fn new(sink: Sender<HeardPing>) -> Self {
        Self { sink }
    }

    /// Forwards the event to presentation if the observer can hear it.
    /// Never waits on the presentation side.
    pub fn evaluate(&self, event: &AcousticEvent, observer: &impl Observer) -> bool {
        if !is_audible(
            &event.origin,
            &observer.observer_position(),
            observer.perception_radius(),
        ) {
            return false;
        }

        match self.sink.try_send(HeardPing::from(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(ping)) => {
                log::warn!("Presentation backlog full, dropping ping from {}", ping.source);
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("Presentation sink closed");
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Listener {
        at: Point,
        radius: f64,
    }

    impl Observer for Listener {
        fn observer_position(&self) -> Point {
            self.at
        }

        fn perception_radius(&self) -> f64 {
            self.radius
        }
    }

    fn event_at(x: f64, y: f64) -> AcousticEvent {
        AcousticEvent::new(Point::new(x, y), 3.0, PlayerId::from("other"))
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let observer = Point::new(10.0, 10.0);
        assert!(is_audible(&Point::new(210.0, 10.0), &observer, 200.0));
        assert!(!is_audible(&Point::new(210.0 + 1e-9, 10.0), &observer, 200.0));
    }

    #[test]
    fn test_audible_event_forwarded() {
        let (tx, rx) = async_channel::unbounded();
        let filter = PerceptionFilter::new(tx);
        let listener = Listener {
            at: Point::default(),
            radius: 200.0,
        };

        assert!(filter.evaluate(&event_at(120.0, 160.0), &listener));
        let heard = rx.try_recv().unwrap();
        assert_eq!(heard.origin, Point::new(120.0, 160.0));
        assert_eq!(heard.intensity, 3.0);
        assert_eq!(heard.source, PlayerId::from("other"));
    }

    #[test]
    fn test_out_of_range_is_silent() {
        let (tx, rx) = async_channel::unbounded();
        let filter = PerceptionFilter::new(tx);
        let listener = Listener {
            at: Point::default(),
            radius: 200.0,
        };

        assert!(!filter.evaluate(&event_at(0.0, 200.5), &listener));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_sink_does_not_block() {
        let (tx, rx) = async_channel::bounded(1);
        let filter = PerceptionFilter::new(tx);
        let listener = Listener {
            at: Point::default(),
            radius: 50.0,
        };

        assert!(filter.evaluate(&event_at(1.0, 1.0), &listener));
        assert!(filter.evaluate(&event_at(2.0, 2.0), &listener));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_closed_sink_still_evaluates() {
        let (tx, rx) = async_channel::unbounded();
        drop(rx);
        let filter = PerceptionFilter::new(tx);
        let listener = Listener {
            at: Point::default(),
            radius: 50.0,
        };

        assert!(filter.evaluate(&event_at(1.0, 1.0), &listener));
    }
}
