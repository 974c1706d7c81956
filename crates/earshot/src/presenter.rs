use async_channel::Receiver;
use sonar::perception::HeardPing;

/// Stand-in for the ring renderer: reports every ping the player can hear.
pub async fn run_presenter(rx: Receiver<HeardPing>) {
    while let Ok(ping) = rx.recv().await {
        log::info!("{}", describe(&ping));
    }
}

pub fn describe(ping: &HeardPing) -> String {
    format!(
        "heard {} at ({:.1}, {:.1}), intensity {:.2}",
        ping.source, ping.origin.x, ping.origin.y, ping.intensity
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonar::event::{PlayerId, Point};

    #[test]
    fn test_describe() {
        let ping = HeardPing {
            origin: Point::new(12.345, -3.0),
            intensity: 6.3871,
            source: PlayerId::from("echo:me"),
        };
        assert_eq!(
            describe(&ping),
            "heard echo:me at (12.3, -3.0), intensity 6.39"
        );
    }
}
