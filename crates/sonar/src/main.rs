use clap::{Parser, Subcommand};
use sonar::command::{Command, StatKind};
use sonar::event::WorldPosition;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "sonar", version, about = "Send input to a running earshot daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Control socket of the daemon
    #[arg(short = 's', long, default_value = sonar::DEFAULT_SOCKET_PATH)]
    socket: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Report the current movement input (magnitude in [0, 1]) and position.
    Move {
        magnitude: f64,
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
        #[arg(allow_negative_numbers = true)]
        z: f64,
    },
    /// Fire a weapon at the given position.
    Fire {
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
        #[arg(allow_negative_numbers = true)]
        z: f64,
    },
    /// Set a progression rank (negative values become 0).
    Rank {
        /// "dampening" or "range"
        stat: StatKind,
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },
    /// Stop the daemon
    Quit,
}

impl From<Commands> for Command {
    fn from(cmd: Commands) -> Self {
        match cmd {
            Commands::Move { magnitude, x, y, z } => Command::Move {
                magnitude,
                position: WorldPosition::new(x, y, z),
            },
            Commands::Fire { x, y, z } => Command::Fire {
                position: WorldPosition::new(x, y, z),
            },
            Commands::Rank { stat, value } => Command::Rank { stat, value },
            Commands::Quit => Command::Quit,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    send_command(&cli.socket, &Command::from(cli.command))
}

fn send_command(socket: &Path, cmd: &Command) -> anyhow::Result<()> {
    let mut stream = UnixStream::connect(socket).map_err(|e| {
        anyhow::anyhow!(
            "Failed to connect to earshot daemon at {}: {}. Is earshot running?",
            socket.display(),
            e
        )
    })?;

    log::debug!("sending '{}'", cmd);
    writeln!(stream, "{}", cmd)?;
    Ok(())
}
