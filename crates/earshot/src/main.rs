use clap::Parser;
use earshot::config;
use earshot::sys::runtime;
use sonar::channel::ChannelMode;
use sonar::event::PlayerId;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "earshot", version, about = "Shared-session ping daemon", long_about = None)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Override the channel mode ("simulated" or "transport")
    #[arg(short = 'm', long)]
    mode: Option<ChannelMode>,

    /// Override the player id
    #[arg(short = 'p', long)]
    player: Option<String>,

    /// Write the default config file and exit
    #[arg(long)]
    init: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => Some(path),
        None => match config::get_config_path() {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("{}; running without a config file", e);
                None
            }
        },
    };

    if args.init {
        let path = config_path.ok_or_else(|| anyhow::anyhow!("No config path available"))?;
        let written = config::write_default_config(&path)?;
        println!("{}", written.display());
        return Ok(());
    }

    let mut cfg = config_path
        .as_deref()
        .map(config::load_or_default)
        .unwrap_or_default();
    if let Some(mode) = args.mode {
        cfg.mode = mode;
    }
    if let Some(player) = args.player {
        cfg.player_id = PlayerId::new(player);
    }

    runtime::run(cfg, config_path)
}
