pub mod channel;
pub mod command;
pub mod emission;
pub mod event;
pub mod macros;
pub mod perception;
pub mod session;
pub mod stats;
pub mod transport;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/earshot.sock";
