//! Line protocol spoken on the daemon's control socket.

use crate::event::WorldPosition;
use std::fmt;
use std::str::FromStr;
use strum::{Display as StrumDisplay, EnumString};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, StrumDisplay)]
#[strum(ascii_case_insensitive)]
pub enum StatKind {
    #[strum(to_string = "dampening", serialize = "damp")]
    Dampening,
    #[strum(to_string = "range", serialize = "hearing")]
    Range,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Move {
        magnitude: f64,
        position: WorldPosition,
    },
    Fire {
        position: WorldPosition,
    },
    Rank {
        stat: StatKind,
        value: i64,
    },
    Quit,
}

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command '{0}'")]
    Unknown(String),
    #[error("'{command}' expects {expected} argument(s), got {got}")]
    Arity {
        command: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("Invalid argument '{0}'")]
    Argument(String),
    #[error("Unbalanced quoting")]
    Quoting,
}

fn number<T: FromStr>(arg: &str) -> Result<T, CommandError> {
    arg.parse().map_err(|_| CommandError::Argument(arg.to_string()))
}

fn position(args: &[String]) -> Result<WorldPosition, CommandError> {
    Ok(WorldPosition::new(
        number(&args[0])?,
        number(&args[1])?,
        number(&args[2])?,
    ))
}

fn expect(command: &'static str, args: &[String], expected: usize) -> Result<(), CommandError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(CommandError::Arity {
            command,
            expected,
            got: args.len(),
        })
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words = shell_words::split(line).map_err(|_| CommandError::Quoting)?;
        let Some((head, args)) = words.split_first() else {
            return Err(CommandError::Empty);
        };

        match head.to_ascii_lowercase().as_str() {
            "move" => {
                expect("move", args, 4)?;
                Ok(Command::Move {
                    magnitude: number(&args[0])?,
                    position: position(&args[1..])?,
                })
            }
            "fire" => {
                expect("fire", args, 3)?;
                Ok(Command::Fire {
                    position: position(args)?,
                })
            }
            "rank" => {
                expect("rank", args, 2)?;
                Ok(Command::Rank {
                    stat: args[0]
                        .parse()
                        .map_err(|_| CommandError::Argument(args[0].clone()))?,
                    value: number(&args[1])?,
                })
            }
            "quit" => {
                expect("quit", args, 0)?;
                Ok(Command::Quit)
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Move {
                magnitude,
                position: p,
            } => write!(f, "move {} {} {} {}", magnitude, p.x, p.y, p.z),
            Command::Fire { position: p } => write!(f, "fire {} {} {}", p.x, p.y, p.z),
            Command::Rank { stat, value } => write!(f, "rank {} {}", stat, value),
            Command::Quit => write!(f, "quit"),
        }
    }
}
