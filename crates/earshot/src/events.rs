use sonar::command::Command;

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Input(Command),
    ConfigReload,
    Shutdown,
}

impl From<Command> for AppEvent {
    fn from(cmd: Command) -> Self {
        AppEvent::Input(cmd)
    }
}
