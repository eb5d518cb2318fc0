//! Transport-independent manager commands.

use crate::error::OverlayError;
use crate::instance::{InstanceId, Mode, SettingValue};
use crate::lifecycle::LifecycleCoordinator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ensure the manager is running; seeds one instance if none exist.
    Start,
    AddInstance,
    UpdateSetting {
        id: InstanceId,
        key: String,
        value: SettingValue,
    },
    SwitchMode {
        id: InstanceId,
        mode: Mode,
    },
    RemoveInstance(InstanceId),
    StopAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Started { live: usize },
    Added(InstanceId),
    /// `changed` is false when the value was already in place.
    Updated { id: InstanceId, changed: bool },
    RemovalQueued(InstanceId),
    StopQueued { count: usize },
}

impl LifecycleCoordinator {
    /// Run one command. Capacity and persistence failures are returned to
    /// the caller; unknown instances and invalid settings are also logged
    /// where they are detected and leave all state untouched.
    pub fn dispatch(&self, command: Command) -> Result<CommandOutcome, OverlayError> {
        tracing::debug!(?command, "dispatching command");
        match command {
            Command::Start => {
                self.start()?;
                Ok(CommandOutcome::Started {
                    live: self.live_count(),
                })
            }
            Command::AddInstance => self.add_instance().map(CommandOutcome::Added),
            Command::UpdateSetting { id, key, value } => {
                let changed = self.update_setting(id, &key, value)?;
                Ok(CommandOutcome::Updated { id, changed })
            }
            Command::SwitchMode { id, mode } => {
                let changed = self.switch_mode(id, mode)?;
                Ok(CommandOutcome::Updated { id, changed })
            }
            Command::RemoveInstance(id) => {
                self.remove_instance(id)?;
                Ok(CommandOutcome::RemovalQueued(id))
            }
            Command::StopAll => Ok(CommandOutcome::StopQueued {
                count: self.stop_all(),
            }),
        }
    }
}
