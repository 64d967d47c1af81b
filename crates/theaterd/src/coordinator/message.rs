//! Requests from handles to the coordinator task.

use tokio::sync::oneshot;

use super::error::Result;
use crate::config::TheaterConfig;

/// Operations the coordinator applies, one at a time, in arrival order.
#[derive(Debug)]
pub enum Command {
    PowerOn,
    PowerOff,
    VolumeUp,
    VolumeDown,
    MuteToggle,
    /// Toggle mute only if the tracked flag differs.
    SetMuted(bool),
    /// Step the volume to an absolute level.
    SetVolumeLevel(f64),
    /// Correct the tracked volume without sending anything.
    SyncVolume(f64),
    SelectSource(String),
    ScreenUp,
    ScreenDown,
    ScreenStop,
    ActivateScene(String),
    UpdateConfig(Box<TheaterConfig>),
    /// Cancel timers, flush pending state and stop the task.
    Shutdown,
}

pub(super) struct Request {
    pub command: Command,
    pub reply: oneshot::Sender<Result<()>>,
}
