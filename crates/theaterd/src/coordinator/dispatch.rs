//! Outbound command seams.
//!
//! The coordinator never knows how a command physically leaves the building;
//! it only sees these two narrow traits.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tracing::warn;

use super::error::Error;
use super::error::Result;

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Transmits a named IR/RF command to a device. Returns once the command has
/// been handed off; there is no feedback from the device itself.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send_command(&self, device_id: &str, command: &str) -> Result<(), SinkError>;
}

/// Switches lights and switches on or off.
#[async_trait]
pub trait EntitySink: Send + Sync {
    /// `brightness` is in the device's native 0-255 range.
    async fn turn_on(&self, entity_id: &str, brightness: Option<u8>) -> Result<(), SinkError>;

    async fn turn_off(&self, entity_id: &str) -> Result<(), SinkError>;
}

/// Issues one command and waits for the sink to accept it.
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn CommandSink>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self { sink }
    }

    /// Failures are logged and returned; nothing is retried.
    pub async fn send(&self, device_id: &str, command: &str) -> Result<()> {
        debug!("Sending '{}' to {}", command, device_id);
        self.sink
            .send_command(device_id, command)
            .await
            .map_err(|source| {
                warn!("Command '{}' to {} failed: {}", command, device_id, source);
                Error::Dispatch {
                    device_id: device_id.to_string(),
                    command: command.to_string(),
                    source,
                }
            })
    }
}

/// Something the recording sink was asked to do.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sent {
    Command { device_id: String, command: String },
    TurnOn { entity_id: String, brightness: Option<u8> },
    TurnOff { entity_id: String },
}

#[cfg(test)]
impl Sent {
    pub fn command(device_id: &str, command: &str) -> Self {
        Sent::Command {
            device_id: device_id.to_string(),
            command: command.to_string(),
        }
    }
}

/// Sink double that records every call with its (virtual) time and can be
/// told to fail specific commands or entities.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    sent: std::sync::Mutex<Vec<(tokio::time::Instant, Sent)>>,
    failing: std::sync::Mutex<std::collections::HashSet<String>>,
}

#[cfg(test)]
impl RecordingSink {
    /// Make any command or entity with this name fail from now on.
    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().iter().map(|(_, s)| s.clone()).collect()
    }

    /// Command names only, in order.
    pub fn commands(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Command { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }

    /// When each occurrence of `command` was sent.
    pub fn times_of(&self, command: &str) -> Vec<tokio::time::Instant> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| matches!(s, Sent::Command { command: c, .. } if c == command))
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn record(&self, name: &str, sent: Sent) -> Result<(), SinkError> {
        if self.failing.lock().unwrap().contains(name) {
            return Err(format!("{} is unreachable", name).into());
        }
        self.sent
            .lock()
            .unwrap()
            .push((tokio::time::Instant::now(), sent));
        Ok(())
    }
}

#[cfg(test)]
#[async_trait]
impl CommandSink for RecordingSink {
    async fn send_command(&self, device_id: &str, command: &str) -> Result<(), SinkError> {
        self.record(command, Sent::command(device_id, command))
    }
}

#[cfg(test)]
#[async_trait]
impl EntitySink for RecordingSink {
    async fn turn_on(&self, entity_id: &str, brightness: Option<u8>) -> Result<(), SinkError> {
        self.record(
            entity_id,
            Sent::TurnOn {
                entity_id: entity_id.to_string(),
                brightness,
            },
        )
    }

    async fn turn_off(&self, entity_id: &str) -> Result<(), SinkError> {
        self.record(
            entity_id,
            Sent::TurnOff {
                entity_id: entity_id.to_string(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_success() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(sink.clone());

        dispatcher.send("amp", "power_on").await.unwrap();
        assert_eq!(sink.sent(), vec![Sent::command("amp", "power_on")]);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_reported() {
        let sink = Arc::new(RecordingSink::default());
        sink.fail_on("power_on");
        let dispatcher = Dispatcher::new(sink.clone());

        let err = dispatcher.send("amp", "power_on").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Dispatch { ref device_id, ref command, .. }
                if device_id == "amp" && command == "power_on"
        ));
        assert!(err.to_string().contains("power_on is unreachable"));
        assert!(sink.sent().is_empty());
    }
}
