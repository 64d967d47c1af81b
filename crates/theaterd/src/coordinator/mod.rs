//! The theater coordinator.
//!
//! A single task owns the theater state and applies every command in turn;
//! callers talk to it through a cloneable `CoordinatorHandle`.

#[allow(clippy::module_inception)]
mod coordinator;
mod devices;
mod dispatch;
mod error;
mod listeners;
mod message;
mod scene;
mod screen;
pub mod state;
pub mod store;

pub use coordinator::Coordinator;
pub use coordinator::CoordinatorHandle;
#[cfg(test)]
pub(crate) use coordinator::testing;
pub use dispatch::CommandSink;
pub use dispatch::Dispatcher;
pub use dispatch::EntitySink;
pub use dispatch::SinkError;
pub use error::Error;
pub use error::Result;
pub use listeners::Subscription;
pub use message::Command;
pub use scene::brightness_to_native;
pub use state::ScreenPosition;
pub use state::TheaterState;
pub use store::JsonFileStore;
pub use store::Persistence;
pub use store::Snapshot;
pub use store::StateStore;
