pub mod api;
pub mod config;
pub mod coordinator;
pub mod integrations;

pub use config::format_diagnostics;
pub use config::Config;
pub use config::Diagnostic;
pub use config::Diagnostics;
pub use config::LogLevel;
pub use config::TheaterConfig;
pub use coordinator::Coordinator;
pub use coordinator::CoordinatorHandle;
pub use coordinator::ScreenPosition;
pub use coordinator::TheaterState;
