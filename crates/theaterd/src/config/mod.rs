#[allow(clippy::module_inception)]
mod config;
mod diagnostics;

pub use config::*;
pub use diagnostics::format_diagnostics;
pub use diagnostics::Diagnostic;
pub use diagnostics::Diagnostics;
pub use diagnostics::ValidationError;
pub use diagnostics::Warning;
