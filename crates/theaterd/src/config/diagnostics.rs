use std::io::Write;

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(ValidationError),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    /// A scene selects a source the HDMI switch has no command for.
    UnknownSceneSource {
        field_path: String,
        source: String,
    },
    /// A scene light entry outside the `light` and `switch` domains.
    UnsupportedLightDomain {
        field_path: String,
        entity_id: String,
    },
}

/// Error type for validation failures
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            message: message.into(),
        }
    }
}

/// A collection of diagnostics (warnings and/or errors)
#[derive(Debug, Clone)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_diagnostics(&self.0))
    }
}

impl std::error::Error for Diagnostics {}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_diagnostics(std::slice::from_ref(self)))
    }
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }

    pub fn field_path(&self) -> &str {
        match self {
            Diagnostic::Warning(Warning::UnknownSceneSource { field_path, .. })
            | Diagnostic::Warning(Warning::UnsupportedLightDomain { field_path, .. }) => {
                field_path
            }
            Diagnostic::Error(e) => &e.field_path,
        }
    }
}

/// Format all diagnostics for display
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(warning) => {
                let note = match warning {
                    Warning::UnknownSceneSource { source, .. } => format!(
                        "source '{}' is not in [hdmi.sources]; the scene will skip source selection",
                        source
                    ),
                    Warning::UnsupportedLightDomain { entity_id, .. } => format!(
                        "'{}' is neither a light nor a switch and will be skipped",
                        entity_id
                    ),
                };
                writeln!(
                    &mut output,
                    "\x1b[33mWarning\x1b[0m: {}",
                    diagnostic.field_path()
                )
                .ok();
                writeln!(&mut output, "  = {}", note).ok();
            }
            Diagnostic::Error(error) => {
                writeln!(&mut output, "\x1b[31mError\x1b[0m: {}", error.field_path).ok();
                writeln!(&mut output, "  = {}", error.message).ok();
            }
        }
        writeln!(&mut output).ok();
    }

    String::from_utf8_lossy(&output).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_and_warning() {
        let diagnostics = vec![
            Diagnostic::Error(ValidationError::new(
                "amplifier.volume_max_steps",
                "volume_max_steps must be at least 1",
            )),
            Diagnostic::Warning(Warning::UnsupportedLightDomain {
                field_path: "scenes[0].lights[2]".to_string(),
                entity_id: "fan.ceiling".to_string(),
            }),
        ];

        let output = format_diagnostics(&diagnostics);
        assert!(output.contains("Error\x1b[0m: amplifier.volume_max_steps"));
        assert!(output.contains("volume_max_steps must be at least 1"));
        assert!(output.contains("Warning\x1b[0m: scenes[0].lights[2]"));
        assert!(output.contains("'fan.ceiling' is neither a light nor a switch"));
    }

    #[test]
    fn test_is_error() {
        let err = Diagnostic::Error(ValidationError::new("a", "b"));
        let warn = Diagnostic::Warning(Warning::UnknownSceneSource {
            field_path: "scenes[0].source".to_string(),
            source: "Tape".to_string(),
        });
        assert!(err.is_error());
        assert!(!err.is_warning());
        assert!(warn.is_warning());
        assert_eq!(warn.field_path(), "scenes[0].source");
    }
}
