//! Helpers for building shell command lines

/// Quote a value for safe interpolation into a shell command
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
