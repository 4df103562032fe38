//! Validation utilities
//!
//! Partition labels end up in shell commands and file names, so they are
//! checked before any backup or delete runs.

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a partition label
///
/// # Validation Rules
/// - Label must not be empty and must be ≤ 64 characters
/// - Only ASCII letters, digits, `_`, `-` and `.` are allowed
/// - Cannot start with `-` or `.`
/// - Cannot contain `..`
///
/// # Examples
/// ```
/// # use partsafe_common::validate_partition_label;
/// assert!(validate_partition_label("boot_a").is_ok());
/// assert!(validate_partition_label("ALIGN_TO_128K_1").is_ok());
/// assert!(validate_partition_label("../etc").is_err());
/// assert!(validate_partition_label("boot a").is_err());
/// ```
pub fn validate_partition_label(label: &str) -> Result<(), ValidationError> {
    let err = |message: &str| Err(ValidationError::new("label", message));

    if label.is_empty() {
        return err("Partition label cannot be empty");
    }

    if label.len() > 64 {
        return err("Partition label too long (max 64 characters)");
    }

    if label.starts_with('-') || label.starts_with('.') {
        return err("Partition label cannot start with '-' or '.'");
    }

    if label.contains("..") {
        return err("Partition label cannot contain '..'");
    }

    if let Some(c) = label
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(ValidationError::new(
            "label",
            format!("Partition label contains invalid character {c:?}"),
        ));
    }

    Ok(())
}
