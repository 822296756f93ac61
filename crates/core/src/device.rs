//! Device registration constants and validation.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a device display name.
pub const MAX_NAME_LEN: usize = 100;

/// Maximum length of a device type tag (e.g. `"router"`, `"switch"`).
pub const MAX_TYPE_LEN: usize = 50;

/// Maximum length of an alert message, matching `alerts.message`.
pub const MAX_ALERT_MESSAGE_LEN: usize = 200;

/// Default seconds between two health-check passes.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a device display name.
///
/// Rules:
/// - Must not be empty or whitespace only.
/// - Must not exceed `MAX_NAME_LEN` characters.
pub fn validate_device_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Device name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Device name must not exceed {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate a device type tag.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_TYPE_LEN` characters.
/// - Must not contain whitespace.
pub fn validate_device_type(device_type: &str) -> Result<(), CoreError> {
    if device_type.is_empty() {
        return Err(CoreError::Validation(
            "Device type must not be empty".to_string(),
        ));
    }
    if device_type.chars().count() > MAX_TYPE_LEN {
        return Err(CoreError::Validation(format!(
            "Device type must not exceed {MAX_TYPE_LEN} characters"
        )));
    }
    if device_type.chars().any(char::is_whitespace) {
        return Err(CoreError::Validation(
            "Device type must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
