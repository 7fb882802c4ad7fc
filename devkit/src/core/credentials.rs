//! Deny-list check for well-known development credentials.

use crate::error::{DevkitError, Result};

/// Values that must never be used as real secrets.
pub const INSECURE_VALUES: &[&str] = &[
    "postgres",
    "minioadmin",
    "CHANGE_ME_INSECURE",
    "password",
    "admin",
];

pub fn is_insecure(value: &str) -> bool {
    INSECURE_VALUES.contains(&value)
}

/// Fail on the first `(variable, value)` pair whose value is on the deny-list.
pub fn ensure_secure(secrets: &[(&'static str, &str)]) -> Result<()> {
    for &(key, value) in secrets {
        if is_insecure(value) {
            return Err(DevkitError::InsecureConfiguration { key });
        }
    }
    Ok(())
}
