//! Readiness verdict derived from probe results.

use crate::core::types::{HealthSnapshot, Readiness};

/// `Ready` only when every downstream probe reports `ok`.
///
/// Derived on every call from the (possibly cached) snapshot; never cached itself.
pub fn readiness(snapshot: &HealthSnapshot) -> Readiness {
    if snapshot.postgres.is_ok() && snapshot.minio.is_ok() {
        Readiness::Ready
    } else {
        Readiness::Degraded
    }
}
