//! The lease contract guarding mutation of centrally persisted state.
//!
//! Only one process may modify a deployment's remote config at a time. The process acquires the
//! deployment's lease, holds it for the whole of one logical operation, and hands it to every
//! persistence call as proof.

use crate::error::{AppError, Result};

/// A lease which may or may not currently be held by this process.
pub trait LeaseGuard: Send + Sync {
    /// The name of the leased resource.
    fn name(&self) -> &str;

    /// The identity this process holds the lease under.
    fn holder_identity(&self) -> &str;

    /// Check if the lease is held by this process right now.
    fn is_held(&self) -> bool;
}

/// Fail with `LeaseNotHeld` unless the given lease is held.
pub fn ensure_held(lease: &dyn LeaseGuard) -> Result<()> {
    if !lease.is_held() {
        return Err(AppError::LeaseNotHeld(lease.name().into()));
    }
    Ok(())
}
