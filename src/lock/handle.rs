use std::time::Duration;
use std::time::Instant;

use crate::coordination::deadline_after;

/// Proof of a granted lease
///
/// Owned by the acquirer. The backend reclaims the lock at `lease_deadline`
/// unless it is released or renewed first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    resource_key: String,
    holder_token: String,
    lease: Duration,
    lease_deadline: Instant,
}

impl LockHandle {
    pub(crate) fn new(
        resource_key: String,
        holder_token: String,
        lease: Duration,
        granted_at: Instant,
    ) -> Self {
        Self {
            resource_key,
            holder_token,
            lease,
            lease_deadline: deadline_after(granted_at, lease),
        }
    }

    pub fn resource_key(&self) -> &str {
        &self.resource_key
    }

    pub fn holder_token(&self) -> &str {
        &self.holder_token
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn lease_deadline(&self) -> Instant {
        self.lease_deadline
    }

    /// Local view only, the backend clock is authoritative.
    pub fn is_lease_expired(&self) -> bool {
        Instant::now() >= self.lease_deadline
    }

    pub(crate) fn extend(
        &mut self,
        lease: Duration,
        renewed_at: Instant,
    ) {
        self.lease = lease;
        self.lease_deadline = deadline_after(renewed_at, lease);
    }
}
