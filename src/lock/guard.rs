use std::time::Duration;

use tracing::debug;
use tracing::warn;

use super::LockHandle;
use super::LockManager;
use crate::Result;

/// Scoped ownership of a granted lock
///
/// Release runs exactly once per guard: either through [`LockGuard::release`],
/// which consumes the guard, or from `Drop` when the owner never released it.
/// The drop path spawns the release on the current tokio runtime; without a
/// runtime the lock is left to expire at its lease.
#[derive(Debug)]
pub struct LockGuard {
    manager: LockManager,
    handle: LockHandle,
    released: bool,
}

impl LockGuard {
    pub(crate) fn new(
        manager: LockManager,
        handle: LockHandle,
    ) -> Self {
        Self {
            manager,
            handle,
            released: false,
        }
    }

    pub fn handle(&self) -> &LockHandle {
        &self.handle
    }

    pub fn resource_key(&self) -> &str {
        self.handle.resource_key()
    }

    /// Extends the lease of the held lock.
    pub async fn renew(
        &mut self,
        lease: Duration,
    ) -> Result<()> {
        self.manager.renew(&mut self.handle, lease).await
    }

    /// Releases the lock and publishes the release notification.
    ///
    /// Returns `Ok(false)` when the lease had already expired or been taken
    /// over, which is not an error.
    ///
    /// Dropping this future before the backend answered leaves the release
    /// to `Drop`.
    pub async fn release(mut self) -> Result<bool> {
        let result = self.manager.release(&self.handle).await;
        self.released = true;
        result
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let manager = self.manager.clone();
                let handle = self.handle.clone();
                debug!(resource_key = handle.resource_key(), "Releasing dropped lock guard");
                runtime.spawn(async move {
                    if let Err(e) = manager.release(&handle).await {
                        warn!(
                            resource_key = handle.resource_key(),
                            "Release of dropped lock guard failed: {:?}", e
                        );
                    }
                });
            }
            Err(_) => {
                warn!(
                    resource_key = self.handle.resource_key(),
                    lease = ?self.handle.lease(),
                    "Lock guard dropped outside a runtime, lock expires with its lease"
                );
            }
        }
    }
}
