/// Prefix of the lock key derived from a stock id
pub const DEFAULT_LOCK_KEY_PREFIX: &str = "stock:lock:";

/// Prefix of the pub/sub channel a lock's release notifications go to
pub const DEFAULT_RELEASE_CHANNEL_PREFIX: &str = "stock:lock:release:";

/// Payload published on a release channel
pub const UNLOCK_MESSAGE: &str = "unlock";

/// Env prefix used by the config loader, e.g. `DLOCK__LOCK__WAIT_TIMEOUT_MS`
pub const CONFIG_ENV_PREFIX: &str = "DLOCK";

/// Sled tree holding stock records
pub(crate) const STOCK_TREE_NAMESPACE: &str = "stock";
