//! System-wide constants for the TxGuard handshake core.

/// Default build-phase TTL in seconds (15 minutes).
///
/// Also the age at which the background sweep reclaims a pending request,
/// regardless of any per-flow override.
pub const DEFAULT_BUILD_TTL_SECS: u64 = 15 * 60;

/// Default confirm-phase TTL in seconds (10 minutes).
///
/// Must never exceed [`DEFAULT_BUILD_TTL_SECS`].
pub const DEFAULT_CONFIRM_TTL_SECS: u64 = 10 * 60;

/// Default interval between background sweeps of the request store.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Number of random bytes behind every request id.
pub const REQUEST_ID_BYTES: usize = 32;

/// Length of a hex-encoded request id.
pub const REQUEST_ID_HEX_LEN: usize = REQUEST_ID_BYTES * 2;

/// Number of hex characters of a hash written to logs and errors.
pub const HASH_PREFIX_LEN: usize = 8;

/// Maximum accepted size of a serialized transaction (bytes).
pub const MAX_TRANSACTION_SIZE: usize = 1232;

/// Environment variable overriding the build-phase TTL.
pub const ENV_BUILD_TTL_SECS: &str = "TXGUARD_BUILD_TTL_SECS";

/// Environment variable overriding the confirm-phase TTL.
pub const ENV_CONFIRM_TTL_SECS: &str = "TXGUARD_CONFIRM_TTL_SECS";

/// Environment variable overriding the sweep interval.
pub const ENV_SWEEP_INTERVAL_SECS: &str = "TXGUARD_SWEEP_INTERVAL_SECS";

/// Environment variable enabling a bounded wait on resource locks.
pub const ENV_LOCK_TIMEOUT_MS: &str = "TXGUARD_LOCK_TIMEOUT_MS";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
