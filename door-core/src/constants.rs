//! Protocol constants

/// Rendered address length: `0x` + 40 hex characters
pub const ADDRESS_LEN: usize = 42;

/// Rendered signing key length: `0x` + 64 hex characters
pub const SIGNING_KEY_LEN: usize = 66;

/// Hex prefix required on addresses and keys
pub const HEX_PREFIX: &str = "0x";

/// Receipt status reported for a successful transaction
pub const RECEIPT_STATUS_SUCCESS: u64 = 1;

/// Default number of receipt polling attempts
pub const DEFAULT_RECEIPT_ATTEMPTS: u32 = 10;

/// Default spacing between receipt polls (milliseconds)
pub const DEFAULT_RECEIPT_INTERVAL_MS: u64 = 1_000;

/// Default delay between reconciliation cycles (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default delay before retrying a failed reconciliation cycle (seconds)
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 3;

/// Default chain id of the local development network
pub const DEFAULT_CHAIN_ID: u64 = 1337;

/// Default JSON-RPC endpoint
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
