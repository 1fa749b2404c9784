//! Smart Door Configuration
//!
//! Connection and timing settings for the access contract client.
//! Supports loading from environment variables with the `SMARTDOOR_` prefix
//! and from the `configKeys.json` layout used by the game client.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;
use crate::error::{DoorError, DoorResult};
use crate::types::{Principal, Signer};

/// Client configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct DoorConfig {
    /// JSON-RPC endpoint of the ledger node
    ///
    /// Reserved for a networked ledger client backend. The in-memory ledger
    /// ignores it and `smartdoor config` only reports it.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Access contract address
    #[serde(default)]
    pub contract_address: Option<String>,
    /// Key the doors sign `openDoor` transactions with
    #[serde(default)]
    pub door_private_key: Option<String>,
    /// Account controlled by `door_private_key`
    #[serde(default)]
    pub door_address: Option<String>,
    /// Chain ID signed transactions are bound to
    ///
    /// Reserved alongside `rpc_url`; nothing in the workspace signs raw
    /// transactions yet.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Delay between reconciliation cycles in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Delay before retrying a failed reconciliation cycle in seconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
    /// Receipt polling attempts before giving up
    #[serde(default = "default_receipt_attempts")]
    pub receipt_max_attempts: u32,
    /// Spacing between receipt polls in milliseconds
    #[serde(default = "default_receipt_interval")]
    pub receipt_interval_millis: u64,
    /// Directory of the persisted watermark store
    #[serde(default = "default_watermark_path")]
    pub watermark_path: PathBuf,
    /// Only spawn external presences for physical door openings
    #[serde(default = "default_true")]
    pub spawn_only_physical: bool,
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_retry_backoff() -> u64 {
    DEFAULT_RETRY_BACKOFF_SECS
}

fn default_receipt_attempts() -> u32 {
    DEFAULT_RECEIPT_ATTEMPTS
}

fn default_receipt_interval() -> u64 {
    DEFAULT_RECEIPT_INTERVAL_MS
}

fn default_watermark_path() -> PathBuf {
    PathBuf::from("./smartdoor-watermarks")
}

fn default_true() -> bool {
    true
}

impl Default for DoorConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            contract_address: None,
            door_private_key: None,
            door_address: None,
            chain_id: DEFAULT_CHAIN_ID,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            retry_backoff_secs: DEFAULT_RETRY_BACKOFF_SECS,
            receipt_max_attempts: DEFAULT_RECEIPT_ATTEMPTS,
            receipt_interval_millis: DEFAULT_RECEIPT_INTERVAL_MS,
            watermark_path: default_watermark_path(),
            spawn_only_physical: true,
        }
    }
}

impl std::fmt::Debug for DoorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoorConfig")
            .field("rpc_url", &self.rpc_url)
            .field("contract_address", &self.contract_address)
            .field(
                "door_private_key",
                &self.door_private_key.as_ref().map(|_| "0x****"),
            )
            .field("door_address", &self.door_address)
            .field("chain_id", &self.chain_id)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("retry_backoff_secs", &self.retry_backoff_secs)
            .field("receipt_max_attempts", &self.receipt_max_attempts)
            .field("receipt_interval_millis", &self.receipt_interval_millis)
            .field("watermark_path", &self.watermark_path)
            .field("spawn_only_physical", &self.spawn_only_physical)
            .finish()
    }
}

/// `configKeys.json` layout
#[derive(Debug, Deserialize)]
struct ConfigKeys {
    ethereum: EthereumKeys,
    #[serde(default)]
    network: Option<NetworkKeys>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EthereumKeys {
    #[serde(default)]
    rpc_url: Option<String>,
    #[serde(default)]
    contract_user_device: Option<String>,
    #[serde(default)]
    door_private_key: Option<String>,
    #[serde(default)]
    door_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkKeys {
    chain_id: u64,
    #[allow(dead_code)]
    #[serde(default)]
    network_name: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

impl DoorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - SMARTDOOR_RPC_URL: JSON-RPC endpoint
    /// - SMARTDOOR_CONTRACT_ADDRESS: Access contract address
    /// - SMARTDOOR_DOOR_PRIVATE_KEY: Door signing key
    /// - SMARTDOOR_DOOR_ADDRESS: Account of the door signing key
    /// - SMARTDOOR_CHAIN_ID: Chain ID
    /// - SMARTDOOR_POLL_INTERVAL: Reconciliation cycle delay in seconds
    /// - SMARTDOOR_RETRY_BACKOFF: Failed cycle retry delay in seconds
    /// - SMARTDOOR_RECEIPT_ATTEMPTS: Receipt polling attempts
    /// - SMARTDOOR_RECEIPT_INTERVAL_MS: Receipt polling spacing in milliseconds
    /// - SMARTDOOR_WATERMARK_PATH: Watermark store directory
    /// - SMARTDOOR_SPAWN_ONLY_PHYSICAL: Restrict presence spawning to physical doors
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rpc_url: env::var("SMARTDOOR_RPC_URL").unwrap_or(defaults.rpc_url),
            contract_address: env::var("SMARTDOOR_CONTRACT_ADDRESS").ok(),
            door_private_key: env::var("SMARTDOOR_DOOR_PRIVATE_KEY").ok(),
            door_address: env::var("SMARTDOOR_DOOR_ADDRESS").ok(),
            chain_id: env_parse("SMARTDOOR_CHAIN_ID").unwrap_or(defaults.chain_id),
            poll_interval_secs: env_parse("SMARTDOOR_POLL_INTERVAL")
                .unwrap_or(defaults.poll_interval_secs),
            retry_backoff_secs: env_parse("SMARTDOOR_RETRY_BACKOFF")
                .unwrap_or(defaults.retry_backoff_secs),
            receipt_max_attempts: env_parse("SMARTDOOR_RECEIPT_ATTEMPTS")
                .unwrap_or(defaults.receipt_max_attempts),
            receipt_interval_millis: env_parse("SMARTDOOR_RECEIPT_INTERVAL_MS")
                .unwrap_or(defaults.receipt_interval_millis),
            watermark_path: env::var("SMARTDOOR_WATERMARK_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.watermark_path),
            spawn_only_physical: env::var("SMARTDOOR_SPAWN_ONLY_PHYSICAL")
                .map(|s| s.to_lowercase() == "true" || s == "1")
                .unwrap_or(true),
        }
    }

    /// Parse the game client's `configKeys.json`
    ///
    /// Fields absent from the file keep their defaults.
    pub fn from_keys_json(json: &str) -> DoorResult<Self> {
        let keys: ConfigKeys = serde_json::from_str(json)
            .map_err(|e| DoorError::Configuration(format!("Invalid configKeys.json: {}", e)))?;

        let mut config = Self::default();
        if let Some(url) = keys.ethereum.rpc_url {
            config.rpc_url = url;
        }
        config.contract_address = keys.ethereum.contract_user_device;
        config.door_private_key = keys.ethereum.door_private_key;
        config.door_address = keys.ethereum.door_address;
        if let Some(network) = keys.network {
            config.chain_id = network.chain_id;
        }
        Ok(config)
    }

    /// Local development network with short intervals
    pub fn development() -> Self {
        Self {
            poll_interval_secs: 3,
            retry_backoff_secs: 1,
            receipt_interval_millis: 250,
            ..Self::default()
        }
    }

    /// Access contract address
    pub fn contract(&self) -> DoorResult<Principal> {
        let raw = self.contract_address.as_deref().ok_or_else(|| {
            DoorError::Configuration("contract_address is not set".to_string())
        })?;
        Principal::parse(raw)
    }

    /// Door signing identity
    pub fn door_signer(&self) -> DoorResult<Signer> {
        match (&self.door_private_key, &self.door_address) {
            (Some(key), Some(address)) => Signer::from_parts(key, address),
            _ => Err(DoorError::Configuration(
                "door_private_key and door_address must both be set".to_string(),
            )),
        }
    }

    /// Check every configured value, collecting all problems
    pub fn validate(&self) -> DoorResult<()> {
        let mut problems = Vec::new();

        if self.rpc_url.trim().is_empty() {
            problems.push("rpc_url is empty".to_string());
        }
        if let Err(e) = self.contract() {
            problems.push(e.to_string());
        }
        if self.door_private_key.is_some() || self.door_address.is_some() {
            if let Err(e) = self.door_signer() {
                problems.push(e.to_string());
            }
        }
        if self.poll_interval_secs == 0 {
            problems.push("poll_interval_secs must be positive".to_string());
        }
        if self.retry_backoff_secs == 0 {
            problems.push("retry_backoff_secs must be positive".to_string());
        }
        if self.receipt_max_attempts == 0 {
            problems.push("receipt_max_attempts must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DoorError::Configuration(problems.join("; ")))
        }
    }

    /// Copy safe to print or serialize
    pub fn redacted(&self) -> Self {
        Self {
            door_private_key: self.door_private_key.as_ref().map(|_| "0x****".to_string()),
            ..self.clone()
        }
    }

    /// Delay between reconciliation cycles
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Delay before retrying a failed cycle
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    /// Spacing between receipt polls
    pub fn receipt_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_interval_millis)
    }
}
