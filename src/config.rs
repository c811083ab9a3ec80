//! Client configuration.

use crate::error::Result;
use crate::types::{Commitment, RecordAddress};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default RPC endpoint (local validator).
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8899";

const COUNTER_PROGRAM_ID: &str = "ABxpQTckk4jR1oZ3kFzbUNTcvZfE3TP7nBhecFhysjGy";
const COUNTER_MANAGER_PROGRAM_ID: &str = "4SXjVQ2iU8iticsh7VCmnCCuko9VLbshmXdVDW2nEi5X";
const TRACKER_PROGRAM_ID: &str = "4FiqmNTgPxvXZLfiuUuJkF28tdupFz66HnMQRTjmUS7r";
const CHECK_PROGRAM_ID: &str = "9EFLnZiD7Hrb41KsMNW6JTAGFpyZtHb2zAHFUhPQztPi";

/// Settings the connection hands to the channel factory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Commitment used for subscriptions and reads that don't override it.
    /// Default: confirmed
    #[serde(default)]
    pub commitment: Commitment,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            commitment: Commitment::Confirmed,
        }
    }
}

/// Addresses of the programs the stores talk to. Missing entries take the
/// built-in ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramIds {
    pub counter: RecordAddress,
    pub counter_manager: RecordAddress,
    pub tracker: RecordAddress,
    pub check: RecordAddress,
}

impl Default for ProgramIds {
    fn default() -> Self {
        Self {
            counter: parse_builtin(COUNTER_PROGRAM_ID),
            counter_manager: parse_builtin(COUNTER_MANAGER_PROGRAM_ID),
            tracker: parse_builtin(TRACKER_PROGRAM_ID),
            check: parse_builtin(CHECK_PROGRAM_ID),
        }
    }
}

fn parse_builtin(id: &str) -> RecordAddress {
    id.parse().expect("built-in program id is valid base58")
}

/// Top-level client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// RPC endpoint; `None` leaves the client disconnected.
    pub endpoint: Option<String>,

    /// Connection settings.
    pub connection: ConnectionConfig,

    /// Program addresses.
    pub programs: ProgramIds,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Some(DEFAULT_ENDPOINT.to_string()),
            connection: ConnectionConfig::default(),
            programs: ProgramIds::default(),
        }
    }
}

impl ClientConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}
