//! Event data structures shared by every monitor transport
//!
//! These types describe what is registered with the remote event monitor
//! (`EventDefinition`), how it is identified afterwards (`EventTypeId`), and
//! what the monitor reports back (`EventOccurrence`). Byte fields travel as
//! `0x`-prefixed hex strings on every JSON surface.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Decodes a hex string with or without a `0x` prefix.
///
/// # Arguments
///
/// * `value` - Hex string (e.g., "0xaa" or "aa")
///
/// # Returns
///
/// * `Ok(Vec<u8>)` - Decoded bytes
/// * `Err(hex::FromHexError)` - The string is not valid hex
pub fn decode_hex(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let stripped = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    hex::decode(stripped)
}

/// Encodes bytes as a `0x`-prefixed lowercase hex string.
pub fn encode_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Serde adapter for `Vec<u8>` fields encoded as hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        serializer.serialize_str(&super::encode_hex(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        super::decode_hex(&value).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Vec<Vec<u8>>` fields encoded as lists of hex strings.
pub mod hex_bytes_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(values: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(super::encode_hex))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|value| super::decode_hex(value).map_err(serde::de::Error::custom))
            .collect()
    }
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Identifier of a monitored ledger.
pub type ChainId = u64;

/// Opaque identifier the remote monitor assigns to a registered event.
///
/// One id names exactly one (chain, contract, event schema, finality policy)
/// tuple. The bytes are never interpreted locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventTypeId(Vec<u8>);

impl EventTypeId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }
}

impl fmt::Display for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<uuid::Uuid> for EventTypeId {
    fn from(value: uuid::Uuid) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for EventTypeId {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for EventTypeId {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl Serialize for EventTypeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        hex_bytes::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for EventTypeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        hex_bytes::deserialize(deserializer).map(Self)
    }
}

// ============================================================================
// EVENT DEFINITIONS
// ============================================================================

/// Maximum number of indexed fields an EVM event can carry (topics 1..=3).
pub const MAX_INDEXED_FIELDS: usize = 3;

/// Length of an EVM contract address in bytes.
pub const EVM_ADDRESS_LEN: usize = 20;

/// Name of the bridge event registered on every monitored chain.
pub const BRIDGE_RECEIPT_EVENT: &str = "BridgeReceipt";

/// Block-confirmation depth the monitor waits for before reporting an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalityPolicy {
    /// Report as soon as the event is in the latest block
    Latest,
    /// Report once the block is considered safe
    Safe,
    /// Report once the block is finalized
    Finalized,
}

impl fmt::Display for FinalityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Latest => "latest",
            Self::Safe => "safe",
            Self::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// One field of an event schema: a solidity type tag and whether it is indexed.
///
/// Field order is significant. It must match the emitter's ABI because the
/// position of a field is the index used later by `FieldFilter`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventField {
    /// Solidity type tag (e.g., "bytes32", "uint256", "address")
    pub sol_type: String,
    /// Whether the field is emitted as a topic
    pub indexed: bool,
}

impl EventField {
    pub fn new(sol_type: impl Into<String>, indexed: bool) -> Self {
        Self {
            sol_type: sol_type.into(),
            indexed,
        }
    }
}

/// Event definition registered with the remote monitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDefinition {
    /// Chain the contract lives on
    pub chain_id: ChainId,
    /// Contract address emitting the event
    #[serde(with = "hex_bytes")]
    pub address: Vec<u8>,
    /// Event name as declared in the contract ABI
    pub event_name: String,
    /// Ordered field schema
    pub fields: Vec<EventField>,
    /// Finality policy the monitor applies before reporting
    pub finality: FinalityPolicy,
}

impl EventDefinition {
    /// Builds the `BridgeReceipt` definition watched on every configured chain.
    ///
    /// Schema: `BridgeReceipt(bytes32 indexed requestId, uint256 indexed srcChainId,
    /// address indexed solver, uint256 amountOut)`.
    pub fn bridge_receipt(chain_id: ChainId, address: Vec<u8>, finality: FinalityPolicy) -> Self {
        Self {
            chain_id,
            address,
            event_name: BRIDGE_RECEIPT_EVENT.to_string(),
            fields: vec![
                EventField::new("bytes32", true),
                EventField::new("uint256", true),
                EventField::new("address", true),
                EventField::new("uint256", false),
            ],
            finality,
        }
    }

    /// Canonical event signature, e.g. `BridgeReceipt(bytes32,uint256,address,uint256)`.
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.fields.iter().map(|f| f.sol_type.as_str()).collect();
        format!("{}({})", self.event_name, types.join(","))
    }

    /// Keccak-256 hash of the canonical signature (the event's topic0).
    pub fn topic0(&self) -> [u8; 32] {
        let mut hasher = Keccak256::new();
        hasher.update(self.signature().as_bytes());
        hasher.finalize().into()
    }

    /// Checks the local preconditions of a registration.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Definition can be sent to the monitor
    /// * `Err(String)` - Human-readable reason the definition is malformed
    pub fn validate(&self) -> Result<(), String> {
        if self.event_name.trim().is_empty() {
            return Err("event name is empty".to_string());
        }
        if self.address.len() != EVM_ADDRESS_LEN {
            return Err(format!(
                "contract address must be {} bytes, got {}",
                EVM_ADDRESS_LEN,
                self.address.len()
            ));
        }
        if self.fields.is_empty() {
            return Err("event schema has no fields".to_string());
        }
        if let Some(field) = self.fields.iter().find(|f| f.sol_type.trim().is_empty()) {
            return Err(format!("event field has empty type tag: {:?}", field));
        }
        let indexed = self.fields.iter().filter(|f| f.indexed).count();
        if indexed > MAX_INDEXED_FIELDS {
            return Err(format!(
                "at most {} indexed fields are supported, got {}",
                MAX_INDEXED_FIELDS, indexed
            ));
        }
        Ok(())
    }
}

// ============================================================================
// EVENT OCCURRENCES
// ============================================================================

/// Decoded value of one event field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFieldValue {
    /// Solidity type tag of the field
    pub sol_type: String,
    /// Whether the field was emitted as a topic
    pub indexed: bool,
    /// ABI-encoded field value
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
}

/// Block and transaction provenance of an occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub block_number: u64,
    #[serde(with = "hex_bytes")]
    pub block_hash: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub transaction_hash: Vec<u8>,
    pub log_index: u64,
    /// Block timestamp (Unix seconds)
    pub timestamp: u64,
}

/// One observed emission of a registered event.
///
/// Produced by the remote monitor and never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOccurrence {
    /// Registered event this occurrence belongs to
    pub event_type_id: EventTypeId,
    /// Chain the event was emitted on
    pub chain_id: ChainId,
    /// Emitting contract address
    #[serde(with = "hex_bytes")]
    pub address: Vec<u8>,
    /// Decoded field values, ordered like the registered schema
    pub data: Vec<EventFieldValue>,
    /// Where the event was observed
    pub block: BlockInfo,
}

impl EventOccurrence {
    /// Returns the decoded field at `index`, if present.
    pub fn field(&self, index: u32) -> Option<&EventFieldValue> {
        self.data.get(index as usize)
    }

    /// Whether this occurrence satisfies a field filter.
    pub fn matches(&self, filter: &FieldFilter) -> bool {
        match self.field(filter.index) {
            Some(field) => filter.exact_values.iter().any(|v| *v == field.value),
            None => false,
        }
    }
}

/// Exact-match filter on one decoded field.
///
/// Matches when the field at `index` equals any of `exact_values` byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    /// Position of the field in the registered schema
    pub index: u32,
    /// Accepted values
    #[serde(with = "hex_bytes_list")]
    pub exact_values: Vec<Vec<u8>>,
}

impl FieldFilter {
    /// Filter matching a single exact value.
    pub fn exact(index: u32, value: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            exact_values: vec![value.into()],
        }
    }
}
