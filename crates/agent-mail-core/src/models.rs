//! Data models for the agent mail router.
//!
//! These map directly to the entities in the data model: `Agent`, `Message`,
//! `Group`, `IssuedKey`, `RoundTable`. All timestamps are UTC.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Agent
// =============================================================================

/// How an agent came to exist in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationMode {
    Legacy,
    Seed,
    Import,
    DidWeb,
}

/// Approval state for a registered agent.
///
/// Absence of this field on legacy data is treated as `Approved` by callers;
/// the repository itself always stores an explicit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Approved,
    Pending,
    Rejected,
}

/// One key in an agent's rotation history.
///
/// The tail of `Agent::public_keys` is the active signing key. Older keys
/// remain valid for verification until `deactivate_at` passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    pub version: u32,
    pub public_key_bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub deactivate_at: Option<DateTime<Utc>>,
}

impl PublicKeyRecord {
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.deactivate_at.is_none_or(|d| d > now)
    }
}

/// Last-seen liveness state for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub status: HeartbeatStatus,
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            last_heartbeat: None,
            status: HeartbeatStatus::Offline,
            interval_ms: 30_000,
            timeout_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatStatus {
    Online,
    Offline,
}

/// A registered agent identity.
///
/// Invariants: `agent_id` is immutable once created. `public_keys` always has
/// exactly one active key (its tail, relative to `deactivate_at`). DID:web
/// agents have `registration_mode = DidWeb` and an `agent_id` of the form
/// `did-web:<domain>[/path]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub display_name: Option<String>,
    pub registration_mode: RegistrationMode,
    pub registration_status: RegistrationStatus,
    pub public_keys: Vec<PublicKeyRecord>,
    pub did: Option<String>,
    pub tenant_id: Option<String>,
    pub verification_tier: String,
    pub trusted_agents: BTreeSet<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub heartbeat: Heartbeat,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// The currently active signing key, if any keys are on file.
    #[must_use]
    pub fn active_key(&self) -> Option<&PublicKeyRecord> {
        self.public_keys.last()
    }

    /// Every key still valid for verification at `now` (active tail plus any
    /// older keys still inside their rotation window).
    #[must_use]
    pub fn verifiable_keys(&self, now: DateTime<Utc>) -> Vec<&PublicKeyRecord> {
        self.public_keys
            .iter()
            .filter(|k| k.is_active_at(now))
            .collect()
    }
}

// =============================================================================
// Envelope / Message
// =============================================================================

/// Ed25519 signature attached to a signed envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    pub alg: String,
    pub kid: String,
    pub sig: String,
}

/// The canonical JSON message payload exchanged between agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    pub id: Option<String>,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub timestamp: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub envelope_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<serde_json::Value>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<EnvelopeSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_message_id: Option<String>,
}

/// Lifecycle state of a stored message. See the state machine in the inbox
/// engine design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Leased,
    Acked,
    Expired,
    Purged,
}

/// Why a message's body was purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeReason {
    Acked,
    TtlExpired,
}

/// Trust classification recorded for the sender of a message.
///
/// Unknown senders are accepted (legacy `agent://` compatibility) but the
/// weakened guarantee is recorded rather than silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Verified,
    Untrusted,
    Unsigned,
}

/// A message in flight or at rest in some agent's inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub to_agent_id: String,
    pub from_agent_id: String,
    pub envelope: Envelope,
    pub status: MessageStatus,
    pub signature_status: SignatureStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lease_until: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub acked_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub ephemeral: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub group_message_id: Option<String>,
    pub purge_reason: Option<PurgeReason>,
}

// =============================================================================
// Group
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Owner,
    Admin,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub agent_id: String,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

/// How an agent may join a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GroupAccess {
    Open,
    KeyProtected { join_key_hash: String },
    InviteOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSettings {
    pub max_members: usize,
    pub message_ttl_sec: Option<u64>,
    pub history_visible: bool,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            max_members: 100,
            message_ttl_sec: None,
            history_visible: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub access: GroupAccess,
    pub members: Vec<GroupMember>,
    pub settings: GroupSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    #[must_use]
    pub fn member(&self, agent_id: &str) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.agent_id == agent_id)
    }

    #[must_use]
    pub fn owner(&self) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.role == GroupRole::Owner)
    }
}

// =============================================================================
// Issued key
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedKey {
    pub key_id: String,
    pub key_hash: String,
    pub client_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub single_use: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub target_agent_id: Option<String>,
}

// =============================================================================
// Round table
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundTableStatus {
    Open,
    Resolved,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTableEntry {
    pub from_agent_id: String,
    pub body: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTable {
    pub id: String,
    pub facilitator: String,
    pub participants: BTreeSet<String>,
    pub topic: String,
    pub goal: String,
    pub status: RoundTableStatus,
    pub thread: Vec<RoundTableEntry>,
    pub expires_at: DateTime<Utc>,
    pub group_id: String,
    pub outcome: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Hard cap on round-table thread length (`spec.md` §3, §8).
pub const ROUND_TABLE_THREAD_CAP: usize = 200;

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn active_key_is_the_tail() {
        let agent = Agent {
            agent_id: "a".into(),
            display_name: None,
            registration_mode: RegistrationMode::Seed,
            registration_status: RegistrationStatus::Approved,
            public_keys: vec![
                PublicKeyRecord {
                    version: 1,
                    public_key_bytes: vec![1],
                    created_at: ts(0),
                    deactivate_at: Some(ts(100)),
                },
                PublicKeyRecord {
                    version: 2,
                    public_key_bytes: vec![2],
                    created_at: ts(50),
                    deactivate_at: None,
                },
            ],
            did: None,
            tenant_id: None,
            verification_tier: "standard".into(),
            trusted_agents: BTreeSet::new(),
            webhook_url: None,
            webhook_secret: None,
            heartbeat: Heartbeat::default(),
            metadata: HashMap::new(),
            created_at: ts(0),
            updated_at: ts(0),
        };
        assert_eq!(agent.active_key().unwrap().version, 2);
        // Before deactivation: both keys verify.
        assert_eq!(agent.verifiable_keys(ts(50)).len(), 2);
        // After deactivation: only the active one.
        assert_eq!(agent.verifiable_keys(ts(200)).len(), 1);
    }

    #[test]
    fn group_owner_lookup() {
        let group = Group {
            id: "g1".into(),
            name: "team".into(),
            access: GroupAccess::Open,
            members: vec![
                GroupMember {
                    agent_id: "alice".into(),
                    role: GroupRole::Owner,
                    joined_at: ts(0),
                },
                GroupMember {
                    agent_id: "bob".into(),
                    role: GroupRole::Member,
                    joined_at: ts(1),
                },
            ],
            settings: GroupSettings::default(),
            created_at: ts(0),
            updated_at: ts(0),
        };
        assert_eq!(group.owner().unwrap().agent_id, "alice");
        assert!(group.member("bob").is_some());
        assert!(group.member("carol").is_none());
    }
}
