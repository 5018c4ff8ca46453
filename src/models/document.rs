// src/models/document.rs
//! DID Document data model for `did:memo`.
//!
//! A [`Document`] is a snapshot assembled from ledger reads; nothing in this
//! crate mutates one after resolution.

use crate::models::did::{Identifier, IdentifierUrl};
use crate::utils::serialization::{self, hex_bytes};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-LD context written into every live document.
pub const DEFAULT_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// Verification method type registered for secp256k1 master keys.
pub const SECP256K1_METHOD_TYPE: &str = "EcdsaSecp256k1VerificationKey2019";

/// A public key bound to a DID at a stable slot index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VerificationMethod {
    /// DID URL whose fragment encodes the slot index
    pub id: IdentifierUrl,

    /// Identity allowed to manage this key
    pub controller: Identifier,

    /// Verification method type, e.g. `EcdsaSecp256k1VerificationKey2019`
    #[serde(rename = "type")]
    pub method_type: String,

    /// Raw key material, serialized as `0x`-prefixed hex
    #[serde(rename = "publicKeyHex", with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

/// A `did:memo` DID Document.
///
/// The document of a deactivated identity is [`Document::default()`]: no
/// context, no id and no entries.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    #[serde(rename = "@context", default, skip_serializing_if = "String::is_empty")]
    pub context: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Identifier>,

    #[serde(rename = "controller", default, skip_serializing_if = "Vec::is_empty")]
    pub controllers: Vec<Identifier>,

    /// Active methods in slot order. The field name keeps the registry's
    /// historical spelling.
    #[serde(rename = "verifycationMethod", default)]
    pub verification_methods: Vec<VerificationMethod>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<IdentifierUrl>,

    #[serde(rename = "assertionMethod", default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_method: Vec<IdentifierUrl>,

    #[serde(rename = "capabilityDelegation", default, skip_serializing_if = "Vec::is_empty")]
    pub capability_delegation: Vec<IdentifierUrl>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery: Vec<IdentifierUrl>,
}

impl Document {
    /// True for the document of a deactivated identity.
    pub fn is_empty(&self) -> bool {
        *self == Document::default()
    }

    /// Looks up an active verification method by its URL.
    pub fn verification_method(&self, url: &IdentifierUrl) -> Option<&VerificationMethod> {
        self.verification_methods.iter().find(|vm| &vm.id == url)
    }

    /// Entries of one relationship list.
    pub fn relationship(&self, kind: RelationshipKind) -> &[IdentifierUrl] {
        match kind {
            RelationshipKind::Authentication => &self.authentication,
            RelationshipKind::AssertionMethod => &self.assertion_method,
            RelationshipKind::CapabilityDelegation => &self.capability_delegation,
            RelationshipKind::Recovery => &self.recovery,
        }
    }

    /// Pretty-printed exchange format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serialization::deserialize(data)
    }
}

/// Purpose a verification method is authorized for, without payload.
///
/// Used to address an existing relationship entry, e.g. for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    Authentication,
    AssertionMethod,
    CapabilityDelegation,
    Recovery,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 4] = [
        RelationshipKind::Authentication,
        RelationshipKind::AssertionMethod,
        RelationshipKind::CapabilityDelegation,
        RelationshipKind::Recovery,
    ];
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationshipKind::Authentication => "authentication",
            RelationshipKind::AssertionMethod => "assertionMethod",
            RelationshipKind::CapabilityDelegation => "capabilityDelegation",
            RelationshipKind::Recovery => "recovery",
        };
        f.write_str(name)
    }
}

/// A relationship grant. Only capability delegation expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    Authentication,
    AssertionMethod,
    /// Expires at the given unix timestamp (seconds). Zero or past values are
    /// accepted and yield an entry that is already expired.
    CapabilityDelegation { expires_at: i64 },
    Recovery,
}

impl Relationship {
    pub fn kind(&self) -> RelationshipKind {
        match self {
            Relationship::Authentication => RelationshipKind::Authentication,
            Relationship::AssertionMethod => RelationshipKind::AssertionMethod,
            Relationship::CapabilityDelegation { .. } => RelationshipKind::CapabilityDelegation,
            Relationship::Recovery => RelationshipKind::Recovery,
        }
    }

    pub fn expires_at(&self) -> Option<i64> {
        match self {
            Relationship::CapabilityDelegation { expires_at } => Some(*expires_at),
            _ => None,
        }
    }
}
