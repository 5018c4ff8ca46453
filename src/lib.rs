// src/lib.rs
//! `did:memo` identity method.
//!
//! Parses `did:memo` identifiers, resolves DID Documents from an on-chain
//! identity registry, and submits registry mutations with synchronous
//! confirmation.
//!
//! ## Layers
//! 1. **Models**: identifier grammar and the DID Document
//! 2. **Ledger ports**: [`ledger::LedgerQuery`] and [`ledger::LedgerMutation`]
//! 3. **Services**: resolver, controller, transaction confirmer, HTTP API
//! 4. **EVM binding**: `ethers` client and the registry contract bindings

pub mod blockchain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod ledger;
pub mod models;
pub mod services;
pub mod utils;
pub mod wallet;

pub use error::{ConfigError, LedgerError, MutationError, ParseError, RejectReason, ResolveError};
pub use models::did::{Fragment, Identifier, IdentifierUrl};
pub use models::document::{Document, Relationship, RelationshipKind, VerificationMethod};
pub use services::controller::IdentityController;
pub use services::resolver::DocumentResolver;
