// src/contracts/mod.rs
//! Registry contract bindings implementing the ledger ports.

pub mod account_did;
pub mod did_proxy;
