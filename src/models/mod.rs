// src/models/mod.rs
//! Value types: identifiers and DID documents.

pub mod did;
pub mod document;
