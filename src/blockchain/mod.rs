// src/blockchain/mod.rs
pub mod evm_client;
