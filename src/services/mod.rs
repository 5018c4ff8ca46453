// src/services/mod.rs
//! Resolution, mutation and confirmation services, plus the HTTP surface.

pub mod api_server;
pub mod confirmer;
pub mod controller;
pub mod resolver;
