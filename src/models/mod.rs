// src/models/mod.rs
//! Data structures shared across services and storage.

pub mod claims;
pub mod user;
