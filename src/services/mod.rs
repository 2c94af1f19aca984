// src/services/mod.rs
pub mod access_gate;
pub mod api_server;
pub mod credential_codec;
pub mod credential_manager;
