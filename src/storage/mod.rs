// src/storage/mod.rs
pub mod postgres_users;
pub mod redis_store;
pub mod revocation_store;
pub mod user_repository;
