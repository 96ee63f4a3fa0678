//
// lib.rs
//
// Exposes internal modules for integration tests. The binary entry point
// lives in main.rs.
//

pub mod backend;
pub mod config;
pub mod diagnostics;
pub mod dispose;
pub mod document_store;
pub mod events;
pub mod gateway;
pub mod limiter;
pub mod notebook;
pub mod protocol;
pub mod resource_map;
pub mod workspace;
