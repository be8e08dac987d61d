// src/expertmesh/mod.rs

pub mod aggregator;
pub mod assignment;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod coordinator;
pub mod environment;
pub mod error;
pub mod event;
pub mod mailbox;
pub mod message;
pub mod orchestrator;
pub mod retrieval;
pub mod worker;

// Let's explicitly export the bus and worker so callers can write expertmesh::Environment
// instead of expertmesh::environment::Environment
pub use environment::Environment;
pub use worker::Worker;
