//! Batch export relay: accepts uploaded work items, enqueues one durable
//! queue task per batch, and keeps an auditable trail of export events.
pub mod audit;
pub mod config;
pub mod export;
pub mod model;
pub mod producer;
pub mod queue;
pub mod server;
