//! Host monitor daemon
//!
//! Wires the collector service to the system sampler and the JSON-lines
//! sink, and serves health, metrics and dashboard endpoints over HTTP.

pub mod api;
