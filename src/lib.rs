//! Namespace provisioning and producer load generation for Apache Pulsar.

pub mod admin;
pub mod client;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod payload;
pub mod rate;
pub mod roles;
pub mod runner;
pub mod topic;
