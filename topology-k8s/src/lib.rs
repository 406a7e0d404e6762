//! Kubernetes persistence and leasing of deployment topology state.

pub mod app;
pub mod cmd;
pub mod config;
#[cfg(test)]
mod config_test;
pub mod k8s;
pub mod remote;
