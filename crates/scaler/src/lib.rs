//! Process surface of the pool scaler: configuration loading and the
//! health/metrics HTTP API

pub mod api;
pub mod config;
