//! HTTP API: trigger endpoint, health, and service wiring.

pub mod app;
