//! TimeGPT analyzer service: configuration, HTTP surface and task supervision

pub mod api;
pub mod config;
pub mod supervisor;
