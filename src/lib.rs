pub mod api;
pub mod clients;
pub mod config;
pub mod consumer;
pub mod error;
pub mod models;
pub mod publisher;
pub mod repository;
pub mod synthesizer;
pub mod telemetry;
pub mod utils;
