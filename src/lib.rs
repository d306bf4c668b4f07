// src/lib.rs

//! Catalog Notifier Library
//!
//! Watches catalog sections for newly listed releases and notifies every
//! subscribed chat exactly once per release.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
