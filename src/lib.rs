//! Mathpress - articles with rendered math
//!
//! This library provides the storage, services and HTTP API of the
//! Mathpress publishing backend.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
