//! services/api/src/lib.rs
//!
//! The delivery layer of the flashcards service: concrete adapters for the
//! core's ports, configuration, HTTP errors and the axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
