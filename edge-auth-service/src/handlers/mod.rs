//! HTTP handlers for the edge auth service.

pub mod auth;
pub mod context;
pub mod health;
pub mod metrics;
pub mod pages;
pub mod sessions;
