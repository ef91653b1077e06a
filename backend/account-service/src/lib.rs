//! Multi-tenant account backend: password and federated authentication,
//! JWT sessions, and organizations with role-based membership joined
//! through short-lived invitation codes.

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod security;
pub mod services;
pub mod store;

#[cfg(test)]
mod tests;
