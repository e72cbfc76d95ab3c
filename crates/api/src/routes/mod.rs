//! Route handlers

pub mod admin;
pub mod analyze;
pub mod auth;
pub mod history;
