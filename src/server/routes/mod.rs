//! HTTP route handlers

pub mod bsky;
pub mod generate;
pub mod health;
pub mod paypal;
pub mod verification;
pub mod views;
