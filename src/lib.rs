//! Turnstile - Fixed-Window Admission Control
//!
//! This crate decides whether a caller may proceed based on a request quota
//! over a per-caller time window. Counters live in an in-memory store with
//! per-entry expiration, and a small HTTP front end maps each decision to a
//! response.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod store;
