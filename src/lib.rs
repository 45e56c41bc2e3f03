//! Local password gate for browser profiles.
//!
//! A browser extension posts a password to a loopback HTTP service; the
//! service resolves it to a browser profile via a bcrypt credential store and
//! hands back a short-lived session token.

#![forbid(unsafe_code)]

pub mod auth;
pub mod browser;
pub mod config;
pub mod gateway;
