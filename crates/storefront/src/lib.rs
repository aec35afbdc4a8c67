//! Agromaq storefront library.
//!
//! The marketplace server for buying, selling and renting agricultural
//! machinery. Exposed as a library so the integration tests can drive the
//! full router in-process.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod compare;
pub mod config;
pub mod content;
pub mod error;
pub mod listing;
pub mod lookup;
pub mod middleware;
pub mod models;
pub mod profile;
pub mod routes;
pub mod state;
pub mod supabase;
