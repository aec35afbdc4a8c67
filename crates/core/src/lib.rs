//! Agromaq Core - Shared domain types.
//!
//! This crate provides the types shared by the Agromaq marketplace crates:
//! - `storefront` - The marketplace server (pages, forms, remote store access)
//! - `integration-tests` - In-process router tests
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients, no session handling. Rows mirror the remote store's tables
//! (`products`, `profiles`, `product_images`); the remote store stays the
//! source of truth.
//!
//! # Modules
//!
//! - [`types`] - Ids, emails, prices, listings, profiles and Brazilian
//!   document/contact validation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
