//! Core types for Agromaq.
//!
//! This module provides type-safe wrappers for marketplace concepts.

pub mod document;
pub mod email;
pub mod id;
pub mod listing;
pub mod price;
pub mod profile;

pub use document::{Cep, Cnpj, Cpf, Document, DocumentError, Phone};
pub use email::{Email, EmailError};
pub use id::*;
pub use listing::{
    Category, ListingType, NewProduct, NewProductImage, Product, ProductImage, ProductPatch,
    RentalPeriod,
};
pub use price::{Price, PriceError};
pub use profile::{Profile, ProfileUpdate};
