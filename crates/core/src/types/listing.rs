//! Listing rows: products and their ordered images.
//!
//! Field names follow the `products` and `product_images` tables exactly so
//! rows deserialize straight from the remote store's JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ProductId, ProductImageId, UserId};
use super::price::Price;

/// Whether a listing is for sale or for rent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingType {
    #[serde(rename = "venda")]
    Sale,
    #[serde(rename = "aluguel")]
    Rental,
}

impl ListingType {
    /// The value stored in the `type` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "venda",
            Self::Rental => "aluguel",
        }
    }
}

impl std::str::FromStr for ListingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "venda" => Ok(Self::Sale),
            "aluguel" => Ok(Self::Rental),
            other => Err(format!("invalid listing type: {other}")),
        }
    }
}

/// Billing period for rentals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RentalPeriod {
    #[serde(rename = "diaria")]
    Daily,
    #[serde(rename = "semanal")]
    Weekly,
    #[serde(rename = "mensal")]
    Monthly,
}

impl RentalPeriod {
    /// The value stored in the `rental_period` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "diaria",
            Self::Weekly => "semanal",
            Self::Monthly => "mensal",
        }
    }

    /// Price suffix shown next to rental prices.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Daily => "por dia",
            Self::Weekly => "por semana",
            Self::Monthly => "por mês",
        }
    }
}

impl std::str::FromStr for RentalPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "diaria" => Ok(Self::Daily),
            "semanal" => Ok(Self::Weekly),
            "mensal" => Ok(Self::Monthly),
            other => Err(format!("invalid rental period: {other}")),
        }
    }
}

/// Machinery category. Each category owns a set of optional attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "tratores")]
    Tractors,
    #[serde(rename = "colheitadeiras")]
    Harvesters,
    #[serde(rename = "implementos")]
    Implements,
    #[serde(rename = "pecas")]
    Parts,
    #[serde(rename = "outros")]
    Other,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Self; 5] = [
        Self::Tractors,
        Self::Harvesters,
        Self::Implements,
        Self::Parts,
        Self::Other,
    ];

    /// The value stored in the `category` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tractors => "tratores",
            Self::Harvesters => "colheitadeiras",
            Self::Implements => "implementos",
            Self::Parts => "pecas",
            Self::Other => "outros",
        }
    }

    /// Human label (pt-BR).
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Tractors => "Tratores",
            Self::Harvesters => "Colheitadeiras",
            Self::Implements => "Implementos",
            Self::Parts => "Peças",
            Self::Other => "Outros",
        }
    }

    /// Engine hours and power apply to self-propelled machines.
    #[must_use]
    pub const fn has_engine(&self) -> bool {
        matches!(self, Self::Tractors | Self::Harvesters)
    }

    /// Implement type and working width apply to implements.
    #[must_use]
    pub const fn is_implement(&self) -> bool {
        matches!(self, Self::Implements)
    }

    /// Part type, condition and number apply to parts.
    #[must_use]
    pub const fn is_part(&self) -> bool {
        matches!(self, Self::Parts)
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| format!("invalid category: {s}"))
    }
}

/// A row of the `products` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Price,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
    #[serde(default)]
    pub rental_period: Option<RentalPeriod>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    pub category: Category,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub hours: Option<i32>,
    #[serde(default)]
    pub power: Option<String>,
    #[serde(default)]
    pub implement_type: Option<String>,
    #[serde(default)]
    pub work_width: Option<String>,
    #[serde(default)]
    pub part_type: Option<String>,
    #[serde(default)]
    pub part_condition: Option<String>,
    #[serde(default)]
    pub part_number: Option<String>,
}

impl Product {
    /// Whether `user` owns this listing.
    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.user_id == user
    }
}

/// A row of the `product_images` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: ProductImageId,
    pub product_id: ProductId,
    pub image_url: String,
    pub position: i32,
}

/// Insert payload for `products`. Server assigns timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProduct {
    pub id: ProductId,
    pub title: String,
    pub description: Option<String>,
    pub price: Price,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
    pub rental_period: Option<RentalPeriod>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub category: Category,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub user_id: UserId,
    pub hours: Option<i32>,
    pub power: Option<String>,
    pub implement_type: Option<String>,
    pub work_width: Option<String>,
    pub part_type: Option<String>,
    pub part_condition: Option<String>,
    pub part_number: Option<String>,
}

/// Insert payload for `product_images`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProductImage {
    pub product_id: ProductId,
    pub image_url: String,
    pub position: i32,
}

/// Update payload for `products`.
///
/// Every editable column is sent, so clearing a field writes `null`. This is
/// what keeps rental-only columns null after switching a listing to sale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPatch {
    pub title: String,
    pub description: Option<String>,
    pub price: Price,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
    pub rental_period: Option<RentalPeriod>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub category: Category,
    pub location: Option<String>,
    pub hours: Option<i32>,
    pub power: Option<String>,
    pub implement_type: Option<String>,
    pub work_width: Option<String>,
    pub part_type: Option<String>,
    pub part_condition: Option<String>,
    pub part_number: Option<String>,
    pub updated_at: DateTime<Utc>,
}
