//! Listing form validation.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use agromaq_core::{
    Category, ListingType, NewProduct, Price, Product, ProductId, ProductPatch, RentalPeriod,
    UserId,
};

use crate::error::FieldError;

const MAX_TITLE_LENGTH: usize = 120;
const MAX_DESCRIPTION_LENGTH: usize = 5000;
const MIN_YEAR: i32 = 1900;

/// Raw listing form fields, as posted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingForm {
    pub title: String,
    pub description: String,
    pub price: String,
    pub listing_type: String,
    pub rental_period: String,
    pub brand: String,
    pub model: String,
    pub year: String,
    pub category: String,
    pub location: String,
    pub hours: String,
    pub power: String,
    pub implement_type: String,
    pub work_width: String,
    pub part_type: String,
    pub part_condition: String,
    pub part_number: String,
}

impl ListingForm {
    /// Prefill the edit form from a stored listing.
    #[must_use]
    pub fn from_product(product: &Product) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            title: product.title.clone(),
            description: text(&product.description),
            price: product.price.amount().to_string(),
            listing_type: product.listing_type.as_str().to_string(),
            rental_period: product
                .rental_period
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
            brand: text(&product.brand),
            model: text(&product.model),
            year: product.year.map(|y| y.to_string()).unwrap_or_default(),
            category: product.category.as_str().to_string(),
            location: text(&product.location),
            hours: product.hours.map(|h| h.to_string()).unwrap_or_default(),
            power: text(&product.power),
            implement_type: text(&product.implement_type),
            work_width: text(&product.work_width),
            part_type: text(&product.part_type),
            part_condition: text(&product.part_condition),
            part_number: text(&product.part_number),
        }
    }

    /// Set a field by its form name, as read from a multipart body.
    /// Returns `false` for names that are not listing fields.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "title" => &mut self.title,
            "description" => &mut self.description,
            "price" => &mut self.price,
            "listing_type" => &mut self.listing_type,
            "rental_period" => &mut self.rental_period,
            "brand" => &mut self.brand,
            "model" => &mut self.model,
            "year" => &mut self.year,
            "category" => &mut self.category,
            "location" => &mut self.location,
            "hours" => &mut self.hours,
            "power" => &mut self.power,
            "implement_type" => &mut self.implement_type,
            "work_width" => &mut self.work_width,
            "part_type" => &mut self.part_type,
            "part_condition" => &mut self.part_condition,
            "part_number" => &mut self.part_number,
            _ => return false,
        };
        *slot = value;
        true
    }

    /// Validate every field, collecting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns one [`FieldError`] per invalid field.
    pub fn validate(&self) -> Result<ListingDraft, Vec<FieldError>> {
        let mut errors = Vec::new();

        let title = self.title.trim();
        if title.is_empty() {
            errors.push(FieldError::new("title", "Informe o título do anúncio."));
        } else if title.chars().count() > MAX_TITLE_LENGTH {
            errors.push(FieldError::new(
                "title",
                format!("O título deve ter no máximo {MAX_TITLE_LENGTH} caracteres."),
            ));
        }

        let description = optional(&self.description);
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LENGTH)
        {
            errors.push(FieldError::new(
                "description",
                format!("A descrição deve ter no máximo {MAX_DESCRIPTION_LENGTH} caracteres."),
            ));
        }

        let price = Price::parse_input(&self.price)
            .map_err(|_| errors.push(FieldError::new("price", "Informe um preço válido.")))
            .ok();

        let listing_type = self
            .listing_type
            .parse::<ListingType>()
            .map_err(|_| {
                errors.push(FieldError::new(
                    "listing_type",
                    "Escolha entre venda ou aluguel.",
                ));
            })
            .ok();

        let rental_period = match listing_type {
            Some(ListingType::Rental) => self
                .rental_period
                .parse::<RentalPeriod>()
                .map_err(|_| {
                    errors.push(FieldError::new(
                        "rental_period",
                        "Informe o período do aluguel.",
                    ));
                })
                .ok(),
            _ => None,
        };

        let category = self
            .category
            .parse::<Category>()
            .map_err(|_| errors.push(FieldError::new("category", "Escolha uma categoria.")))
            .ok();

        let max_year = Utc::now().year() + 1;
        let year = match optional(&self.year) {
            None => None,
            Some(raw) => match raw.parse::<i32>() {
                Ok(y) if (MIN_YEAR..=max_year).contains(&y) => Some(y),
                _ => {
                    errors.push(FieldError::new(
                        "year",
                        format!("Informe um ano entre {MIN_YEAR} e {max_year}."),
                    ));
                    None
                }
            },
        };

        let engine = category.is_some_and(|c| c.has_engine());
        let implement = category.is_some_and(|c| c.is_implement());
        let part = category.is_some_and(|c| c.is_part());

        let hours = match optional(&self.hours).filter(|_| engine) {
            None => None,
            Some(raw) => match raw.replace('.', "").parse::<i32>() {
                Ok(h) if h >= 0 => Some(h),
                _ => {
                    errors.push(FieldError::new("hours", "Informe as horas de uso em números."));
                    None
                }
            },
        };

        if !errors.is_empty() {
            return Err(errors);
        }
        let (Some(price), Some(listing_type), Some(category)) = (price, listing_type, category)
        else {
            return Err(errors);
        };

        Ok(ListingDraft {
            title: title.to_string(),
            description,
            price,
            listing_type,
            rental_period,
            brand: optional(&self.brand),
            model: optional(&self.model),
            year,
            category,
            location: optional(&self.location),
            hours,
            power: optional(&self.power).filter(|_| engine),
            implement_type: optional(&self.implement_type).filter(|_| implement),
            work_width: optional(&self.work_width).filter(|_| implement),
            part_type: optional(&self.part_type).filter(|_| part),
            part_condition: optional(&self.part_condition).filter(|_| part),
            part_number: optional(&self.part_number).filter(|_| part),
        })
    }
}

/// A validated listing. Attributes that do not apply to the category or
/// listing type are always `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingDraft {
    pub title: String,
    pub description: Option<String>,
    pub price: Price,
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
}

impl ListingDraft {
    /// Insert payload for a new listing.
    #[must_use]
    pub fn into_new_product(
        self,
        id: ProductId,
        user_id: UserId,
        image_url: Option<String>,
    ) -> NewProduct {
        NewProduct {
            id,
            title: self.title,
            description: self.description,
            price: self.price,
            listing_type: self.listing_type,
            rental_period: self.rental_period,
            brand: self.brand,
            model: self.model,
            year: self.year,
            category: self.category,
            location: self.location,
            image_url,
            user_id,
            hours: self.hours,
            power: self.power,
            implement_type: self.implement_type,
            work_width: self.work_width,
            part_type: self.part_type,
            part_condition: self.part_condition,
            part_number: self.part_number,
        }
    }

    /// Update payload for an existing listing.
    #[must_use]
    pub fn into_patch(self, now: DateTime<Utc>) -> ProductPatch {
        ProductPatch {
            title: self.title,
            description: self.description,
            price: self.price,
            listing_type: self.listing_type,
            rental_period: self.rental_period,
            brand: self.brand,
            model: self.model,
            year: self.year,
            category: self.category,
            location: self.location,
            hours: self.hours,
            power: self.power,
            implement_type: self.implement_type,
            work_width: self.work_width,
            part_type: self.part_type,
            part_condition: self.part_condition,
            part_number: self.part_number,
            updated_at: now,
        }
    }
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_set_by_field_name() {
        let mut form = ListingForm::default();
        assert!(form.set("title", "Colheitadeira New Holland TC5070".to_string()));
        assert!(form.set("part_number", "84475516".to_string()));
        assert!(!form.set("imagens", String::new()));
        assert_eq!(form.title, "Colheitadeira New Holland TC5070");
        assert_eq!(form.part_number, "84475516");
    }

    fn tractor_form() -> ListingForm {
        ListingForm {
            title: " Trator Valtra A750 ".to_string(),
            price: "R$ 210.000,00".to_string(),
            listing_type: "venda".to_string(),
            rental_period: "mensal".to_string(),
            category: "tratores".to_string(),
            year: "2020".to_string(),
            hours: "1.850".to_string(),
            power: "75 cv".to_string(),
            part_number: "ABC-123".to_string(),
            ..ListingForm::default()
        }
    }

    #[test]
    fn test_valid_sale_listing() {
        let draft = tractor_form().validate().unwrap();
        assert_eq!(draft.title, "Trator Valtra A750");
        assert_eq!(draft.price.amount(), Decimal::new(210_000, 0));
        assert_eq!(draft.hours, Some(1850));
        assert_eq!(draft.power.as_deref(), Some("75 cv"));
    }

    #[test]
    fn test_sale_drops_rental_period_and_foreign_attributes() {
        let draft = tractor_form().validate().unwrap();
        assert_eq!(draft.rental_period, None);
        assert_eq!(draft.part_number, None);
    }

    #[test]
    fn test_rental_requires_period() {
        let mut form = tractor_form();
        form.listing_type = "aluguel".to_string();
        form.rental_period = String::new();

        let errors = form.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.first().unwrap().field, "rental_period");

        form.rental_period = "diaria".to_string();
        assert_eq!(
            form.validate().unwrap().rental_period,
            Some(RentalPeriod::Daily)
        );
    }

    #[test]
    fn test_collects_all_errors() {
        let form = ListingForm {
            year: "1850".to_string(),
            ..ListingForm::default()
        };
        let fields: Vec<&str> = form
            .validate()
            .unwrap_err()
            .iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, ["title", "price", "listing_type", "category", "year"]);
    }

    #[test]
    fn test_parts_keep_part_attributes() {
        let form = ListingForm {
            title: "Bomba injetora".to_string(),
            price: "4500".to_string(),
            listing_type: "venda".to_string(),
            category: "pecas".to_string(),
            part_type: "Motor".to_string(),
            part_condition: "usada".to_string(),
            part_number: "BI-9920".to_string(),
            hours: "100".to_string(),
            ..ListingForm::default()
        };
        let draft = form.validate().unwrap();
        assert_eq!(draft.part_number.as_deref(), Some("BI-9920"));
        assert_eq!(draft.hours, None);
    }

    #[test]
    fn test_patch_carries_updated_at() {
        let now = Utc::now();
        let patch = tractor_form().validate().unwrap().into_patch(now);
        assert_eq!(patch.updated_at, now);
        assert_eq!(patch.listing_type, ListingType::Sale);
    }
}
