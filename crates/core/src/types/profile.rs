//! Seller/buyer profile rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::UserId;

/// A row of the `profiles` table. The id equals the auth user id; the row is
/// created by a backend trigger on signup, so every field except `id` may be
/// empty until the user fills the profile form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub cep: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub complement: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// An empty profile for a user whose row does not exist yet.
    #[must_use]
    pub const fn empty(id: UserId, email: Option<String>) -> Self {
        Self {
            id,
            full_name: None,
            email,
            phone: None,
            document: None,
            cep: None,
            street: None,
            number: None,
            complement: None,
            neighborhood: None,
            city: None,
            state: None,
            company_name: None,
            bio: None,
            avatar_url: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// `"City - UF"` when both are known, used as a listing's default location.
    #[must_use]
    pub fn location_label(&self) -> Option<String> {
        match (self.city.as_deref(), self.state.as_deref()) {
            (Some(city), Some(state)) if !city.is_empty() && !state.is_empty() => {
                Some(format!("{city} - {state}"))
            }
            _ => None,
        }
    }
}

/// Upsert payload for `profiles`, produced by validated form input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    pub id: UserId,
    pub full_name: String,
    pub phone: String,
    pub document: Option<String>,
    pub cep: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub company_name: Option<String>,
    pub bio: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_label() {
        let mut profile = Profile::empty(UserId::generate(), None);
        assert_eq!(profile.location_label(), None);

        profile.city = Some("Rio Verde".to_string());
        profile.state = Some("GO".to_string());
        assert_eq!(profile.location_label().as_deref(), Some("Rio Verde - GO"));
    }
}
