//! Profile form validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agromaq_core::{Cep, Document, Phone, Profile, ProfileUpdate, UserId};

use crate::error::FieldError;
use crate::lookup::normalize_uf;

const MAX_BIO_LENGTH: usize = 500;

/// Raw profile form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub full_name: String,
    pub phone: String,
    pub document: String,
    pub cep: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub company_name: String,
    pub bio: String,
}

impl ProfileForm {
    /// Prefill from a stored profile.
    #[must_use]
    pub fn from_profile(profile: &Profile) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            full_name: text(&profile.full_name),
            phone: text(&profile.phone),
            document: text(&profile.document),
            cep: text(&profile.cep),
            street: text(&profile.street),
            number: text(&profile.number),
            complement: text(&profile.complement),
            neighborhood: text(&profile.neighborhood),
            city: text(&profile.city),
            state: text(&profile.state),
            company_name: text(&profile.company_name),
            bio: text(&profile.bio),
        }
    }

    /// Validate and normalize. Identifiers are stored in display format.
    ///
    /// # Errors
    ///
    /// Returns one [`FieldError`] per invalid field.
    pub fn validate(&self, id: UserId, now: DateTime<Utc>) -> Result<ProfileUpdate, Vec<FieldError>> {
        let mut errors = Vec::new();

        let full_name = self.full_name.trim().to_string();
        if full_name.is_empty() {
            errors.push(FieldError::new("full_name", "Informe seu nome."));
        }

        let phone = match Phone::parse(&self.phone) {
            Ok(phone) => phone.to_string(),
            Err(e) => {
                errors.push(FieldError::new("phone", capitalize(&e.to_string())));
                String::new()
            }
        };

        let document = optional(&self.document).and_then(|raw| match Document::parse(&raw) {
            Ok(doc) => Some(doc.to_string()),
            Err(e) => {
                errors.push(FieldError::new("document", capitalize(&e.to_string())));
                None
            }
        });

        let cep = optional(&self.cep).and_then(|raw| match Cep::parse(&raw) {
            Ok(cep) => Some(cep.to_string()),
            Err(e) => {
                errors.push(FieldError::new("cep", capitalize(&e.to_string())));
                None
            }
        });

        let state = optional(&self.state).and_then(|raw| {
            let uf = normalize_uf(&raw);
            if uf.is_none() {
                errors.push(FieldError::new("state", "Estado inválido."));
            }
            uf.map(str::to_string)
        });

        let bio = optional(&self.bio);
        if bio
            .as_ref()
            .is_some_and(|b| b.chars().count() > MAX_BIO_LENGTH)
        {
            errors.push(FieldError::new(
                "bio",
                format!("A apresentação deve ter no máximo {MAX_BIO_LENGTH} caracteres."),
            ));
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ProfileUpdate {
            id,
            full_name,
            phone,
            document,
            cep,
            street: optional(&self.street),
            number: optional(&self.number),
            complement: optional(&self.complement),
            neighborhood: optional(&self.neighborhood),
            city: optional(&self.city),
            state,
            company_name: optional(&self.company_name),
            bio,
            updated_at: now,
        })
    }
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    chars.next().map_or_else(String::new, |first| {
        format!("{}{}.", first.to_uppercase(), chars.as_str())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form() -> ProfileForm {
        ProfileForm {
            full_name: "Ana Souza".to_string(),
            phone: "34998765432".to_string(),
            document: "529.982.247-25".to_string(),
            cep: "38400100".to_string(),
            city: "Uberlândia".to_string(),
            state: "mg".to_string(),
            ..ProfileForm::default()
        }
    }

    #[test]
    fn test_valid_profile_is_normalized() {
        let update = form().validate(UserId::generate(), Utc::now()).unwrap();
        assert_eq!(update.phone, "(34) 99876-5432");
        assert_eq!(update.document.as_deref(), Some("529.982.247-25"));
        assert_eq!(update.cep.as_deref(), Some("38400-100"));
        assert_eq!(update.state.as_deref(), Some("MG"));
        assert_eq!(update.street, None);
    }

    #[test]
    fn test_invalid_fields_are_reported() {
        let mut bad = form();
        bad.full_name = "  ".to_string();
        bad.phone = "123".to_string();
        bad.document = "111.111.111-11".to_string();
        bad.state = "ZZ".to_string();

        let errors = bad.validate(UserId::generate(), Utc::now()).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, ["full_name", "phone", "document", "state"]);
        assert_eq!(errors.get(1).unwrap().message, "Telefone inválido.");
    }

    #[test]
    fn test_document_is_optional() {
        let mut f = form();
        f.document = String::new();
        assert_eq!(f.validate(UserId::generate(), Utc::now()).unwrap().document, None);
    }
}
