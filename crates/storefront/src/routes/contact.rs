//! Contact page.
//!
//! Messages are validated, logged and acknowledged. They are not stored.

use axum::{Form, Json, extract::State, response::Redirect};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use agromaq_core::{Email, Phone};

use crate::config::ContactConfig;
use crate::error::{AppError, FieldError, Result};
use crate::middleware::OptionalAuth;
use crate::models::Notice;
use crate::state::AppState;

use super::{PageResponse, notify, page};

const MAX_MESSAGE_LENGTH: usize = 2000;

#[derive(Debug, Serialize)]
pub struct ContactPage {
    pub contact: ContactConfig,
    pub subjects: &'static [&'static str],
}

/// Subjects offered in the form.
pub const SUBJECTS: &[&str] = &[
    "Dúvidas sobre compra",
    "Dúvidas sobre aluguel",
    "Quero anunciar",
    "Problemas com anúncio",
    "Outros",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
}

/// A contact message that passed validation.
#[derive(Debug)]
pub struct ContactMessage {
    pub name: String,
    pub email: Email,
    pub phone: Option<Phone>,
    pub subject: String,
    pub message: String,
}

impl ContactForm {
    /// Validate the form.
    ///
    /// # Errors
    ///
    /// Returns one [`FieldError`] per invalid field.
    pub fn validate(&self) -> std::result::Result<ContactMessage, Vec<FieldError>> {
        let mut errors = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push(FieldError::new("name", "Informe seu nome."));
        }
        let email = Email::parse(&self.email)
            .map_err(|_| errors.push(FieldError::new("email", "E-mail inválido.")))
            .ok();
        let phone = match self.phone.trim() {
            "" => None,
            raw => Phone::parse(raw)
                .map_err(|_| errors.push(FieldError::new("phone", "Telefone inválido.")))
                .ok(),
        };
        let subject = self.subject.trim();
        if !SUBJECTS.contains(&subject) {
            errors.push(FieldError::new("subject", "Escolha um assunto."));
        }
        let message = self.message.trim();
        if message.is_empty() {
            errors.push(FieldError::new("message", "Escreva sua mensagem."));
        } else if message.chars().count() > MAX_MESSAGE_LENGTH {
            errors.push(FieldError::new(
                "message",
                format!("A mensagem deve ter no máximo {MAX_MESSAGE_LENGTH} caracteres."),
            ));
        }

        match email {
            Some(email) if errors.is_empty() => Ok(ContactMessage {
                name: name.to_string(),
                email,
                phone,
                subject: subject.to_string(),
                message: message.to_string(),
            }),
            _ => Err(errors),
        }
    }
}

/// Contact details and form options.
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Json<PageResponse<ContactPage>> {
    let data = ContactPage {
        contact: state.config().contact.clone(),
        subjects: SUBJECTS,
    };
    page("contato", &session, user.as_ref(), data).await
}

/// Accept a contact message.
#[instrument(skip_all)]
pub async fn submit(session: Session, Form(form): Form<ContactForm>) -> Result<Redirect> {
    let message = form.validate().map_err(AppError::Validation)?;
    tracing::info!(
        email = %message.email,
        subject = %message.subject,
        has_phone = message.phone.is_some(),
        length = message.message.len(),
        "Contact message received"
    );
    notify(
        &session,
        Notice::success(format!(
            "Obrigado, {}! Recebemos sua mensagem e responderemos em breve.",
            message.name
        )),
    )
    .await;
    Ok(Redirect::to("/contato"))
}
