//! CEP and IBGE lookup API used by the address forms.
//!
//! The CEP endpoint answers with a [`Notice`] describing the outcome, so
//! the form can show feedback without interpreting status codes.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Result;
use crate::lookup::{Address, LookupError, Municipality, State as Uf};
use crate::models::Notice;
use crate::state::AppState;

/// Outcome of a CEP lookup.
#[derive(Debug, Serialize)]
pub struct CepLookup {
    pub address: Option<Address>,
    pub notice: Notice,
}

impl CepLookup {
    fn from_result(result: std::result::Result<Address, LookupError>) -> (StatusCode, Self) {
        match result {
            Ok(address) => (
                StatusCode::OK,
                Self {
                    address: Some(address),
                    notice: Notice::success("Endereço preenchido automaticamente."),
                },
            ),
            Err(e) => {
                let kind = e.kind();
                let notice = match &e {
                    LookupError::NotFound(_) => {
                        Notice::warning("CEP não encontrado. Preencha o endereço manualmente.")
                    }
                    LookupError::InvalidCep(_) => Notice::error("CEP inválido. Informe os 8 dígitos."),
                    _ => {
                        tracing::warn!(error = %e, kind = ?kind, "CEP lookup failed");
                        Notice::error(kind.user_message())
                    }
                };
                (
                    kind.status(),
                    Self {
                        address: None,
                        notice,
                    },
                )
            }
        }
    }
}

/// `GET /api/cep/{cep}`
pub async fn address(State(state): State<AppState>, Path(cep): Path<String>) -> Response {
    let (status, body) = CepLookup::from_result(state.lookup().address_for_cep(&cep).await);
    (status, Json(body)).into_response()
}

/// `GET /api/estados`, ordered by name.
pub async fn states(State(state): State<AppState>) -> Result<Json<Vec<Uf>>> {
    Ok(Json(state.lookup().states().await?))
}

/// `GET /api/estados/{uf}/municipios`, ordered by name.
pub async fn municipalities(
    State(state): State<AppState>,
    Path(uf): Path<String>,
) -> Result<Json<Vec<Municipality>>> {
    Ok(Json(state.lookup().municipalities(&uf).await?))
}

#[cfg(test)]
mod tests {
    use agromaq_core::Cep;

    use super::*;
    use crate::models::NoticeLevel;

    #[test]
    fn test_not_found_is_a_warning() {
        let (status, body) =
            CepLookup::from_result(Err(LookupError::NotFound("01001000".to_string())));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.address.is_none());
        assert_eq!(body.notice.level, NoticeLevel::Warning);
    }

    #[test]
    fn test_invalid_cep_is_unprocessable() {
        let err = Cep::parse("123").map_err(LookupError::from);
        let (status, body) = CepLookup::from_result(err.map(|_| blank_address()));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.notice.level, NoticeLevel::Error);
    }

    fn blank_address() -> Address {
        Address {
            cep: String::new(),
            street: String::new(),
            complement: String::new(),
            neighborhood: String::new(),
            city: String::new(),
            state: String::new(),
            ibge: String::new(),
        }
    }

    #[test]
    fn test_found_is_ok() {
        let (status, body) = CepLookup::from_result(Ok(Address {
            cep: "38400-000".to_string(),
            city: "Uberlândia".to_string(),
            state: "MG".to_string(),
            ..blank_address()
        }));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.address.map(|a| a.city).as_deref(), Some("Uberlândia"));
    }
}
