//! Brazilian address lookups: ViaCEP for postal codes, IBGE for states and
//! municipalities.
//!
//! Results are cached in memory for 24 hours via `moka`; the data changes
//! rarely and both services are rate limited.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use url::Url;

use agromaq_core::{Cep, DocumentError};

use crate::config::LookupConfig;
use crate::error::ErrorKind;

/// The 27 federative units.
pub const UFS: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB", "PR",
    "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

/// Normalize a UF code, or `None` if it is not one of [`UFS`].
#[must_use]
pub fn normalize_uf(input: &str) -> Option<&'static str> {
    let upper = input.trim().to_ascii_uppercase();
    UFS.into_iter().find(|uf| *uf == upper)
}

/// Errors from the lookup services.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lookup service returned {0}")]
    Status(u16),

    #[error("invalid CEP: {0}")]
    InvalidCep(#[from] DocumentError),

    #[error("unknown state: {0}")]
    InvalidState(String),

    #[error("CEP not found: {0}")]
    NotFound(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl LookupError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Http(err) if err.is_timeout() => ErrorKind::Timeout,
            Self::Http(err) if err.is_decode() => ErrorKind::Unexpected,
            Self::Http(_) => ErrorKind::Network,
            Self::Status(status) => ErrorKind::classify(Some(*status), None, ""),
            Self::InvalidCep(_) | Self::InvalidState(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Url(_) => ErrorKind::Unexpected,
        }
    }
}

/// An address resolved from a CEP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub cep: String,
    #[serde(rename(deserialize = "logradouro"), default)]
    pub street: String,
    #[serde(rename(deserialize = "complemento"), default)]
    pub complement: String,
    #[serde(rename(deserialize = "bairro"), default)]
    pub neighborhood: String,
    #[serde(rename(deserialize = "localidade"))]
    pub city: String,
    #[serde(rename(deserialize = "uf"))]
    pub state: String,
    #[serde(default)]
    pub ibge: String,
}

/// A federative unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub id: u32,
    #[serde(rename(deserialize = "sigla"))]
    pub uf: String,
    #[serde(rename(deserialize = "nome"))]
    pub name: String,
}

/// A municipality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Municipality {
    pub id: u32,
    #[serde(rename(deserialize = "nome"))]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Cep(String),
    States,
    Municipalities(&'static str),
}

#[derive(Clone)]
enum CacheValue {
    Address(Arc<Address>),
    States(Arc<Vec<State>>),
    Municipalities(Arc<Vec<Municipality>>),
}

/// Client for ViaCEP and the IBGE localities API.
#[derive(Clone)]
pub struct LookupClient {
    inner: Arc<LookupClientInner>,
}

struct LookupClientInner {
    http: reqwest::Client,
    viacep: Url,
    ibge: Url,
    cache: Cache<CacheKey, CacheValue>,
}

impl LookupClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns an error if a base URL cannot be parsed.
    pub fn new(config: &LookupConfig, http: reqwest::Client) -> Result<Self, LookupError> {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(24 * 60 * 60))
            .build();

        Ok(Self {
            inner: Arc::new(LookupClientInner {
                http,
                viacep: base_url(&config.viacep_base_url)?,
                ibge: base_url(&config.ibge_base_url)?,
                cache,
            }),
        })
    }

    /// Resolve a CEP to an address.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCep` for malformed input and `NotFound` when the
    /// service knows no such CEP.
    #[instrument(skip(self))]
    pub async fn address_for_cep(&self, raw: &str) -> Result<Address, LookupError> {
        let cep = Cep::parse(raw)?;
        let key = CacheKey::Cep(cep.as_str().to_string());
        if let Some(CacheValue::Address(address)) = self.inner.cache.get(&key).await {
            tracing::debug!("Cache hit for CEP");
            return Ok((*address).clone());
        }

        let url = self
            .inner
            .viacep
            .join(&format!("ws/{}/json/", cep.as_str()))?;
        let body: serde_json::Value = self.get_json(url).await?;

        // ViaCEP answers 200 with {"erro": true} (or "true") for unknown CEPs
        let missing = matches!(
            body.get("erro"),
            Some(serde_json::Value::Bool(true))
        ) || body.get("erro").and_then(serde_json::Value::as_str) == Some("true");
        if missing {
            return Err(LookupError::NotFound(cep.to_string()));
        }

        let address: Address =
            serde_json::from_value(body).map_err(|_| LookupError::NotFound(cep.to_string()))?;
        self.inner
            .cache
            .insert(key, CacheValue::Address(Arc::new(address.clone())))
            .await;
        Ok(address)
    }

    /// Every state, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is unreachable.
    #[instrument(skip(self))]
    pub async fn states(&self) -> Result<Vec<State>, LookupError> {
        if let Some(CacheValue::States(states)) = self.inner.cache.get(&CacheKey::States).await {
            return Ok((*states).clone());
        }

        let mut url = self.inner.ibge.join("api/v1/localidades/estados")?;
        url.query_pairs_mut().append_pair("orderBy", "nome");
        let states: Vec<State> = self.get_json(url).await?;

        self.inner
            .cache
            .insert(CacheKey::States, CacheValue::States(Arc::new(states.clone())))
            .await;
        Ok(states)
    }

    /// Municipalities of a state, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` for unknown UF codes.
    #[instrument(skip(self))]
    pub async fn municipalities(&self, uf: &str) -> Result<Vec<Municipality>, LookupError> {
        let uf = normalize_uf(uf).ok_or_else(|| LookupError::InvalidState(uf.to_string()))?;
        let key = CacheKey::Municipalities(uf);
        if let Some(CacheValue::Municipalities(list)) = self.inner.cache.get(&key).await {
            return Ok((*list).clone());
        }

        let mut url = self
            .inner
            .ibge
            .join(&format!("api/v1/localidades/estados/{uf}/municipios"))?;
        url.query_pairs_mut().append_pair("orderBy", "nome");
        let list: Vec<Municipality> = self.get_json(url).await?;

        self.inner
            .cache
            .insert(key, CacheValue::Municipalities(Arc::new(list.clone())))
            .await;
        Ok(list)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, LookupError> {
        let response = self.inner.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Lookup service returned non-success status");
            return Err(LookupError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}

fn base_url(raw: &str) -> Result<Url, url::ParseError> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_uf() {
        assert_eq!(normalize_uf(" mg "), Some("MG"));
        assert_eq!(normalize_uf("XX"), None);
        assert_eq!(UFS.len(), 27);
    }

    #[test]
    fn test_viacep_payload() {
        let body = r#"{
            "cep": "38400-100",
            "logradouro": "Avenida Afonso Pena",
            "complemento": "",
            "bairro": "Centro",
            "localidade": "Uberlândia",
            "uf": "MG",
            "ibge": "3170206"
        }"#;
        let address: Address = serde_json::from_str(body).unwrap();
        assert_eq!(address.city, "Uberlândia");
        assert_eq!(address.state, "MG");

        let out = serde_json::to_value(&address).unwrap();
        assert_eq!(out["street"], "Avenida Afonso Pena");
    }

    #[test]
    fn test_ibge_payloads() {
        let states: Vec<State> =
            serde_json::from_str(r#"[{"id":31,"sigla":"MG","nome":"Minas Gerais","regiao":{"id":3}}]"#)
                .unwrap();
        assert_eq!(states.first().unwrap().uf, "MG");

        let cities: Vec<Municipality> =
            serde_json::from_str(r#"[{"id":3170206,"nome":"Uberlândia","microrregiao":{}}]"#)
                .unwrap();
        assert_eq!(cities.first().unwrap().name, "Uberlândia");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            LookupError::NotFound("00000-000".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LookupError::InvalidState("ZZ".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(LookupError::Status(503).kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_invalid_cep_never_hits_network() {
        let client = LookupClient::new(&LookupConfig::default(), reqwest::Client::new()).unwrap();
        let err = client.address_for_cep("123").await.unwrap_err();
        assert!(matches!(err, LookupError::InvalidCep(_)));
    }
}
