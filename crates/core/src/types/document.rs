//! Brazilian document and contact identifiers.
//!
//! CPF (individuals), CNPJ (companies), phone numbers and CEP postal codes
//! are accepted with or without punctuation. Each type stores digits only and
//! formats on display.

use core::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static CPF_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{3}\.?\d{3}\.?\d{3}-?\d{2}$").expect("CPF pattern is a valid regex")
});

static CNPJ_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{2}\.?\d{3}\.?\d{3}/?\d{4}-?\d{2}$").expect("CNPJ pattern is a valid regex")
});

static PHONE_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\+?55\s?)?\(?[1-9]\d\)?\s?(?:9\s?)?\d{4}[-\s]?\d{4}$")
        .expect("phone pattern is a valid regex")
});

static CEP_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}-?\d{3}$").expect("CEP pattern is a valid regex"));

/// Validation failures for Brazilian identifiers.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("CPF inválido")]
    InvalidCpf,
    #[error("CNPJ inválido")]
    InvalidCnpj,
    #[error("documento deve ser um CPF ou CNPJ")]
    UnknownDocument,
    #[error("telefone inválido")]
    InvalidPhone,
    #[error("CEP inválido")]
    InvalidCep,
}

fn digits_of(input: &str) -> Vec<u32> {
    input.chars().filter_map(|c| c.to_digit(10)).collect()
}

fn digits_to_string(digits: &[u32]) -> String {
    digits
        .iter()
        .filter_map(|d| char::from_digit(*d, 10))
        .collect()
}

fn all_same(digits: &[u32]) -> bool {
    digits.windows(2).all(|w| w.first() == w.get(1))
}

fn cpf_check_digit(digits: &[u32]) -> u32 {
    let len = u32::try_from(digits.len()).unwrap_or(0);
    let sum: u32 = digits
        .iter()
        .zip((2..=len + 1).rev())
        .map(|(d, w)| d * w)
        .sum();
    let rest = (sum * 10) % 11;
    if rest == 10 { 0 } else { rest }
}

fn cnpj_check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    let rest = sum % 11;
    if rest < 2 { 0 } else { 11 - rest }
}

/// A CPF with valid check digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cpf(String);

impl Cpf {
    /// Parse a CPF, punctuated or not.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidCpf`] when the format or check digits
    /// are wrong, or when all digits are equal.
    pub fn parse(input: &str) -> Result<Self, DocumentError> {
        let trimmed = input.trim();
        if !CPF_FORMAT.is_match(trimmed) {
            return Err(DocumentError::InvalidCpf);
        }
        let digits = digits_of(trimmed);
        if all_same(&digits) {
            return Err(DocumentError::InvalidCpf);
        }
        let (Some(base), Some(&d1), Some(&d2)) = (digits.get(..9), digits.get(9), digits.get(10))
        else {
            return Err(DocumentError::InvalidCpf);
        };
        let first = cpf_check_digit(base);
        let second = digits
            .get(..10)
            .map_or(u32::MAX, cpf_check_digit);
        if first != d1 || second != d2 {
            return Err(DocumentError::InvalidCpf);
        }
        Ok(Self(digits_to_string(&digits)))
    }

    /// Digits only.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cpf {
    #[allow(clippy::indexing_slicing)] // length fixed by parse
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.0;
        write!(
            f,
            "{}.{}.{}-{}",
            &d[0..3],
            &d[3..6],
            &d[6..9],
            &d[9..11]
        )
    }
}

/// A CNPJ with valid check digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cnpj(String);

impl Cnpj {
    const FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    const SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

    /// Parse a CNPJ, punctuated or not.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidCnpj`] when the format or check digits
    /// are wrong, or when all digits are equal.
    pub fn parse(input: &str) -> Result<Self, DocumentError> {
        let trimmed = input.trim();
        if !CNPJ_FORMAT.is_match(trimmed) {
            return Err(DocumentError::InvalidCnpj);
        }
        let digits = digits_of(trimmed);
        if all_same(&digits) {
            return Err(DocumentError::InvalidCnpj);
        }
        let (Some(&d1), Some(&d2)) = (digits.get(12), digits.get(13)) else {
            return Err(DocumentError::InvalidCnpj);
        };
        let first = cnpj_check_digit(&digits, &Self::FIRST_WEIGHTS);
        let second = cnpj_check_digit(&digits, &Self::SECOND_WEIGHTS);
        if first != d1 || second != d2 {
            return Err(DocumentError::InvalidCnpj);
        }
        Ok(Self(digits_to_string(&digits)))
    }

    /// Digits only.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cnpj {
    #[allow(clippy::indexing_slicing)] // length fixed by parse
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.0;
        write!(
            f,
            "{}.{}.{}/{}-{}",
            &d[0..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..14]
        )
    }
}

/// The taxpayer document on a seller profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Document {
    Cpf(Cpf),
    Cnpj(Cnpj),
}

impl Document {
    /// Parse either a CPF (11 digits) or a CNPJ (14 digits).
    ///
    /// # Errors
    ///
    /// Returns the CPF/CNPJ error matching the digit count, or
    /// [`DocumentError::UnknownDocument`] for any other length.
    pub fn parse(input: &str) -> Result<Self, DocumentError> {
        match digits_of(input).len() {
            11 => Cpf::parse(input).map(Self::Cpf),
            14 => Cnpj::parse(input).map(Self::Cnpj),
            _ => Err(DocumentError::UnknownDocument),
        }
    }

    /// Digits only, as stored in the profile row.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cpf(cpf) => cpf.as_str(),
            Self::Cnpj(cnpj) => cnpj.as_str(),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpf(cpf) => cpf.fmt(f),
            Self::Cnpj(cnpj) => cnpj.fmt(f),
        }
    }
}

/// A Brazilian landline (10 digits) or mobile (11 digits) number with DDD.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Parse a phone number such as `(34) 99876-5432` or `3432101234`.
    ///
    /// A leading `+55` country code is accepted and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidPhone`] for anything else.
    pub fn parse(input: &str) -> Result<Self, DocumentError> {
        let trimmed = input.trim();
        if !PHONE_FORMAT.is_match(trimmed) {
            return Err(DocumentError::InvalidPhone);
        }
        let mut digits = digits_of(trimmed);
        if digits.len() > 11 && digits.starts_with(&[5, 5]) {
            digits.drain(..2);
        }
        match digits.len() {
            10 => Ok(Self(digits_to_string(&digits))),
            11 if digits.get(2) == Some(&9) => Ok(Self(digits_to_string(&digits))),
            _ => Err(DocumentError::InvalidPhone),
        }
    }

    /// Digits only, DDD included.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a mobile number (9-prefixed, 11 digits).
    #[must_use]
    pub fn is_mobile(&self) -> bool {
        self.0.len() == 11
    }
}

impl fmt::Display for Phone {
    #[allow(clippy::indexing_slicing)] // length fixed by parse
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.0;
        let split = d.len() - 4;
        write!(f, "({}) {}-{}", &d[0..2], &d[2..split], &d[split..])
    }
}

/// An 8-digit CEP postal code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cep(String);

impl Cep {
    /// Parse a CEP such as `38400-100` or `38400100`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::InvalidCep`] for anything else.
    pub fn parse(input: &str) -> Result<Self, DocumentError> {
        let trimmed = input.trim();
        if !CEP_FORMAT.is_match(trimmed) {
            return Err(DocumentError::InvalidCep);
        }
        Ok(Self(digits_to_string(&digits_of(trimmed))))
    }

    /// Digits only, as the lookup API expects.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (head, tail) = self.0.split_at_checked(5).unwrap_or((&self.0, ""));
        write!(f, "{head}-{tail}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cpf_valid_with_and_without_punctuation() {
        let cpf = Cpf::parse("529.982.247-25").unwrap();
        assert_eq!(cpf.as_str(), "52998224725");
        assert_eq!(cpf.to_string(), "529.982.247-25");
        assert!(Cpf::parse("52998224725").is_ok());
    }

    #[test]
    fn test_cpf_rejects_bad_check_digits() {
        assert_eq!(Cpf::parse("529.982.247-26"), Err(DocumentError::InvalidCpf));
    }

    #[test]
    fn test_cpf_rejects_repeated_digits() {
        assert_eq!(Cpf::parse("111.111.111-11"), Err(DocumentError::InvalidCpf));
    }

    #[test]
    fn test_cnpj_valid() {
        let cnpj = Cnpj::parse("11.222.333/0001-81").unwrap();
        assert_eq!(cnpj.as_str(), "11222333000181");
        assert_eq!(cnpj.to_string(), "11.222.333/0001-81");
    }

    #[test]
    fn test_cnpj_rejects_bad_check_digits() {
        assert_eq!(
            Cnpj::parse("11.222.333/0001-82"),
            Err(DocumentError::InvalidCnpj)
        );
    }

    #[test]
    fn test_document_dispatches_on_length() {
        assert!(matches!(
            Document::parse("52998224725"),
            Ok(Document::Cpf(_))
        ));
        assert!(matches!(
            Document::parse("11222333000181"),
            Ok(Document::Cnpj(_))
        ));
        assert_eq!(
            Document::parse("1234"),
            Err(DocumentError::UnknownDocument)
        );
    }

    #[test]
    fn test_phone_mobile_and_landline() {
        let mobile = Phone::parse("(34) 99876-5432").unwrap();
        assert_eq!(mobile.as_str(), "34998765432");
        assert!(mobile.is_mobile());
        assert_eq!(mobile.to_string(), "(34) 99876-5432");

        let landline = Phone::parse("34 3210-1234").unwrap();
        assert_eq!(landline.as_str(), "3432101234");
        assert_eq!(landline.to_string(), "(34) 3210-1234");
    }

    #[test]
    fn test_phone_accepts_country_code() {
        assert_eq!(
            Phone::parse("+55 34 99876-5432").unwrap().as_str(),
            "34998765432"
        );
    }

    #[test]
    fn test_phone_rejects_garbage() {
        assert_eq!(Phone::parse("12345"), Err(DocumentError::InvalidPhone));
        assert_eq!(Phone::parse("(04) 3210-1234"), Err(DocumentError::InvalidPhone));
    }

    #[test]
    fn test_cep() {
        let cep = Cep::parse("38400-100").unwrap();
        assert_eq!(cep.as_str(), "38400100");
        assert_eq!(cep.to_string(), "38400-100");
        assert_eq!(Cep::parse("3840-0100"), Err(DocumentError::InvalidCep));
    }
}
