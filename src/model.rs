//! Lookup keys and the address records providers answer with.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{config::ProviderId, errors::InvalidLookupKey};

/// A postal code as supplied by the caller.
///
/// Only emptiness is checked; the value is passed through to upstreams as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey(String);

impl LookupKey {
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidLookupKey> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(InvalidLookupKey);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address as returned by ViaCEP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViaCepAddress {
    pub cep: String,
    pub logradouro: String,
    pub complemento: String,
    pub unidade: String,
    pub bairro: String,
    pub localidade: String,
    pub uf: String,
    pub ibge: String,
    pub gia: String,
    pub ddd: String,
    pub siafi: String,
}

/// Address as returned by BrasilAPI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrasilApiAddress {
    pub cep: String,
    pub state: String,
    pub city: String,
    pub neighborhood: String,
    pub street: String,
    pub service: String,
}

/// Provider-specific address fields, serialized with the provider's own names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AddressFields {
    ViaCep(ViaCepAddress),
    BrasilApi(BrasilApiAddress),
}

/// Successful answer of one provider, tagged with the provider that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressRecord {
    #[serde(flatten)]
    pub fields: AddressFields,
    pub source: ProviderId,
}

impl AddressRecord {
    pub fn new(source: ProviderId, fields: AddressFields) -> Self {
        Self { fields, source }
    }

    pub fn postal_code(&self) -> &str {
        match &self.fields {
            AddressFields::ViaCep(a) => &a.cep,
            AddressFields::BrasilApi(a) => &a.cep,
        }
    }

    /// State (UF) code.
    pub fn region(&self) -> &str {
        match &self.fields {
            AddressFields::ViaCep(a) => &a.uf,
            AddressFields::BrasilApi(a) => &a.state,
        }
    }

    pub fn locality(&self) -> &str {
        match &self.fields {
            AddressFields::ViaCep(a) => &a.localidade,
            AddressFields::BrasilApi(a) => &a.city,
        }
    }

    pub fn neighborhood(&self) -> &str {
        match &self.fields {
            AddressFields::ViaCep(a) => &a.bairro,
            AddressFields::BrasilApi(a) => &a.neighborhood,
        }
    }

    pub fn street(&self) -> &str {
        match &self.fields {
            AddressFields::ViaCep(a) => &a.logradouro,
            AddressFields::BrasilApi(a) => &a.street,
        }
    }
}
