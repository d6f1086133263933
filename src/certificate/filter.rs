//! Composable certificate filters.
//!
//! # Example
//!
//! ```
//! use pki_bridge::CertificateFilter;
//!
//! // Valid certificates of an individual (CPF without CNPJ), or any
//! // certificate carrying an Italian fiscal code.
//! let filter = CertificateFilter::any([
//!     CertificateFilter::all([
//!         CertificateFilter::IsPkiBrazilPessoaFisica,
//!         CertificateFilter::IsWithinValidity,
//!     ]),
//!     CertificateFilter::HasPkiItalyCodiceFiscale,
//! ]);
//! # let _ = filter;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::Certificate;

// ============================================================================
// Types
// ============================================================================

/// Arbitrary predicate over a certificate.
pub type Predicate = Arc<dyn Fn(&Certificate) -> bool + Send + Sync>;

// ============================================================================
// CertificateFilter
// ============================================================================

/// Boolean predicate over a [`Certificate`].
#[derive(Clone)]
pub enum CertificateFilter {
    /// ICP-Brasil individual: CPF present, CNPJ absent.
    IsPkiBrazilPessoaFisica,
    /// ICP-Brasil CPF present.
    HasPkiBrazilCpf,
    /// ICP-Brasil CNPJ present.
    HasPkiBrazilCnpj,
    /// ICP-Brasil CPF equals the given value.
    PkiBrazilCpfEquals(String),
    /// ICP-Brasil CNPJ equals the given value.
    PkiBrazilCnpjEquals(String),
    /// Italian codice fiscale present.
    HasPkiItalyCodiceFiscale,
    /// Italian codice fiscale equals the given value.
    PkiItalyCodiceFiscaleEquals(String),
    /// Validity window contains the current time.
    IsWithinValidity,
    /// Validity window contains the given instant.
    IsWithinValidityAt(DateTime<Utc>),
    /// Every filter passes (vacuously true).
    All(Vec<CertificateFilter>),
    /// At least one filter passes.
    Any(Vec<CertificateFilter>),
    /// Caller-supplied predicate.
    Custom(Predicate),
}

impl CertificateFilter {
    /// Combines filters with AND.
    #[must_use]
    pub fn all(filters: impl IntoIterator<Item = Self>) -> Self {
        Self::All(filters.into_iter().collect())
    }

    /// Combines filters with OR.
    #[must_use]
    pub fn any(filters: impl IntoIterator<Item = Self>) -> Self {
        Self::Any(filters.into_iter().collect())
    }

    /// Wraps a closure.
    #[must_use]
    pub fn custom(predicate: impl Fn(&Certificate) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    /// Returns `true` if `cert` passes the filter.
    #[must_use]
    pub fn matches(&self, cert: &Certificate) -> bool {
        let brazil = cert.pki_brazil.as_ref();
        let italy = cert.pki_italy.as_ref();

        match self {
            Self::IsPkiBrazilPessoaFisica => {
                brazil.is_some_and(|b| b.cpf().is_some() && b.cnpj().is_none())
            }
            Self::HasPkiBrazilCpf => brazil.is_some_and(|b| b.cpf().is_some()),
            Self::HasPkiBrazilCnpj => brazil.is_some_and(|b| b.cnpj().is_some()),
            Self::PkiBrazilCpfEquals(cpf) => {
                brazil.is_some_and(|b| b.cpf.as_deref() == Some(cpf.as_str()))
            }
            Self::PkiBrazilCnpjEquals(cnpj) => {
                brazil.is_some_and(|b| b.cnpj.as_deref() == Some(cnpj.as_str()))
            }
            Self::HasPkiItalyCodiceFiscale => italy.is_some_and(|i| i.codice_fiscale().is_some()),
            Self::PkiItalyCodiceFiscaleEquals(cf) => {
                italy.is_some_and(|i| i.codice_fiscale.as_deref() == Some(cf.as_str()))
            }
            Self::IsWithinValidity => cert.is_valid_at(Utc::now()),
            Self::IsWithinValidityAt(instant) => cert.is_valid_at(*instant),
            Self::All(filters) => filters.iter().all(|f| f.matches(cert)),
            Self::Any(filters) => filters.iter().any(|f| f.matches(cert)),
            Self::Custom(predicate) => predicate(cert),
        }
    }
}

impl fmt::Debug for CertificateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IsPkiBrazilPessoaFisica => f.write_str("IsPkiBrazilPessoaFisica"),
            Self::HasPkiBrazilCpf => f.write_str("HasPkiBrazilCpf"),
            Self::HasPkiBrazilCnpj => f.write_str("HasPkiBrazilCnpj"),
            Self::PkiBrazilCpfEquals(v) => f.debug_tuple("PkiBrazilCpfEquals").field(v).finish(),
            Self::PkiBrazilCnpjEquals(v) => f.debug_tuple("PkiBrazilCnpjEquals").field(v).finish(),
            Self::HasPkiItalyCodiceFiscale => f.write_str("HasPkiItalyCodiceFiscale"),
            Self::PkiItalyCodiceFiscaleEquals(v) => f
                .debug_tuple("PkiItalyCodiceFiscaleEquals")
                .field(v)
                .finish(),
            Self::IsWithinValidity => f.write_str("IsWithinValidity"),
            Self::IsWithinValidityAt(t) => f.debug_tuple("IsWithinValidityAt").field(t).finish(),
            Self::All(v) => f.debug_tuple("All").field(v).finish(),
            Self::Any(v) => f.debug_tuple("Any").field(v).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
