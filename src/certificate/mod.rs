//! Certificate descriptors and filters.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Certificate`] | One entry of `listCertificates` |
//! | [`PkiBrazil`], [`PkiItaly`] | Locale-specific certificate fields |
//! | [`CertificateFilter`] | Composable predicate applied to a listing |

/// Composable certificate filters.
pub mod filter;

/// Certificate descriptors and date post-processing.
pub mod model;

pub use filter::{CertificateFilter, Predicate};
pub use model::{
    Certificate, PkiBrazil, PkiItaly, normalize_listing, parse_birth_date, parse_timestamp,
};
