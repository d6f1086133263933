//! Certificate descriptors and listing post-processing.
//!
//! The component reports dates in whatever textual form its platform
//! produces. [`normalize_listing`] rewrites them into canonical forms
//! before the listing is decoded into [`Certificate`] values.

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};

// ============================================================================
// Certificate
// ============================================================================

/// A certificate available to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// Identifier used by every other certificate operation.
    pub thumbprint: String,

    /// Common name of the subject.
    #[serde(default)]
    pub subject_name: String,

    /// Common name of the issuer.
    #[serde(default)]
    pub issuer_name: String,

    /// Start of the validity window.
    pub validity_start: DateTime<Utc>,

    /// End of the validity window.
    pub validity_end: DateTime<Utc>,

    /// ICP-Brasil fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pki_brazil: Option<PkiBrazil>,

    /// Italian PKI fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pki_italy: Option<PkiItaly>,

    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Certificate {
    /// Returns `true` if `instant` falls inside the validity window.
    #[inline]
    #[must_use]
    pub fn is_valid_at(&self, instant: DateTime<Utc>) -> bool {
        self.validity_start <= instant && instant <= self.validity_end
    }
}

/// ICP-Brasil certificate fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkiBrazil {
    /// Individual taxpayer ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,

    /// Company taxpayer ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnpj: Option<String>,

    /// Holder's date of birth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,

    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PkiBrazil {
    /// Returns the CPF if present and non-empty.
    #[inline]
    #[must_use]
    pub fn cpf(&self) -> Option<&str> {
        self.cpf.as_deref().filter(|s| !s.is_empty())
    }

    /// Returns the CNPJ if present and non-empty.
    #[inline]
    #[must_use]
    pub fn cnpj(&self) -> Option<&str> {
        self.cnpj.as_deref().filter(|s| !s.is_empty())
    }
}

/// Italian PKI certificate fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkiItaly {
    /// Italian fiscal code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codice_fiscale: Option<String>,

    /// Fields this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PkiItaly {
    /// Returns the codice fiscale if present and non-empty.
    #[inline]
    #[must_use]
    pub fn codice_fiscale(&self) -> Option<&str> {
        self.codice_fiscale.as_deref().filter(|s| !s.is_empty())
    }
}

// ============================================================================
// Post-processing
// ============================================================================

/// Canonicalizes the date fields of a raw `listCertificates` payload.
///
/// - `validityStart` / `validityEnd` become RFC 3339 UTC timestamps
/// - `pkiBrazil.dateOfBirth` becomes `YYYY-MM-DD`
///
/// A certificate whose validity dates cannot be read is left out of the
/// listing; an unreadable date of birth is removed. Both are logged.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the payload is not an array of objects.
pub fn normalize_listing(payload: Value) -> Result<Value> {
    let Value::Array(entries) = payload else {
        return Err(Error::protocol("certificate listing is not an array"));
    };

    let mut certs = Vec::with_capacity(entries.len());
    for mut entry in entries {
        let obj = entry
            .as_object_mut()
            .ok_or_else(|| Error::protocol("certificate entry is not an object"))?;

        if let Err(e) = normalize_validity(obj) {
            let thumbprint = obj
                .get("thumbprint")
                .and_then(Value::as_str)
                .unwrap_or_default();
            warn!(thumbprint, error = %e, "Skipping certificate with unreadable validity");
            continue;
        }
        normalize_birth_date(obj);

        certs.push(entry);
    }

    Ok(Value::Array(certs))
}

/// Rewrites the validity window as RFC 3339 timestamps.
fn normalize_validity(obj: &mut Map<String, Value>) -> Result<()> {
    for key in ["validityStart", "validityEnd"] {
        if let Some(Value::String(raw)) = obj.get(key) {
            let parsed = parse_timestamp(raw)?;
            obj.insert(key.to_string(), Value::String(parsed.to_rfc3339()));
        }
    }
    Ok(())
}

/// Rewrites `pkiBrazil.dateOfBirth` as `YYYY-MM-DD`, or drops it.
fn normalize_birth_date(obj: &mut Map<String, Value>) {
    let Some(Value::Object(brazil)) = obj.get_mut("pkiBrazil") else {
        return;
    };
    let Some(Value::String(raw)) = brazil.get("dateOfBirth") else {
        return;
    };

    if raw.is_empty() {
        brazil.remove("dateOfBirth");
        return;
    }

    match parse_birth_date(raw) {
        Ok(date) => {
            brazil.insert(
                "dateOfBirth".to_string(),
                Value::String(date.format("%Y-%m-%d").to_string()),
            );
        }
        Err(e) => {
            warn!(error = %e, "Dropping unreadable date of birth");
            brazil.remove("dateOfBirth");
        }
    }
}

/// Parses a validity timestamp.
///
/// Accepts RFC 3339, an offset-less date-time (taken as UTC) and a bare
/// date (midnight UTC).
///
/// # Errors
///
/// Returns [`Error::Protocol`] if no format matches.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    Err(Error::protocol(format!("unrecognized timestamp: {raw}")))
}

/// Parses an ICP-Brasil date of birth.
///
/// Accepts the compact `YYYYMMDD` form and the separated `YYYY?MM?DD` form
/// (any single-character separators).
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the text matches neither form or is not a
/// calendar date.
pub fn parse_birth_date(raw: &str) -> Result<NaiveDate> {
    let invalid = || Error::protocol(format!("unrecognized date of birth: {raw}"));

    let compact = raw
        .get(0..8)
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()));

    let (year, month, day) = match compact {
        Some(c) => (&c[0..4], &c[4..6], &c[6..8]),
        None => match (raw.get(0..4), raw.get(5..7), raw.get(8..10)) {
            (Some(y), Some(m), Some(d)) => (y, m, d),
            _ => return Err(invalid()),
        },
    };

    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Datelike, TimeZone};
    use serde_json::json;

    fn listing() -> Value {
        json!([{
            "thumbprint": "3A1F",
            "subjectName": "JOHN DOE",
            "issuerName": "AC TEST",
            "validityStart": "2015-04-22T10:00:00-03:00",
            "validityEnd": "2018-04-22T10:00:00",
            "email": "john@example.com",
            "pkiBrazil": {
                "cpf": "12345678909",
                "cnpj": "",
                "dateOfBirth": "19800115",
                "responsavel": "JOHN DOE"
            }
        }])
    }

    #[test]
    fn test_validity_dates_become_timestamps() {
        let certs: Vec<Certificate> =
            serde_json::from_value(normalize_listing(listing()).expect("normalize"))
                .expect("decode");

        let cert = &certs[0];
        assert_eq!(
            cert.validity_start,
            Utc.with_ymd_and_hms(2015, 4, 22, 13, 0, 0).unwrap()
        );
        assert_eq!(
            cert.validity_end,
            Utc.with_ymd_and_hms(2018, 4, 22, 10, 0, 0).unwrap()
        );
        assert_eq!(cert.extra["email"], "john@example.com");
    }

    #[test]
    fn test_compact_date_of_birth() {
        let certs: Vec<Certificate> =
            serde_json::from_value(normalize_listing(listing()).expect("normalize"))
                .expect("decode");

        let brazil = certs[0].pki_brazil.as_ref().expect("pkiBrazil");
        let dob = brazil.date_of_birth.expect("date of birth");

        assert_eq!(dob.year(), 1980);
        assert_eq!(dob.month0(), 0);
        assert_eq!(dob.day(), 15);
        assert_eq!(brazil.cpf(), Some("12345678909"));
        assert_eq!(brazil.cnpj(), None);
        assert_eq!(brazil.extra["responsavel"], "JOHN DOE");
    }

    #[test]
    fn test_separated_date_of_birth() {
        let dob = parse_birth_date("1980-01-15").expect("parse");
        assert_eq!(dob, NaiveDate::from_ymd_opt(1980, 1, 15).unwrap());

        let dob = parse_birth_date("1975/12/31").expect("parse");
        assert_eq!(dob, NaiveDate::from_ymd_opt(1975, 12, 31).unwrap());
    }

    #[test]
    fn test_invalid_date_of_birth() {
        assert!(parse_birth_date("1980").is_err());
        assert!(parse_birth_date("19801345").is_err());
        assert!(parse_birth_date("abcd-ef-gh").is_err());
    }

    #[test]
    fn test_empty_date_of_birth_is_dropped() {
        let payload = json!([{
            "thumbprint": "A",
            "validityStart": "2020-01-01",
            "validityEnd": "2030-01-01",
            "pkiBrazil": { "cpf": "1", "dateOfBirth": "" }
        }]);

        let certs: Vec<Certificate> =
            serde_json::from_value(normalize_listing(payload).expect("normalize"))
                .expect("decode");
        assert!(certs[0].pki_brazil.as_ref().unwrap().date_of_birth.is_none());
    }

    #[test]
    fn test_unreadable_validity_skips_only_that_certificate() {
        let payload = json!([
            {
                "thumbprint": "BAD",
                "validityStart": "not a date",
                "validityEnd": "2030-01-01"
            },
            {
                "thumbprint": "GOOD",
                "validityStart": "2020-01-01",
                "validityEnd": "2030-01-01",
                "pkiBrazil": { "cpf": "1", "dateOfBirth": "1980-13-45" }
            }
        ]);

        let certs: Vec<Certificate> =
            serde_json::from_value(normalize_listing(payload).expect("normalize"))
                .expect("decode");

        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].thumbprint, "GOOD");
        let brazil = certs[0].pki_brazil.as_ref().expect("pkiBrazil");
        assert!(brazil.date_of_birth.is_none());
        assert_eq!(brazil.cpf(), Some("1"));
    }

    #[test]
    fn test_rejects_non_array_listing() {
        assert!(normalize_listing(json!({ "thumbprint": "A" })).is_err());
        assert!(normalize_listing(json!(["A"])).is_err());
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2020-05-01T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2020-05-01 00:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2020-05-01").unwrap(), expected);
        assert!(parse_timestamp("May 1st").is_err());
    }

    #[test]
    fn test_validity_window() {
        let payload = json!([{
            "thumbprint": "A",
            "validityStart": "2020-01-01T00:00:00Z",
            "validityEnd": "2021-01-01T00:00:00Z"
        }]);
        let certs: Vec<Certificate> =
            serde_json::from_value(normalize_listing(payload).unwrap()).unwrap();

        assert!(certs[0].is_valid_at(Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap()));
        assert!(!certs[0].is_valid_at(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()));
    }
}
