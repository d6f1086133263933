//! Host environment: page location and browser detection.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::Result;
use crate::transport::TransportKind;

// ============================================================================
// Navigator
// ============================================================================

/// The page's location.
///
/// Used to resolve relative URLs and to send the user to the install page.
pub trait Navigator: Send + Sync {
    /// Returns the URL of the current page.
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be read.
    fn current_url(&self) -> Result<Url>;

    /// Navigates the page to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if navigation is not possible.
    fn navigate(&self, url: &Url) -> Result<()>;
}

// ============================================================================
// User-agent patterns
// ============================================================================

/// Browser token followed by its major version.
static BROWSER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(opera|chrome|safari|firefox|msie|trident/)/?\s*(\d+)")
        .expect("valid browser token pattern")
});

/// IE 11 revision (`rv:11.0`).
static TRIDENT_REVISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\brv[ :]+(\d+)").expect("valid revision pattern")
});

/// Chromium derivatives that keep the `Chrome` token.
static CHROMIUM_DERIVATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(OPR|Edge)/(\d+)").expect("valid derivative pattern")
});

/// Explicit `Version/N` token (Safari, Opera Presto).
static VERSION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)version/(\d+)").expect("valid version pattern")
});

// ============================================================================
// DetectedBrowser
// ============================================================================

/// Browser name and major version sniffed from a user-agent string.
///
/// # Example
///
/// ```
/// use pki_bridge::client::DetectedBrowser;
/// use pki_bridge::transport::TransportKind;
///
/// let browser = DetectedBrowser::from_user_agent(
///     "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/49.0.2623.87 Safari/537.36",
/// );
/// assert_eq!(browser.to_string(), "Chrome 49");
/// assert_eq!(browser.transport_kind(), TransportKind::Extension);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedBrowser {
    name: String,
    version: Option<String>,
}

impl DetectedBrowser {
    /// Creates a browser descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Sniffs the browser from a user-agent string.
    ///
    /// Unrecognized agents yield the name `"Unknown"` without a version.
    #[must_use]
    pub fn from_user_agent(ua: &str) -> Self {
        let Some(token) = BROWSER_TOKEN.captures(ua) else {
            return Self::new("Unknown", None);
        };

        let name = token[1].trim_end_matches('/');
        let major = token[2].to_string();

        if name.eq_ignore_ascii_case("trident") {
            let revision = TRIDENT_REVISION
                .captures(ua)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            return Self::new("IE", Some(revision));
        }

        if name == "Chrome"
            && let Some(derivative) = CHROMIUM_DERIVATIVE.captures(ua)
        {
            let vendor = match &derivative[1] {
                "OPR" => "Opera",
                other => other,
            };
            return Self::new(vendor, Some(derivative[2].to_string()));
        }

        let version = VERSION_TOKEN
            .captures(ua)
            .map_or(major, |c| c[1].to_string());

        Self::new(name, Some(version))
    }

    /// Returns the browser name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the major version, if known.
    #[inline]
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns the transport this browser reaches the component with.
    ///
    /// Labels containing `Chrome` use the extension, labels containing
    /// `IE` use the add-on, everything else is unsupported.
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        let label = self.to_string();

        if label.contains("Chrome") {
            TransportKind::Extension
        } else if label.contains("IE") {
            TransportKind::Addon
        } else {
            TransportKind::Unsupported
        }
    }
}

impl fmt::Display for DetectedBrowser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} {version}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
