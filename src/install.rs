//! Installation status of the PKI component.
//!
//! The install check never fails just because the component is missing or
//! outdated; those outcomes are reported as an [`InstallStatus`] whose
//! [`InstallState`] explains what the user has to do.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Page the user is sent to when the component must be (re)installed.
pub const INSTALL_URL: &str = "https://getwebpkibeta.lacunasoftware.com/";

/// ID of the marker element the extension injects into every page.
pub const EXTENSION_MARKER_ID: &str = "bilncomoicocegjjailledgehhanjgmc";

/// Minimum browser extension version.
pub const EXTENSION_REQUIRED_VERSION: &str = "2.0.22";

/// First extension version able to update itself.
pub const EXTENSION_FIRST_SELF_UPDATE_VERSION: &str = "2.0.20";

/// Minimum native helper version on Windows.
pub const NATIVE_WIN_REQUIRED_VERSION: &str = "2.0.9";

/// Latest legacy add-on version.
pub const ADDON_LATEST_VERSION: &str = "1.6.1";

// ============================================================================
// InstallState
// ============================================================================

/// Outcome of an install check, independent of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallState {
    /// Component present and compatible.
    Installed = 0,
    /// Component missing.
    NotInstalled = 1,
    /// Component present but too old.
    Outdated = 2,
    /// The host cannot run the component at all.
    BrowserNotSupported = 3,
}

impl InstallState {
    /// Returns the numeric status code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Installed => "installed",
            Self::NotInstalled => "not installed",
            Self::Outdated => "outdated",
            Self::BrowserNotSupported => "browser not supported",
        };
        f.write_str(s)
    }
}

// ============================================================================
// ExtensionState
// ============================================================================

/// Finer-grained status reported by extension hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionState {
    /// Extension and native helper ready.
    Installed = 0,
    /// Extension missing.
    ExtensionNotInstalled = 1,
    /// Extension too old.
    ExtensionOutdated = 2,
    /// Native helper missing.
    NativeNotInstalled = 3,
    /// Native helper too old.
    NativeOutdated = 4,
}

impl ExtensionState {
    /// Parses a status code sent by the extension.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Installed),
            1 => Some(Self::ExtensionNotInstalled),
            2 => Some(Self::ExtensionOutdated),
            3 => Some(Self::NativeNotInstalled),
            4 => Some(Self::NativeOutdated),
            _ => None,
        }
    }

    /// Returns the numeric status code.
    #[inline]
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }
}

/// Maps an extension status code onto the host-independent state.
///
/// Unknown codes count as not installed.
#[must_use]
pub const fn install_state_from_code(code: i64) -> InstallState {
    match ExtensionState::from_code(code) {
        Some(ExtensionState::Installed) => InstallState::Installed,
        Some(ExtensionState::ExtensionOutdated | ExtensionState::NativeOutdated) => {
            InstallState::Outdated
        }
        _ => InstallState::NotInstalled,
    }
}

// ============================================================================
// InstallStatus
// ============================================================================

/// Result of checking whether the component can be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallStatus {
    /// Whether the component can be used.
    ///
    /// Only [`InstallStatus::installed`] sets it; a not-ready component that
    /// reports code 0 still counts as not installed.
    #[serde(default)]
    pub is_installed: bool,

    /// Overall state.
    pub state: InstallState,

    /// Human-readable explanation, absent when installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Host-specific status code (see [`ExtensionState`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_specific_status: Option<i64>,

    /// Whether an outdated extension can update itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_can_self_update: Option<bool>,
}

impl InstallStatus {
    /// Status of a usable component.
    #[must_use]
    pub const fn installed() -> Self {
        Self {
            is_installed: true,
            state: InstallState::Installed,
            message: None,
            browser_specific_status: None,
            extension_can_self_update: None,
        }
    }

    /// Status of an unusable component.
    #[must_use]
    pub fn unavailable(state: InstallState, message: impl Into<String>) -> Self {
        Self {
            is_installed: false,
            state,
            message: Some(message.into()),
            browser_specific_status: None,
            extension_can_self_update: None,
        }
    }

    /// Attaches the host-specific status code.
    #[must_use]
    pub fn with_browser_status(mut self, code: i64) -> Self {
        self.browser_specific_status = Some(code);
        self
    }

    /// Attaches the self-update capability flag.
    #[must_use]
    pub fn with_self_update(mut self, can_self_update: bool) -> Self {
        self.extension_can_self_update = Some(can_self_update);
        self
    }

    /// Returns `true` if the component is ready to use.
    #[inline]
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.is_installed
    }

    /// Returns the typed host-specific status, if any.
    #[inline]
    #[must_use]
    pub fn extension_state(&self) -> Option<ExtensionState> {
        self.browser_specific_status
            .and_then(ExtensionState::from_code)
    }
}

// ============================================================================
// Tests
// ============================================================================
