//! Command definitions.
//!
//! Each command serializes to the `command` / `request` pair of the
//! outbound envelope:
//!
//! ```json
//! { "command": "signData", "request": { "certificateThumbprint": "...", ... } }
//! ```
//!
//! # Commands
//!
//! | Group | Commands |
//! |-------|----------|
//! | Lifecycle | `getVersion`, `getExtensionVersion`, `initialize`, `pollNative`, `updateExtension` |
//! | Certificates | `listCertificates`, `readCertificate` |
//! | Signing | `signHash`, `signData`, `signWithRestPki`, `preauthorizeSignatures` |
//! | Folders | `showFolderBrowser`, `downloadToFolder`, `openFolder` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Command
// ============================================================================

/// All commands understood by the PKI component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "request")]
pub enum Command {
    /// Get the component version.
    #[serde(rename = "getVersion")]
    GetVersion,

    /// Get the browser extension version (extension hosts only).
    #[serde(rename = "getExtensionVersion")]
    GetExtensionVersion,

    /// Initialize the extension and its native helper.
    #[serde(rename = "initialize")]
    Initialize,

    /// List the certificates available to the user.
    #[serde(rename = "listCertificates")]
    ListCertificates,

    /// Read a certificate's encoded content.
    #[serde(rename = "readCertificate")]
    ReadCertificate {
        /// Certificate to read.
        #[serde(rename = "certificateThumbprint")]
        certificate_thumbprint: String,
    },

    /// Ask the extension to poll its native helper.
    #[serde(rename = "pollNative")]
    PollNative {
        /// Minimum Windows native helper version.
        #[serde(rename = "requiredNativeWinVersion")]
        required_native_win_version: String,
    },

    /// Sign a precomputed digest.
    #[serde(rename = "signHash")]
    SignHash {
        /// Signing certificate.
        #[serde(rename = "certificateThumbprint")]
        certificate_thumbprint: String,
        /// Base64 digest.
        hash: String,
        /// Digest algorithm name or OID.
        #[serde(rename = "digestAlgorithm")]
        digest_algorithm: String,
    },

    /// Hash and sign raw data.
    #[serde(rename = "signData")]
    SignData {
        /// Signing certificate.
        #[serde(rename = "certificateThumbprint")]
        certificate_thumbprint: String,
        /// Base64 data.
        data: String,
        /// Digest algorithm name or OID.
        #[serde(rename = "digestAlgorithm")]
        digest_algorithm: String,
    },

    /// Sign through a REST PKI token.
    #[serde(rename = "signWithRestPki")]
    SignWithRestPki {
        /// Signing certificate.
        #[serde(rename = "certificateThumbprint")]
        certificate_thumbprint: String,
        /// Signature session token.
        token: String,
        /// REST PKI endpoint, if not the component default.
        #[serde(rename = "restPkiUrl", skip_serializing_if = "Option::is_none")]
        rest_pki_url: Option<String>,
    },

    /// Authorize a batch of signatures up front.
    #[serde(rename = "preauthorizeSignatures")]
    PreauthorizeSignatures {
        /// Signing certificate.
        #[serde(rename = "certificateThumbprint")]
        certificate_thumbprint: String,
        /// Number of signatures to authorize.
        #[serde(rename = "signatureCount")]
        signature_count: u32,
    },

    /// Let the user pick a folder.
    #[serde(rename = "showFolderBrowser")]
    ShowFolderBrowser {
        /// Prompt shown in the dialog.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Download a file into a previously chosen folder.
    #[serde(rename = "downloadToFolder")]
    DownloadToFolder {
        /// Absolute URL of the file.
        url: String,
        /// Folder returned by the folder browser.
        #[serde(rename = "folderId")]
        folder_id: String,
        /// Target file name.
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },

    /// Open a folder in the OS file manager. The payload is the bare folder ID.
    #[serde(rename = "openFolder")]
    OpenFolder(String),

    /// Trigger the extension self-update.
    #[serde(rename = "updateExtension")]
    UpdateExtension,
}

impl Command {
    /// Returns the wire name of the command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GetVersion => "getVersion",
            Self::GetExtensionVersion => "getExtensionVersion",
            Self::Initialize => "initialize",
            Self::ListCertificates => "listCertificates",
            Self::ReadCertificate { .. } => "readCertificate",
            Self::PollNative { .. } => "pollNative",
            Self::SignHash { .. } => "signHash",
            Self::SignData { .. } => "signData",
            Self::SignWithRestPki { .. } => "signWithRestPki",
            Self::PreauthorizeSignatures { .. } => "preauthorizeSignatures",
            Self::ShowFolderBrowser { .. } => "showFolderBrowser",
            Self::DownloadToFolder { .. } => "downloadToFolder",
            Self::OpenFolder(_) => "openFolder",
            Self::UpdateExtension => "updateExtension",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
