//! Configuration types for a handwritten-document analysis run.
//!
//! Pipeline behaviour is controlled through [`AnalyzerConfig`], built via its
//! [`AnalyzerConfigBuilder`]. Client-specific knobs (model, temperature,
//! request timeout) live with the clients in [`crate::pipeline::analyze`], and
//! the service credential is a separate [`Credential`] value handed to the
//! client constructor. The pipeline itself never reads the environment.

use crate::error::AnalyzerError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Resolution used to rasterise PDF pages. Sharp enough for handwriting.
pub const DEFAULT_DPI: u32 = 200;

/// Environment variables searched for the Gemini credential, in order.
pub const CREDENTIAL_ENV_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// Configuration for one analysis run.
///
/// # Example
/// ```rust
/// use handnote2docx::AnalyzerConfig;
///
/// let config = AnalyzerConfig::builder()
///     .dpi(200)
///     .export_file_name("notes.docx")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// Rendering DPI for PDF pages. Range: 72–400. Default: 200.
    ///
    /// Fixed for the whole run; every page is rendered at the same resolution.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 6000.
    ///
    /// A 200-DPI render of an oversized scan could otherwise allocate hundreds
    /// of megabytes of pixels.
    pub max_rendered_pixels: u32,

    /// Instruction sent with every page. If None, uses
    /// [`crate::prompts::DEFAULT_INSTRUCTION`].
    pub instruction: Option<String>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// File name given to the export artifact. If None, chosen from the
    /// source media type.
    pub export_file_name: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            max_rendered_pixels: 6000,
            instruction: None,
            password: None,
            export_file_name: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("instruction", &self.instruction.as_ref().map(|s| s.len()))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("export_file_name", &self.export_file_name)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalyzerConfig {
    /// Create a new builder for `AnalyzerConfig`.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder {
            config: Self::default(),
        }
    }

    /// The instruction text actually sent with each page.
    pub fn instruction(&self) -> &str {
        self.instruction
            .as_deref()
            .unwrap_or(crate::prompts::DEFAULT_INSTRUCTION)
    }
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.instruction = Some(instruction.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn export_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.export_file_name = Some(name.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalyzerConfig, AnalyzerError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(AnalyzerError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if let Some(ref instruction) = c.instruction {
            if instruction.trim().is_empty() {
                return Err(AnalyzerError::InvalidConfig(
                    "Instruction must not be empty".into(),
                ));
            }
        }
        if let Some(ref name) = c.export_file_name {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(AnalyzerError::InvalidConfig(format!(
                    "Export file name must be a bare file name, got {name:?}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Credential ───────────────────────────────────────────────────────────

/// API key for the external generation service.
///
/// Resolved once by the entry point and passed into the client constructor.
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Look the key up in [`CREDENTIAL_ENV_VARS`], first non-empty match wins.
    pub fn from_env() -> Result<Self, AnalyzerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Credential::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AnalyzerError> {
        CREDENTIAL_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
            .map(Self)
            .ok_or(AnalyzerError::CredentialMissing)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_fixed_resolution() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.dpi, 200);
        assert!(config.instruction().contains("### Transcript"));
    }

    #[test]
    fn build_rejects_out_of_range_dpi() {
        let err = AnalyzerConfig::builder().dpi(20).build().unwrap_err();
        assert!(err.to_string().contains("DPI"));
        assert!(AnalyzerConfig::builder().dpi(401).build().is_err());
        assert!(AnalyzerConfig::builder().dpi(300).build().is_ok());
    }

    #[test]
    fn build_rejects_blank_instruction_and_path_names() {
        assert!(AnalyzerConfig::builder().instruction("  ").build().is_err());
        assert!(AnalyzerConfig::builder()
            .export_file_name("../out.docx")
            .build()
            .is_err());
    }

    #[test]
    fn custom_instruction_overrides_default() {
        let config = AnalyzerConfig::builder()
            .instruction("Transcribe only.")
            .build()
            .unwrap();
        assert_eq!(config.instruction(), "Transcribe only.");
    }

    #[test]
    fn debug_redacts_password() {
        let config = AnalyzerConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn credential_lookup_order() {
        let vars: HashMap<&str, &str> =
            [("GOOGLE_API_KEY", "g-key"), ("GEMINI_API_KEY", "m-key")].into();
        let cred = Credential::from_lookup(|n| vars.get(n).map(|v| v.to_string())).unwrap();
        assert_eq!(cred.expose(), "g-key");

        let vars: HashMap<&str, &str> = [("GOOGLE_API_KEY", " "), ("GEMINI_API_KEY", "m-key")].into();
        let cred = Credential::from_lookup(|n| vars.get(n).map(|v| v.to_string())).unwrap();
        assert_eq!(cred.expose(), "m-key");
    }

    #[test]
    fn credential_missing_is_fatal() {
        let err = Credential::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, AnalyzerError::CredentialMissing));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let cred = Credential::new("sk-secret");
        assert!(!format!("{cred:?}").contains("sk-secret"));
    }
}
