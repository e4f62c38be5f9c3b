#![forbid(unsafe_code)]

//! Binder configuration.
//!
//! [`BinderOptions`] is plain data and always available. With the `config`
//! feature it can also be loaded from TOML or JSON:
//!
//! ```toml
//! cascade = false
//! invalidate_side = "A"
//! ```
//!
//! Missing keys take their defaults; unknown keys are rejected.

#[cfg(feature = "config")]
use std::path::{Path, PathBuf};

use tether_core::SideId;

/// Options shared by a binder node and every child created from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "config",
    derive(serde::Serialize, serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct BinderOptions {
    /// Whether the run that follows a context-changed rebuild cascades to
    /// children.
    pub cascade: bool,
    /// The side bulk `invalidate` passes to every binding.
    pub invalidate_side: SideId,
}

impl Default for BinderOptions {
    fn default() -> Self {
        Self {
            cascade: true,
            invalidate_side: SideId::B,
        }
    }
}

impl BinderOptions {
    #[must_use]
    pub fn with_cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }

    #[must_use]
    pub fn with_invalidate_side(mut self, side: SideId) -> Self {
        self.invalidate_side = side;
        self
    }
}

/// Errors from loading [`BinderOptions`].
#[cfg(feature = "config")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read binder options from '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML binder options: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON binder options: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(feature = "config")]
impl BinderOptions {
    /// Parse options from a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Parse options from a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load options from a file; `.json` files are parsed as JSON, anything
    /// else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let options = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text)?,
            _ => Self::from_toml_str(&text)?,
        };
        tracing::debug!(path = %path.display(), ?options, "binder options loaded");
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cascade_and_invalidate_b() {
        let options = BinderOptions::default();
        assert!(options.cascade);
        assert_eq!(options.invalidate_side, SideId::B);
    }

    #[test]
    fn builders_override_fields() {
        let options = BinderOptions::default()
            .with_cascade(false)
            .with_invalidate_side(SideId::A);
        assert_eq!(
            options,
            BinderOptions {
                cascade: false,
                invalidate_side: SideId::A
            }
        );
    }

    #[cfg(feature = "config")]
    mod parsing {
        use super::*;

        #[test]
        fn toml_with_missing_keys_uses_defaults() {
            let options = BinderOptions::from_toml_str("invalidate_side = \"A\"\n").unwrap();
            assert!(options.cascade);
            assert_eq!(options.invalidate_side, SideId::A);
        }

        #[test]
        fn json_round_trips_every_field() {
            let options = BinderOptions::from_json_str(r#"{"cascade":false,"invalidate_side":"B"}"#)
                .unwrap();
            assert_eq!(options, BinderOptions::default().with_cascade(false));
        }

        #[test]
        fn unknown_keys_are_rejected() {
            assert!(matches!(
                BinderOptions::from_toml_str("cascade = true\nretries = 3\n"),
                Err(ConfigError::Toml(_))
            ));
            assert!(matches!(
                BinderOptions::from_json_str(r#"{"side":"A"}"#),
                Err(ConfigError::Json(_))
            ));
        }

        #[test]
        fn load_picks_format_from_extension() {
            let dir = std::env::temp_dir().join(format!("tether-config-{}", std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            let json = dir.join("binder.json");
            std::fs::write(&json, r#"{"cascade":false}"#).unwrap();
            let toml = dir.join("binder.toml");
            std::fs::write(&toml, "invalidate_side = \"A\"\n").unwrap();

            assert!(!BinderOptions::load(&json).unwrap().cascade);
            assert_eq!(BinderOptions::load(&toml).unwrap().invalidate_side, SideId::A);
            assert!(matches!(
                BinderOptions::load(dir.join("missing.toml")),
                Err(ConfigError::Read { .. })
            ));
            std::fs::remove_dir_all(&dir).unwrap();
        }
    }
}
