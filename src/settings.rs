//! Startup configuration. Everything the handlers need (model source, input
//! size, decision threshold, optional API key) is resolved once here and
//! passed into the app as shared state, never read ad hoc at request time.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::model::ModelSource;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub model: ModelSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub limits: LimitSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Local path to a TorchScript artifact. Takes precedence over the hub
    /// fields when set.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Hugging Face repository id, e.g. `someuser/pneumonia-classifier`.
    #[serde(default)]
    pub repo_id: Option<String>,
    /// Artifact filename within the hub repository.
    #[serde(default)]
    pub filename: Option<String>,
    /// Where downloaded artifacts are cached between runs.
    pub cache_dir: PathBuf,
    /// Side length of the square model input, in pixels.
    pub image_size: u32,
    /// Probability cutoff above which the diagnosis is PNEUMONIA.
    pub threshold: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSettings {
    /// Static key expected in the `x-api-key` header. Unset disables the
    /// check entirely.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitSettings {
    /// Upper bound on the multipart upload, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        LimitSettings {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

impl ModelSettings {
    /// Pick the artifact source from the configured fields.
    pub fn source(&self) -> Result<ModelSource, ConfigError> {
        match (&self.path, &self.repo_id, &self.filename) {
            (Some(path), _, _) => Ok(ModelSource::LocalFile(path.clone())),
            (None, Some(repo_id), Some(filename)) => Ok(ModelSource::HuggingFace {
                repo_id: repo_id.clone(),
                filename: filename.clone(),
            }),
            _ => Err(ConfigError::Message(
                "model source requires either model.path or both model.repo_id \
                 and model.filename"
                    .into(),
            )),
        }
    }
}

impl Settings {
    /// Load configuration from `pneumoscan.toml` (if present) and
    /// `PNEUMOSCAN__*` environment variables, on top of the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("pneumoscan.toml")
    }

    pub fn load_from(config_file: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("model.cache_dir", "models")?
            .set_default("model.image_size", 200)?
            .set_default("model.threshold", 0.5)?
            .set_default("limits.max_upload_bytes", DEFAULT_MAX_UPLOAD_BYTES as i64)?
            .add_source(File::with_name(config_file).required(false))
            .add_source(
                Environment::with_prefix("PNEUMOSCAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.model.source()?;
        if !(0.0..=1.0).contains(&self.model.threshold) {
            return Err(ConfigError::Message(format!(
                "model.threshold must be in [0, 1], got {}",
                self.model.threshold
            )));
        }
        if self.model.image_size == 0 {
            return Err(ConfigError::Message(
                "model.image_size must be nonzero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_settings() -> ModelSettings {
        ModelSettings {
            path: None,
            repo_id: None,
            filename: None,
            cache_dir: "models".into(),
            image_size: 200,
            threshold: 0.5,
        }
    }

    #[test]
    fn local_path_wins_over_hub_fields() {
        let mut model = model_settings();
        model.path = Some("model.pt".into());
        model.repo_id = Some("someuser/pneumonia".into());
        model.filename = Some("model.pt".into());
        assert!(matches!(
            model.source().unwrap(),
            ModelSource::LocalFile(_)
        ));
    }

    #[test]
    fn hub_source_needs_both_fields() {
        let mut model = model_settings();
        model.repo_id = Some("someuser/pneumonia".into());
        assert!(model.source().is_err());

        model.filename = Some("model.pt".into());
        assert!(matches!(
            model.source().unwrap(),
            ModelSource::HuggingFace { .. }
        ));
    }

    #[test]
    fn missing_source_is_rejected() {
        assert!(model_settings().source().is_err());
    }

    #[test]
    fn defaults_apply_without_a_config_file() {
        std::env::set_var("PNEUMOSCAN__MODEL__PATH", "model.pt");
        let settings = Settings::load_from("does-not-exist.toml").unwrap();
        std::env::remove_var("PNEUMOSCAN__MODEL__PATH");

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.model.image_size, 200);
        assert_eq!(settings.model.threshold, 0.5);
        assert_eq!(settings.limits.max_upload_bytes, 10 * 1024 * 1024);
        assert!(settings.auth.api_key.is_none());
    }
}
