//! Model resolution and loading. The trained classifier is an opaque
//! TorchScript artifact, fetched from a local path or the Hugging Face hub
//! and deserialized into memory exactly once per process. Every request
//! after the first observes the same cached handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tch::{no_grad, Tensor};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::pipeline::InputTensor;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model artifact unavailable: {0}")]
    Unavailable(String),

    #[error("model output violated its contract: {0}")]
    Contract(String),

    #[error("forward pass failed: {0}")]
    Forward(#[from] tch::TchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the trained artifact comes from.
#[derive(Debug, Clone)]
pub enum ModelSource {
    LocalFile(PathBuf),
    HuggingFace { repo_id: String, filename: String },
}

impl ModelSource {
    /// Resolve the source to a file on disk. The hub variant downloads the
    /// artifact into `cache_dir` unless a previous run already did.
    pub async fn resolve(&self, cache_dir: &Path) -> Result<PathBuf, ModelError> {
        match self {
            ModelSource::LocalFile(path) => {
                if !path.is_file() {
                    return Err(ModelError::Unavailable(format!(
                        "no model artifact at {}",
                        path.display()
                    )));
                }
                Ok(path.clone())
            }
            ModelSource::HuggingFace { repo_id, filename } => {
                let target = cache_dir.join(repo_id.replace('/', "--")).join(filename);
                if target.is_file() {
                    return Ok(target);
                }

                let url =
                    format!("https://huggingface.co/{repo_id}/resolve/main/{filename}");
                info!(%url, "downloading model artifact");
                let response = reqwest::get(&url)
                    .await
                    .map_err(|e| ModelError::Unavailable(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(ModelError::Unavailable(format!(
                        "hub returned {} for {url}",
                        response.status()
                    )));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| ModelError::Unavailable(e.to_string()))?;

                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, &bytes).await?;
                Ok(target)
            }
        }
    }
}

/// One forward pass over a preprocessed image, yielding the pneumonia
/// probability. Object-safe so tests can substitute a mock.
pub trait Predictor: Send + Sync {
    fn predict(&self, input: &InputTensor) -> Result<f32, ModelError>;
}

/// A loaded TorchScript module.
pub struct TorchPredictor {
    module: tch::CModule,
}

impl TorchPredictor {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let module = tch::CModule::load(path).map_err(|e| {
            ModelError::Unavailable(format!("failed to load {}: {e}", path.display()))
        })?;
        Ok(TorchPredictor { module })
    }
}

impl Predictor for TorchPredictor {
    fn predict(&self, input: &InputTensor) -> Result<f32, ModelError> {
        let tensor = Tensor::from_slice(&input.data).reshape(input.shape.as_slice());
        let output = no_grad(|| self.module.forward_ts(&[tensor]))?;

        // The training pipeline promises a single sigmoid output. Check it
        // instead of trusting it.
        let numel: i64 = output.size().iter().product();
        if numel != 1 {
            return Err(ModelError::Contract(format!(
                "expected a single scalar output, got {numel} elements"
            )));
        }
        let score = output.view(-1).double_value(&[0]) as f32;
        if !(0.0..=1.0).contains(&score) {
            return Err(ModelError::Contract(format!(
                "score {score} outside [0, 1]"
            )));
        }
        Ok(score)
    }
}

/// The deserialize step of a load, separated out so tests can count loads
/// or substitute a mock predictor.
pub type Loader = Box<dyn Fn(&Path) -> Result<Arc<dyn Predictor>, ModelError> + Send + Sync>;

/// Lazily resolves and loads the model, at most once per process. Concurrent
/// first calls are serialized by the cell, so a cold start never loads the
/// artifact twice. There is no invalidation and no reload on failure.
pub struct ModelProvider {
    source: ModelSource,
    cache_dir: PathBuf,
    loader: Loader,
    cell: OnceCell<Arc<dyn Predictor>>,
}

impl ModelProvider {
    pub fn new(source: ModelSource, cache_dir: PathBuf) -> Self {
        Self::with_loader(
            source,
            cache_dir,
            Box::new(|path: &Path| {
                Ok(Arc::new(TorchPredictor::load(path)?) as Arc<dyn Predictor>)
            }),
        )
    }

    /// Like [`ModelProvider::new`] but with a custom load step, so tests can
    /// count loads or substitute a mock predictor.
    pub fn with_loader(source: ModelSource, cache_dir: PathBuf, loader: Loader) -> Self {
        ModelProvider {
            source,
            cache_dir,
            loader,
            cell: OnceCell::new(),
        }
    }

    /// A provider whose cache slot is already filled. Never touches disk or
    /// network.
    pub fn preloaded(predictor: Arc<dyn Predictor>) -> Self {
        ModelProvider {
            source: ModelSource::LocalFile(PathBuf::new()),
            cache_dir: PathBuf::new(),
            loader: Box::new(|_: &Path| unreachable!("preloaded provider never loads")),
            cell: OnceCell::new_with(Some(predictor)),
        }
    }

    /// Get the cached model handle, loading it on the first call.
    pub async fn get(&self) -> Result<Arc<dyn Predictor>, ModelError> {
        self.cell
            .get_or_try_init(|| async {
                let path = self.source.resolve(&self.cache_dir).await?;
                info!(path = %path.display(), "loading model artifact");
                (self.loader)(&path)
            })
            .await
            .map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedPredictor(f32);

    impl Predictor for FixedPredictor {
        fn predict(&self, _input: &InputTensor) -> Result<f32, ModelError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn missing_local_file_is_unavailable() {
        let source = ModelSource::LocalFile("/nonexistent/model.pt".into());
        let err = source.resolve(Path::new("/tmp")).await.unwrap_err();
        assert!(matches!(err, ModelError::Unavailable(_)));
    }

    #[tokio::test]
    async fn local_file_resolves_to_itself() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a real artifact").unwrap();
        let source = ModelSource::LocalFile(file.path().to_path_buf());
        let resolved = source.resolve(Path::new("/tmp")).await.unwrap();
        assert_eq!(resolved, file.path());
    }

    #[tokio::test]
    async fn loader_runs_at_most_once() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();

        let provider = ModelProvider::with_loader(
            ModelSource::LocalFile(file.path().to_path_buf()),
            PathBuf::new(),
            Box::new(move |_: &Path| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(FixedPredictor(0.7)) as Arc<dyn Predictor>)
            }),
        );

        let first = provider.get().await.unwrap();
        let second = provider.get().await.unwrap();
        let third = provider.get().await.unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &third));
    }

    #[tokio::test]
    async fn preloaded_provider_serves_without_loading() {
        let provider = ModelProvider::preloaded(Arc::new(FixedPredictor(0.9)));
        let predictor = provider.get().await.unwrap();
        let input = InputTensor {
            data: vec![0.0; 3],
            shape: [1, 1, 1, 3],
        };
        assert_eq!(predictor.predict(&input).unwrap(), 0.9);
    }
}
