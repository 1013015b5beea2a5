//! Classifier model management for ONNX Runtime
//!
//! Handles locating, downloading, verifying and loading the pretrained
//! character classifier. The model is run forward-only.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use ndarray::ArrayView4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::config::ModelSettings;

/// Errors surfaced by a classifier
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("failed to load classifier: {0}")]
    Load(String),

    #[error("classifier inference failed: {0}")]
    Inference(String),

    #[error("unexpected classifier output: {0}")]
    UnexpectedOutput(String),
}

/// A black-box classifier: (1, H, W, 1) tensor in, flat score vector out
pub trait Classifier: Send {
    /// Run one forward pass
    fn predict(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError>;

    /// Number of scores per prediction, when the model declares it statically
    fn output_len(&self) -> Option<usize> {
        None
    }
}

/// Model manifest tracking downloaded models
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub filename: String,
    pub source_url: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub downloaded_at: u64,
}

/// Locates the classifier file, downloading it when a source URL is configured
pub struct ModelManager {
    settings: ModelSettings,
    offline: bool,
}

impl ModelManager {
    /// Create a model manager for the configured model
    ///
    /// Downloads are disabled when `HWR_OFFLINE` is set.
    pub fn new(settings: ModelSettings) -> Self {
        Self {
            settings,
            offline: std::env::var_os("HWR_OFFLINE").is_some(),
        }
    }

    /// Allow or forbid network downloads
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Path the model is loaded from
    pub fn model_path(&self) -> &Path {
        &self.settings.path
    }

    fn manifest_path(&self) -> PathBuf {
        self.settings
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("manifest.json")
    }

    /// Check if the model file is present and non-empty
    pub fn is_model_available(&self) -> bool {
        std::fs::metadata(&self.settings.path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Make sure the model is on disk and matches the configured checksum
    /// Returns the path to the model file
    pub fn ensure_model(&self) -> Result<PathBuf> {
        let path = self.settings.path.clone();

        if self.is_model_available() {
            info!("Model already available at {:?}", path);
        } else {
            let Some(url) = self.settings.url.as_deref() else {
                anyhow::bail!("Model not found at {:?} and no download URL is configured", path);
            };
            self.download_model(url)?;
        }

        if let Some(expected) = self.settings.sha256.as_deref() {
            let actual = sha256_file(&path)?;
            if !actual.eq_ignore_ascii_case(expected) {
                anyhow::bail!(
                    "Checksum mismatch for {:?}: expected {}, got {}",
                    path,
                    expected,
                    actual
                );
            }
            debug!("Checksum verified for {:?}", path);
        }

        Ok(path)
    }

    /// Download the model (blocking)
    fn download_model(&self, url: &str) -> Result<()> {
        let path = &self.settings.path;

        if self.offline {
            anyhow::bail!(
                "Offline mode: cannot download the model. Please download it manually from {} and place it at {:?}",
                url,
                path
            );
        }
        info!("Downloading classifier from {}", url);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create model directory {:?}", parent))?;
        }

        // Create a tokio runtime for async download
        let rt = Runtime::new().context("Failed to create tokio runtime")?;
        let hash = rt.block_on(async { self.download_file_async(url, path).await })?;

        if !self.is_model_available() {
            anyhow::bail!("Download completed but the model file is missing or empty");
        }

        self.update_manifest(url, &hash)?;

        info!("Successfully downloaded classifier to {:?}", path);
        Ok(())
    }

    /// Async download implementation, returns the SHA-256 of the payload
    async fn download_file_async(&self, url: &str, path: &Path) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .get(url)
            .send()
            .await
            .context("Failed to send download request")?;

        if !response.status().is_success() {
            anyhow::bail!("Download failed with status {}: {}", response.status(), url);
        }

        debug!("Download size: {:?} bytes", response.content_length());

        // Nothing is left behind at the temp path if the transfer fails
        let temp_path = path.with_extension("tmp");
        let result = match self.write_download(response, &temp_path, url).await {
            Ok(hash) => std::fs::rename(&temp_path, path)
                .context("Failed to move downloaded file to final location")
                .map(|_| hash),
            Err(e) => Err(e),
        };

        if result.is_err() {
            std::fs::remove_file(&temp_path).ok();
        }
        result
    }

    /// Stream the response body into `temp_path`, hashing as it goes
    async fn write_download(&self, response: reqwest::Response, temp_path: &Path, url: &str) -> Result<String> {
        let mut file = std::fs::File::create(temp_path).context("Failed to create temp file")?;

        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Error reading download stream")?;

            file.write_all(&chunk).context("Failed to write to temp file")?;

            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
        }

        file.flush().context("Failed to flush temp file")?;
        debug!("Received {} bytes from {}", downloaded, url);

        let hash = format!("{:x}", hasher.finalize());
        if let Some(expected) = self.settings.sha256.as_deref() {
            if !hash.eq_ignore_ascii_case(expected) {
                anyhow::bail!("Checksum mismatch for download from {}: expected {}, got {}", url, expected, hash);
            }
        }

        Ok(hash)
    }

    /// Record a completed download in the manifest
    fn update_manifest(&self, url: &str, hash: &str) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_else(|e| {
            warn!("Ignoring unreadable model manifest: {}", e);
            ModelManifest::default()
        });

        let filename = self
            .settings
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let info = ModelInfo {
            filename: filename.clone(),
            source_url: url.to_string(),
            size_bytes: std::fs::metadata(&self.settings.path)?.len(),
            sha256: hash.to_string(),
            downloaded_at: unix_now(),
        };

        if let Some(existing) = manifest.models.iter_mut().find(|m| m.filename == filename) {
            *existing = info;
        } else {
            manifest.models.push(info);
        }

        self.save_manifest(&manifest)
    }

    /// Load the model manifest
    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.manifest_path();
        if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(ModelManifest::default())
        }
    }

    /// Save the model manifest
    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(self.manifest_path(), content)?;
        Ok(())
    }
}

/// Hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(format!("{:x}", hasher.finalize()))
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Character classifier backed by an ONNX Runtime session
pub struct OnnxClassifier {
    session: Session,
    output_len: Option<usize>,
}

impl OnnxClassifier {
    /// Load a classifier from an ONNX file
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self, ModelError> {
        Self::load(model_path, intra_threads).map_err(|e| ModelError::Load(format!("{:#}", e)))
    }

    fn load(model_path: &Path, intra_threads: usize) -> Result<Self> {
        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
            .context("Failed to load ONNX model")?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .context("Model declares no inputs")?;

        // Last dimension of the first output, when it is static
        let output_len = session
            .outputs
            .first()
            .and_then(|output| output.output_type.tensor_shape())
            .and_then(|shape| shape.iter().last().copied())
            .filter(|&d| d > 0)
            .map(|d| d as usize);

        info!(
            "Model loaded. Input: {}, outputs: {:?}, classes: {:?}",
            input_name,
            session.outputs.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(),
            output_len
        );

        Ok(Self { session, output_len })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&mut self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError> {
        let tensor = TensorRef::from_array_view(input).map_err(|e| ModelError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let (shape, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::UnexpectedOutput(e.to_string()))?;

        // Either (classes) or (1, classes)
        let batch = if shape.len() > 1 { shape[0] } else { 1 };
        if batch != 1 {
            return Err(ModelError::UnexpectedOutput(format!(
                "expected a batch of 1, got shape {:?}",
                shape.iter().collect::<Vec<_>>()
            )));
        }

        Ok(scores.to_vec())
    }

    fn output_len(&self) -> Option<usize> {
        self.output_len
    }
}

/// Ensure the model is present, then load it
pub fn load_onnx_classifier(settings: &ModelSettings) -> Result<Box<dyn Classifier>, ModelError> {
    let path = ModelManager::new(settings.clone())
        .ensure_model()
        .map_err(|e| ModelError::Load(format!("{:#}", e)))?;

    let classifier = OnnxClassifier::new(&path, settings.intra_threads)?;
    Ok(Box::new(classifier))
}
