//! Model weight provisioning.
//!
//! Weights live in the Hugging Face cache (`HF_HOME`), written once by
//! [`provision`] and only read afterwards.

use crate::config::ModelConfig;
use hf_hub::{
    Cache, Repo, RepoType,
    api::sync::{Api, ApiBuilder, ApiError},
};
use std::{path::PathBuf, sync::mpsc, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("hub request failed: {0}")]
    Hub(#[from] ApiError),

    #[error("weights for {model_id} are missing `{file}` and downloads are disabled")]
    MissingWeights { model_id: String, file: String },

    #[error("provisioning did not finish within {0:?}")]
    Timeout(Duration),

    #[error("weight source failed: {0}")]
    Source(String),
}

/// Read/fetch access to one model repository's files.
pub trait WeightSource {
    /// Repository identifier, for messages.
    fn model_id(&self) -> &str;

    /// Local path of `file` if it is already cached.
    fn cached(&self, file: &str) -> Option<PathBuf>;

    /// Every file the repository publishes at the configured revision.
    fn list_files(&self) -> Result<Vec<String>, ProvisionError>;

    /// Downloads `file` into the cache and returns its local path.
    fn download(&self, file: &str) -> Result<PathBuf, ProvisionError>;
}

/// [`WeightSource`] backed by the Hugging Face hub and its local cache.
pub struct HubWeights {
    model_id: String,
    repo: Repo,
    cache: Cache,
    api: Api,
}

impl HubWeights {
    /// Uses the default cache location (`HF_HOME`) and `HF_TOKEN` when set.
    pub fn new(config: &ModelConfig) -> Result<Self, ProvisionError> {
        let repo = Repo::with_revision(
            config.model_id.clone(),
            RepoType::Model,
            config.revision.clone(),
        );
        let api = ApiBuilder::new()
            .with_token(std::env::var("HF_TOKEN").ok())
            .build()?;

        Ok(Self {
            model_id: config.model_id.clone(),
            repo,
            cache: Cache::default(),
            api,
        })
    }
}

impl WeightSource for HubWeights {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn cached(&self, file: &str) -> Option<PathBuf> {
        self.cache.repo(self.repo.clone()).get(file)
    }

    fn list_files(&self) -> Result<Vec<String>, ProvisionError> {
        let info = self.api.repo(self.repo.clone()).info()?;
        Ok(info.siblings.into_iter().map(|s| s.rfilename).collect())
    }

    fn download(&self, file: &str) -> Result<PathBuf, ProvisionError> {
        Ok(self.api.repo(self.repo.clone()).get(file)?)
    }
}

/// Outcome of a provisioning run.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub downloaded: Vec<PathBuf>,
    pub cached: Vec<PathBuf>,
}

/// Files the model loader reads: configs, tokenizers and tensors.
fn is_weight_file(name: &str) -> bool {
    [".json", ".safetensors", ".model"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

/// Downloads every weight file that is not cached yet.
///
/// Running it again once the cache is populated downloads nothing.
pub fn provision(source: &impl WeightSource) -> Result<ProvisionReport, ProvisionError> {
    let mut report = ProvisionReport::default();

    for file in source.list_files()?.iter().filter(|f| is_weight_file(f)) {
        match source.cached(file) {
            Some(path) => {
                log::debug!("{file} already cached at {}", path.display());
                report.cached.push(path);
            }
            None => {
                log::info!("Downloading {}/{file}", source.model_id());
                report.downloaded.push(source.download(file)?);
            }
        }
    }

    log::info!(
        "Provisioned {}: {} downloaded, {} already cached",
        source.model_id(),
        report.downloaded.len(),
        report.cached.len()
    );
    Ok(report)
}

/// Runs [`provision`] on its own thread and gives up after `timeout`.
///
/// On timeout the worker thread is detached rather than joined, so a caller
/// that exits afterwards is not held up by a stalled download.
pub fn provision_with_timeout<S>(
    source: S,
    timeout: Duration,
) -> Result<ProvisionReport, ProvisionError>
where
    S: WeightSource + Send + 'static,
{
    let (done_tx, done_rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("provision".to_string())
        .spawn(move || {
            // the receiver is gone once we timed out
            let _ = done_tx.send(provision(&source));
        })
        .map_err(|e| ProvisionError::Source(e.to_string()))?;

    match done_rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(ProvisionError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ProvisionError::Source(
            "provisioning thread panicked".to_string(),
        )),
    }
}

/// Checks that `config.required_files` are cached before the model loads.
///
/// Missing files either fail with [`ProvisionError::MissingWeights`] or, when
/// `allow_download` is set, trigger a full [`provision`] run.
pub fn ensure_weights(
    source: &impl WeightSource,
    config: &ModelConfig,
) -> Result<(), ProvisionError> {
    let missing = config
        .required_files
        .iter()
        .find(|file| source.cached(file).is_none());

    let Some(file) = missing else {
        log::info!("Weights for {} found in cache", source.model_id());
        return Ok(());
    };

    if !config.allow_download {
        return Err(ProvisionError::MissingWeights {
            model_id: source.model_id().to_string(),
            file: file.clone(),
        });
    }

    log::warn!("{file} is not cached, provisioning {}", source.model_id());
    provision(source)?;

    match config
        .required_files
        .iter()
        .find(|file| source.cached(file).is_none())
    {
        Some(file) => Err(ProvisionError::MissingWeights {
            model_id: source.model_id().to_string(),
            file: file.clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        cell::Cell,
        path::{Path, PathBuf},
        time::Instant,
    };

    /// Serves a fixed file list and "downloads" into a temp directory.
    struct DirWeights {
        root: PathBuf,
        files: Vec<&'static str>,
        downloads: Cell<usize>,
    }

    impl DirWeights {
        fn new(root: &Path, files: Vec<&'static str>) -> Self {
            Self {
                root: root.to_path_buf(),
                files,
                downloads: Cell::new(0),
            }
        }
    }

    impl WeightSource for DirWeights {
        fn model_id(&self) -> &str {
            "test/model"
        }

        fn cached(&self, file: &str) -> Option<PathBuf> {
            let path = self.root.join(file);
            path.exists().then_some(path)
        }

        fn list_files(&self) -> Result<Vec<String>, ProvisionError> {
            Ok(self.files.iter().map(|f| f.to_string()).collect())
        }

        fn download(&self, file: &str) -> Result<PathBuf, ProvisionError> {
            self.downloads.set(self.downloads.get() + 1);
            let path = self.root.join(file);
            std::fs::write(&path, format!("weights of {file}"))
                .map_err(|e| ProvisionError::Source(e.to_string()))?;
            Ok(path)
        }
    }

    /// Never answers the file listing in time.
    struct StalledWeights;

    impl WeightSource for StalledWeights {
        fn model_id(&self) -> &str {
            "test/stalled"
        }

        fn cached(&self, _file: &str) -> Option<PathBuf> {
            None
        }

        fn list_files(&self) -> Result<Vec<String>, ProvisionError> {
            std::thread::sleep(Duration::from_secs(30));
            Ok(vec![])
        }

        fn download(&self, _file: &str) -> Result<PathBuf, ProvisionError> {
            unreachable!("listing never finishes")
        }
    }

    fn config_requiring(files: &[&str], allow_download: bool) -> ModelConfig {
        ModelConfig {
            required_files: files.iter().map(|f| f.to_string()).collect(),
            allow_download,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn second_run_downloads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirWeights::new(
            dir.path(),
            vec!["config.json", "model.safetensors", "README.md"],
        );

        let first = provision(&source).unwrap();
        assert_eq!(first.downloaded.len(), 2);
        let stored = std::fs::read(dir.path().join("model.safetensors")).unwrap();

        let second = provision(&source).unwrap();
        assert!(second.downloaded.is_empty());
        assert_eq!(second.cached.len(), 2);
        assert_eq!(source.downloads.get(), 2);
        assert_eq!(
            std::fs::read(dir.path().join("model.safetensors")).unwrap(),
            stored
        );
    }

    #[test]
    fn skips_non_weight_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirWeights::new(dir.path(), vec![".gitattributes", "README.md"]);

        let report = provision(&source).unwrap();
        assert!(report.downloaded.is_empty());
        assert!(!dir.path().join("README.md").exists());
    }

    #[test]
    fn missing_weights_fail_when_downloads_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirWeights::new(dir.path(), vec!["tokenizer.json"]);

        let err = ensure_weights(&source, &config_requiring(&["tokenizer.json"], false))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::MissingWeights { ref file, .. } if file == "tokenizer.json"));
        assert_eq!(source.downloads.get(), 0);
    }

    #[test]
    fn missing_weights_are_fetched_when_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirWeights::new(dir.path(), vec!["tokenizer.json", "model.safetensors"]);

        ensure_weights(&source, &config_requiring(&["tokenizer.json"], true)).unwrap();
        assert_eq!(source.downloads.get(), 2);
    }

    #[test]
    fn required_file_absent_upstream_is_still_missing() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirWeights::new(dir.path(), vec!["config.json"]);

        let err = ensure_weights(&source, &config_requiring(&["tokenizer.json"], true))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::MissingWeights { .. }));
    }

    #[test]
    fn cached_weights_need_no_source_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), "{}").unwrap();
        let source = DirWeights::new(dir.path(), vec![]);

        ensure_weights(&source, &config_requiring(&["tokenizer.json"], false)).unwrap();
        assert_eq!(source.downloads.get(), 0);
    }

    #[test]
    fn stalled_source_times_out_promptly() {
        let started = Instant::now();
        let err = provision_with_timeout(StalledWeights, Duration::from_millis(100)).unwrap_err();

        assert!(matches!(err, ProvisionError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn finished_run_is_returned_before_the_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirWeights::new(dir.path(), vec!["config.json"]);

        let report = provision_with_timeout(source, Duration::from_secs(10)).unwrap();
        assert_eq!(report.downloaded.len(), 1);
        assert!(dir.path().join("config.json").exists());
    }
}
