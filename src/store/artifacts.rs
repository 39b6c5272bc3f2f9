//! 学習済み成果物（テキストパイプラインと分類器）の JSON 永続化。
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::classification::{NormalizerSettings, SpanishNormalizer, TextFeaturizer, TfidfVectorizer};
use crate::classifier::Booster;
use crate::error::{DetectorError, Result};

pub const FORMAT_VERSION: u32 = 1;
pub const TEXT_PIPELINE_FILE: &str = "text_pipeline.json";
pub const CLASSIFIER_FILE: &str = "classifier.json";

/// 2つの成果物の保存先。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub text_pipeline: PathBuf,
    pub classifier: PathBuf,
}

impl ArtifactPaths {
    #[must_use]
    pub fn new(text_pipeline: impl Into<PathBuf>, classifier: impl Into<PathBuf>) -> Self {
        Self {
            text_pipeline: text_pipeline.into(),
            classifier: classifier.into(),
        }
    }

    /// ディレクトリ直下の既定ファイル名。
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(TEXT_PIPELINE_FILE), dir.join(CLASSIFIER_FILE))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPipelineArtifact {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub normalizer: NormalizerSettings,
    pub vectorizer: TfidfVectorizer,
}

impl TextPipelineArtifact {
    #[must_use]
    pub fn from_featurizer(featurizer: &TextFeaturizer) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            trained_at: Utc::now(),
            normalizer: featurizer.normalizer_settings(),
            vectorizer: featurizer.vectorizer().clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub model: Booster,
}

impl ClassifierArtifact {
    #[must_use]
    pub fn from_model(model: &Booster) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            trained_at: Utc::now(),
            model: model.clone(),
        }
    }
}

fn persistence_error(path: &Path, source: impl Into<anyhow::Error>) -> DetectorError {
    DetectorError::Persistence {
        path: path.to_path_buf(),
        source: source.into(),
    }
}

fn load_error(path: &Path, source: impl Into<anyhow::Error>) -> DetectorError {
    DetectorError::ArtifactLoad {
        path: path.to_path_buf(),
        source: source.into(),
    }
}

/// 同じディレクトリの一時ファイルに書いてから rename で置き換える。
///
/// # Errors
/// ディレクトリ作成・書き込み・rename のいずれかに失敗した場合は [`DetectorError::Persistence`]。
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| persistence_error(path, error))?;
    }
    let bytes = serde_json::to_vec(value).map_err(|error| persistence_error(path, error))?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    };
    if let Err(error) = write() {
        let _ = fs::remove_file(&tmp_path);
        return Err(persistence_error(path, error));
    }
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
    Ok(())
}

/// # Errors
/// 読み込みまたはデシリアライズに失敗した場合は [`DetectorError::ArtifactLoad`]。
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path).map_err(|error| load_error(path, error))?;
    serde_json::from_slice(&raw).map_err(|error| load_error(path, error))
}

fn ensure_version(path: &Path, version: u32) -> Result<()> {
    if version == FORMAT_VERSION {
        Ok(())
    } else {
        Err(load_error(
            path,
            anyhow::anyhow!("unsupported format_version {version} (expected {FORMAT_VERSION})"),
        ))
    }
}

/// # Errors
/// 書き込みに失敗した場合。
pub fn save_text_pipeline(path: &Path, featurizer: &TextFeaturizer) -> Result<()> {
    save_json(path, &TextPipelineArtifact::from_featurizer(featurizer))
}

/// # Errors
/// 書き込みに失敗した場合。
pub fn save_classifier(path: &Path, model: &Booster) -> Result<()> {
    save_json(path, &ClassifierArtifact::from_model(model))
}

/// テキストパイプラインを読み込み、現在の正規化器と結合する。
///
/// # Errors
/// 読み込み失敗、未知のバージョン、正規化器の不一致の場合。
pub fn load_text_pipeline(path: &Path, normalizer: SpanishNormalizer) -> Result<TextFeaturizer> {
    let artifact: TextPipelineArtifact = load_json(path)?;
    ensure_version(path, artifact.format_version)?;
    TextFeaturizer::from_fitted(normalizer, artifact.vectorizer, &artifact.normalizer)
}

/// # Errors
/// 読み込み失敗、未知のバージョン、木構造が不正な場合。
pub fn load_classifier(path: &Path) -> Result<Booster> {
    let artifact: ClassifierArtifact = load_json(path)?;
    ensure_version(path, artifact.format_version)?;
    artifact
        .model
        .validate()
        .map_err(|reason| load_error(path, anyhow::anyhow!(reason)))?;
    Ok(artifact.model)
}

/// 2つの成果物を読み込み、分類器の入力次元が `V + 2` と一致することを確かめる。
///
/// # Errors
/// どちらかの読み込みに失敗した場合、または次元が一致しない場合。
pub fn load_pair(
    paths: &ArtifactPaths,
    normalizer: SpanishNormalizer,
) -> Result<(TextFeaturizer, Booster)> {
    let featurizer = load_text_pipeline(&paths.text_pipeline, normalizer)?;
    let model = load_classifier(&paths.classifier)?;
    let expected = featurizer.dimension()?;
    if model.n_features() != expected {
        return Err(DetectorError::DimensionMismatch {
            expected,
            actual: model.n_features(),
        });
    }
    tracing::info!(
        text_pipeline = %paths.text_pipeline.display(),
        classifier = %paths.classifier.display(),
        feature_dimension = expected,
        trees = model.n_trees(),
        "artifacts loaded"
    );
    Ok((featurizer, model))
}
