use std::{
    env,
    net::SocketAddr,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::classification::{LemmaTable, SpanishNormalizer};
use crate::classifier::BoosterParams;
use crate::error::DetectorError;
use crate::service::DEFAULT_MIN_RETRAIN_EXAMPLES;
use crate::store::{ArtifactPaths, CLASSIFIER_FILE, TEXT_PIPELINE_FILE};
use crate::training::TrainingOptions;

#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    artifact_dir: PathBuf,
    text_pipeline_path: PathBuf,
    classifier_path: PathBuf,
    corpus_path: PathBuf,
    lemma_table_path: Option<PathBuf>,
    max_features: NonZeroUsize,
    n_estimators: NonZeroUsize,
    max_depth: usize,
    learning_rate: f64,
    seed: u64,
    test_ratio: f64,
    retrain_min_examples: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// 環境変数から設定を読み込む。すべての値に既定値がある。
    ///
    /// # Errors
    /// 値のパースに失敗した場合、または範囲外の場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("VERAZ_HTTP_BIND", "0.0.0.0:8000")?;
        let artifact_dir = parse_path("VERAZ_ARTIFACT_DIR", "artifacts");
        let text_pipeline_path = env_path_opt("VERAZ_TEXT_PIPELINE_PATH")
            .unwrap_or_else(|| artifact_dir.join(TEXT_PIPELINE_FILE));
        let classifier_path = env_path_opt("VERAZ_CLASSIFIER_PATH")
            .unwrap_or_else(|| artifact_dir.join(CLASSIFIER_FILE));
        let corpus_path = parse_path("VERAZ_CORPUS_PATH", "fake_news_spanish.csv");
        let lemma_table_path = env_path_opt("VERAZ_LEMMA_TABLE_PATH");

        let max_features = parse_non_zero_usize("VERAZ_MAX_FEATURES", 5000)?;
        let n_estimators = parse_non_zero_usize("VERAZ_N_ESTIMATORS", 300)?;
        let max_depth = parse_usize("VERAZ_MAX_DEPTH", 10)?;
        let learning_rate = parse_f64("VERAZ_LEARNING_RATE", 0.1)?;
        if !(learning_rate > 0.0 && learning_rate <= 1.0) {
            return Err(ConfigError::Invalid {
                name: "VERAZ_LEARNING_RATE",
                source: anyhow::anyhow!("value must be in (0, 1]"),
            });
        }
        let seed = parse_u64("VERAZ_SEED", 42)?;
        let test_ratio = parse_f64("VERAZ_TEST_RATIO", 0.2)?;
        if !(test_ratio > 0.0 && test_ratio < 1.0) {
            return Err(ConfigError::Invalid {
                name: "VERAZ_TEST_RATIO",
                source: anyhow::anyhow!("value must be in (0, 1)"),
            });
        }
        let retrain_min_examples = parse_retrain_min_examples()?;

        Ok(Self {
            http_bind,
            artifact_dir,
            text_pipeline_path,
            classifier_path,
            corpus_path,
            lemma_table_path,
            max_features,
            n_estimators,
            max_depth,
            learning_rate,
            seed,
            test_ratio,
            retrain_min_examples,
        })
    }

    /// CLI 引数でコーパスの場所を上書きする。
    #[must_use]
    pub fn with_corpus_path(mut self, path: PathBuf) -> Self {
        self.corpus_path = path;
        self
    }

    #[must_use]
    pub fn with_http_bind(mut self, bind: SocketAddr) -> Self {
        self.http_bind = bind;
        self
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    #[must_use]
    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.text_pipeline_path, &self.classifier_path)
    }

    #[must_use]
    pub fn corpus_path(&self) -> &Path {
        &self.corpus_path
    }

    #[must_use]
    pub fn lemma_table_path(&self) -> Option<&Path> {
        self.lemma_table_path.as_deref()
    }

    #[must_use]
    pub fn max_features(&self) -> usize {
        self.max_features.get()
    }

    #[must_use]
    pub fn retrain_min_examples(&self) -> usize {
        self.retrain_min_examples.get()
    }

    #[must_use]
    pub fn booster_params(&self) -> BoosterParams {
        BoosterParams {
            n_estimators: self.n_estimators.get(),
            max_depth: self.max_depth,
            learning_rate: self.learning_rate,
            seed: self.seed,
            ..BoosterParams::default()
        }
    }

    #[must_use]
    pub fn training_options(&self) -> TrainingOptions {
        TrainingOptions {
            max_features: self.max_features.get(),
            params: self.booster_params(),
            test_ratio: self.test_ratio,
            split_seed: self.seed,
        }
    }

    /// 設定されたレンマ表（未指定なら埋め込み表）で正規化器を作る。
    ///
    /// # Errors
    /// レンマ表ファイルの読み込みや解析に失敗した場合。
    pub fn normalizer(&self) -> Result<SpanishNormalizer, DetectorError> {
        let table = match &self.lemma_table_path {
            Some(path) => LemmaTable::from_path(path)?,
            None => LemmaTable::embedded()?,
        };
        Ok(SpanishNormalizer::new(table))
    }
}

fn env_path_opt(name: &'static str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

fn parse_path(name: &'static str, default: &str) -> PathBuf {
    env_path_opt(name).unwrap_or_else(|| PathBuf::from(default))
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let parsed = parse_usize(name, default)?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

/// 再学習の最小件数は引き上げられるが、既定の 10 件未満にはできない。
fn parse_retrain_min_examples() -> Result<NonZeroUsize, ConfigError> {
    const NAME: &str = "VERAZ_RETRAIN_MIN_EXAMPLES";
    let parsed = parse_non_zero_usize(NAME, DEFAULT_MIN_RETRAIN_EXAMPLES)?;
    if parsed.get() < DEFAULT_MIN_RETRAIN_EXAMPLES {
        return Err(ConfigError::Invalid {
            name: NAME,
            source: anyhow::anyhow!(
                "must be at least {DEFAULT_MIN_RETRAIN_EXAMPLES}, got {parsed}"
            ),
        });
    }
    Ok(parsed)
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: [&str; 13] = [
        "VERAZ_HTTP_BIND",
        "VERAZ_ARTIFACT_DIR",
        "VERAZ_TEXT_PIPELINE_PATH",
        "VERAZ_CLASSIFIER_PATH",
        "VERAZ_CORPUS_PATH",
        "VERAZ_LEMMA_TABLE_PATH",
        "VERAZ_MAX_FEATURES",
        "VERAZ_N_ESTIMATORS",
        "VERAZ_MAX_DEPTH",
        "VERAZ_LEARNING_RATE",
        "VERAZ_SEED",
        "VERAZ_TEST_RATIO",
        "VERAZ_RETRAIN_MIN_EXAMPLES",
    ];

    fn set_env(name: &str, value: &str) {
        // SAFETY: tests hold ENV_MUTEX while mutating the environment.
        unsafe {
            env::set_var(name, value);
        }
    }

    fn reset_env() {
        for key in KEYS {
            // SAFETY: tests hold ENV_MUTEX while mutating the environment.
            unsafe {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn from_env_uses_defaults() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();

        let config = Config::from_env().expect("config should load");

        assert_eq!(
            config.http_bind(),
            "0.0.0.0:8000".parse::<SocketAddr>().expect("addr")
        );
        assert_eq!(
            config.artifact_paths(),
            ArtifactPaths::in_dir(Path::new("artifacts"))
        );
        assert_eq!(config.corpus_path(), Path::new("fake_news_spanish.csv"));
        assert!(config.lemma_table_path().is_none());
        assert_eq!(config.max_features(), 5000);
        assert_eq!(config.retrain_min_examples(), 10);
        assert_eq!(config.booster_params(), BoosterParams::default());

        let options = config.training_options();
        assert!((options.test_ratio - 0.2).abs() < f64::EPSILON);
        assert_eq!(options.split_seed, 42);
    }

    #[test]
    fn individual_artifact_paths_override_directory() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("VERAZ_ARTIFACT_DIR", "/var/lib/veraz");
        set_env("VERAZ_CLASSIFIER_PATH", "/tmp/model.json");

        let config = Config::from_env().expect("config should load");
        let paths = config.artifact_paths();
        assert_eq!(
            paths.text_pipeline,
            PathBuf::from("/var/lib/veraz/text_pipeline.json")
        );
        assert_eq!(paths.classifier, PathBuf::from("/tmp/model.json"));
        reset_env();
    }

    #[test]
    fn zero_max_features_is_rejected() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("VERAZ_MAX_FEATURES", "0");

        let error = Config::from_env().expect_err("zero must be rejected");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                name: "VERAZ_MAX_FEATURES",
                ..
            }
        ));
        reset_env();
    }

    #[test]
    fn retrain_minimum_cannot_go_below_ten() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("VERAZ_RETRAIN_MIN_EXAMPLES", "3");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                name: "VERAZ_RETRAIN_MIN_EXAMPLES",
                ..
            })
        ));

        set_env("VERAZ_RETRAIN_MIN_EXAMPLES", "25");
        let config = Config::from_env().expect("raising the minimum is allowed");
        assert_eq!(config.retrain_min_examples(), 25);
        reset_env();
    }

    #[test]
    fn out_of_range_ratios_are_rejected() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("VERAZ_TEST_RATIO", "1.5");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                name: "VERAZ_TEST_RATIO",
                ..
            })
        ));

        reset_env();
        set_env("VERAZ_LEARNING_RATE", "abc");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid {
                name: "VERAZ_LEARNING_RATE",
                ..
            })
        ));
        reset_env();
    }

    #[test]
    fn cli_overrides_replace_env_values() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        let config = Config::from_env()
            .expect("config should load")
            .with_corpus_path(PathBuf::from("data/other.csv"))
            .with_http_bind("127.0.0.1:9000".parse().expect("addr"));
        assert_eq!(config.corpus_path(), Path::new("data/other.csv"));
        assert_eq!(config.http_bind().port(), 9000);
    }
}
