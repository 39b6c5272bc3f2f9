//! 判定と再学習を提供するサービス本体。
//!
//! テキストパイプラインは読み込み後に固定され、分類器だけが再学習で更新される。
//! 判定は読み取りロック、再学習は書き込みロックを最後まで保持する。
use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

use crate::classification::{SpanishNormalizer, TextFeaturizer};
use crate::classifier::Booster;
use crate::error::{DetectorError, Result};
use crate::evaluation::{round4, MetricsCalculator};
use crate::schema::{Label, NewsItem, PredictionRecord, RetrainReport, RetrainRequest};
use crate::store::{self, ArtifactPaths};

pub const DEFAULT_MIN_RETRAIN_EXAMPLES: usize = 10;
pub const RETRAIN_SUCCESS_MESSAGE: &str = "Modelo reentrenado exitosamente";
pub const EMPTY_PREDICT_MESSAGE: &str = "No se proporcionaron datos para la predicción";

/// 分類器の状態遷移。`Dirty` はメモリ上のモデルがディスクより新しいことを表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Loaded,
    Retrained,
    Persisted,
    Dirty,
}

impl ModelStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Retrained => "retrained",
            Self::Persisted => "persisted",
            Self::Dirty => "dirty",
        }
    }
}

/// ヘルスチェック向けのモデル状態。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelSnapshot {
    pub status: ModelStatus,
    pub trees: usize,
    pub feature_dimension: usize,
    pub retrain_count: u64,
}

#[derive(Debug)]
struct ModelState {
    model: Booster,
    status: ModelStatus,
    retrain_count: u64,
}

#[derive(Debug)]
pub struct DetectorService {
    featurizer: TextFeaturizer,
    state: RwLock<ModelState>,
    classifier_path: PathBuf,
    min_retrain_examples: usize,
}

impl DetectorService {
    /// 学習済みのパイプラインと分類器からサービスを組み立てる。
    ///
    /// 再学習の最小件数は [`DEFAULT_MIN_RETRAIN_EXAMPLES`] より小さくならない。
    ///
    /// # Errors
    /// 分類器の入力次元が `V + 2` と一致しない場合。
    pub fn new(
        featurizer: TextFeaturizer,
        model: Booster,
        classifier_path: impl Into<PathBuf>,
        min_retrain_examples: usize,
    ) -> Result<Self> {
        let expected = featurizer.dimension()?;
        if model.n_features() != expected {
            return Err(DetectorError::DimensionMismatch {
                expected,
                actual: model.n_features(),
            });
        }
        Ok(Self {
            featurizer,
            state: RwLock::new(ModelState {
                model,
                status: ModelStatus::Loaded,
                retrain_count: 0,
            }),
            classifier_path: classifier_path.into(),
            min_retrain_examples: min_retrain_examples.max(DEFAULT_MIN_RETRAIN_EXAMPLES),
        })
    }

    /// 成果物を読み込んでサービスを作る。
    ///
    /// # Errors
    /// 成果物の読み込みに失敗した場合、または組み合わせが不整合な場合。
    pub fn load(
        paths: &ArtifactPaths,
        normalizer: SpanishNormalizer,
        min_retrain_examples: usize,
    ) -> Result<Self> {
        let (featurizer, model) = store::load_pair(paths, normalizer)?;
        Self::new(featurizer, model, &paths.classifier, min_retrain_examples)
    }

    #[must_use]
    pub fn classifier_path(&self) -> &Path {
        &self.classifier_path
    }

    #[must_use]
    pub fn min_retrain_examples(&self) -> usize {
        self.min_retrain_examples
    }

    #[must_use]
    pub fn featurizer(&self) -> &TextFeaturizer {
        &self.featurizer
    }

    #[must_use]
    pub fn snapshot(&self) -> ModelSnapshot {
        let state = self.state.read();
        ModelSnapshot {
            status: state.status,
            trees: state.model.n_trees(),
            feature_dimension: state.model.n_features(),
            retrain_count: state.retrain_count,
        }
    }

    /// 現在の分類器のコピー。
    #[must_use]
    pub fn model(&self) -> Booster {
        self.state.read().model.clone()
    }

    /// 記事ごとに Fake / Real と Fake 確率（小数第4位）を返す。
    ///
    /// # Errors
    /// 空のバッチは検証エラー。特徴量化や推論の失敗はそのまま返す。
    pub fn predict(&self, items: &[NewsItem]) -> Result<Vec<PredictionRecord>> {
        if items.is_empty() {
            return Err(DetectorError::validation(EMPTY_PREDICT_MESSAGE));
        }
        let features = self.featurizer.featurize(items)?;
        let probabilities = self.state.read().model.predict_proba(&features)?;

        let records = items
            .iter()
            .zip(probabilities)
            .map(|(item, probability)| PredictionRecord {
                title: item.title.clone(),
                description: item.description.clone(),
                date: item.date.clone(),
                verdict: Label::from_probability(probability).as_str().to_string(),
                probability: round4(probability),
            })
            .collect::<Vec<_>>();
        tracing::debug!(items = records.len(), "prediction batch completed");
        Ok(records)
    }

    fn validate_retrain(&self, request: &RetrainRequest) -> Result<Vec<Label>> {
        if request.data.len() < self.min_retrain_examples {
            return Err(DetectorError::validation(format!(
                "Se requieren al menos {} ejemplos para reentrenar",
                self.min_retrain_examples
            )));
        }
        if request.data.len() != request.labels.len() {
            return Err(DetectorError::validation(format!(
                "La cantidad de ejemplos ({}) y de etiquetas ({}) no coincide",
                request.data.len(),
                request.labels.len()
            )));
        }
        request
            .labels
            .iter()
            .map(|&raw| {
                Label::try_from(raw).map_err(|value| {
                    DetectorError::validation(format!(
                        "Etiqueta inválida {value}: solo se admiten 0 (Real) y 1 (Fake)"
                    ))
                })
            })
            .collect()
    }

    /// 分類器を新しいバッチで追加学習し、同じバッチでのメトリクスを返す。
    ///
    /// 学習はコピーに対して行い、成功した場合だけ差し替える。
    /// 差し替え後の保存に失敗した場合は [`DetectorError::NotDurable`] を返し、状態は `Dirty` になる。
    ///
    /// # Errors
    /// 検証エラーの場合は状態を一切変更しない。
    pub fn retrain(&self, request: &RetrainRequest) -> Result<RetrainReport> {
        let labels = self.validate_retrain(request)?;
        let started = Instant::now();

        let mut state = self.state.write();
        let features = self.featurizer.featurize(&request.data)?;
        let mut candidate = state.model.clone();
        let fit = candidate.fit(&features, &labels)?;
        let predicted = candidate.predict(&features)?;
        let metrics = MetricsCalculator::from_pairs(&labels, &predicted)
            .finalize()
            .rounded();

        let report = RetrainReport {
            message: RETRAIN_SUCCESS_MESSAGE.to_string(),
            precision: metrics.precision,
            recall: metrics.recall,
            f1_score: metrics.f1,
        };
        state.model = candidate;
        state.status = ModelStatus::Retrained;
        state.retrain_count += 1;

        match store::save_classifier(&self.classifier_path, &state.model) {
            Ok(()) => {
                state.status = ModelStatus::Persisted;
                tracing::info!(
                    examples = labels.len(),
                    rounds_added = fit.rounds_added,
                    total_trees = fit.total_trees,
                    train_logloss = fit.train_logloss,
                    precision = report.precision,
                    recall = report.recall,
                    f1_score = report.f1_score,
                    elapsed_ms = started.elapsed().as_millis(),
                    "classifier retrained and persisted"
                );
                Ok(report)
            }
            Err(error) => {
                state.status = ModelStatus::Dirty;
                tracing::error!(
                    error = %error,
                    path = %self.classifier_path.display(),
                    total_trees = fit.total_trees,
                    "classifier retrained but could not be persisted"
                );
                Err(DetectorError::NotDurable {
                    report,
                    source: Box::new(error),
                })
            }
        }
    }
}
