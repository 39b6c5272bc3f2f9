//! 初回学習（コーパス → テキストパイプライン + 分類器 → 評価 → 保存）。
mod corpus;
mod split;

use std::path::Path;
use std::time::Instant;

pub use corpus::{load_corpus, read_corpus, Corpus, CorpusStats};
pub use split::{train_test_split, Split};

use crate::classification::{SpanishNormalizer, TextFeaturizer, DEFAULT_MAX_FEATURES};
use crate::classifier::{Booster, BoosterParams, FitSummary};
use crate::error::{DetectorError, Result};
use crate::evaluation::{BinaryMetrics, MetricsCalculator};
use crate::schema::{Label, NewsItem};
use crate::store::{save_classifier, save_text_pipeline, ArtifactPaths};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingOptions {
    pub max_features: usize,
    pub params: BoosterParams,
    pub test_ratio: f64,
    /// 分割用のシード（分類器のシードは `params.seed`）
    pub split_seed: u64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_MAX_FEATURES,
            params: BoosterParams::default(),
            test_ratio: 0.2,
            split_seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub featurizer: TextFeaturizer,
    pub model: Booster,
    pub fit: FitSummary,
    /// 評価用データでのメトリクス
    pub evaluation: BinaryMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
}

fn select<T: Clone>(values: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&idx| values[idx].clone()).collect()
}

/// コーパス全体でテキストパイプラインを学習し、分割した学習側で分類器を学習、評価側で評価する。
///
/// # Errors
/// コーパスが分割できないほど小さい場合、または学習に失敗した場合。
pub fn train(
    corpus: &Corpus,
    normalizer: SpanishNormalizer,
    options: &TrainingOptions,
) -> Result<TrainingOutcome> {
    if corpus.is_empty() {
        return Err(DetectorError::Corpus(
            "corpus has no usable rows after cleaning".to_string(),
        ));
    }
    let items: Vec<NewsItem> = corpus.items();
    let labels: Vec<Label> = corpus.labels();

    let started = Instant::now();
    let mut featurizer = TextFeaturizer::new(normalizer, options.max_features);
    featurizer.fit(&items)?;
    let dimension = featurizer.dimension()?;
    tracing::info!(
        rows = items.len(),
        feature_dimension = dimension,
        elapsed_ms = started.elapsed().as_millis(),
        "text pipeline fitted"
    );

    let split = train_test_split(items.len(), options.test_ratio, options.split_seed)?;
    let train_x = featurizer.featurize(&select(&items, &split.train))?;
    let train_y = select(&labels, &split.train);
    let test_x = featurizer.featurize(&select(&items, &split.test))?;
    let test_y = select(&labels, &split.test);

    let mut model = Booster::new(options.params, dimension);
    let fit = model.fit(&train_x, &train_y)?;
    let predicted = model.predict(&test_x)?;
    let evaluation = MetricsCalculator::from_pairs(&test_y, &predicted).finalize();

    tracing::info!(
        train_rows = split.train.len(),
        test_rows = split.test.len(),
        precision = evaluation.precision,
        recall = evaluation.recall,
        f1 = evaluation.f1,
        accuracy = evaluation.accuracy,
        elapsed_ms = started.elapsed().as_millis(),
        "initial training evaluated"
    );

    Ok(TrainingOutcome {
        featurizer,
        model,
        fit,
        evaluation,
        train_rows: split.train.len(),
        test_rows: split.test.len(),
    })
}

/// コーパスを読み込んで学習し、両方の成果物を保存する。
///
/// # Errors
/// 読み込み・学習・保存のいずれかに失敗した場合。
pub fn train_and_persist(
    corpus_path: &Path,
    normalizer: SpanishNormalizer,
    options: &TrainingOptions,
    paths: &ArtifactPaths,
) -> Result<TrainingOutcome> {
    let corpus = load_corpus(corpus_path)?;
    let outcome = train(&corpus, normalizer, options)?;
    save_text_pipeline(&paths.text_pipeline, &outcome.featurizer)?;
    save_classifier(&paths.classifier, &outcome.model)?;
    tracing::info!(
        text_pipeline = %paths.text_pipeline.display(),
        classifier = %paths.classifier.display(),
        "artifacts persisted"
    );
    Ok(outcome)
}
