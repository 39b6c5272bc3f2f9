//! 正規化 → TF-IDF → 長さ特徴量の結合までを担う特徴量パイプライン。
use std::borrow::Cow;

use rayon::prelude::*;
use sprs::CsMat;

use super::normalizer::{NormalizerSettings, SpanishNormalizer};
use super::vectorizer::TfidfVectorizer;
use crate::error::{DetectorError, Result};
use crate::schema::NewsItem;

/// テキスト以外に付け加える列の数（タイトル長・本文長）。
pub const EXTRA_FEATURE_COUNT: usize = 2;

/// 生テキストから計算する補助特徴量。スケーリングはしない。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtraFeatures {
    pub title_length: f64,
    pub description_length: f64,
}

impl ExtraFeatures {
    /// 文字数は Unicode スカラー値単位で数える。
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_item(item: &NewsItem) -> Self {
        Self {
            title_length: item.title.chars().count() as f64,
            description_length: item.description.chars().count() as f64,
        }
    }

    fn columns(self) -> [f64; EXTRA_FEATURE_COUNT] {
        [self.title_length, self.description_length]
    }
}

/// テキスト行列の右側に補助特徴量の2列を連結する。出力は常に `V + 2` 列の CSR。
///
/// # Errors
/// 行数が一致しない場合は [`DetectorError::DimensionMismatch`]。
pub fn fuse(text: &CsMat<f64>, extras: &[ExtraFeatures]) -> Result<CsMat<f64>> {
    if text.rows() != extras.len() {
        return Err(DetectorError::DimensionMismatch {
            expected: text.rows(),
            actual: extras.len(),
        });
    }
    let text: Cow<'_, CsMat<f64>> = if text.is_csr() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.to_csr())
    };

    let vocab_len = text.cols();
    let mut indptr = Vec::with_capacity(extras.len() + 1);
    let mut indices = Vec::with_capacity(text.nnz() + extras.len() * EXTRA_FEATURE_COUNT);
    let mut data = Vec::with_capacity(indices.capacity());
    indptr.push(0);
    for (row, extra) in text.outer_iterator().zip(extras) {
        indices.extend_from_slice(row.indices());
        data.extend_from_slice(row.data());
        for (offset, value) in extra.columns().into_iter().enumerate() {
            // 0 は疎行列では欠損と同じ扱い
            if value != 0.0 {
                indices.push(vocab_len + offset);
                data.push(value);
            }
        }
        indptr.push(indices.len());
    }

    CsMat::try_new(
        (extras.len(), vocab_len + EXTRA_FEATURE_COUNT),
        indptr,
        indices,
        data,
    )
    .map_err(|(_, _, _, error)| DetectorError::Compute(format!("invalid fused matrix: {error:?}")))
}

/// 正規化器とベクトライザを順に適用する二段構成のテキストパイプライン。
#[derive(Debug, Clone)]
pub struct TextFeaturizer {
    normalizer: SpanishNormalizer,
    vectorizer: TfidfVectorizer,
}

impl TextFeaturizer {
    /// 未学習のパイプラインを作る。
    #[must_use]
    pub fn new(normalizer: SpanishNormalizer, max_features: usize) -> Self {
        Self {
            normalizer,
            vectorizer: TfidfVectorizer::new(max_features),
        }
    }

    /// 永続化済みのベクトライザからパイプラインを復元する。
    ///
    /// # Errors
    /// 正規化器の設定が学習時と異なる場合、またはベクトライザが未学習の場合。
    pub fn from_fitted(
        normalizer: SpanishNormalizer,
        vectorizer: TfidfVectorizer,
        recorded: &NormalizerSettings,
    ) -> Result<Self> {
        normalizer.ensure_matches(recorded)?;
        if !vectorizer.is_fitted() {
            return Err(DetectorError::NotFitted {
                component: "vectorizer",
            });
        }
        Ok(Self {
            normalizer,
            vectorizer,
        })
    }

    #[must_use]
    pub fn normalizer(&self) -> &SpanishNormalizer {
        &self.normalizer
    }

    #[must_use]
    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }

    #[must_use]
    pub fn normalizer_settings(&self) -> NormalizerSettings {
        self.normalizer.settings()
    }

    /// 各記事の `title + " " + description` を正規化する。
    #[must_use]
    pub fn normalize_items(&self, items: &[NewsItem]) -> Vec<String> {
        items
            .par_iter()
            .map(|item| self.normalizer.normalize(&item.combined_text()))
            .collect()
    }

    /// コーパス全体で語彙を学習する。
    ///
    /// # Errors
    /// すでに学習済み、またはコーパスが空の場合。
    pub fn fit(&mut self, items: &[NewsItem]) -> Result<()> {
        let normalized = self.normalize_items(items);
        self.vectorizer.fit(&normalized)
    }

    /// 融合後の列数 `V + 2`。
    ///
    /// # Errors
    /// 未学習の場合。
    pub fn dimension(&self) -> Result<usize> {
        Ok(self.vectorizer.vocabulary_len()? + EXTRA_FEATURE_COUNT)
    }

    /// 記事の並びを `[n, V + 2]` の特徴量行列に変換する。
    ///
    /// # Errors
    /// 未学習の場合、または行列の組み立てに失敗した場合。
    pub fn featurize(&self, items: &[NewsItem]) -> Result<CsMat<f64>> {
        let normalized = self.normalize_items(items);
        let text = self.vectorizer.transform(&normalized)?;
        let extras: Vec<ExtraFeatures> = items.iter().map(ExtraFeatures::from_item).collect();
        fuse(&text, &extras)
    }
}
