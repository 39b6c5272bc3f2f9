//! 正規化済みテキストを TF-IDF の疎行列に変換する。
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use crate::error::{DetectorError, Result};

pub const DEFAULT_MAX_FEATURES: usize = 5000;

static TERM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("compile term pattern"));

/// 2文字以上の語をトークンとして取り出す。
fn analyze(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TERM_RE
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// 学習済み語彙。語はアルファベット順に並び、その位置が列番号になる。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "VocabularyRepr", into = "VocabularyRepr")]
pub struct Vocabulary {
    terms: Vec<String>,
    idf: Vec<f64>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VocabularyRepr {
    terms: Vec<String>,
    idf: Vec<f64>,
}

impl TryFrom<VocabularyRepr> for Vocabulary {
    type Error = String;

    fn try_from(repr: VocabularyRepr) -> Result<Self, Self::Error> {
        if repr.terms.len() != repr.idf.len() {
            return Err(format!(
                "vocabulary has {} terms but {} idf weights",
                repr.terms.len(),
                repr.idf.len()
            ));
        }
        let index: HashMap<String, usize> = repr
            .terms
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();
        if index.len() != repr.terms.len() {
            return Err("vocabulary contains duplicate terms".to_string());
        }
        Ok(Self {
            terms: repr.terms,
            idf: repr.idf,
            index,
        })
    }
}

impl From<Vocabulary> for VocabularyRepr {
    fn from(vocabulary: Vocabulary) -> Self {
        Self {
            terms: vocabulary.terms,
            idf: vocabulary.idf,
        }
    }
}

impl Vocabulary {
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    #[must_use]
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    #[must_use]
    pub fn idf(&self) -> &[f64] {
        &self.idf
    }
}

/// TF-IDF ベクトライザ。`fit` は1つの成果物につき1回だけ。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    max_features: usize,
    vocabulary: Option<Vocabulary>,
}

impl Default for TfidfVectorizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FEATURES)
    }
}

impl TfidfVectorizer {
    #[must_use]
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features,
            vocabulary: None,
        }
    }

    #[must_use]
    pub fn max_features(&self) -> usize {
        self.max_features
    }

    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.vocabulary.is_some()
    }

    #[must_use]
    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocabulary.as_ref()
    }

    /// 語彙サイズ V。未学習なら [`DetectorError::NotFitted`]。
    ///
    /// # Errors
    /// `fit` 前に呼ばれた場合。
    pub fn vocabulary_len(&self) -> Result<usize> {
        self.fitted().map(Vocabulary::len)
    }

    fn fitted(&self) -> Result<&Vocabulary> {
        self.vocabulary
            .as_ref()
            .ok_or(DetectorError::NotFitted {
                component: "vectorizer",
            })
    }

    /// コーパスから語彙と IDF を学習する。
    ///
    /// 語はコーパス全体の出現回数の降順（同数ならアルファベット順）で上位 `max_features` 個を残す。
    ///
    /// # Errors
    /// 学習済みの場合は [`DetectorError::AlreadyFitted`]、コーパスが空なら検証エラー。
    pub fn fit<S: AsRef<str> + Sync>(&mut self, corpus: &[S]) -> Result<()> {
        if self.vocabulary.is_some() {
            return Err(DetectorError::AlreadyFitted {
                component: "vectorizer",
            });
        }
        if corpus.is_empty() {
            return Err(DetectorError::validation(
                "cannot fit the vectorizer on an empty corpus",
            ));
        }

        let analyzed: Vec<Vec<String>> = corpus
            .par_iter()
            .map(|doc| analyze(doc.as_ref()))
            .collect();

        // term -> (total count, document frequency)
        let mut stats: HashMap<String, (u64, u64)> = HashMap::new();
        for tokens in &analyzed {
            let mut seen: HashSet<&str> = HashSet::new();
            for token in tokens {
                let entry = stats.entry(token.clone()).or_insert((0, 0));
                entry.0 += 1;
                if seen.insert(token.as_str()) {
                    entry.1 += 1;
                }
            }
        }
        let unique_terms = stats.len();

        let mut ranked: Vec<(String, u64, u64)> = stats
            .into_iter()
            .map(|(term, (tf, df))| (term, tf, df))
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0));
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(self.max_features);
        ranked.sort_by(|a, b| a.0.cmp(&b.0));

        #[allow(clippy::cast_precision_loss)]
        let n_docs = corpus.len() as f64;
        let mut terms = Vec::with_capacity(ranked.len());
        let mut idf = Vec::with_capacity(ranked.len());
        let mut index = HashMap::with_capacity(ranked.len());
        for (position, (term, _tf, df)) in ranked.into_iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let df = df as f64;
            // idf(t) = ln((1 + n) / (1 + df(t))) + 1
            idf.push(((1.0 + n_docs) / (1.0 + df)).ln() + 1.0);
            index.insert(term.clone(), position);
            terms.push(term);
        }

        tracing::info!(
            total_docs = corpus.len(),
            unique_terms,
            vocabulary_size = terms.len(),
            max_features = self.max_features,
            "vectorizer fitted"
        );
        if terms.is_empty() {
            tracing::warn!("vectorizer vocabulary is empty; text features will all be zero");
        }

        self.vocabulary = Some(Vocabulary { terms, idf, index });
        Ok(())
    }

    /// テキスト列を `[n, V]` の疎行列に変換する。語彙外の語は無視する。
    ///
    /// # Errors
    /// `fit` 前に呼ばれた場合は [`DetectorError::NotFitted`]。
    pub fn transform<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Result<CsMat<f64>> {
        let vocabulary = self.fitted()?;

        let rows: Vec<(Vec<usize>, Vec<f64>)> = texts
            .par_iter()
            .map(|text| {
                let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
                for token in analyze(text.as_ref()) {
                    if let Some(idx) = vocabulary.index_of(&token) {
                        *counts.entry(idx).or_insert(0.0) += 1.0;
                    }
                }
                let mut indices = Vec::with_capacity(counts.len());
                let mut weights = Vec::with_capacity(counts.len());
                for (idx, count) in counts {
                    indices.push(idx);
                    weights.push(count * vocabulary.idf[idx]);
                }
                let norm = weights.iter().map(|w| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for weight in &mut weights {
                        *weight /= norm;
                    }
                }
                (indices, weights)
            })
            .collect();

        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for (row_indices, row_weights) in rows {
            indices.extend(row_indices);
            data.extend(row_weights);
            indptr.push(indices.len());
        }

        CsMat::try_new((texts.len(), vocabulary.len()), indptr, indices, data).map_err(
            |(_, _, _, error)| DetectorError::Compute(format!("invalid tf-idf matrix: {error:?}")),
        )
    }
}
