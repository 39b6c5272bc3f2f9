//! スペイン語テキストの正規化（小文字化・レンマ化・記号除去・ストップワード除去）。
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::lemma::LemmaTable;
use super::stopwords;
use crate::error::{DetectorError, Result};

/// 空白で区切った塊から前後の記号を落とし、語と語をつなぐハイフンだけで分割する。
///
/// `covid-19`・`EE.UU`・URL・メールアドレスは1トークンのまま残り、後段の英字判定で落ちる。
fn surface_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
        .map(trim_edges)
        .flat_map(split_word_hyphens)
        .map(trim_edges)
        .filter(|token| !token.is_empty())
}

fn trim_edges(token: &str) -> &str {
    token.trim_matches(|c: char| !c.is_alphanumeric())
}

/// `ex-ministro` は分割し、`covid-19` は分割しない。
fn split_word_hyphens(token: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut chars = token.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '-' {
            let next = chars.peek().map(|&(_, next)| next);
            if prev.is_some_and(char::is_alphanumeric) && next.is_some_and(char::is_alphabetic) {
                parts.push(&token[start..idx]);
                start = idx + c.len_utf8();
            }
        }
        prev = Some(c);
    }
    parts.push(&token[start..]);
    parts
}

/// 成果物に記録する正規化器の設定。推論時の設定と一致しなければならない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerSettings {
    pub lemma_table_fingerprint: u64,
    pub stopwords_fingerprint: u64,
}

#[derive(Debug, Clone)]
pub struct SpanishNormalizer {
    lemmas: LemmaTable,
}

impl SpanishNormalizer {
    #[must_use]
    pub fn new(lemmas: LemmaTable) -> Self {
        Self { lemmas }
    }

    /// 埋め込みのレンマ表を使う既定構成。
    ///
    /// # Errors
    /// 埋め込み表の解析に失敗した場合のみエラーを返す。
    pub fn with_embedded_table() -> Result<Self> {
        Ok(Self::new(LemmaTable::embedded()?))
    }

    #[must_use]
    pub fn settings(&self) -> NormalizerSettings {
        NormalizerSettings {
            lemma_table_fingerprint: self.lemmas.fingerprint(),
            stopwords_fingerprint: stopwords::fingerprint(),
        }
    }

    /// 成果物に記録された設定と現在の構成が一致するか検証する。
    ///
    /// # Errors
    /// レンマ表またはストップワード集合が異なる場合は [`DetectorError::NormalizerMismatch`]。
    pub fn ensure_matches(&self, recorded: &NormalizerSettings) -> Result<()> {
        let current = self.settings();
        if current.lemma_table_fingerprint != recorded.lemma_table_fingerprint {
            return Err(DetectorError::NormalizerMismatch(format!(
                "lemma table fingerprint {:016x} differs from fitted {:016x}",
                current.lemma_table_fingerprint, recorded.lemma_table_fingerprint
            )));
        }
        if current.stopwords_fingerprint != recorded.stopwords_fingerprint {
            return Err(DetectorError::NormalizerMismatch(format!(
                "stopword set fingerprint {:016x} differs from fitted {:016x}",
                current.stopwords_fingerprint, recorded.stopwords_fingerprint
            )));
        }
        Ok(())
    }

    /// テキストを正規化する。どんな入力でも失敗しない。
    #[must_use]
    pub fn normalize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let lowered = text.nfc().collect::<String>().to_lowercase();
        let mut kept: Vec<String> = Vec::new();
        for token in surface_tokens(&lowered) {
            if !token.chars().all(char::is_alphabetic) {
                continue;
            }
            let lemma = self.lemmas.lemmatize(token);
            if stopwords::is_stopword(&lemma) {
                continue;
            }
            kept.push(lemma);
        }
        kept.join(" ")
    }

    /// 欠損値（`None`）は空文字列として扱う。
    #[must_use]
    pub fn normalize_opt(&self, text: Option<&str>) -> String {
        text.map(|value| self.normalize(value)).unwrap_or_default()
    }
}
