//! 辞書引き + 複数形規則によるスペイン語レンマ化。
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use xxhash_rust::xxh3::xxh3_64;

use crate::error::{DetectorError, Result};

const DEFAULT_LEMMA_TABLE: &str = include_str!("../../resources/lemmas_es.tsv");

/// 固定のレンマ表。学習時と推論時で同一の表を使うことが再現性の前提になる。
#[derive(Debug, Clone)]
pub struct LemmaTable {
    entries: HashMap<String, String>,
    fingerprint: u64,
}

impl LemmaTable {
    /// バイナリに埋め込んだ既定の表。
    ///
    /// # Errors
    /// 埋め込み表の書式が壊れている場合のみエラーを返す。
    pub fn embedded() -> Result<Self> {
        Self::parse(DEFAULT_LEMMA_TABLE)
    }

    /// `form<TAB>lemma` 形式のファイルから読み込む。
    ///
    /// # Errors
    /// ファイルが読めない、または書式が不正な場合はエラーを返す。
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|error| DetectorError::ArtifactLoad {
            path: path.to_path_buf(),
            source: anyhow::Error::new(error),
        })?;
        Self::parse(&raw)
    }

    /// 表のテキストを解釈する。`#` で始まる行と空行は無視する。
    ///
    /// # Errors
    /// タブ区切りで2列になっていない行がある場合はエラーを返す。
    pub fn parse(raw: &str) -> Result<Self> {
        let mut entries = HashMap::new();
        for (line_no, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((form, lemma)) = line.split_once('\t') else {
                return Err(DetectorError::validation(format!(
                    "lemma table line {} is not `form<TAB>lemma`",
                    line_no + 1
                )));
            };
            let (form, lemma) = (form.trim(), lemma.trim());
            if form.is_empty() || lemma.is_empty() {
                return Err(DetectorError::validation(format!(
                    "lemma table line {} has an empty column",
                    line_no + 1
                )));
            }
            entries
                .entry(form.to_lowercase())
                .or_insert_with(|| lemma.to_lowercase());
        }

        // 挿入順に依存しない指紋にするため、ソートしてからハッシュする
        let mut sorted: Vec<(&String, &String)> = entries.iter().collect();
        sorted.sort();
        let mut canonical = String::new();
        for (form, lemma) in sorted {
            canonical.push_str(form);
            canonical.push('\t');
            canonical.push_str(lemma);
            canonical.push('\n');
        }
        let fingerprint = xxh3_64(canonical.as_bytes());

        Ok(Self {
            entries,
            fingerprint,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// 小文字化済みトークンのレンマを返す。
    #[must_use]
    pub fn lemmatize(&self, token: &str) -> String {
        if let Some(lemma) = self.entries.get(token) {
            return lemma.clone();
        }
        reduce_plural(token)
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'á' | 'é' | 'í' | 'ó' | 'ú')
}

fn reduce_plural(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let len = chars.len();
    if len <= 4 || chars[len - 1] != 's' {
        return token.to_string();
    }

    // naciones -> nación
    if let Some(stem) = token.strip_suffix("iones") {
        return format!("{stem}ión");
    }
    // voces -> voz
    if let Some(stem) = token.strip_suffix("ces") {
        return format!("{stem}z");
    }
    if chars[len - 2] == 'e' {
        let before = chars[len - 3];
        let before_that = chars[len - 4];
        // ciudades -> ciudad, mujeres -> mujer, leyes -> ley; hombres -> hombre
        if matches!(before, 'l' | 'r' | 'n' | 'd' | 'j' | 'y') && is_vowel(before_that) {
            return chars[..len - 2].iter().collect();
        }
        return chars[..len - 1].iter().collect();
    }
    // crisis, virus はそのまま
    if matches!(chars[len - 2], 'a' | 'o' | 'á' | 'é' | 'ó') {
        return chars[..len - 1].iter().collect();
    }
    token.to_string()
}
