//! `;` 区切りの学習用コーパスの読み込みとクリーニング。
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{DetectorError, Result};
use crate::schema::{Label, LabeledExample, NewsItem};

const TITLE_COLUMN: &str = "Titulo";
const DESCRIPTION_COLUMN: &str = "Descripcion";
const LABEL_COLUMN: &str = "Label";
const DATE_COLUMN: &str = "Fecha";

/// クリーニングで落とした行の内訳。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CorpusStats {
    pub total_rows: usize,
    pub dropped_missing: usize,
    pub dropped_invalid_label: usize,
    pub dropped_duplicates: usize,
}

#[derive(Debug, Clone)]
pub struct Corpus {
    pub examples: Vec<LabeledExample>,
    pub stats: CorpusStats,
}

impl Corpus {
    #[must_use]
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> Vec<NewsItem> {
        self.examples.iter().map(|example| example.item.clone()).collect()
    }

    #[must_use]
    pub fn labels(&self) -> Vec<Label> {
        self.examples.iter().map(|example| example.label).collect()
    }
}

fn parse_label(raw: &str) -> Option<Label> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Label::try_from(value).ok();
    }
    // "1.0" のような浮動小数点表記も受け付ける
    let value = raw.parse::<f64>().ok()?;
    if value.fract() != 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Label::try_from(value as i64).ok()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// ファイルからコーパスを読み込む。
///
/// # Errors
/// ファイルが開けない、必須列がない、CSV として解釈できない場合は [`DetectorError::Corpus`]。
pub fn load_corpus(path: &Path) -> Result<Corpus> {
    let file = File::open(path).map_err(|error| {
        DetectorError::Corpus(format!("failed to open {}: {error}", path.display()))
    })?;
    let corpus = read_corpus(file)?;
    tracing::info!(
        path = %path.display(),
        rows = corpus.stats.total_rows,
        kept = corpus.len(),
        dropped_missing = corpus.stats.dropped_missing,
        dropped_invalid_label = corpus.stats.dropped_invalid_label,
        dropped_duplicates = corpus.stats.dropped_duplicates,
        "corpus loaded"
    );
    Ok(corpus)
}

/// 欠損値・不正ラベルの行を落とし、全列が一致する重複行を落とす。
///
/// # Errors
/// 必須列がない、または CSV として解釈できない場合。
pub fn read_corpus<R: Read>(reader: R) -> Result<Corpus> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|error| DetectorError::Corpus(format!("failed to read header: {error}")))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|header| header.trim() == name)
            .ok_or_else(|| DetectorError::Corpus(format!("missing required column `{name}`")))
    };
    let title_idx = column(TITLE_COLUMN)?;
    let description_idx = column(DESCRIPTION_COLUMN)?;
    let label_idx = column(LABEL_COLUMN)?;
    let date_idx = headers.iter().position(|header| header.trim() == DATE_COLUMN);

    let mut stats = CorpusStats::default();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut examples = Vec::new();
    for (row_no, record) in reader.records().enumerate() {
        let record = record.map_err(|error| {
            DetectorError::Corpus(format!("malformed record {}: {error}", row_no + 1))
        })?;
        stats.total_rows += 1;

        let (Some(title), Some(description), Some(raw_label)) = (
            non_empty(record.get(title_idx)),
            non_empty(record.get(description_idx)),
            non_empty(record.get(label_idx)),
        ) else {
            stats.dropped_missing += 1;
            continue;
        };
        let Some(label) = parse_label(raw_label) else {
            stats.dropped_invalid_label += 1;
            continue;
        };
        let key: Vec<String> = record.iter().map(str::to_string).collect();
        if !seen.insert(key) {
            stats.dropped_duplicates += 1;
            continue;
        }

        let date = date_idx
            .and_then(|idx| record.get(idx))
            .unwrap_or_default();
        examples.push(LabeledExample {
            item: NewsItem::new(title, description, date),
            label,
        });
    }

    Ok(Corpus { examples, stats })
}
