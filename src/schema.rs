//! 入出力のデータモデル。フィールド名は既存クライアントとの互換のためスペイン語のまま。
use serde::{Deserialize, Serialize};

/// 判定対象のニュース記事。`Fecha` は特徴量には使わない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(rename = "Titulo")]
    pub title: String,
    #[serde(rename = "Descripcion")]
    pub description: String,
    #[serde(rename = "Fecha")]
    pub date: String,
}

impl NewsItem {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            date: date.into(),
        }
    }

    /// ベクトル化に渡す結合テキスト（タイトル + 空白 + 本文）。
    #[must_use]
    pub fn combined_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// ラベル付き学習データ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledExample {
    pub item: NewsItem,
    pub label: Label,
}

/// 0 = Real, 1 = Fake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability >= crate::classifier::FAKE_THRESHOLD {
            Self::Fake
        } else {
            Self::Real
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Real => "Real",
            Self::Fake => "Fake",
        }
    }

    #[must_use]
    pub fn as_target(self) -> f64 {
        match self {
            Self::Real => 0.0,
            Self::Fake => 1.0,
        }
    }

    #[must_use]
    pub fn is_fake(self) -> bool {
        matches!(self, Self::Fake)
    }
}

impl TryFrom<i64> for Label {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Real),
            1 => Ok(Self::Fake),
            other => Err(other),
        }
    }
}

/// 1件分の判定結果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(rename = "Titulo")]
    pub title: String,
    #[serde(rename = "Descripcion")]
    pub description: String,
    #[serde(rename = "Fecha")]
    pub date: String,
    #[serde(rename = "Prediccion")]
    pub verdict: String,
    #[serde(rename = "Probabilidad")]
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<PredictionRecord>,
}

/// 再学習リクエスト。`data` と `labels` は同じ長さでなければならない。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrainRequest {
    pub data: Vec<NewsItem>,
    pub labels: Vec<i64>,
}

/// 再学習後のメトリクス（小数第4位で丸め済み）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainReport {
    pub message: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn news_item_uses_spanish_wire_names() {
        let item: NewsItem = serde_json::from_value(serde_json::json!({
            "Titulo": "a",
            "Descripcion": "b",
            "Fecha": "2024-01-01"
        }))
        .expect("news item should deserialize");
        assert_eq!(item, NewsItem::new("a", "b", "2024-01-01"));
        assert_eq!(item.combined_text(), "a b");
    }

    #[test]
    fn label_threshold_is_inclusive() {
        assert_eq!(Label::from_probability(0.5), Label::Fake);
        assert_eq!(Label::from_probability(0.499_999), Label::Real);
    }

    #[test]
    fn label_rejects_values_outside_binary_range() {
        assert_eq!(Label::try_from(1), Ok(Label::Fake));
        assert_eq!(Label::try_from(2), Err(2));
        assert_eq!(Label::try_from(-1), Err(-1));
    }
}
