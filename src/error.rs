//! 判定パイプライン全体で共有するエラー型と分類ユーティリティ。
use std::path::PathBuf;

use thiserror::Error;

use crate::schema::RetrainReport;

#[derive(Debug, Error)]
pub enum DetectorError {
    /// 呼び出し側の入力が前提条件を満たさない。状態は一切変更しない。
    #[error("{0}")]
    Validation(String),

    #[error("{component} is not fitted")]
    NotFitted { component: &'static str },

    #[error("{component} is already fitted; its vocabulary is frozen")]
    AlreadyFitted { component: &'static str },

    #[error("feature dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("text normalizer does not match the fitted artifact: {0}")]
    NormalizerMismatch(String),

    #[error("computation failed: {0}")]
    Compute(String),

    #[error("failed to load artifact {path}: {source}")]
    ArtifactLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to persist artifact {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// 再学習はメモリ上で完了したが、分類器の永続化に失敗した。
    #[error("classifier updated in memory but not persisted: {source}")]
    NotDurable {
        report: RetrainReport,
        #[source]
        source: Box<DetectorError>,
    },

    #[error("corpus error: {0}")]
    Corpus(String),
}

/// エラーの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 呼び出し側の入力エラー（400 として返す）
    Validation,
    /// 成果物の破損・組み合わせ不整合など、起動時なら致命的なエラー
    Fatal,
    /// リクエスト単位で失敗させ、プロセスは継続するエラー
    Transient,
}

impl DetectorError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// エラーを種類に分類する。
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFitted { .. }
            | Self::AlreadyFitted { .. }
            | Self::DimensionMismatch { .. }
            | Self::NormalizerMismatch(_)
            | Self::ArtifactLoad { .. }
            | Self::Corpus(_) => ErrorKind::Fatal,
            Self::Compute(_) | Self::Persistence { .. } | Self::NotDurable { .. } => {
                ErrorKind::Transient
            }
        }
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation)
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal)
    }
}

pub type Result<T, E = DetectorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_is_not_fatal() {
        let error = DetectorError::validation("Se requieren al menos 10 ejemplos para reentrenar");
        assert!(error.is_validation());
        assert!(!error.is_fatal());
        assert_eq!(
            error.to_string(),
            "Se requieren al menos 10 ejemplos para reentrenar"
        );
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let error = DetectorError::DimensionMismatch {
            expected: 5002,
            actual: 12,
        };
        assert!(error.is_fatal());
        assert!(error.to_string().contains("expected 5002, got 12"));
    }

    #[test]
    fn compute_error_is_transient() {
        let error = DetectorError::Compute("worker panicked".to_string());
        assert_eq!(error.kind(), ErrorKind::Transient);
    }
}
