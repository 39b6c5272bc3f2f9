use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// ログの出力形式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// `RUST_LOG_FORMAT` の値を解釈する。未設定なら JSON。
    pub(crate) fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("json") => Self::Json,
            Some(_) => Self::Text,
        }
    }

    fn layer(self) -> Box<dyn Layer<Registry> + Send + Sync> {
        match self {
            Self::Json => fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .boxed(),
            Self::Text => fmt::layer().with_target(true).boxed(),
        }
    }
}

/// Tracing サブスクライバを一度だけ初期化する。
///
/// フィルタは `RUST_LOG` に従い、常に INFO 以上を含める。
/// 別のサブスクライバが設定済み（テストなど）なら何もしない。
pub fn init() {
    TRACING_INIT.get_or_init(|| {
        let format = LogFormat::from_env_value(std::env::var("RUST_LOG_FORMAT").ok().as_deref());
        let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());
        if tracing_subscriber::registry()
            .with(format.layer())
            .with(filter)
            .try_init()
            .is_err()
        {
            tracing::debug!("global subscriber already installed");
        }
    });
}
