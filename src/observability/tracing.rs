use anyhow::{Error, Result};
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// 出力形式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// `TAGGER_LOG_FORMAT` から形式を決める。未設定や不明な値はテキスト。
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var("TAGGER_LOG_FORMAT") {
            Ok(raw) if raw.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Tracing サブスクライバを一度だけ初期化する。
///
/// フィルタは `RUST_LOG`（未設定時は `info`）。ログは標準エラーに出す。
///
/// # Errors
/// 他のグローバルサブスクライバが既に設定されている場合。
pub fn init(format: LogFormat) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);

        let result = match format {
            LogFormat::Json => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr)
                        .json(),
                )
                .try_init(),
            LogFormat::Text => registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };
        result.map_err(|e: tracing_subscriber::util::TryInitError| Error::msg(e.to_string()))?;

        info!(?format, "tracing initialized");
        Ok::<(), Error>(())
    })?;
    Ok(())
}
