use std::{env, num::NonZeroUsize, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::classification::{ClassifierSettings, DEFAULT_MAX_TAGS, DEFAULT_MIN_CONFIDENCE};
use crate::pipeline::TaggingSettings;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// 環境変数から読み込む実行時設定。
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    dictionary_path: Option<PathBuf>,
    min_confidence: f32,
    max_tags: NonZeroUsize,
    read_page_size: NonZeroUsize,
    write_chunk_size: NonZeroUsize,
    chunk_delay: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dictionary_path: None,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_tags: NonZeroUsize::new(DEFAULT_MAX_TAGS).unwrap_or(NonZeroUsize::MIN),
            read_page_size: NonZeroUsize::new(20).unwrap_or(NonZeroUsize::MIN),
            write_chunk_size: NonZeroUsize::new(500).unwrap_or(NonZeroUsize::MIN),
            chunk_delay: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// 環境変数から設定を読み込み、検証する。未設定の項目は既定値を使う。
    ///
    /// # Errors
    /// 数値のパースに失敗した場合、または値が範囲外の場合は [`ConfigError`] を返す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let dictionary_path = env::var("TAGGER_DICTIONARY_PATH")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);
        let min_confidence = parse_ratio("TAGGER_MIN_CONFIDENCE", DEFAULT_MIN_CONFIDENCE)?;
        let max_tags = parse_non_zero_usize("TAGGER_MAX_TAGS", DEFAULT_MAX_TAGS)?;
        let read_page_size = parse_non_zero_usize("TAGGER_READ_PAGE_SIZE", 20)?;
        let write_chunk_size = parse_non_zero_usize("TAGGER_WRITE_CHUNK_SIZE", 500)?;
        let chunk_delay = parse_duration_ms("TAGGER_CHUNK_DELAY_MS", 100)?;

        Ok(Self {
            dictionary_path,
            min_confidence,
            max_tags,
            read_page_size,
            write_chunk_size,
            chunk_delay,
        })
    }

    #[must_use]
    pub fn dictionary_path(&self) -> Option<&std::path::Path> {
        self.dictionary_path.as_deref()
    }

    #[must_use]
    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    #[must_use]
    pub fn max_tags(&self) -> NonZeroUsize {
        self.max_tags
    }

    #[must_use]
    pub fn read_page_size(&self) -> NonZeroUsize {
        self.read_page_size
    }

    #[must_use]
    pub fn write_chunk_size(&self) -> NonZeroUsize {
        self.write_chunk_size
    }

    #[must_use]
    pub fn chunk_delay(&self) -> Duration {
        self.chunk_delay
    }

    #[must_use]
    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            min_confidence: self.min_confidence,
            max_tags: self.max_tags.get(),
        }
    }

    #[must_use]
    pub fn tagging_settings(&self) -> TaggingSettings {
        TaggingSettings {
            read_page_size: self.read_page_size.get(),
            write_chunk_size: self.write_chunk_size.get(),
            chunk_delay: self.chunk_delay,
        }
    }
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<NonZeroUsize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.trim().parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    NonZeroUsize::new(parsed).ok_or_else(|| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!("must be greater than zero"),
    })
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default_ms.to_string());
    let ms = raw.trim().parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    Ok(Duration::from_millis(ms))
}

fn parse_ratio(name: &'static str, default: f32) -> Result<f32, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.trim().parse::<f32>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("value must be between 0 and 1"),
        });
    }
    Ok(parsed)
}
