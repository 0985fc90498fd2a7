use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::{
    classification::{CategoryScore, ClassificationResult, KeywordDictionary, PostClassifier},
    config::Config,
    evaluation::load_cases,
    observability::Metrics,
    pipeline::TaggingService,
    store::InMemoryPostStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Classify one caption and print the tags as JSON
    Classify {
        caption: String,
        /// Also print the raw score of every category
        #[arg(long)]
        scores: bool,
    },
    /// Run the classifier against labeled cases and print precision/recall/F1
    Validate { cases: PathBuf },
    /// Tag every untagged post in a JSON post array
    Backfill {
        posts: PathBuf,
        /// Where to write the posts after tagging
        #[arg(long)]
        output: Option<PathBuf>,
        /// Maximum number of posts to read
        #[arg(long)]
        limit: Option<usize>,
        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },
}

/// 設定から組み立てた共有コンポーネント。
pub struct ComponentRegistry {
    config: Arc<Config>,
    classifier: Arc<PostClassifier>,
    metrics: Arc<Metrics>,
}

impl ComponentRegistry {
    /// 辞書を読み込み、分類器とメトリクスを初期化する。
    ///
    /// # Errors
    /// 辞書ファイルの読み込み・検証、またはメトリクス登録に失敗した場合。
    pub fn build(config: Config) -> Result<Self> {
        let dictionary = match config.dictionary_path() {
            Some(path) => KeywordDictionary::from_path(path)
                .with_context(|| format!("failed to load dictionary {}", path.display()))?,
            None => KeywordDictionary::builtin(),
        };
        info!(
            populated = dictionary.populated_categories().count(),
            custom = config.dictionary_path().is_some(),
            "keyword dictionary loaded"
        );

        let classifier = Arc::new(PostClassifier::new(
            dictionary,
            config.classifier_settings(),
        ));
        let metrics = Arc::new(Metrics::standalone().context("failed to register metrics")?);

        Ok(Self {
            config: Arc::new(config),
            classifier,
            metrics,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn classifier(&self) -> Arc<PostClassifier> {
        Arc::clone(&self.classifier)
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }
}

#[derive(Serialize)]
struct ClassifyOutput<'a> {
    caption: &'a str,
    tags: Vec<ClassificationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scores: Option<Vec<CategoryScore>>,
}

/// サブコマンドを実行し、結果を JSON で `out` に書く。
///
/// # Errors
/// 入力ファイルの読み書き、バッチ処理、出力の書き込みに失敗した場合。
pub async fn run<W: Write>(command: Command, registry: &ComponentRegistry, out: &mut W) -> Result<()> {
    match command {
        Command::Classify { caption, scores } => {
            let classifier = registry.classifier();
            let output = ClassifyOutput {
                caption: &caption,
                tags: classifier.tags_for(Some(caption.as_str())),
                scores: scores.then(|| classifier.score_all(&caption)),
            };
            write_json(out, &output)
        }
        Command::Validate { cases } => {
            let cases = load_cases(&cases)?;
            let report = crate::evaluation::validate(&registry.classifier(), &cases);
            write_json(out, &report)
        }
        Command::Backfill {
            posts,
            output,
            limit,
            metrics,
        } => {
            let store = Arc::new(InMemoryPostStore::from_json_path(&posts)?);
            let service = TaggingService::new(
                registry.classifier(),
                Arc::clone(&store),
                Arc::clone(&store),
                registry.config().tagging_settings(),
                registry.metrics(),
            );

            let report = service
                .tag_untagged_posts(limit)
                .await
                .context("backfill failed")?;

            if let Some(path) = output {
                write_posts(&path, &store).await?;
                info!(path = %path.display(), "tagged posts written");
            }
            write_json(out, &report)?;
            if metrics {
                out.write_all(registry.metrics().render().as_bytes())?;
            }
            Ok(())
        }
    }
}

async fn write_posts(path: &Path, store: &InMemoryPostStore) -> Result<()> {
    let body = serde_json::to_vec_pretty(&store.posts()).context("failed to serialize posts")?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("failed to write posts to {}", path.display()))
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to write JSON output")?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PostRecord;

    fn registry() -> ComponentRegistry {
        ComponentRegistry::build(Config::default()).unwrap()
    }

    #[test]
    fn parses_backfill_arguments() {
        let cli = Cli::try_parse_from([
            "caption-tagger",
            "backfill",
            "posts.json",
            "--output",
            "out.json",
            "--limit",
            "10",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Backfill {
                posts: PathBuf::from("posts.json"),
                output: Some(PathBuf::from("out.json")),
                limit: Some(10),
                metrics: false,
            }
        );
    }

    #[tokio::test]
    async fn classify_prints_tags() {
        let mut out = Vec::new();
        run(
            Command::Classify {
                caption: "Mới mua iPhone từ Apple Store".into(),
                scores: false,
            },
            &registry(),
            &mut out,
        )
        .await
        .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["tags"][0]["tag"], "technology");
        assert!(value.get("scores").is_none());
    }

    #[tokio::test]
    async fn backfill_writes_tagged_posts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("posts.json");
        let output = dir.path().join("tagged.json");
        let posts = vec![
            PostRecord::new("a", Some("Tối nay đi xem phim bom tấn ở rạp")),
            PostRecord::new("b", Some("Hôm nay trời đẹp quá")),
        ];
        std::fs::write(&input, serde_json::to_vec(&posts).unwrap()).unwrap();

        let mut out = Vec::new();
        run(
            Command::Backfill {
                posts: input,
                output: Some(output.clone()),
                limit: None,
                metrics: true,
            },
            &registry(),
            &mut out,
        )
        .await
        .unwrap();

        let written: Vec<PostRecord> =
            serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(written[0].tags, Some(vec!["Phim ảnh".to_string()]));
        assert_eq!(written[1].tags, None);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\"tagged\": 1"));
        assert!(text.contains("tagger_tag_writes_total"));
    }
}
