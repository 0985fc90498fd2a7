//! ラベル付きキャプションに対する分類精度の検証。
use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::metrics::{CaseMetrics, MetricsCalculator, MetricsSummary};
use crate::classification::{Category, ClassificationResult, PostClassifier};

/// 検証ケース。期待タグはタグ名か slug で書ける。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCase {
    pub caption: String,
    #[serde(default)]
    pub expected_tags: Vec<String>,
}

impl ValidationCase {
    #[must_use]
    pub fn new(caption: impl Into<String>, expected_tags: &[&str]) -> Self {
        Self {
            caption: caption.into(),
            expected_tags: expected_tags.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    fn expected_labels(&self) -> HashSet<String> {
        self.expected_tags
            .iter()
            .map(|tag| match tag.parse::<Category>() {
                Ok(category) => category.label().to_string(),
                // 未知のタグはそのまま残し、偽陰性として数える
                Err(_) => tag.trim().to_string(),
            })
            .collect()
    }
}

/// 1 ケース分の検証結果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseReport {
    pub caption: String,
    pub expected: Vec<String>,
    pub predicted: Vec<ClassificationResult>,
    #[serde(flatten)]
    pub metrics: CaseMetrics,
}

/// 検証セット全体の結果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub cases: Vec<CaseReport>,
    pub summary: MetricsSummary,
}

/// 分類器を検証セットにかけ、ケースごとの指標と平均を返す。
#[must_use]
pub fn validate(classifier: &PostClassifier, cases: &[ValidationCase]) -> ValidationReport {
    let mut calculator = MetricsCalculator::new();
    let mut reports = Vec::with_capacity(cases.len());

    for case in cases {
        let expected = case.expected_labels();
        let predicted = classifier.tags_for(Some(case.caption.as_str()));
        let predicted_labels: HashSet<String> = predicted
            .iter()
            .map(|result| result.label().to_string())
            .collect();
        let metrics = calculator.push(&expected, &predicted_labels);

        let mut expected_sorted: Vec<String> = expected.into_iter().collect();
        expected_sorted.sort();
        reports.push(CaseReport {
            caption: case.caption.clone(),
            expected: expected_sorted,
            predicted,
            metrics,
        });
    }

    let summary = calculator.finalize();
    info!(
        cases = summary.cases,
        average_f1 = summary.average_f1,
        exact_match_accuracy = summary.exact_match_accuracy,
        "validation finished"
    );

    ValidationReport {
        cases: reports,
        summary,
    }
}

/// JSON 配列の検証ケースを読み込む。
///
/// # Errors
/// ファイルを読めない場合、または JSON として不正な場合。
pub fn load_cases(path: &Path) -> Result<Vec<ValidationCase>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read validation cases from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse validation cases in {}", path.display()))
}
