use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

/// 1 ケース分の適合率・再現率・F1。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CaseMetrics {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

impl CaseMetrics {
    /// 期待タグと予測タグを比較する。
    ///
    /// 両方が空なら完全一致とみなす。片方だけが空の場合、空でない側から見た指標は 0 になる。
    #[must_use]
    pub fn compare(expected: &HashSet<String>, predicted: &HashSet<String>) -> Self {
        if expected.is_empty() && predicted.is_empty() {
            return Self {
                precision: 1.0,
                recall: 1.0,
                f1: 1.0,
            };
        }

        #[allow(clippy::cast_precision_loss)]
        let true_positive = expected.intersection(predicted).count() as f32;
        #[allow(clippy::cast_precision_loss)]
        let precision = if predicted.is_empty() {
            0.0
        } else {
            true_positive / predicted.len() as f32
        };
        #[allow(clippy::cast_precision_loss)]
        let recall = if expected.is_empty() {
            0.0
        } else {
            true_positive / expected.len() as f32
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            precision,
            recall,
            f1,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct LabelStats {
    true_positive: usize,
    false_positive: usize,
    false_negative: usize,
    support: usize, // 期待タグに含まれた回数
}

/// ラベル単位の集計結果。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelSummary {
    pub support: usize,
    pub true_positive: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

/// 検証セット全体の集計。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub cases: usize,
    pub average_precision: f32,
    pub average_recall: f32,
    pub average_f1: f32,
    /// 期待タグ集合と予測タグ集合が完全に一致したケースの割合。
    pub exact_match_accuracy: f32,
    pub macro_f1: f32,
    pub per_label: BTreeMap<String, LabelSummary>,
}

impl Default for MetricsSummary {
    fn default() -> Self {
        Self {
            cases: 0,
            average_precision: 0.0,
            average_recall: 0.0,
            average_f1: 0.0,
            exact_match_accuracy: 0.0,
            macro_f1: 0.0,
            per_label: BTreeMap::new(),
        }
    }
}

/// ケースを順に登録して指標を集計する。
#[derive(Debug, Default)]
pub struct MetricsCalculator {
    per_label: BTreeMap<String, LabelStats>,
    cases: Vec<CaseMetrics>,
    exact_matches: usize,
}

impl MetricsCalculator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 期待タグと予測タグを登録し、そのケースの指標を返す。
    pub fn push(&mut self, expected: &HashSet<String>, predicted: &HashSet<String>) -> CaseMetrics {
        let metrics = CaseMetrics::compare(expected, predicted);
        self.cases.push(metrics);
        if expected == predicted {
            self.exact_matches += 1;
        }

        for label in expected.union(predicted) {
            let stats = self.per_label.entry(label.clone()).or_default();
            let in_expected = expected.contains(label);
            let in_predicted = predicted.contains(label);
            if in_expected {
                stats.support += 1;
            }
            match (in_expected, in_predicted) {
                (true, true) => stats.true_positive += 1,
                (false, true) => stats.false_positive += 1,
                (true, false) => stats.false_negative += 1,
                (false, false) => {}
            }
        }

        metrics
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn finalize(&self) -> MetricsSummary {
        if self.cases.is_empty() {
            return MetricsSummary::default();
        }

        let count = self.cases.len() as f32;
        let average = |select: fn(&CaseMetrics) -> f32| -> f32 {
            self.cases.iter().map(select).sum::<f32>() / count
        };

        let per_label: BTreeMap<String, LabelSummary> = self
            .per_label
            .iter()
            .map(|(label, stats)| (label.clone(), summarize_label(stats)))
            .collect();
        let macro_f1 = if per_label.is_empty() {
            0.0
        } else {
            per_label.values().map(|s| s.f1).sum::<f32>() / per_label.len() as f32
        };

        MetricsSummary {
            cases: self.cases.len(),
            average_precision: average(|m| m.precision),
            average_recall: average(|m| m.recall),
            average_f1: average(|m| m.f1),
            exact_match_accuracy: self.exact_matches as f32 / count,
            macro_f1,
            per_label,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize_label(stats: &LabelStats) -> LabelSummary {
    let tp = stats.true_positive as f32;
    let precision = if stats.true_positive + stats.false_positive > 0 {
        tp / (stats.true_positive + stats.false_positive) as f32
    } else {
        0.0
    };
    let recall = if stats.true_positive + stats.false_negative > 0 {
        tp / (stats.true_positive + stats.false_negative) as f32
    } else {
        0.0
    };
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    LabelSummary {
        support: stats.support,
        true_positive: stats.true_positive,
        false_positive: stats.false_positive,
        false_negative: stats.false_negative,
        precision,
        recall,
        f1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(labels: &[&str]) -> HashSet<String> {
        labels.iter().map(|l| (*l).to_string()).collect()
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn case_metrics_for_partial_overlap() {
        let metrics = CaseMetrics::compare(&set(&["a", "b"]), &set(&["a", "c", "d"]));
        assert!(close(metrics.precision, 1.0 / 3.0));
        assert!(close(metrics.recall, 0.5));
        assert!(close(metrics.f1, 0.4));
    }

    #[test]
    fn case_metrics_for_empty_sides() {
        let both_empty = CaseMetrics::compare(&set(&[]), &set(&[]));
        assert!(close(both_empty.f1, 1.0));

        let nothing_predicted = CaseMetrics::compare(&set(&["a"]), &set(&[]));
        assert!(close(nothing_predicted.precision, 0.0));
        assert!(close(nothing_predicted.recall, 0.0));

        let spurious = CaseMetrics::compare(&set(&[]), &set(&["a"]));
        assert!(close(spurious.f1, 0.0));
    }

    #[test]
    fn calculator_averages_cases() {
        let mut calculator = MetricsCalculator::new();
        calculator.push(&set(&["sports"]), &set(&["sports"]));
        calculator.push(&set(&["food"]), &set(&["sports"]));
        let summary = calculator.finalize();

        assert_eq!(summary.cases, 2);
        assert!(close(summary.average_precision, 0.5));
        assert!(close(summary.average_recall, 0.5));
        assert!(close(summary.exact_match_accuracy, 0.5));

        let sports = summary.per_label["sports"];
        assert_eq!(sports.true_positive, 1);
        assert_eq!(sports.false_positive, 1);
        assert_eq!(sports.support, 1);
        let food = summary.per_label["food"];
        assert_eq!(food.false_negative, 1);
        assert!(close(food.f1, 0.0));
    }

    #[test]
    fn empty_calculator_finalizes_to_default() {
        let summary = MetricsCalculator::new().finalize();
        assert_eq!(summary, MetricsSummary::default());
    }
}
