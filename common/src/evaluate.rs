//! 抽出精度評価モジュール
//!
//! 抽出結果と正解データを `id` で突き合わせ、項目ごとの正解率を集計する。

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// 評価対象の項目（`id` 以外の9項目）
pub const EVALUATED_FIELDS: &[&str] = &[
    "product_line",
    "origin_port_code",
    "origin_port_name",
    "destination_port_code",
    "destination_port_name",
    "incoterm",
    "cargo_weight_kg",
    "cargo_cbm",
    "is_dangerous",
];

/// 項目ごとの集計
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldScore {
    pub field: String,
    pub correct: usize,
    pub total: usize,
}

impl FieldScore {
    /// 正解率（%）
    pub fn accuracy(&self) -> f64 {
        percentage(self.correct, self.total)
    }
}

/// 不一致1件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMismatch {
    pub id: String,
    pub field: String,
    pub predicted: Value,
    pub truth: Value,
}

/// 総合評価
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Exceptional,
    Strong,
    Acceptable,
    NeedsImprovement,
}

impl Rating {
    pub fn from_accuracy(overall: f64) -> Self {
        if overall >= 90.0 {
            Rating::Exceptional
        } else if overall >= 80.0 {
            Rating::Strong
        } else if overall >= 70.0 {
            Rating::Acceptable
        } else {
            Rating::NeedsImprovement
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rating::Exceptional => write!(f, "EXCEPTIONAL"),
            Rating::Strong => write!(f, "STRONG"),
            Rating::Acceptable => write!(f, "ACCEPTABLE"),
            Rating::NeedsImprovement => write!(f, "NEEDS IMPROVEMENT"),
        }
    }
}

/// 評価結果
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    pub fields: Vec<FieldScore>,
    pub mismatches: Vec<FieldMismatch>,
    /// 抽出結果が存在しなかった正解データのid
    pub missing_ids: Vec<String>,
}

impl EvaluationReport {
    /// 全項目の正解率（%）
    pub fn overall_accuracy(&self) -> f64 {
        let correct = self.fields.iter().map(|f| f.correct).sum();
        let total = self.fields.iter().map(|f| f.total).sum();
        percentage(correct, total)
    }

    pub fn rating(&self) -> Rating {
        Rating::from_accuracy(self.overall_accuracy())
    }
}

fn percentage(correct: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64 * 100.0
    }
}

/// 値の比較
///
/// - 両方null → 一致、片方null → 不一致
/// - 数値は小数点以下2桁に丸めて比較
/// - 文字列は前後空白を除き大文字小文字を区別しない
pub fn compare_values(predicted: &Value, truth: &Value) -> bool {
    match (predicted, truth) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(p), Value::Number(t)) => match (p.as_f64(), t.as_f64()) {
            (Some(p), Some(t)) => crate::schema::round2(p) == crate::schema::round2(t),
            _ => p == t,
        },
        (Value::String(p), Value::String(t)) => p.trim().to_lowercase() == t.trim().to_lowercase(),
        _ => predicted == truth,
    }
}

/// 抽出結果と正解データを比較
pub fn evaluate(predictions: &[Map<String, Value>], ground_truth: &[Map<String, Value>]) -> EvaluationReport {
    let lookup: HashMap<&str, &Map<String, Value>> = predictions
        .iter()
        .filter_map(|p| p.get("id").and_then(Value::as_str).map(|id| (id, p)))
        .collect();

    let mut fields: Vec<FieldScore> = EVALUATED_FIELDS
        .iter()
        .map(|f| FieldScore {
            field: f.to_string(),
            ..Default::default()
        })
        .collect();
    let mut mismatches = Vec::new();
    let mut missing_ids = Vec::new();

    for truth in ground_truth {
        let id = truth.get("id").and_then(Value::as_str).unwrap_or_default();

        let Some(pred) = lookup.get(id) else {
            missing_ids.push(id.to_string());
            for score in &mut fields {
                score.total += 1;
            }
            continue;
        };

        for score in &mut fields {
            score.total += 1;
            let predicted = pred.get(&score.field).unwrap_or(&Value::Null);
            let expected = truth.get(&score.field).unwrap_or(&Value::Null);

            if compare_values(predicted, expected) {
                score.correct += 1;
            } else {
                mismatches.push(FieldMismatch {
                    id: id.to_string(),
                    field: score.field.clone(),
                    predicted: predicted.clone(),
                    truth: expected.clone(),
                });
            }
        }
    }

    EvaluationReport {
        fields,
        mismatches,
        missing_ids,
    }
}
