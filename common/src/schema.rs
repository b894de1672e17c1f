//! 抽出結果の検証・正規化
//!
//! パース済みのJSONオブジェクトを型・値域・大文字小文字の制約で検証し、
//! `ExtractionRecord` に変換する。違反はまとめて `Error::Validation` で返す。

use crate::error::{Error, Result};
use crate::types::ExtractionRecord;
use serde_json::{Map, Value};

/// 許可する商品区分
pub const PRODUCT_LINES: &[&str] = &["pl_sea_import_lcl", "pl_sea_export_lcl"];

/// 抽出結果を検証して `ExtractionRecord` を作る
pub fn validate_record(id: &str, extracted: &Map<String, Value>) -> Result<ExtractionRecord> {
    let mut issues = Vec::new();

    let product_line = optional_string(extracted, "product_line", &mut issues);
    if let Some(line) = &product_line {
        if !PRODUCT_LINES.contains(&line.as_str()) {
            issues.push(format!("invalid product_line: {}", line));
        }
    }

    let origin_port_code = port_code(extracted, "origin_port_code", &mut issues);
    let destination_port_code = port_code(extracted, "destination_port_code", &mut issues);

    let incoterm = optional_string(extracted, "incoterm", &mut issues)
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty());

    let record = ExtractionRecord {
        id: id.to_string(),
        product_line,
        origin_port_code,
        origin_port_name: optional_string(extracted, "origin_port_name", &mut issues),
        destination_port_code,
        destination_port_name: optional_string(extracted, "destination_port_name", &mut issues),
        incoterm,
        cargo_weight_kg: rounded_number(extracted, "cargo_weight_kg", &mut issues),
        cargo_cbm: rounded_number(extracted, "cargo_cbm", &mut issues),
        is_dangerous: flag(extracted, "is_dangerous", &mut issues),
    };

    if issues.is_empty() {
        Ok(record)
    } else {
        Err(Error::Validation(issues))
    }
}

/// 小数点以下2桁に丸める
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn optional_string(map: &Map<String, Value>, key: &str, issues: &mut Vec<String>) -> Option<String> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            issues.push(format!("{} must be a string, got {}", key, other));
            None
        }
    }
}

fn port_code(map: &Map<String, Value>, key: &str, issues: &mut Vec<String>) -> Option<String> {
    let code = optional_string(map, key, issues)?;
    let code = code.trim().to_uppercase();
    if code.is_empty() {
        return None;
    }
    if code.chars().count() != 5 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        issues.push(format!("{} must be 5 letters: {}", key, code));
        return None;
    }
    Some(code)
}

fn rounded_number(map: &Map<String, Value>, key: &str, issues: &mut Vec<String>) -> Option<f64> {
    let value = match map.get(key) {
        None | Some(Value::Null) => return None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        Some(_) => None,
    };

    match value {
        Some(v) => Some(round2(v)),
        None => {
            issues.push(format!("{} must be a number, got {}", key, map[key]));
            None
        }
    }
}

fn flag(map: &Map<String, Value>, key: &str, issues: &mut Vec<String>) -> bool {
    match map.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) if n.as_i64() == Some(0) => false,
        Some(Value::Number(n)) if n.as_i64() == Some(1) => true,
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" => false,
            _ => {
                issues.push(format!("{} must be a boolean, got {:?}", key, s));
                false
            }
        },
        Some(other) => {
            issues.push(format!("{} must be a boolean, got {}", key, other));
            false
        }
    }
}
