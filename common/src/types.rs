//! 抽出処理の型定義
//!
//! - InputItem: 入力メール1件
//! - ExtractionRecord: メール1件から得た船積み情報（最終出力）
//! - PortReferenceEntry: 港コード参照データの1行

use serde::{Deserialize, Serialize};

/// 入力メール
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputItem {
    pub id: String,
    pub subject: String,
    pub body: String,
}

/// 抽出結果
///
/// 値がない項目は `null` として出力する（キーは常に全項目そろえる）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub id: String,

    #[serde(default)]
    pub product_line: Option<String>,

    #[serde(default)]
    pub origin_port_code: Option<String>,

    #[serde(default)]
    pub origin_port_name: Option<String>,

    #[serde(default)]
    pub destination_port_code: Option<String>,

    #[serde(default)]
    pub destination_port_name: Option<String>,

    #[serde(default)]
    pub incoterm: Option<String>,

    #[serde(default)]
    pub cargo_weight_kg: Option<f64>,

    #[serde(default)]
    pub cargo_cbm: Option<f64>,

    #[serde(default)]
    pub is_dangerous: bool,
}

impl ExtractionRecord {
    /// 処理失敗時の空レコード（全項目なし、危険物フラグfalse）
    pub fn null(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// 空レコードかどうか
    pub fn is_null(&self) -> bool {
        *self == Self::null(self.id.clone())
    }
}

/// 港コード参照データ（UN/LOCODE）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortReferenceEntry {
    pub code: String,
    pub name: String,
}
