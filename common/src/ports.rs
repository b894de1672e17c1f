//! 港コード照合モジュール
//!
//! 参照データ（UN/LOCODE一覧）から 港コード→正式名称 の表を一度だけ構築し、
//! AIが抽出した港コードを検証・補正する。
//!
//! 正式名称の選択規則（参照データの出現順に適用）:
//! 1. 手動オーバーライド表にあるコードは常にその名称
//! 2. それ以外は最初に出現した名称を採用し、後続の名称が
//!    - 現在の名称が `/` を含み、後続が含まない場合
//!    - `/` を含まず、現在より短い場合
//!    に置き換える

use crate::error::{Error, Result};
use crate::types::PortReferenceEntry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// 手動オーバーライド表
///
/// 参照データ上で表記が割れている港の正式名称を固定する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortOverrides {
    names: HashMap<String, String>,
}

impl PortOverrides {
    /// オーバーライドなし
    pub fn empty() -> Self {
        Self::default()
    }

    /// 組み込みの正式名称表
    pub fn builtin() -> Self {
        let pairs: &[(&str, &str)] = &[
            ("INMAA", "Chennai ICD"),
            ("KRPUS", "Busan"),
            ("MYPKG", "Port Klang"),
            ("INBLR", "Bangalore ICD"),
            ("THBKK", "Bangkok"),
            ("CNTXG", "Xingang"),
            ("CNSZX", "Shenzhen"),
            ("SGSIN", "Singapore"),
            ("HKHKG", "Hong Kong"),
            ("CNSHA", "Shanghai"),
            ("INNSA", "Nhava Sheva"),
            ("INWFD", "ICD Whitefield"),
            ("INMUN", "Mundra ICD"),
            ("JPYOK", "Yokohama"),
            ("THLCH", "Laem Chabang"),
            ("AEJEA", "Jebel Ali"),
            ("PHMNL", "Manila"),
            ("VNSGN", "Ho Chi Minh"),
            ("BDDAC", "Dhaka"),
            ("ITGOA", "Genoa"),
            ("TRAMR", "Ambarli"),
            ("TRIZM", "Izmir"),
            ("TWKEL", "Keelung"),
            ("USHOU", "Houston"),
            ("USLAX", "Los Angeles"),
            ("ZACPT", "Cape Town"),
            ("DEHAM", "Hamburg"),
            ("CNQIN", "Qingdao"),
            ("CNNSA", "Nansha"),
            ("CNGZG", "Guangzhou"),
            ("IDSUB", "Surabaya"),
            ("JPOSA", "Osaka"),
            ("SAJED", "Jeddah"),
        ];
        Self::from_pairs(pairs.iter().copied())
    }

    /// (コード, 名称) の組から構築（コードは大文字化）
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let names = pairs
            .into_iter()
            .map(|(code, name)| (code.trim().to_uppercase(), name.to_string()))
            .collect();
        Self { names }
    }

    /// JSON文字列（{"CODE": "Name", ...}）から読み込み
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, String> = serde_json::from_str(json)?;
        Ok(Self::from_pairs(raw.iter().map(|(k, v)| (k.as_str(), v.as_str()))))
    }

    /// 別の表を重ねる（同じコードは `other` を優先）
    pub fn merged(mut self, other: PortOverrides) -> Self {
        self.names.extend(other.names);
        self
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.names.get(code).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// 港コード→正式名称の表
///
/// 反復順はコードの初出順（部分一致の優先順位に使う）。
#[derive(Debug, Clone, Default)]
pub struct PortLookupTable {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl PortLookupTable {
    /// 参照データから表を構築
    pub fn build(entries: &[PortReferenceEntry], overrides: &PortOverrides) -> Self {
        let mut table = Self::default();

        for entry in entries {
            let code = entry.code.trim().to_uppercase();
            let name = entry.name.as_str();

            if let Some(fixed) = overrides.get(&code) {
                table.upsert(code, fixed.to_string());
                continue;
            }

            match table.index.get(&code) {
                None => table.upsert(code, name.to_string()),
                Some(&pos) => {
                    let current = &table.entries[pos].1;
                    if is_better_name(name, current) {
                        table.entries[pos].1 = name.to_string();
                    }
                }
            }
        }

        table
    }

    fn upsert(&mut self, code: String, name: String) {
        match self.index.get(&code) {
            Some(&pos) => self.entries[pos].1 = name,
            None => {
                self.index.insert(code.clone(), self.entries.len());
                self.entries.push((code, name));
            }
        }
    }

    /// コードの正式名称
    pub fn get(&self, code: &str) -> Option<&str> {
        self.index.get(code).map(|&pos| self.entries[pos].1.as_str())
    }

    /// 初出順に (コード, 名称) を返す
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(c, n)| (c.as_str(), n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 後続の名称が現在の名称より正式名称らしいか
fn is_better_name(candidate: &str, current: &str) -> bool {
    let candidate_compound = candidate.contains('/');
    if !candidate_compound && current.contains('/') {
        return true;
    }
    !candidate_compound && candidate.chars().count() < current.chars().count()
}

/// 照合結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPort {
    pub code: Option<String>,
    pub name: Option<String>,
}

impl ResolvedPort {
    fn unknown() -> Self {
        Self::default()
    }

    fn found(code: &str, name: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            name: Some(name.to_string()),
        }
    }
}

/// 抽出された港コードを参照表で検証・補正する
#[derive(Debug, Clone)]
pub struct PortCodeResolver {
    table: PortLookupTable,
}

impl PortCodeResolver {
    pub fn new(table: PortLookupTable) -> Self {
        Self { table }
    }

    /// 参照データと手動オーバーライドから構築
    pub fn from_reference(entries: &[PortReferenceEntry], overrides: &PortOverrides) -> Self {
        Self::new(PortLookupTable::build(entries, overrides))
    }

    /// 参照データJSONファイルを読み込み
    pub fn load_reference(path: &Path) -> Result<Vec<PortReferenceEntry>> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "港コード参照ファイルが見つかりません: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<PortReferenceEntry> = serde_json::from_str(&content)?;
        Ok(entries)
    }

    pub fn table(&self) -> &PortLookupTable {
        &self.table
    }

    /// 港コードを照合
    ///
    /// 1. 完全一致 → 表の正式名称
    /// 2. 部分一致（どちらかがもう一方を含む）→ 表の反復順で最初の一致
    /// 3. 一致なし → コード・名称とも None
    pub fn resolve(&self, code: Option<&str>) -> ResolvedPort {
        let Some(code) = code.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty()) else {
            return ResolvedPort::unknown();
        };

        if let Some(name) = self.table.get(&code) {
            return ResolvedPort::found(&code, name);
        }

        tracing::warn!(code = %code, "港コードが参照データにありません");

        match self
            .table
            .iter()
            .find(|(ref_code, _)| ref_code.contains(code.as_str()) || code.contains(ref_code))
        {
            Some((ref_code, ref_name)) => {
                tracing::info!(from = %code, to = %ref_code, "港コードを部分一致で補正");
                ResolvedPort::found(ref_code, ref_name)
            }
            None => ResolvedPort::unknown(),
        }
    }

    /// 抽出結果の出発港・到着港を照合して書き換える
    ///
    /// コードがない・空文字の港は書き換えず、抽出された名称をそのまま残す。
    /// コードが文字列でない場合は検証エラー。
    pub fn apply(&self, extracted: &mut Map<String, Value>) -> Result<()> {
        let mut issues = Vec::new();

        for (code_key, name_key) in [
            ("origin_port_code", "origin_port_name"),
            ("destination_port_code", "destination_port_name"),
        ] {
            let code = match extracted.get(code_key) {
                None | Some(Value::Null) => continue,
                Some(Value::String(code)) if code.trim().is_empty() => continue,
                Some(Value::String(code)) => code.clone(),
                Some(other) => {
                    issues.push(format!("{} must be a string, got {}", code_key, other));
                    continue;
                }
            };

            let resolved = self.resolve(Some(&code));
            extracted.insert(code_key.into(), to_value(resolved.code));
            extracted.insert(name_key.into(), to_value(resolved.name));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(issues))
        }
    }
}

fn to_value(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}
