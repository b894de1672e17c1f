//! チェックポイントモジュール
//!
//! 長時間バッチの途中経過をファイルに保存し、中断後に続きから再開する。
//! 書き込みは同じディレクトリの一時ファイルに書いてからリネームするため、
//! 書き込み中に落ちても既存のチェックポイントは壊れない。

use crate::error::{FreightError, Result};
use freight_extract_common::ExtractionRecord;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const DEFAULT_CHECKPOINT_FILE: &str = "checkpoint.json";

/// チェックポイントファイルの構造
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// 処理済みレコード（入力順）
    pub results: Vec<ExtractionRecord>,
    /// 最後に処理したメールの位置（0始まり）
    #[serde(alias = "last_processed")]
    pub last_processed_index: usize,
}

/// 再開位置
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumePoint {
    pub results: Vec<ExtractionRecord>,
    /// 次に処理するメールの位置
    pub start_index: usize,
}

/// チェックポイント情報（CLI表示用）
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointInfo {
    pub records: usize,
    pub last_processed_index: usize,
    pub size_bytes: u64,
}

/// チェックポイントの保存先
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// チェックポイントを読み込み
    ///
    /// ファイルがなければ空の結果と位置0を返す。
    /// 壊れている・件数が合わない場合はエラー。
    pub fn load(&self) -> Result<ResumePoint> {
        let Some(state) = self.read_state()? else {
            return Ok(ResumePoint::default());
        };

        if state.results.len() != state.last_processed_index + 1 {
            return Err(FreightError::Checkpoint(format!(
                "件数不一致: results={} last_processed_index={}",
                state.results.len(),
                state.last_processed_index
            )));
        }

        Ok(ResumePoint {
            start_index: state.last_processed_index + 1,
            results: state.results,
        })
    }

    fn read_state(&self) -> Result<Option<CheckpointState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let state: CheckpointState = serde_json::from_reader(reader).map_err(|e| {
            FreightError::Checkpoint(format!("{} の読み込みに失敗: {}", self.path.display(), e))
        })?;
        Ok(Some(state))
    }

    /// チェックポイントを保存（全体を上書き）
    pub fn save(&self, state: &CheckpointState) -> Result<()> {
        write_json_atomic(&self.path, state)
    }

    /// チェックポイントを削除
    ///
    /// 削除した場合 `Ok(true)`、もともと存在しない場合 `Ok(false)`。
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// チェックポイント情報
    pub fn info(&self) -> Result<Option<CheckpointInfo>> {
        let Some(state) = self.read_state()? else {
            return Ok(None);
        };
        let size_bytes = std::fs::metadata(&self.path)?.len();
        Ok(Some(CheckpointInfo {
            records: state.results.len(),
            last_processed_index: state.last_processed_index,
            size_bytes,
        }))
    }
}

/// JSONを一時ファイル経由で書き込む
///
/// 同じディレクトリに一時ファイルを作り、書き込み完了後にリネームする。
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut temp = NamedTempFile::new_in(&dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| FreightError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn records(n: usize) -> Vec<ExtractionRecord> {
        (0..n).map(|i| ExtractionRecord::null(format!("EMAIL_{:03}", i))).collect()
    }

    #[test]
    fn test_write_json_atomic_leaves_no_temp_files() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("out.json");
        write_json_atomic(&path, &records(2)).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let loaded: Vec<ExtractionRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, records(2));
    }

    #[test]
    fn test_write_json_atomic_overwrites() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("out.json");
        write_json_atomic(&path, &records(3)).unwrap();
        write_json_atomic(&path, &records(1)).unwrap();

        let loaded: Vec<ExtractionRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_legacy_key_accepted() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("checkpoint.json");
        let json = serde_json::json!({
            "results": records(5),
            "last_processed": 4
        });
        std::fs::write(&path, json.to_string()).unwrap();

        let resume = CheckpointStore::new(&path).load().unwrap();
        assert_eq!(resume.start_index, 5);
        assert_eq!(resume.results.len(), 5);
    }

    #[test]
    fn test_info() {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        assert!(store.info().unwrap().is_none());

        store
            .save(&CheckpointState {
                results: records(10),
                last_processed_index: 9,
            })
            .unwrap();

        let info = store.info().unwrap().expect("情報が取得できない");
        assert_eq!(info.records, 10);
        assert_eq!(info.last_processed_index, 9);
        assert!(info.size_bytes > 0);
    }
}
