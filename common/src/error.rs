//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// レスポンスから構造化オブジェクトを取り出せなかった
    #[error("Parse error: {message} (response: {snippet})")]
    Parse { message: String, snippet: String },

    /// スキーマ制約違反（複数件まとめて返す）
    #[error("Validation error: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
