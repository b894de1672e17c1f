use thiserror::Error;

#[derive(Error, Debug)]
pub enum FreightError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。環境変数 {0} を設定するか `freight-extract config --set-api-key YOUR_KEY` で設定してください")]
    MissingApiKey(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("入力ファイルが不正: {0}")]
    InvalidInput(String),

    #[error("レート制限による再試行が上限に達しました ({attempts}回)")]
    RetriesExhausted { attempts: u32 },

    #[error("API呼び出しエラー: {0}")]
    RemoteCall(String),

    #[error("チェックポイントエラー: {0}")]
    Checkpoint(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] freight_extract_common::Error),
}

impl FreightError {
    /// バッチ全体を中断すべき設定系のエラーか
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FreightError::Config(_)
                | FreightError::MissingApiKey(_)
                | FreightError::FileNotFound(_)
                | FreightError::InvalidInput(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FreightError>;
