use clap::{Parser, Subcommand};
use crate::ai_provider::AiProvider;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "freight-extract")]
#[command(about = "フォワーディングメール船積み情報抽出ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// AIプロバイダ (groq/openai)
    #[arg(long, default_value = "groq", global = true)]
    pub ai_provider: AiProvider,
}

#[derive(Subcommand)]
pub enum Commands {
    /// メールJSONから船積み情報を一括抽出
    Extract {
        /// 入力メールJSONファイル
        #[arg(short, long, default_value = "emails_input.json")]
        input: PathBuf,

        /// 出力JSONファイル
        #[arg(short, long, default_value = "output.json")]
        output: PathBuf,

        /// 港コード参照JSONファイル
        #[arg(short, long, default_value = "port_codes_reference.json")]
        ports: PathBuf,

        /// チェックポイントファイル
        #[arg(short, long, default_value = "checkpoint.json")]
        checkpoint: PathBuf,

        /// メール間の待機時間（ミリ秒、省略時は設定ファイルの値）
        #[arg(long)]
        delay_ms: Option<u64>,

        /// モデル名（省略時は設定ファイルまたはプロバイダ既定）
        #[arg(short, long)]
        model: Option<String>,

        /// 港名称の上書きJSONファイル（{"コード": "名称"}）
        #[arg(long)]
        overrides: Option<PathBuf>,

        /// 組み込みの港名称上書きを使わない
        #[arg(long)]
        no_builtin_overrides: bool,
    },

    /// 抽出結果を正解データと比較して精度を表示
    Evaluate {
        /// 抽出結果JSONファイル
        #[arg(short, long, default_value = "output.json")]
        predictions: PathBuf,

        /// 正解JSONファイル
        #[arg(short, long, default_value = "ground_truth.json")]
        truth: PathBuf,

        /// 表示する不一致の件数
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// チェックポイント管理
    Checkpoint {
        /// チェックポイントファイル
        #[arg(short, long, default_value = "checkpoint.json")]
        path: PathBuf,

        /// チェックポイント情報を表示
        #[arg(long)]
        info: bool,

        /// チェックポイントを削除
        #[arg(long)]
        clear: bool,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
