//! メール一括抽出モジュール
//!
//! メール1件ごとに以下を順に実行する:
//! プロンプト生成 → API呼び出し（レート制限時は待機して再試行）→ JSONパース
//! → 港コード照合 → 検証 → 結果追加
//!
//! どの段階で失敗しても空レコードで置き換えて次のメールへ進む。
//! 一定件数ごとにチェックポイントを保存し、結果の出力に成功した後で削除する。

pub mod checkpoint;
pub mod client;
pub mod sleeper;

pub use checkpoint::{write_json_atomic, CheckpointState, CheckpointStore, ResumePoint};
pub use client::{ChatCompletionClient, CompletionClient, CompletionError};
pub use sleeper::{Sleeper, TokioSleeper};

use crate::error::{FreightError, Result};
use freight_extract_common::{
    advise_wait, build_extraction_prompt, parse_object, validate_record, ExtractionRecord,
    InputItem, PortCodeResolver,
};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};

/// バッチ処理の設定
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// メール間の待機時間
    pub inter_item_delay: Duration,
    /// この件数ごとにチェックポイントを保存
    pub checkpoint_every: usize,
    /// レート制限時の最大試行回数（初回を含む）
    pub max_attempts: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            inter_item_delay: Duration::from_secs(1),
            checkpoint_every: 5,
            max_attempts: 5,
        }
    }
}

/// 失敗した段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Remote,
    Parse,
    Validation,
    Other,
}

impl FailureStage {
    fn of(error: &FreightError) -> Self {
        match error {
            FreightError::RetriesExhausted { .. } | FreightError::RemoteCall(_) => {
                FailureStage::Remote
            }
            FreightError::Common(freight_extract_common::Error::Parse { .. }) => FailureStage::Parse,
            FreightError::Common(freight_extract_common::Error::Validation(_)) => {
                FailureStage::Validation
            }
            _ => FailureStage::Other,
        }
    }
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::Remote => write!(f, "API呼び出し"),
            FailureStage::Parse => write!(f, "パース"),
            FailureStage::Validation => write!(f, "検証"),
            FailureStage::Other => write!(f, "その他"),
        }
    }
}

/// 空レコードで置き換えたメール
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub id: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// バッチ処理の結果
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// 入力順の抽出結果（入力件数と同数）
    pub records: Vec<ExtractionRecord>,
    /// 今回の実行で失敗したメール
    pub failures: Vec<ItemFailure>,
    /// チェックポイントから再開した位置（最初からなら0）
    pub resumed_from: usize,
    /// 今回の実行で処理した件数
    pub processed: usize,
    pub elapsed: Duration,
}

/// 一括抽出の実行器
pub struct BatchOrchestrator<C, S> {
    client: C,
    sleeper: S,
    resolver: PortCodeResolver,
    port_context: String,
    store: CheckpointStore,
    options: BatchOptions,
}

impl<C: CompletionClient, S: Sleeper> BatchOrchestrator<C, S> {
    pub fn new(
        client: C,
        sleeper: S,
        resolver: PortCodeResolver,
        port_context: String,
        store: CheckpointStore,
        options: BatchOptions,
    ) -> Self {
        Self {
            client,
            sleeper,
            resolver,
            port_context,
            store,
            options,
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// APIを呼び出す（レート制限時は待機して再試行）
    pub async fn call_with_backoff(&self, prompt: &str) -> Result<String> {
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.client.complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(CompletionError::Failed(msg)) => {
                    tracing::error!(error = %msg, "API呼び出しに失敗");
                    return Err(FreightError::RemoteCall(msg));
                }
                Err(CompletionError::RateLimited(msg)) => {
                    if attempt >= max_attempts {
                        tracing::error!(attempts = attempt, "レート制限の再試行上限に到達");
                        return Err(FreightError::RetriesExhausted { attempts: attempt });
                    }
                    let wait = advise_wait(&msg);
                    tracing::warn!(
                        "レート制限: {}秒待機します (試行 {}/{})",
                        wait.as_secs(),
                        attempt,
                        max_attempts
                    );
                    self.sleeper.sleep(wait).await;
                    tracing::info!("再試行します");
                }
            }
        }
    }

    /// メール1件を抽出（失敗はそのままエラーで返す）
    pub async fn extract_item(&self, item: &InputItem) -> Result<ExtractionRecord> {
        let prompt = build_extraction_prompt(&item.subject, &item.body, &self.port_context);
        tracing::debug!(id = %item.id, chars = prompt.len(), "プロンプト生成");

        let response = self.call_with_backoff(&prompt).await?;
        tracing::debug!(id = %item.id, chars = response.len(), "レスポンス受信");

        let mut extracted = parse_object(&response)?;
        extracted.insert("id".into(), Value::String(item.id.clone()));

        self.resolver.apply(&mut extracted)?;

        let record = validate_record(&item.id, &extracted)?;
        Ok(record)
    }

    /// メール1件を処理（失敗時は空レコード）
    pub async fn process_item(&self, item: &InputItem) -> (ExtractionRecord, Option<ItemFailure>) {
        match self.extract_item(item).await {
            Ok(record) => {
                tracing::info!(id = %item.id, "✓ 抽出成功");
                (record, None)
            }
            Err(e) => {
                let stage = FailureStage::of(&e);
                tracing::error!(id = %item.id, %stage, error = %e, "✗ 抽出失敗、空レコードで置き換えます");
                let failure = ItemFailure {
                    id: item.id.clone(),
                    stage,
                    reason: e.to_string(),
                };
                (ExtractionRecord::null(&item.id), Some(failure))
            }
        }
    }

    /// 全メールを処理
    ///
    /// チェックポイントがあれば続きから再開する。
    /// チェックポイントは削除しない（出力後に `finish` で削除する）。
    pub async fn run(&self, items: &[InputItem]) -> BatchReport {
        let started = Instant::now();
        let total = items.len();
        let resume = self.resume_point(items);
        let resumed_from = resume.start_index;
        let mut records = resume.results;
        let mut failures = Vec::new();

        if resumed_from > 0 {
            tracing::info!("チェックポイントから再開: {}/{}", resumed_from, total);
        }

        for (idx, item) in items.iter().enumerate().skip(resumed_from) {
            tracing::info!("進捗: {}/{}", idx + 1, total);

            let (record, failure) = self.process_item(item).await;
            records.push(record);
            failures.extend(failure);

            let every = self.options.checkpoint_every;
            if every > 0 && (idx + 1) % every == 0 {
                self.save_checkpoint(&records, idx);
            }

            if idx + 1 < total && !self.options.inter_item_delay.is_zero() {
                self.sleeper.sleep(self.options.inter_item_delay).await;
            }
        }

        // 出力ファイルを書くまで全件分をチェックポイントに残す
        let every = self.options.checkpoint_every;
        if every > 0 && total > resumed_from && total % every != 0 {
            self.save_checkpoint(&records, total - 1);
        }

        BatchReport {
            processed: total - resumed_from,
            records,
            failures,
            resumed_from,
            elapsed: started.elapsed(),
        }
    }

    /// 結果を出力ファイルに書き込み、成功したらチェックポイントを削除
    ///
    /// 書き込みに失敗した場合はチェックポイントを残すので、再実行すればAPIを呼ばずに出力できる。
    pub fn finish(&self, output: &Path, report: &BatchReport) -> Result<()> {
        write_json_atomic(output, &report.records)?;

        match self.store.clear() {
            Ok(true) => tracing::debug!(path = %self.store.path().display(), "チェックポイントを削除"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "チェックポイントの削除に失敗"),
        }
        Ok(())
    }

    /// 再開位置を決定（使えないチェックポイントは無視して最初から）
    fn resume_point(&self, items: &[InputItem]) -> ResumePoint {
        let resume = match self.store.load() {
            Ok(resume) => resume,
            Err(e) => {
                tracing::warn!(error = %e, "チェックポイントを読み込めません。最初から処理します");
                return ResumePoint::default();
            }
        };

        if resume.start_index > items.len() {
            tracing::warn!(
                "チェックポイントの件数 ({}) が入力件数 ({}) を超えています。最初から処理します",
                resume.start_index,
                items.len()
            );
            return ResumePoint::default();
        }

        let ids_match = resume
            .results
            .iter()
            .zip(items)
            .all(|(record, item)| record.id == item.id);
        if !ids_match {
            tracing::warn!("チェックポイントのidが入力と一致しません。最初から処理します");
            return ResumePoint::default();
        }

        resume
    }

    fn save_checkpoint(&self, records: &[ExtractionRecord], last_processed_index: usize) {
        let state = CheckpointState {
            results: records.to_vec(),
            last_processed_index,
        };
        match self.store.save(&state) {
            Ok(()) => tracing::info!("💾 チェックポイント保存: {}件", last_processed_index + 1),
            Err(e) => tracing::warn!(error = %e, "チェックポイントの保存に失敗（処理は継続）"),
        }
    }
}
