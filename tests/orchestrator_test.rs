//! 一括抽出の統合テスト
//!
//! 台本どおりに応答するクライアントと、待機時間を記録するだけの待機処理で
//! 再開・失敗の吸収・レート制限の再試行・チェックポイント保存を検証

use async_trait::async_trait;
use freight_extract::extractor::{
    BatchOptions, BatchOrchestrator, BatchReport, CheckpointState, CheckpointStore,
    CompletionClient, CompletionError, FailureStage, Sleeper,
};
use freight_extract_common::{
    build_port_codes_context, ExtractionRecord, InputItem, PortCodeResolver, PortOverrides,
    PortReferenceEntry,
};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

const RATE_LIMIT_MESSAGE: &str =
    "Rate limit reached for model `llama-3.3-70b-versatile`. Please try again in 1m2.5s.";
const RATE_LIMIT_WAIT: Duration = Duration::from_secs(67);
const INTER_ITEM_DELAY: Duration = Duration::from_secs(1);

type Reply = Result<String, CompletionError>;

/// idごとに台本どおり応答するクライアント
///
/// 台本が尽きたら成功応答を返す。呼び出し時点のチェックポイントの位置も記録する。
struct ScriptedClient {
    ids: Vec<String>,
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
    checkpoint_path: PathBuf,
    observed: Mutex<Vec<(String, Option<u64>)>>,
}

impl ScriptedClient {
    fn new(items: &[InputItem], checkpoint_path: &Path) -> Self {
        Self {
            ids: items.iter().map(|i| i.id.clone()).collect(),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            checkpoint_path: checkpoint_path.to_path_buf(),
            observed: Mutex::new(Vec::new()),
        }
    }

    fn script(self, id: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), replies.into());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, id: &str) -> usize {
        self.calls().iter().filter(|c| *c == id).count()
    }

    fn checkpoint_seen_by(&self, id: &str) -> Option<u64> {
        self.observed
            .lock()
            .unwrap()
            .iter()
            .find(|(seen, _)| seen == id)
            .and_then(|(_, index)| *index)
    }
}

fn success_reply(id: &str) -> String {
    let n: f64 = id.trim_start_matches("EMAIL_").parse().unwrap_or(0.0);
    format!(
        "```json\n{{\"product_line\": \"pl_sea_import_lcl\", \"origin_port_code\": \"HKHKG\", \
         \"origin_port_name\": \"HK\", \"destination_port_code\": \"inmaa\", \
         \"destination_port_name\": \"Madras\", \"incoterm\": \"fob\", \
         \"cargo_weight_kg\": {}, \"cargo_cbm\": 1.234, \"is_dangerous\": false}}\n```",
        n * 100.5
    )
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, prompt: &str) -> Reply {
        let id = self
            .ids
            .iter()
            .find(|id| prompt.contains(id.as_str()))
            .cloned()
            .expect("プロンプトにidが含まれていない");
        self.calls.lock().unwrap().push(id.clone());

        let checkpoint = std::fs::read_to_string(&self.checkpoint_path)
            .ok()
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
            .and_then(|v| v["last_processed_index"].as_u64());
        self.observed.lock().unwrap().push((id.clone(), checkpoint));

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(|replies| replies.pop_front());
        scripted.unwrap_or_else(|| Ok(success_reply(&id)))
    }
}

#[derive(Default)]
struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn count(&self, duration: Duration) -> usize {
        self.waits.lock().unwrap().iter().filter(|d| **d == duration).count()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

fn reference() -> Vec<PortReferenceEntry> {
    [
        ("HKHKG", "Hong Kong"),
        ("INMAA", "Chennai"),
        ("INMAA", "Chennai ICD"),
        ("CNSHA", "Shanghai"),
    ]
    .iter()
    .map(|(code, name)| PortReferenceEntry {
        code: code.to_string(),
        name: name.to_string(),
    })
    .collect()
}

fn items(n: usize) -> Vec<InputItem> {
    (1..=n)
        .map(|i| InputItem {
            id: format!("EMAIL_{:03}", i),
            subject: format!("RFQ EMAIL_{:03} HK to Chennai", i),
            body: "Please quote LCL FOB Hong Kong to Chennai ICD.".to_string(),
        })
        .collect()
}

type TestOrchestrator = BatchOrchestrator<Arc<ScriptedClient>, Arc<RecordingSleeper>>;

fn orchestrator(
    client: Arc<ScriptedClient>,
    sleeper: Arc<RecordingSleeper>,
    checkpoint_path: &Path,
) -> TestOrchestrator {
    let reference = reference();
    BatchOrchestrator::new(
        client,
        sleeper,
        PortCodeResolver::from_reference(&reference, &PortOverrides::empty()),
        build_port_codes_context(&reference, 47),
        CheckpointStore::new(checkpoint_path),
        BatchOptions {
            inter_item_delay: INTER_ITEM_DELAY,
            ..Default::default()
        },
    )
}

async fn run_fresh(
    inputs: &[InputItem],
    checkpoint_path: &Path,
) -> (BatchReport, Arc<ScriptedClient>, TestOrchestrator) {
    let client = Arc::new(ScriptedClient::new(inputs, checkpoint_path));
    let orch = orchestrator(client.clone(), Arc::new(RecordingSleeper::default()), checkpoint_path);
    (orch.run(inputs).await, client, orch)
}

fn ids(records: &[ExtractionRecord]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

#[tokio::test]
async fn test_one_record_per_item_in_order() {
    let dir = tempdir().expect("Failed to create temp dir");
    let checkpoint_path = dir.path().join("checkpoint.json");
    let inputs = items(12);

    let client = Arc::new(ScriptedClient::new(&inputs, &checkpoint_path));
    let sleeper = Arc::new(RecordingSleeper::default());
    let report = orchestrator(client.clone(), sleeper.clone(), &checkpoint_path)
        .run(&inputs)
        .await;

    assert_eq!(ids(&report.records), ids_of(&inputs));
    assert!(report.failures.is_empty());
    assert_eq!(report.resumed_from, 0);
    assert_eq!(report.processed, 12);
    assert_eq!(client.calls().len(), 12);

    // メール間の待機は最後のメールの後には入らない
    assert_eq!(sleeper.count(INTER_ITEM_DELAY), 11);

    let first = &report.records[0];
    assert_eq!(first.origin_port_code.as_deref(), Some("HKHKG"));
    assert_eq!(first.origin_port_name.as_deref(), Some("Hong Kong"));
    assert_eq!(first.destination_port_code.as_deref(), Some("INMAA"));
    assert_eq!(first.destination_port_name.as_deref(), Some("Chennai"));
    assert_eq!(first.incoterm.as_deref(), Some("FOB"));
    assert_eq!(first.cargo_weight_kg, Some(100.5));
    assert_eq!(first.cargo_cbm, Some(1.23));
}

fn ids_of(inputs: &[InputItem]) -> Vec<String> {
    inputs.iter().map(|i| i.id.clone()).collect()
}

#[tokio::test]
async fn test_checkpoint_saved_every_fifth_item_and_cleared() {
    let dir = tempdir().expect("Failed to create temp dir");
    let checkpoint_path = dir.path().join("checkpoint.json");
    let inputs = items(12);

    let (report, client, orch) = run_fresh(&inputs, &checkpoint_path).await;
    assert_eq!(report.records.len(), 12);

    for id in ["EMAIL_001", "EMAIL_002", "EMAIL_005"] {
        assert_eq!(client.checkpoint_seen_by(id), None, "{} の時点で保存済み", id);
    }
    // 5件目の後に保存 → 6件目の呼び出し時点で位置4
    assert_eq!(client.checkpoint_seen_by("EMAIL_006"), Some(4));
    assert_eq!(client.checkpoint_seen_by("EMAIL_010"), Some(4));
    assert_eq!(client.checkpoint_seen_by("EMAIL_011"), Some(9));
    assert_eq!(client.checkpoint_seen_by("EMAIL_012"), Some(9));

    // 最後の2件も含めて出力まで残す
    let resume = CheckpointStore::new(&checkpoint_path).load().unwrap();
    assert_eq!(resume.start_index, 12);
    assert_eq!(resume.results, report.records);

    // 出力に成功したら削除
    let output = dir.path().join("output.json");
    orch.finish(&output, &report).unwrap();
    assert!(output.exists());
    assert!(!checkpoint_path.exists());
}

#[tokio::test]
async fn test_resume_matches_uninterrupted_run() {
    let inputs = items(12);

    let full_dir = tempdir().expect("Failed to create temp dir");
    let (uninterrupted, _, _) = run_fresh(&inputs, &full_dir.path().join("checkpoint.json")).await;

    // 7件目の後で中断した状態を再現
    let dir = tempdir().expect("Failed to create temp dir");
    let checkpoint_path = dir.path().join("checkpoint.json");
    CheckpointStore::new(&checkpoint_path)
        .save(&CheckpointState {
            results: uninterrupted.records[..7].to_vec(),
            last_processed_index: 6,
        })
        .unwrap();

    let (resumed, client, orch) = run_fresh(&inputs, &checkpoint_path).await;

    assert_eq!(resumed.records, uninterrupted.records);
    assert_eq!(resumed.resumed_from, 7);
    assert_eq!(resumed.processed, 5);
    assert_eq!(
        client.calls(),
        vec!["EMAIL_008", "EMAIL_009", "EMAIL_010", "EMAIL_011", "EMAIL_012"]
    );

    let output = dir.path().join("output.json");
    orch.finish(&output, &resumed).unwrap();
    let written: Vec<ExtractionRecord> =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written, uninterrupted.records);
    assert!(!checkpoint_path.exists());
}

#[tokio::test]
async fn test_failures_become_null_records() {
    let dir = tempdir().expect("Failed to create temp dir");
    let checkpoint_path = dir.path().join("checkpoint.json");
    let inputs = items(8);

    let client = ScriptedClient::new(&inputs, &checkpoint_path)
        .script("EMAIL_003", vec![Ok("I could not find any shipment details.".into())])
        .script("EMAIL_005", vec![Err(CompletionError::Failed("API error 500: boom".into()))])
        .script("EMAIL_007", vec![Ok(r#"{"product_line": "pl_air_import"}"#.into())]);
    let client = Arc::new(client);
    let report = orchestrator(client.clone(), Arc::new(RecordingSleeper::default()), &checkpoint_path)
        .run(&inputs)
        .await;

    assert_eq!(ids(&report.records), ids_of(&inputs));
    for (idx, record) in report.records.iter().enumerate() {
        let failed = matches!(idx, 2 | 4 | 6);
        assert_eq!(record.is_null(), failed, "{}", record.id);
    }

    let stages: Vec<(String, FailureStage)> = report
        .failures
        .iter()
        .map(|f| (f.id.clone(), f.stage))
        .collect();
    assert_eq!(
        stages,
        vec![
            ("EMAIL_003".to_string(), FailureStage::Parse),
            ("EMAIL_005".to_string(), FailureStage::Remote),
            ("EMAIL_007".to_string(), FailureStage::Validation),
        ]
    );

    // 失敗したメールも再試行しない
    assert_eq!(client.calls_for("EMAIL_005"), 1);
}

#[tokio::test]
async fn test_rate_limit_waits_and_retries() {
    let dir = tempdir().expect("Failed to create temp dir");
    let checkpoint_path = dir.path().join("checkpoint.json");
    let inputs = items(4);

    let limited = || Err(CompletionError::RateLimited(RATE_LIMIT_MESSAGE.into()));
    let client = ScriptedClient::new(&inputs, &checkpoint_path)
        .script("EMAIL_002", vec![limited(), limited()])
        .script("EMAIL_004", (0..10).map(|_| limited()).collect());
    let client = Arc::new(client);
    let sleeper = Arc::new(RecordingSleeper::default());
    let report = orchestrator(client.clone(), sleeper.clone(), &checkpoint_path)
        .run(&inputs)
        .await;

    // 2回待って3回目で成功
    assert_eq!(client.calls_for("EMAIL_002"), 3);
    assert!(!report.records[1].is_null());

    // 上限5回で諦めて空レコード、最後の試行の後は待たない
    assert_eq!(client.calls_for("EMAIL_004"), 5);
    assert!(report.records[3].is_null());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].stage, FailureStage::Remote);

    assert_eq!(sleeper.count(RATE_LIMIT_WAIT), 2 + 4);
    assert_eq!(sleeper.count(INTER_ITEM_DELAY), 3);
}

#[tokio::test]
async fn test_unusable_checkpoint_is_ignored() {
    let inputs = items(6);

    let cases = vec![
        // 件数不一致
        CheckpointState {
            results: vec![ExtractionRecord::null("EMAIL_001")],
            last_processed_index: 3,
        },
        // 入力より多い
        CheckpointState {
            results: items(9).iter().map(|i| ExtractionRecord::null(&i.id)).collect(),
            last_processed_index: 8,
        },
        // 別の入力のチェックポイント
        CheckpointState {
            results: vec![ExtractionRecord::null("OTHER_001"), ExtractionRecord::null("OTHER_002")],
            last_processed_index: 1,
        },
    ];

    for state in cases {
        let dir = tempdir().expect("Failed to create temp dir");
        let checkpoint_path = dir.path().join("checkpoint.json");
        CheckpointStore::new(&checkpoint_path).save(&state).unwrap();

        let (report, client, _) = run_fresh(&inputs, &checkpoint_path).await;
        assert_eq!(report.resumed_from, 0);
        assert_eq!(client.calls().len(), 6);
        assert_eq!(ids(&report.records), ids_of(&inputs));
    }
}

#[tokio::test]
async fn test_corrupt_checkpoint_is_ignored() {
    let dir = tempdir().expect("Failed to create temp dir");
    let checkpoint_path = dir.path().join("checkpoint.json");
    std::fs::write(&checkpoint_path, "{ truncated").unwrap();
    let inputs = items(3);

    let (report, _, _) = run_fresh(&inputs, &checkpoint_path).await;
    assert_eq!(report.records.len(), 3);
    assert!(report.failures.is_empty());

    // 壊れたファイルは今回の結果で上書きされる
    assert_eq!(CheckpointStore::new(&checkpoint_path).load().unwrap().start_index, 3);
}

#[tokio::test]
async fn test_empty_input() {
    let dir = tempdir().expect("Failed to create temp dir");
    let checkpoint_path = dir.path().join("checkpoint.json");

    let (report, client, _) = run_fresh(&[], &checkpoint_path).await;
    assert!(report.records.is_empty());
    assert!(client.calls().is_empty());
    assert!(!checkpoint_path.exists());
}

/// 書き込めないパスを作る（親がディレクトリではなく通常ファイル）
fn unwritable_path(dir: &Path, file_name: &str) -> PathBuf {
    let blocker = dir.join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    blocker.join(file_name)
}

#[tokio::test]
async fn test_output_write_failure_keeps_checkpoint() {
    let dir = tempdir().expect("Failed to create temp dir");
    let checkpoint_path = dir.path().join("checkpoint.json");
    let inputs = items(7);

    let (report, client, orch) = run_fresh(&inputs, &checkpoint_path).await;
    assert_eq!(client.calls().len(), 7);

    let result = orch.finish(&unwritable_path(dir.path(), "output.json"), &report);
    assert!(result.is_err());

    // 全件分が残っているので再実行はAPIを呼ばずに出力できる
    let resume = CheckpointStore::new(&checkpoint_path).load().unwrap();
    assert_eq!(resume.start_index, 7);
    assert_eq!(resume.results, report.records);

    let (rerun, rerun_client, rerun_orch) = run_fresh(&inputs, &checkpoint_path).await;
    assert!(rerun_client.calls().is_empty());
    assert_eq!(rerun.records, report.records);

    let output = dir.path().join("output.json");
    rerun_orch.finish(&output, &rerun).unwrap();
    assert!(output.exists());
    assert!(!checkpoint_path.exists());
}

#[tokio::test]
async fn test_checkpoint_write_failure_does_not_abort_batch() {
    let dir = tempdir().expect("Failed to create temp dir");
    let checkpoint_path = unwritable_path(dir.path(), "checkpoint.json");
    let inputs = items(12);

    let (report, client, orch) = run_fresh(&inputs, &checkpoint_path).await;

    assert_eq!(ids(&report.records), ids_of(&inputs));
    assert!(report.failures.is_empty());
    assert_eq!(client.calls(), ids_of(&inputs));
    assert!(!checkpoint_path.exists());

    // 削除の失敗も出力を妨げない
    let output = dir.path().join("output.json");
    orch.finish(&output, &report).unwrap();
    assert!(output.exists());
}
