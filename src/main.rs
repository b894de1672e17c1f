use clap::Parser;
use freight_extract::{cli, config, error, extractor, logging};
use freight_extract_common::{
    build_port_codes_context, evaluate, prompts::DEFAULT_MAX_PORTS, InputItem, PortCodeResolver,
    PortOverrides,
};
use cli::{Cli, Commands};
use config::Config;
use error::{FreightError, Result};
use extractor::{BatchOptions, BatchOrchestrator, ChatCompletionClient, CheckpointStore, TokioSleeper};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("\n✗ {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Extract {
            input,
            output,
            ports,
            checkpoint,
            delay_ms,
            model,
            overrides,
            no_builtin_overrides,
        } => {
            println!("📦 freight-extract - 一括抽出");
            println!("開始: {}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));

            // 1. 入力・参照データ読み込み（ここまでで失敗したらAPIは呼ばない）
            println!("[1/4] 入力を読み込み中...");
            let items = load_items(&input)?;
            println!("✔ {}件のメール\n", items.len());

            println!("[2/4] 港コード参照データを読み込み中...");
            require_file(&ports)?;
            let reference = PortCodeResolver::load_reference(&ports)?;
            let mut port_overrides = if no_builtin_overrides {
                PortOverrides::empty()
            } else {
                PortOverrides::builtin()
            };
            if let Some(path) = overrides {
                require_file(&path)?;
                let json = std::fs::read_to_string(&path)?;
                port_overrides = port_overrides.merged(PortOverrides::from_json(&json)?);
            }
            let resolver = PortCodeResolver::from_reference(&reference, &port_overrides);
            let port_context = build_port_codes_context(&reference, DEFAULT_MAX_PORTS);
            println!(
                "✔ {}件の参照データ（{}コード、上書き{}件）\n",
                reference.len(),
                resolver.table().len(),
                port_overrides.len()
            );

            let api_key = config.get_api_key(cli.ai_provider)?;
            let model = model.unwrap_or_else(|| config.model_for(cli.ai_provider));
            let client = ChatCompletionClient::new(
                &config.base_url_for(cli.ai_provider),
                &api_key,
                &model,
                config.temperature,
                config.max_tokens,
                config.timeout_seconds,
            )
            .map_err(|e| FreightError::Config(e.to_string()))?;

            // 2. 抽出
            println!("[3/4] 抽出中... (モデル: {})", client.model());
            let options = BatchOptions {
                inter_item_delay: Duration::from_millis(delay_ms.unwrap_or(config.inter_item_delay_ms)),
                ..Default::default()
            };
            let orchestrator = BatchOrchestrator::new(
                client,
                TokioSleeper::new(true),
                resolver,
                port_context,
                CheckpointStore::new(checkpoint),
                options,
            );
            let report = orchestrator.run(&items).await;
            println!("✔ 抽出完了\n");

            // 3. 保存
            println!("[4/4] 結果を保存中...");
            orchestrator.finish(&output, &report)?;
            println!("✔ 結果を保存: {}", output.display());

            println!("\n処理結果:");
            println!("  件数: {}", report.records.len());
            if report.resumed_from > 0 {
                println!("  再開位置: {}件目から", report.resumed_from + 1);
            }
            println!("  今回処理: {}件", report.processed);
            println!("  成功: {}件", report.processed - report.failures.len());
            println!("  失敗: {}件", report.failures.len());
            println!("  所要時間: {:.1}秒", report.elapsed.as_secs_f64());

            if !report.failures.is_empty() {
                println!("\n空レコードで置き換えたメール:");
                for failure in &report.failures {
                    println!("  - {} [{}] {}", failure.id, failure.stage, failure.reason);
                }
            }

            println!("\n✅ 完了");
        }

        Commands::Evaluate { predictions, truth, top } => {
            println!("📊 freight-extract - 精度評価\n");

            let predictions = load_objects(&predictions)?;
            let ground_truth = load_objects(&truth)?;
            let report = evaluate(&predictions, &ground_truth);

            println!("項目別正解率:");
            for score in &report.fields {
                println!(
                    "  {:<24} {:>6.2}% ({}/{})",
                    score.field,
                    score.accuracy(),
                    score.correct,
                    score.total
                );
            }
            println!("\n総合正解率: {:.2}% [{}]", report.overall_accuracy(), report.rating());

            if !report.missing_ids.is_empty() {
                println!("\n抽出結果がないid: {}", report.missing_ids.join(", "));
            }

            if !report.mismatches.is_empty() {
                println!("\n不一致（{}件中 先頭{}件）:", report.mismatches.len(), top.min(report.mismatches.len()));
                for mismatch in report.mismatches.iter().take(top) {
                    println!(
                        "  {} {}: 抽出={} 正解={}",
                        mismatch.id, mismatch.field, mismatch.predicted, mismatch.truth
                    );
                }
            }
        }

        Commands::Checkpoint { path, info, clear } => {
            let store = CheckpointStore::new(path);

            if info || !clear {
                // デフォルトまたは--info: 情報表示
                match store.info() {
                    Ok(Some(info)) => {
                        println!("チェックポイント情報:");
                        println!("  パス: {}", store.path().display());
                        println!("  件数: {}", info.records);
                        println!("  次の再開位置: {}件目", info.last_processed_index + 2);
                        println!("  サイズ: {} bytes", info.size_bytes);
                    }
                    Ok(None) => println!("チェックポイントが存在しません: {}", store.path().display()),
                    Err(e) => println!("チェックポイント読み込みエラー: {}", e),
                }
            }

            if clear {
                match store.clear() {
                    Ok(true) => println!("✔ チェックポイントを削除しました: {}", store.path().display()),
                    Ok(false) => println!("チェックポイントが存在しません"),
                    Err(e) => println!("チェックポイント削除エラー: {}", e),
                }
            }
        }

        Commands::Config { set_api_key, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                let provider = cli.ai_provider;
                println!("設定:");
                println!("  プロバイダ: {:?}", provider);
                println!("  モデル: {}", config.model_for(provider));
                println!("  APIエンドポイント: {}", config.base_url_for(provider));
                println!("  temperature: {}", config.temperature);
                println!("  max_tokens: {}", config.max_tokens);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  メール間待機: {}ms", config.inter_item_delay_ms);
                println!(
                    "  APIキー: {}",
                    if config.get_api_key(provider).is_ok() { "設定済み" } else { "未設定" }
                );
            }
        }
    }

    Ok(())
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(FreightError::FileNotFound(path.display().to_string()))
    }
}

/// 入力メールJSONを読み込み
fn load_items(path: &Path) -> Result<Vec<InputItem>> {
    require_file(path)?;
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| FreightError::InvalidInput(format!("{}: {}", path.display(), e)))
}

/// 任意のJSONオブジェクト配列を読み込み（評価用）
fn load_objects(path: &Path) -> Result<Vec<Map<String, Value>>> {
    require_file(path)?;
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| FreightError::InvalidInput(format!("{}: {}", path.display(), e)))
}
