//! 待機処理
//!
//! レート制限待ち・メール間待機を差し替え可能にする。
//! テストでは実際に待たずに待機時間だけを記録する実装を使う。

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

/// 待機処理
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
impl<T: Sleeper + ?Sized> Sleeper for Arc<T> {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await
    }
}

/// この長さ以上の待機はカウントダウンを表示する
const COUNTDOWN_THRESHOLD: Duration = Duration::from_secs(30);

/// tokioタイマーによる待機
#[derive(Debug, Clone, Default)]
pub struct TokioSleeper {
    show_countdown: bool,
}

impl TokioSleeper {
    pub fn new(show_countdown: bool) -> Self {
        Self { show_countdown }
    }
}

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !self.show_countdown || duration < COUNTDOWN_THRESHOLD {
            tokio::time::sleep(duration).await;
            return;
        }

        // 表示は1秒ごとに更新するが、待機自体は1回の sleep で行う
        let bar = ProgressBar::new(duration.as_secs());
        bar.set_style(
            ProgressStyle::with_template("  再開まで {msg} [{bar:30}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let wait = tokio::time::sleep(duration);
        tokio::pin!(wait);
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let total = duration.as_secs();
        let mut elapsed = 0u64;

        loop {
            tokio::select! {
                _ = &mut wait => break,
                _ = ticker.tick() => {
                    let remaining = total.saturating_sub(elapsed);
                    bar.set_message(format!("{}m{:02}s", remaining / 60, remaining % 60));
                    bar.set_position(elapsed.min(total));
                    elapsed += 1;
                }
            }
        }

        bar.finish_and_clear();
    }
}
