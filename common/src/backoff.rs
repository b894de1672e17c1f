//! レート制限時の待機時間算出
//!
//! APIのレート制限エラーメッセージ（例: "Please try again in 9m13.824s"）から
//! 再試行までの待機秒数を求める。副作用なし。

use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

/// 提示された待機時間に上乗せする余裕（秒）
pub const SAFETY_MARGIN_SECS: u64 = 5;

/// メッセージを解釈できない場合の待機時間（秒）
pub const DEFAULT_WAIT_SECS: u64 = 600;

lazy_static! {
    static ref RETRY_AFTER: Regex =
        Regex::new(r"Please try again in (\d+)m([\d.]+)s").expect("valid regex");
}

/// 待機秒数を算出
///
/// `M分S秒` を秒に換算して小数点以下を切り捨て、余裕分を加える。
/// パターンに一致しない場合は `DEFAULT_WAIT_SECS`。
///
/// # Examples
/// ```
/// use freight_extract_common::advise_wait_secs;
///
/// assert_eq!(advise_wait_secs("Please try again in 9m13.824s"), 558);
/// assert_eq!(advise_wait_secs("service unavailable"), 600);
/// ```
pub fn advise_wait_secs(message: &str) -> u64 {
    let Some(caps) = RETRY_AFTER.captures(message) else {
        return DEFAULT_WAIT_SECS;
    };

    let minutes = caps[1].parse::<u64>();
    let seconds = caps[2].parse::<f64>();
    match (minutes, seconds) {
        (Ok(m), Ok(s)) if s.is_finite() => {
            let total = m as f64 * 60.0 + s;
            total.floor() as u64 + SAFETY_MARGIN_SECS
        }
        _ => DEFAULT_WAIT_SECS,
    }
}

/// 待機時間を `Duration` で返す
pub fn advise_wait(message: &str) -> Duration {
    Duration::from_secs(advise_wait_secs(message))
}
