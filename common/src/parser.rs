//! APIレスポンスパーサー
//!
//! 生成APIのレスポンス（JSONのみを返すよう指示しても前置きやコードブロックが
//! 付くことがある）から、JSONオブジェクトを1つ取り出す。
//!
//! 抽出手順（最初に成功したものを採用）:
//! 1. 前後の空白と ```json ... ``` のフェンスを除去
//! 2. 残りをそのままJSONとしてパース
//! 3. `{` `}` の対応を数えながら走査し、最初にパースできた `{...}` を採用
//! 4. いずれも失敗したらエラー

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// エラーに含めるレスポンスの最大文字数
const SNIPPET_CHARS: usize = 500;

const FENCE: &str = "```";

/// レスポンスからJSONオブジェクトを取り出す
///
/// # Examples
/// ```
/// use freight_extract_common::parse_object;
///
/// let obj = parse_object("Sure, here is the data: {\"a\":1} Thanks!").unwrap();
/// assert_eq!(obj["a"], 1);
/// ```
pub fn parse_object(response: &str) -> Result<Map<String, Value>> {
    let text = strip_code_fence(response);

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return Ok(map);
    }

    if let Some(map) = first_balanced_object(text) {
        return Ok(map);
    }

    let snippet: String = text.chars().take(SNIPPET_CHARS).collect();
    tracing::error!(response = %snippet, "JSONの抽出に失敗");
    Err(Error::Parse {
        message: "JSONオブジェクトが見つかりません".into(),
        snippet,
    })
}

/// 前後の空白とコードフェンス（言語タグ付き可）を除去
fn strip_code_fence(response: &str) -> &str {
    let mut text = response.trim();

    if let Some(rest) = text.strip_prefix(FENCE) {
        // ```json のようなタグを読み飛ばす
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        text = &rest[tag_len..];
    }

    if let Some(rest) = text.strip_suffix(FENCE) {
        text = rest;
    }

    text.trim()
}

/// 括弧の深さを追跡し、最上位の `{...}` を先頭から順に試す
///
/// 文字列リテラル中の括弧は区別しない。
fn first_balanced_object(text: &str) -> Option<Map<String, Value>> {
    let mut depth = 0usize;
    let mut start = None;

    for (i, c) in text.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        let candidate = &text[s..=i];
                        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
                            return Some(map);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    None
}
