//! Freight Extract Common Library
//!
//! 外部APIやファイルI/Oに依存しない抽出ロジック:
//! 待機時間算出・レスポンスパース・港コード照合・検証・精度評価

pub mod types;
pub mod error;
pub mod backoff;
pub mod parser;
pub mod ports;
pub mod prompts;
pub mod schema;
pub mod evaluate;

pub use types::{ExtractionRecord, InputItem, PortReferenceEntry};
pub use error::{Error, Result};
pub use backoff::{advise_wait, advise_wait_secs};
pub use parser::parse_object;
pub use ports::{PortCodeResolver, PortLookupTable, PortOverrides, ResolvedPort};
pub use prompts::{build_extraction_prompt, build_port_codes_context};
pub use schema::validate_record;
pub use evaluate::{compare_values, evaluate, EvaluationReport};
