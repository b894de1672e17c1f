//! プロンプト生成モジュール
//!
//! - build_port_codes_context: 港コード参照一覧のプロンプト断片
//! - build_extraction_prompt: メール1件分の抽出プロンプト

use crate::types::PortReferenceEntry;

/// プロンプトに載せる港コードの最大件数
pub const DEFAULT_MAX_PORTS: usize = 47;

/// 港コード参照一覧を生成
///
/// 参照データの先頭 `max_ports` 件を `CODE: Name` 形式で列挙する。
pub fn build_port_codes_context(ports: &[PortReferenceEntry], max_ports: usize) -> String {
    let list = ports
        .iter()
        .take(max_ports)
        .map(|p| format!("  {}: {}", p.code, p.name))
        .collect::<Vec<_>>()
        .join("\n");

    format!("**Port Codes Reference (UN/LOCODE):**\n{}", list)
}

/// 抽出プロンプトを生成
pub fn build_extraction_prompt(subject: &str, body: &str, port_codes_context: &str) -> String {
    format!(
        r#"You extract structured shipment details from freight forwarding emails. Apply every rule below.

**Email Subject:** {subject}
**Email Body:** {body}

{port_codes_context}

## Product line
- Identify the origin and destination port codes first; decide from the codes, not the names.
- Destination code starts with "IN" → "pl_sea_import_lcl".
- Origin code starts with "IN" → "pl_sea_export_lcl".

## Ports
- Codes are 5-letter UN/LOCODEs taken only from the reference above.
- Names must be the exact reference name for the chosen code.
- Port not in the reference → null code and null name.
- "via" / transshipment ports are ignored; use the direct origin → destination pair.
- When an ICD is mentioned together with its gateway port, the ICD is the destination.

## Incoterm
- One of FOB, CIF, CFR, EXW, DDP, DAP, FCA, CPT, CIP, DPU, uppercase.
- Missing or ambiguous ("FOB or CIF") → "FOB".
- Body wins over subject when they conflict.

## Cargo weight (cargo_weight_kg)
- lbs × 0.453592, tonnes/MT × 1000, kg as-is; round to 2 decimals.
- TBD / N/A / not mentioned → null. An explicit 0 stays 0.
- Several shipments → first shipment only.

## Cargo volume (cargo_cbm)
- CBM, cubic meters, m³ or RT (1 RT = 1 CBM); round to 2 decimals.
- Never compute volume from dimensions; dimensions only → null.
- TBD / N/A / not mentioned → null. Several shipments → first shipment only.

## Dangerous goods (is_dangerous)
- true for: DG, dangerous goods, hazardous, hazmat, IMO, IMDG, "Class <n>", "UN <n>",
  flammable, corrosive, toxic, explosive.
- false for: non-DG, non-hazardous, not dangerous, or no mention.

## Output
Return ONLY one raw JSON object, no markdown fences, no commentary, with exactly these keys:
{{
  "product_line": "pl_sea_import_lcl",
  "origin_port_code": "HKHKG",
  "origin_port_name": "Hong Kong",
  "destination_port_code": "INMAA",
  "destination_port_name": "Chennai ICD",
  "incoterm": "FOB",
  "cargo_weight_kg": 500.0,
  "cargo_cbm": 2.5,
  "is_dangerous": false
}}
Use JSON null (not the string "null") for missing values and true/false for booleans."#
    )
}
