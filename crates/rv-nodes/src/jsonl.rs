// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reads back the artifact format [`rv_core::ComparisonRecord::to_line_value`]
//! writes, for the nodes (Validate, Compare, Update) that aggregate or act
//! over already-streamed records (§4.6: "Compare/Validate/Save aggregate
//! over the JSONL").

use rv_core::{ComparisonRecord, RecordStage};
use rv_error::{ErrorCode, RvError};
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};

const STAGE_KEYS: [(&str, RecordStage); 3] = [
    ("extracted_at", RecordStage::Scanned),
    ("validated_at", RecordStage::Validated),
    ("compared_at", RecordStage::Compared),
];

/// Parse every non-empty line of `path` as one [`ComparisonRecord`].
///
/// Returns an empty vector when the file does not exist yet (an empty
/// catalog leaves no artifact, per §8's boundary behavior).
pub async fn read_jsonl(path: &Path) -> Result<Vec<ComparisonRecord>, RvError> {
    let bytes = match fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(path, e)),
    };
    let mut records = Vec::new();
    let mut lines = BufReader::new(bytes.as_slice()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_error(path, e))?
    {
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_record_line(&line)?);
    }
    Ok(records)
}

fn parse_record_line(line: &str) -> Result<ComparisonRecord, RvError> {
    let value: Value = serde_json::from_str(line).map_err(|e| parse_error(format!("invalid JSON line: {e}")))?;
    let obj = value.as_object().ok_or_else(|| parse_error("record line is not a JSON object"))?;

    let field = |key: &str| obj.get(key).cloned().unwrap_or(Value::Null);
    let from_value = |v: Value, what: &str| serde_json::from_value(v).map_err(|e| parse_error(format!("{what}: {e}")));

    let (_, stage) = STAGE_KEYS
        .iter()
        .find(|(key, _)| obj.contains_key(*key))
        .copied()
        .ok_or_else(|| parse_error("record line missing a stage timestamp key"))?;
    let timestamp_key = STAGE_KEYS.iter().find(|(_, s)| *s == stage).map(|(k, _)| *k).unwrap_or("extracted_at");

    Ok(ComparisonRecord {
        product_set_id: from_value(field("product_set_id"), "product_set_id")?,
        product_id: from_value(field("product_id"), "product_id")?,
        url: from_value(field("url"), "url")?,
        platform: from_value(field("platform"), "platform")?,
        db: from_value(field("db"), "db")?,
        fetch: from_value(field("fetch"), "fetch")?,
        comparison: from_value(field("comparison"), "comparison")?,
        matched: from_value(field("match"), "match")?,
        status: from_value(field("status"), "status")?,
        error: from_value(field("error"), "error")?,
        timestamp: from_value(field(timestamp_key), "timestamp")?,
        stage,
    })
}

fn parse_error(message: impl Into<String>) -> RvError {
    RvError::new(ErrorCode::Unknown, message.into())
}

fn io_error(path: &Path, source: std::io::Error) -> RvError {
    RvError::new(ErrorCode::Unknown, format!("reading result artifact: {source}")).with_context("path", path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_core::{PlatformId as Pid, ProductSet, SaleStatus};
    use uuid::Uuid as U;

    fn db_row() -> ProductSet {
        ProductSet {
            product_set_id: U::nil(),
            product_id: "A".into(),
            brand_id: "b1".into(),
            platform: Pid::new("oliveyoung"),
            link_url: "https://example.com/goods/A".into(),
            product_name: "토너".into(),
            thumbnail: String::new(),
            original_price: 10_000,
            discounted_price: 8_000,
            sale_status: SaleStatus::OnSale,
            auto_crawled: true,
        }
    }

    #[tokio::test]
    async fn round_trips_a_written_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let rec = ComparisonRecord::not_found(db_row(), "https://example.com/goods/A".into(), Pid::new("oliveyoung"), RecordStage::Scanned);
        let line = serde_json::to_string(&rec.to_line_value()).unwrap();
        tokio::fs::write(&path, format!("{line}\n")).await.unwrap();

        let records = read_jsonl(&path).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].product_set_id, rec.product_set_id);
        assert_eq!(records[0].stage, RecordStage::Scanned);
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-written.jsonl");
        let records = read_jsonl(&path).await.unwrap();
        assert!(records.is_empty());
    }
}
