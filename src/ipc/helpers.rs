use serde_json::json;

use crate::view::SortDir;

pub fn parse_search(params: &serde_json::Value) -> String {
    params
        .get("search")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

pub fn parse_dir(params: &serde_json::Value) -> Result<SortDir, serde_json::Value> {
    SortDir::parse(params.get("sortDir").and_then(|v| v.as_str()))
        .ok_or_else(|| json!({ "field": "sortDir", "allowed": ["asc", "desc"] }))
}
