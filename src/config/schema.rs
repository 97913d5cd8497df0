use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "target": { "type": "string", "format": "uri" },
            "scan": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "fuzz_forms": { "type": "boolean" },
                    "fuzz_url": { "type": "boolean" },
                    "max_forms": { "type": "integer", "minimum": 0 },
                    "max_params": { "type": "integer", "minimum": 0 },
                    "max_payloads": { "type": "integer", "minimum": 1 },
                    "max_payloads_per_point": { "type": "integer", "minimum": 1 },
                    "synthetic_params": { "type": "boolean" },
                    "csp_aware": { "type": "boolean" },
                    "seed": { "type": "integer", "minimum": 0 },
                    "dwell_timeout_ms": { "type": "integer", "minimum": 1 },
                    "evasion": { "type": "string", "enum": ["off", "light", "aggressive"] }
                }
            },
            "stealth": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "user_agent": { "type": "string" },
                    "ua_rotation": { "type": "string", "enum": ["session", "per-attempt"] },
                    "pacing_ms": { "type": "integer", "minimum": 0 },
                    "jitter_pct": { "type": "number", "minimum": 0, "maximum": 1 },
                    "warmup_requests": { "type": "integer", "minimum": 0 },
                    "warmup_wait_ms": { "type": "integer", "minimum": 0 }
                }
            },
            "browser": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "headless": { "type": "boolean" },
                    "navigation_timeout_ms": { "type": "integer", "minimum": 1 },
                    "navigation_retries": { "type": "integer", "minimum": 0 },
                    "backoff_ms": { "type": "integer", "minimum": 0 }
                }
            },
            "payloads": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "wordlists": { "type": "array", "items": { "type": "string" } },
                    "wordlist_mode": { "type": "string", "enum": ["extend", "replace"] }
                }
            },
            "evidence": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "output_dir": { "type": "string" },
                    "trace_on_hit": { "type": "boolean" }
                }
            },
            "scoring": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "severity_policy": { "type": "string", "enum": ["default", "owasp", "cvss"] }
                }
            }
        }
    })
});
