use std::path::{Component, Path};

use serde_yaml::Value;

use crate::errors::ScanError;

/// Keys whose values are filesystem paths.
const PATH_KEYS: &[&str] = &["output_dir", "wordlists"];

const BLOCKED_TARGET_SCHEMES: &[&str] = &["javascript:", "data:", "file:", "vbscript:", "blob:"];

/// Reject values that would escape the working tree, point the scanner at a
/// non-web origin, or smuggle extra request headers.
pub fn validate_security_patterns(value: &Value) -> Result<(), ScanError> {
    walk(value, &mut Vec::new())
}

fn walk(value: &Value, path: &mut Vec<String>) -> Result<(), ScanError> {
    match value {
        Value::String(s) => check_string(s, path),
        Value::Mapping(map) => {
            for (k, v) in map {
                path.push(k.as_str().unwrap_or("?").to_string());
                walk(v, path)?;
                path.pop();
            }
            Ok(())
        }
        Value::Sequence(seq) => {
            for (i, v) in seq.iter().enumerate() {
                path.push(format!("[{}]", i));
                walk(v, path)?;
                path.pop();
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Innermost mapping key, skipping sequence indices.
fn field_name(path: &[String]) -> &str {
    path.iter()
        .rev()
        .find(|p| !p.starts_with('['))
        .map(String::as_str)
        .unwrap_or("")
}

fn check_string(s: &str, path: &[String]) -> Result<(), ScanError> {
    let location = if path.is_empty() { "root".to_string() } else { path.join(".") };
    let reject = |what: &str| Err(ScanError::Config(format!("{} at config path: {}", what, location)));

    if s.contains('\0') {
        return reject("NUL byte");
    }

    let field = field_name(path);
    if PATH_KEYS.contains(&field) && escapes_tree(s) {
        return reject(&format!("Path traversal in '{}'", s));
    }
    if field == "target" {
        let lower = s.trim_start().to_ascii_lowercase();
        if let Some(scheme) = BLOCKED_TARGET_SCHEMES.iter().find(|p| lower.starts_with(*p)) {
            return reject(&format!("Target scheme '{}' is not scannable", scheme));
        }
    }
    if field == "user_agent" && s.chars().any(|c| c.is_control()) {
        return reject("Control character in user agent");
    }
    Ok(())
}

fn escapes_tree(raw: &str) -> bool {
    let normalized = raw.replace('\\', "/");
    Path::new(&normalized)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(yaml: &str) -> Result<(), ScanError> {
        validate_security_patterns(&serde_yaml::from_str::<Value>(yaml).unwrap())
    }

    #[test]
    fn test_safe_config_passes() {
        assert!(check("target: https://example.com\nscan:\n  evasion: light\n  max_payloads: 50").is_ok());
        assert!(check("evidence:\n  output_dir: ./results/run-1").is_ok());
    }

    #[test]
    fn test_output_dir_traversal_blocked() {
        let err = check("evidence:\n  output_dir: ../../etc").unwrap_err();
        assert!(err.to_string().contains("evidence.output_dir"));
        assert!(check("evidence:\n  output_dir: 'results\\..\\..\\etc'").is_err());
    }

    #[test]
    fn test_wordlist_traversal_blocked() {
        let err = check("payloads:\n  wordlists:\n    - lists/extra.txt\n    - '../../secret.txt'").unwrap_err();
        assert!(err.to_string().contains("payloads.wordlists.[1]"));
    }

    #[test]
    fn test_non_web_targets_blocked() {
        assert!(check("target: 'javascript:alert(1)'").is_err());
        assert!(check("target: 'file:///etc/passwd'").is_err());
        assert!(check("target: 'data:text/html,<h1>hi</h1>'").is_err());
    }

    #[test]
    fn test_payload_looking_strings_elsewhere_pass() {
        // Markup in free-form values is normal for this tool.
        assert!(check("stealth:\n  user_agent: 'Mozilla/5.0 <script>'").is_ok());
        assert!(check("notes: '../x'").is_ok());
    }

    #[test]
    fn test_header_injection_in_user_agent_blocked() {
        assert!(check("stealth:\n  user_agent: \"UA\\r\\nX-Evil: 1\"").is_err());
    }
}
