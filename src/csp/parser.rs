use std::collections::HashMap;

use crate::errors::ScanError;

/// Source expressions of one directive that matter for script capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceList {
    pub unsafe_inline: bool,
    pub unsafe_eval: bool,
    pub strict_dynamic: bool,
    pub nonce: bool,
    pub hash: bool,
    pub none: bool,
    pub wildcard: bool,
    pub data_scheme: bool,
    pub blob_scheme: bool,
    pub sources: Vec<String>,
}

impl SourceList {
    fn parse(values: &[&str]) -> Result<Self, ScanError> {
        let mut list = SourceList::default();
        for raw in values {
            let v = raw.to_ascii_lowercase();
            if v.starts_with('\'') != (v.len() > 1 && v.ends_with('\'')) {
                return Err(ScanError::CspParse(format!("unbalanced quotes in source '{}'", raw)));
            }
            match v.as_str() {
                "'unsafe-inline'" => list.unsafe_inline = true,
                "'unsafe-eval'" => list.unsafe_eval = true,
                "'strict-dynamic'" => list.strict_dynamic = true,
                "'none'" => list.none = true,
                "*" => list.wildcard = true,
                "data:" => list.data_scheme = true,
                "blob:" => list.blob_scheme = true,
                _ if v.starts_with("'nonce-") => list.nonce = true,
                _ if v.starts_with("'sha256-") || v.starts_with("'sha384-") || v.starts_with("'sha512-") => {
                    list.hash = true
                }
                _ => {}
            }
            list.sources.push(raw.to_string());
        }
        Ok(list)
    }

    /// `'unsafe-inline'` is ignored when a nonce, hash or `'strict-dynamic'`
    /// is present.
    pub fn inline_effective(&self) -> bool {
        self.unsafe_inline && !self.nonce && !self.hash && !self.strict_dynamic && !self.none
    }
}

/// One serialized policy, directive name to source list. Duplicate
/// directives keep the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPolicy {
    pub raw: String,
    pub directives: HashMap<String, SourceList>,
}

impl ParsedPolicy {
    pub fn get(&self, name: &str) -> Option<&SourceList> {
        self.directives.get(name)
    }

    /// `script-src`, falling back to `default-src`.
    pub fn script_sources(&self) -> Option<&SourceList> {
        self.get("script-src").or_else(|| self.get("default-src"))
    }

    pub fn style_sources(&self) -> Option<&SourceList> {
        self.get("style-src").or_else(|| self.get("default-src"))
    }
}

fn valid_directive_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Parse a single policy (no commas).
pub fn parse_policy(value: &str) -> Result<ParsedPolicy, ScanError> {
    if value.chars().any(|c| c.is_control() && c != '\t') {
        return Err(ScanError::CspParse("control characters in policy".into()));
    }
    let mut policy = ParsedPolicy {
        raw: value.trim().to_string(),
        directives: HashMap::new(),
    };
    for part in value.split(';') {
        let mut tokens = part.split_whitespace();
        let Some(name) = tokens.next() else {
            continue;
        };
        let name = name.to_ascii_lowercase();
        if !valid_directive_name(&name) {
            return Err(ScanError::CspParse(format!("invalid directive name '{}'", name)));
        }
        let values: Vec<&str> = tokens.collect();
        let list = SourceList::parse(&values)?;
        policy.directives.entry(name).or_insert(list);
    }
    if policy.directives.is_empty() {
        return Err(ScanError::CspParse("policy has no directives".into()));
    }
    Ok(policy)
}

/// A header value may carry several comma-joined policies.
pub fn parse_header(value: &str) -> Result<Vec<ParsedPolicy>, ScanError> {
    value
        .split(',')
        .filter(|p| !p.trim().is_empty())
        .map(parse_policy)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script_src_self() {
        let p = parse_policy("script-src 'self'; object-src 'none'").unwrap();
        let script = p.script_sources().unwrap();
        assert!(!script.unsafe_inline);
        assert!(!script.inline_effective());
        assert!(p.get("object-src").unwrap().none);
    }

    #[test]
    fn test_default_src_fallback() {
        let p = parse_policy("default-src 'self' 'unsafe-inline' data:").unwrap();
        let script = p.script_sources().unwrap();
        assert!(script.inline_effective());
        assert!(script.data_scheme);
    }

    #[test]
    fn test_nonce_disables_unsafe_inline() {
        let p = parse_policy("script-src 'unsafe-inline' 'nonce-abc123'").unwrap();
        assert!(!p.script_sources().unwrap().inline_effective());
        let p = parse_policy("script-src 'unsafe-inline' 'strict-dynamic'").unwrap();
        assert!(!p.script_sources().unwrap().inline_effective());
    }

    #[test]
    fn test_duplicate_directive_keeps_first() {
        let p = parse_policy("script-src 'none'; script-src 'unsafe-inline'").unwrap();
        assert!(p.script_sources().unwrap().none);
    }

    #[test]
    fn test_malformed_policies() {
        assert!(parse_policy("").is_err());
        assert!(parse_policy("script_src! 'self'").is_err());
        assert!(parse_policy("script-src 'unsafe-inline").is_err());
        assert!(parse_policy("script-src 'self'\u{0}").is_err());
    }

    #[test]
    fn test_comma_joined_header() {
        let policies = parse_header("script-src 'unsafe-inline', default-src 'self'").unwrap();
        assert_eq!(policies.len(), 2);
    }
}
