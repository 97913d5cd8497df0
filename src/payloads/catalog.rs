use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ScanError;
use crate::models::candidate::Requirements;
use crate::models::context::ContextTag;
use crate::models::signal::SinkFamily;
use super::body::JS_PLACEHOLDER;
use super::builtin::BUILTIN_TEMPLATES;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadTemplate {
    pub id: String,
    pub body: String,
    pub requirements: Requirements,
    pub contexts: Vec<ContextTag>,
    /// Sink families this shape is known to reach.
    pub families: Vec<SinkFamily>,
    /// `builtin` or the wordlist file the template came from.
    pub origin: String,
}

impl PayloadTemplate {
    pub fn supports(&self, context: ContextTag) -> bool {
        self.contexts.contains(&context)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordlistMode {
    #[default]
    Extend,
    Replace,
}

impl std::str::FromStr for WordlistMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "extend" => Ok(Self::Extend),
            "replace" => Ok(Self::Replace),
            other => Err(format!("unknown wordlist mode '{}'", other)),
        }
    }
}

/// Read-only template index, shared across the run.
#[derive(Debug, Clone)]
pub struct PayloadCatalog {
    templates: Arc<Vec<PayloadTemplate>>,
}

impl PayloadCatalog {
    pub fn builtin() -> Self {
        let templates = BUILTIN_TEMPLATES
            .iter()
            .map(|t| PayloadTemplate {
                id: t.id.to_string(),
                body: t.body.to_string(),
                requirements: Requirements {
                    requires_inline: t.requires_inline,
                    needs_data: t.needs_data,
                    needs_blob: t.needs_blob,
                    needs_eval: false,
                },
                contexts: t.contexts.to_vec(),
                families: t.families.to_vec(),
                origin: "builtin".to_string(),
            })
            .collect();
        Self { templates: Arc::new(templates) }
    }

    pub fn from_templates(templates: Vec<PayloadTemplate>) -> Result<Self, ScanError> {
        if templates.is_empty() {
            return Err(ScanError::CatalogLoad("catalog contains no templates".into()));
        }
        Ok(Self { templates: Arc::new(templates) })
    }

    /// Build the session catalog from the built-ins and external wordlists.
    pub async fn load(wordlists: &[PathBuf], mode: WordlistMode) -> Result<Self, ScanError> {
        let mut templates = match mode {
            WordlistMode::Extend => Self::builtin().templates.as_ref().clone(),
            WordlistMode::Replace => Vec::new(),
        };

        for file in expand_wordlists(wordlists)? {
            let content = tokio::fs::read_to_string(&file).await.map_err(|e| {
                ScanError::CatalogLoad(format!("cannot read wordlist {}: {}", file.display(), e))
            })?;
            let parsed = parse_wordlist(&file, &content);
            info!(file = %file.display(), templates = parsed.len(), "Loaded wordlist");
            templates.extend(parsed);
        }

        let catalog = Self::from_templates(templates)?;
        debug!(templates = catalog.len(), mode = ?mode, "Payload catalog ready");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn templates(&self) -> &[PayloadTemplate] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&PayloadTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Templates compatible with `context`, in catalog order.
    pub fn for_context(&self, context: ContextTag) -> impl Iterator<Item = &PayloadTemplate> {
        self.templates.iter().filter(move |t| t.supports(context))
    }
}

/// Resolve files and directories (every `*.txt` inside, sorted) to files.
fn expand_wordlists(paths: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let pattern = path.join("*.txt");
            let pattern = pattern.to_string_lossy();
            let entries = glob::glob(&pattern)
                .map_err(|e| ScanError::CatalogLoad(format!("bad wordlist pattern {}: {}", pattern, e)))?;
            let mut found: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(ScanError::CatalogLoad(format!("wordlist not found: {}", path.display())));
        }
    }
    Ok(files)
}

struct Header {
    contexts: Vec<ContextTag>,
    requirements: Option<Requirements>,
    families: Vec<SinkFamily>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            contexts: ContextTag::ALL.to_vec(),
            requirements: None,
            families: Vec::new(),
        }
    }
}

/// Parse one wordlist. Header comments apply to every following line until
/// the next header of the same key.
pub fn parse_wordlist(file: &Path, content: &str) -> Vec<PayloadTemplate> {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "wordlist".to_string());
    let mut header = Header::default();
    let mut templates = Vec::new();

    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if let Some(comment) = line.trim_start().strip_prefix('#') {
            apply_header(&mut header, comment, file, lineno + 1);
            continue;
        }
        if !line.contains(JS_PLACEHOLDER) {
            warn!(file = %file.display(), line = lineno + 1, "Wordlist entry has no {{JS}} placeholder, skipped");
            continue;
        }

        let requirements = header.requirements.unwrap_or_else(|| infer_requirements(line));
        templates.push(PayloadTemplate {
            id: format!("{}-{}", stem, lineno + 1),
            body: line.to_string(),
            requirements,
            contexts: header.contexts.clone(),
            families: header.families.clone(),
            origin: file.display().to_string(),
        });
    }
    templates
}

fn apply_header(header: &mut Header, comment: &str, file: &Path, lineno: usize) {
    let Some((key, value)) = comment.split_once(':') else {
        return;
    };
    let items = value.split(',').map(str::trim).filter(|s| !s.is_empty());
    match key.trim().to_ascii_lowercase().as_str() {
        "contexts" => {
            let parsed: Vec<ContextTag> = items
                .filter_map(|s| {
                    let tag = ContextTag::parse(s);
                    if tag.is_none() {
                        warn!(file = %file.display(), line = lineno, context = s, "Unknown context tag");
                    }
                    tag
                })
                .collect();
            header.contexts = if parsed.is_empty() { ContextTag::ALL.to_vec() } else { parsed };
        }
        "requires" => {
            let mut req = Requirements::default();
            for item in items {
                match item.to_ascii_lowercase().as_str() {
                    "inline" => req.requires_inline = true,
                    "data" => req.needs_data = true,
                    "blob" => req.needs_blob = true,
                    "eval" => req.needs_eval = true,
                    "none" => {}
                    other => warn!(file = %file.display(), line = lineno, capability = other, "Unknown capability"),
                }
            }
            header.requirements = Some(req);
        }
        "sinks" => {
            header.families = items
                .filter_map(|s| match s.to_ascii_lowercase().as_str() {
                    "markup" => Some(SinkFamily::Markup),
                    "event" | "event_handler" => Some(SinkFamily::EventHandler),
                    "navigation" => Some(SinkFamily::Navigation),
                    _ => None,
                })
                .collect();
        }
        _ => {}
    }
}

/// Capability guess for untagged wordlist lines. Anything that can end up as
/// markup or a handler is assumed to need inline script.
fn infer_requirements(body: &str) -> Requirements {
    let lower = body.to_ascii_lowercase();
    let markup = lower.contains('<') || lower.contains("javascript:") || lower.contains(" on");
    Requirements {
        requires_inline: markup,
        needs_data: lower.contains("data:"),
        needs_blob: lower.contains("blob("),
        needs_eval: lower.contains("eval(") || lower.contains("function("),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_covers_every_context() {
        let catalog = PayloadCatalog::builtin();
        assert!(!catalog.is_empty());
        for ctx in ContextTag::ALL {
            assert!(catalog.for_context(ctx).next().is_some(), "no template for {}", ctx);
        }
        for t in catalog.templates() {
            assert!(t.body.contains(JS_PLACEHOLDER), "{} lacks placeholder", t.id);
        }
    }

    #[test]
    fn test_builtin_ids_unique() {
        let catalog = PayloadCatalog::builtin();
        let mut ids: Vec<&str> = catalog.templates().iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
    }

    #[test]
    fn test_parse_wordlist_headers() {
        let content = "# contexts: html_attr, url\n# requires: data\n\"><script src=\"data:,{JS}\"></script>\nno placeholder here\n# requires: none\n# contexts: js_string\n';{JS};//\n";
        let templates = parse_wordlist(Path::new("/tmp/custom.txt"), content);
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].id, "custom-3");
        assert_eq!(templates[0].contexts, vec![ContextTag::HtmlAttr, ContextTag::Url]);
        assert!(templates[0].requirements.needs_data);
        assert!(!templates[0].requirements.requires_inline);
        assert_eq!(templates[1].contexts, vec![ContextTag::JsString]);
        assert_eq!(templates[1].requirements, Requirements::default());
    }

    #[test]
    fn test_untagged_lines_infer_inline() {
        let templates = parse_wordlist(Path::new("x.txt"), "<b onmouseover=\"{JS}\">\n");
        assert!(templates[0].requirements.requires_inline);
        assert_eq!(templates[0].contexts.len(), ContextTag::ALL.len());
    }

    #[test]
    fn test_empty_catalog_is_load_error() {
        let err = PayloadCatalog::from_templates(Vec::new()).unwrap_err();
        assert!(err.classify().is_fatal());
    }

    #[tokio::test]
    async fn test_load_replace_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "# contexts: html_text\n<svg onload=\"{JS}\">\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "# contexts: url\njavascript:void({JS})\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "<i>{JS}</i>\n").unwrap();

        let catalog = PayloadCatalog::load(&[dir.path().to_path_buf()], WordlistMode::Replace)
            .await
            .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.templates()[0].id, "a-2");

        let extended = PayloadCatalog::load(&[dir.path().join("a.txt")], WordlistMode::Extend)
            .await
            .unwrap();
        assert_eq!(extended.len(), PayloadCatalog::builtin().len() + 1);
    }

    #[tokio::test]
    async fn test_load_replace_empty_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.txt");
        std::fs::write(&file, "# only comments\n").unwrap();
        let err = PayloadCatalog::load(&[file], WordlistMode::Replace).await.unwrap_err();
        assert!(matches!(err, ScanError::CatalogLoad(_)));
    }
}
