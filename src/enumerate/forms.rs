use scraper::{Html, Selector};
use tracing::debug;

use crate::models::FormTarget;

/// Input types that carry no user-controlled text.
const SKIPPED_TYPES: &[&str] = &["submit", "button", "reset", "image", "file", "checkbox", "radio"];

/// Parameters that should never be fuzzed (security tokens, nonces, CSRF, etc.)
pub fn is_security_param(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("nonce")
        || lower.contains("csrf")
        || lower.contains("xsrf")
        || lower.contains("authenticity")
        || lower.contains("__requestverificationtoken")
        || lower.contains("viewstate")
        || lower.contains("eventvalidation")
        || lower.contains("antiforgery")
        || lower.contains("captcha")
        || lower == "state"
        || lower == "_token"
}

/// A form as found in the document, with the fields worth fuzzing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredForm {
    pub target: FormTarget,
    /// Fuzzable field names in document order.
    pub fuzzable: Vec<String>,
}

/// Extract up to `max_forms` forms in document order. Forms without a single
/// fuzzable field are skipped and do not count toward the cap.
pub fn extract_forms(html: &str, max_forms: usize) -> Vec<DiscoveredForm> {
    let document = Html::parse_document(html);
    let (Ok(form_sel), Ok(field_sel)) = (
        Selector::parse("form"),
        Selector::parse("input[name], textarea[name], select[name]"),
    ) else {
        return Vec::new();
    };

    let mut forms = Vec::new();
    for (form_index, form) in document.select(&form_sel).enumerate() {
        if forms.len() >= max_forms {
            break;
        }
        let mut fields = Vec::new();
        let mut fuzzable = Vec::new();
        for field in form.select(&field_sel) {
            let Some(name) = field.value().attr("name") else {
                continue;
            };
            if name.is_empty() || fields.iter().any(|f| f == name) {
                continue;
            }
            fields.push(name.to_string());

            let kind = field
                .value()
                .attr("type")
                .unwrap_or("text")
                .to_ascii_lowercase();
            let is_input = field.value().name() == "input";
            if is_input && SKIPPED_TYPES.contains(&kind.as_str()) {
                continue;
            }
            if field.value().name() == "select" || is_security_param(name) {
                continue;
            }
            fuzzable.push(name.to_string());
        }
        if fuzzable.is_empty() {
            debug!(form_index, "Form has no fuzzable fields, skipped");
            continue;
        }
        let method = form
            .value()
            .attr("method")
            .unwrap_or("get")
            .to_ascii_lowercase();
        forms.push(DiscoveredForm {
            target: FormTarget {
                form_index,
                action: form.value().attr("action").map(str::to_string),
                method,
                fields,
            },
            fuzzable,
        });
    }
    forms
}

/// In-page script that fills form `form_index` and submits it. `values`
/// maps field names to values; unlisted fields keep their defaults.
pub fn submit_script(form_index: usize, values: &[(String, String)]) -> String {
    let assignments: Vec<String> = values
        .iter()
        .map(|(name, value)| {
            format!(
                "set({},{});",
                serde_json::Value::String(name.clone()),
                serde_json::Value::String(value.clone())
            )
        })
        .collect();
    format!(
        "(() => {{ const f = document.forms[{idx}]; if (!f) return false; \
         const set = (n, v) => {{ const el = f.elements.namedItem(n); if (el && 'value' in el) el.value = v; }}; \
         {body} HTMLFormElement.prototype.submit.call(f); return true; }})()",
        idx = form_index,
        body = assignments.join(" ")
    )
}
