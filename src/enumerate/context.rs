use std::sync::LazyLock;

use regex::Regex;

use crate::models::ContextTag;

static ATTR_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(["']?)[^"'<>]*$"#).expect("valid regex")
});

const URL_ATTRIBUTES: &[&str] = &[
    "href", "src", "action", "formaction", "data", "xlink:href", "poster", "background", "ping",
];

/// Find the last opening `<name` (case-insensitive) that is not closed by a
/// later `</name`.
fn inside_element(prefix: &str, name: &str) -> bool {
    let lower = prefix.to_ascii_lowercase();
    let open = lower.rfind(&format!("<{}", name));
    let close = lower.rfind(&format!("</{}", name));
    match (open, close) {
        (Some(o), Some(c)) => o > c,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Infer where `marker` surfaces in rendered `html`. `None` when the marker
/// does not appear at all.
pub fn infer_context(html: &str, marker: &str) -> Option<ContextTag> {
    let pos = html.find(marker)?;
    let prefix = &html[..pos];

    let last_lt = prefix.rfind('<');
    let last_gt = prefix.rfind('>');
    let in_tag = match (last_lt, last_gt) {
        (Some(lt), Some(gt)) => lt > gt,
        (Some(_), None) => true,
        _ => false,
    };

    if in_tag {
        let tag_src = last_lt.map(|lt| &prefix[lt..]).unwrap_or(prefix);
        if let Some(caps) = ATTR_TAIL.captures(tag_src) {
            let name = caps.get(1).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
            if name == "srcdoc" {
                return Some(ContextTag::Srcdoc);
            }
            if URL_ATTRIBUTES.contains(&name.as_str()) {
                return Some(ContextTag::Url);
            }
            if name == "style" {
                return Some(ContextTag::Style);
            }
        }
        return Some(ContextTag::HtmlAttr);
    }

    if inside_element(prefix, "script") {
        return Some(ContextTag::JsString);
    }
    if inside_element(prefix, "style") {
        return Some(ContextTag::Style);
    }
    if inside_element(prefix, "svg") {
        return Some(ContextTag::Svg);
    }
    Some(ContextTag::HtmlText)
}
