//! Segmented payload bodies.
//!
//! A template is split on `{JS}` into markup and script segments. Markup is
//! scanned with a small HTML tokenizer so transforms know which characters
//! are tag or attribute names, where text gaps between tags are, and what
//! kind of site each script segment sits in.

use crate::models::context::ContextTag;

pub const JS_PLACEHOLDER: &str = "{JS}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Markup(Vec<char>),
    Script(String),
}

/// Where a script segment executes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSite {
    /// Inside an attribute value (event handler, URL attribute, srcdoc).
    Attribute {
        name: String,
        quote: Option<char>,
        url_body: bool,
    },
    /// Raw text of a `<script>` element.
    ScriptElement,
    /// The payload itself is a `javascript:`/`data:` URL.
    BareUrl,
    /// Directly inside surrounding script code.
    Code,
}

impl ScriptSite {
    pub fn in_url(&self) -> bool {
        matches!(self, ScriptSite::BareUrl | ScriptSite::Attribute { url_body: true, .. })
    }

    /// Quote character that can be used inside this site without ending it.
    pub fn inner_quote(&self) -> char {
        match self {
            ScriptSite::Attribute { quote: Some('\''), .. } => '"',
            _ => '\'',
        }
    }
}

/// Markup character classes relevant to case-insensitive rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Text,
    TagName,
    AttrName,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Text,
    TagOpen,
    TagName,
    EndTagName,
    InTag,
    AttrName,
    AfterAttrName,
    BeforeValue,
    Value(Option<char>),
    RawText(RawKind),
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Script,
    Style,
}

/// Result of scanning the markup segments of a body.
#[derive(Debug, Clone, Default)]
pub struct MarkupMap {
    /// Per markup segment, per char.
    pub classes: Vec<Vec<CharClass>>,
    /// `(segment index, char index)` text gaps where noise may be inserted.
    pub gaps: Vec<(usize, usize)>,
    /// Per script segment, in order.
    pub sites: Vec<ScriptSite>,
}

/// Script that proves execution: writes the token into the top document title.
pub fn execution_expression(token: &str, quote: char) -> String {
    format!("top.document.title={q}{token}{q}", q = quote, token = token)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadBody {
    pub segments: Vec<Segment>,
    sites: Vec<ScriptSite>,
    context: ContextTag,
}

impl PayloadBody {
    /// Split a template on `{JS}` and fill every script slot with the
    /// execution expression for `token`, quoted to suit its site.
    pub fn from_template(template: &str, token: &str, context: ContextTag) -> Self {
        let mut segments = Vec::new();
        let mut parts = template.split(JS_PLACEHOLDER).peekable();
        while let Some(part) = parts.next() {
            if !part.is_empty() {
                segments.push(Segment::Markup(part.chars().collect()));
            }
            if parts.peek().is_some() {
                segments.push(Segment::Script(String::new()));
            }
        }
        let mut body = Self { segments, sites: Vec::new(), context };
        body.sites = body.scan().sites;
        let sites = body.sites.clone();
        for (js, site) in body.scripts_mut().zip(sites.iter()) {
            *js = execution_expression(token, site.inner_quote());
        }
        body
    }

    pub fn context(&self) -> ContextTag {
        self.context
    }

    /// Site of each script segment, in order.
    pub fn sites(&self) -> &[ScriptSite] {
        &self.sites
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            match seg {
                Segment::Markup(chars) => out.extend(chars.iter()),
                Segment::Script(js) => out.push_str(js),
            }
        }
        out
    }

    pub fn scripts_mut(&mut self) -> impl Iterator<Item = &mut String> {
        self.segments.iter_mut().filter_map(|s| match s {
            Segment::Script(js) => Some(js),
            Segment::Markup(_) => None,
        })
    }

    /// Markup segments paired with their index among markup segments.
    pub fn markup_mut(&mut self) -> impl Iterator<Item = (usize, &mut Vec<char>)> {
        self.segments
            .iter_mut()
            .filter_map(|s| match s {
                Segment::Markup(chars) => Some(chars),
                Segment::Script(_) => None,
            })
            .enumerate()
    }

    /// Scan the markup with an HTML tokenizer.
    pub fn scan(&self) -> MarkupMap {
        let mut map = MarkupMap::default();
        let mut state = self.initial_state();
        let mut tag_name = String::new();
        let mut attr_name = String::new();
        let mut value_prefix = String::new();
        let mut markup_idx = 0usize;
        let mut bare_prefix = String::new();

        if matches!(state, Lex::Text | Lex::Value(_)) {
            map.gaps.push((0, 0));
        }

        for seg in &self.segments {
            match seg {
                Segment::Script(_) => {
                    let site = match state {
                        Lex::Value(quote) => {
                            let prefix = value_prefix.trim_start().to_ascii_lowercase();
                            ScriptSite::Attribute {
                                name: attr_name.to_ascii_lowercase(),
                                quote,
                                url_body: prefix.starts_with("javascript:") || prefix.starts_with("data:"),
                            }
                        }
                        Lex::BeforeValue => ScriptSite::Attribute {
                            name: attr_name.to_ascii_lowercase(),
                            quote: None,
                            url_body: false,
                        },
                        Lex::RawText(RawKind::Script) => ScriptSite::ScriptElement,
                        _ => {
                            let lower = bare_prefix.trim_start().to_ascii_lowercase();
                            if (lower.starts_with("javascript:") || lower.starts_with("data:"))
                                && !lower.contains('<')
                            {
                                ScriptSite::BareUrl
                            } else {
                                ScriptSite::Code
                            }
                        }
                    };
                    map.sites.push(site);
                }
                Segment::Markup(chars) => {
                    let mut classes = Vec::with_capacity(chars.len());
                    let mut i = 0usize;
                    while i < chars.len() {
                        let c = chars[i];
                        bare_prefix.push(c);
                        if state == Lex::Text && c == '<' && !(markup_idx == 0 && i == 0) {
                            map.gaps.push((markup_idx, i));
                        }
                        let (class, next) = match state {
                            Lex::Text => {
                                if c == '<' {
                                    (CharClass::Other, Lex::TagOpen)
                                } else {
                                    (CharClass::Text, Lex::Text)
                                }
                            }
                            Lex::TagOpen => {
                                if c == '/' {
                                    tag_name.clear();
                                    (CharClass::Other, Lex::EndTagName)
                                } else if c == '!' {
                                    (CharClass::Other, Lex::Comment)
                                } else if c.is_ascii_alphabetic() {
                                    tag_name.clear();
                                    tag_name.push(c);
                                    (CharClass::TagName, Lex::TagName)
                                } else {
                                    (CharClass::Text, Lex::Text)
                                }
                            }
                            Lex::TagName => {
                                if c.is_ascii_alphanumeric() || c == '-' {
                                    tag_name.push(c);
                                    (CharClass::TagName, Lex::TagName)
                                } else if c == '>' {
                                    (CharClass::Other, close_tag(&tag_name))
                                } else {
                                    (CharClass::Other, Lex::InTag)
                                }
                            }
                            Lex::EndTagName => {
                                if c == '>' {
                                    (CharClass::Other, Lex::Text)
                                } else if c.is_ascii_alphanumeric() {
                                    (CharClass::TagName, Lex::EndTagName)
                                } else {
                                    (CharClass::Other, Lex::EndTagName)
                                }
                            }
                            Lex::InTag => {
                                if c == '>' {
                                    (CharClass::Other, close_tag(&tag_name))
                                } else if c.is_ascii_alphabetic() {
                                    attr_name.clear();
                                    attr_name.push(c);
                                    (CharClass::AttrName, Lex::AttrName)
                                } else {
                                    (CharClass::Other, Lex::InTag)
                                }
                            }
                            Lex::AttrName => {
                                if c == '=' {
                                    (CharClass::Other, Lex::BeforeValue)
                                } else if c == '>' {
                                    (CharClass::Other, close_tag(&tag_name))
                                } else if c.is_whitespace() || c == '/' {
                                    (CharClass::Other, Lex::AfterAttrName)
                                } else {
                                    attr_name.push(c);
                                    (CharClass::AttrName, Lex::AttrName)
                                }
                            }
                            Lex::AfterAttrName => {
                                if c == '=' {
                                    (CharClass::Other, Lex::BeforeValue)
                                } else if c == '>' {
                                    (CharClass::Other, close_tag(&tag_name))
                                } else if c.is_ascii_alphabetic() {
                                    attr_name.clear();
                                    attr_name.push(c);
                                    (CharClass::AttrName, Lex::AttrName)
                                } else {
                                    (CharClass::Other, Lex::AfterAttrName)
                                }
                            }
                            Lex::BeforeValue => {
                                value_prefix.clear();
                                if c == '"' || c == '\'' {
                                    (CharClass::Other, Lex::Value(Some(c)))
                                } else if c == '>' {
                                    (CharClass::Other, close_tag(&tag_name))
                                } else if c.is_whitespace() {
                                    (CharClass::Other, Lex::BeforeValue)
                                } else {
                                    value_prefix.push(c);
                                    (CharClass::Other, Lex::Value(None))
                                }
                            }
                            Lex::Value(Some(q)) => {
                                if c == q {
                                    (CharClass::Other, Lex::InTag)
                                } else {
                                    value_prefix.push(c);
                                    (CharClass::Other, Lex::Value(Some(q)))
                                }
                            }
                            Lex::Value(None) => {
                                if c.is_whitespace() {
                                    (CharClass::Other, Lex::InTag)
                                } else if c == '>' {
                                    (CharClass::Other, close_tag(&tag_name))
                                } else {
                                    value_prefix.push(c);
                                    (CharClass::Other, Lex::Value(None))
                                }
                            }
                            Lex::RawText(kind) => {
                                let closer = match kind {
                                    RawKind::Script => "</script",
                                    RawKind::Style => "</style",
                                };
                                if c == '<' && starts_with_ci(&chars[i..], closer) {
                                    tag_name.clear();
                                    (CharClass::Other, Lex::TagOpen)
                                } else {
                                    (CharClass::Other, Lex::RawText(kind))
                                }
                            }
                            Lex::Comment => {
                                if c == '>' && i >= 2 && chars[i - 1] == '-' && chars[i - 2] == '-' {
                                    (CharClass::Other, Lex::Text)
                                } else {
                                    (CharClass::Other, Lex::Comment)
                                }
                            }
                        };
                        classes.push(class);
                        state = next;
                        i += 1;
                    }
                    map.classes.push(classes);
                    markup_idx += 1;
                }
            }
        }
        map
    }

    fn initial_state(&self) -> Lex {
        if self.context == ContextTag::HtmlAttr {
            if let Some(Segment::Markup(chars)) = self.segments.first() {
                if let Some(&q) = chars.first() {
                    if q == '"' || q == '\'' {
                        return Lex::Value(Some(q));
                    }
                }
            }
        }
        Lex::Text
    }
}

fn close_tag(name: &str) -> Lex {
    match name.to_ascii_lowercase().as_str() {
        "script" => Lex::RawText(RawKind::Script),
        "style" => Lex::RawText(RawKind::Style),
        _ => Lex::Text,
    }
}

fn starts_with_ci(chars: &[char], needle: &str) -> bool {
    let n: Vec<char> = needle.chars().collect();
    chars.len() >= n.len()
        && chars.iter().zip(n.iter()).all(|(a, b)| a.eq_ignore_ascii_case(b))
}

/// Per-char mask of a JS snippet: `true` where the char is code, `false`
/// inside string/template literals and comments.
pub fn js_code_mask(js: &str) -> Vec<bool> {
    let chars: Vec<char> = js.chars().collect();
    let mut mask = vec![true; chars.len()];
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' || c == '"' || c == '`' {
            mask[i] = false;
            i += 1;
            while i < chars.len() {
                mask[i] = false;
                if chars[i] == '\\' {
                    if i + 1 < chars.len() {
                        mask[i + 1] = false;
                    }
                    i += 2;
                    continue;
                }
                if chars[i] == c {
                    break;
                }
                i += 1;
            }
            i += 1;
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            let start = i;
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                i += 1;
            }
            let end = (i + 2).min(chars.len());
            for m in &mut mask[start..end] {
                *m = false;
            }
            i = end;
        } else if c == '/' && chars.get(i + 1) == Some(&'/') {
            for m in &mut mask[i..] {
                *m = false;
            }
            break;
        } else {
            i += 1;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "spk1";
    const JS: &str = "top.document.title='spk1'";

    #[test]
    fn test_split_and_render() {
        let body = PayloadBody::from_template(r#"<svg onload="{JS}">"#, TOKEN, ContextTag::HtmlText);
        assert_eq!(body.segments.len(), 3);
        assert_eq!(body.render(), format!(r#"<svg onload="{}">"#, JS));
    }

    #[test]
    fn test_event_attribute_site() {
        let body = PayloadBody::from_template(r#"<img src=x onerror="{JS}">"#, TOKEN, ContextTag::HtmlText);
        let map = body.scan();
        assert_eq!(
            map.sites,
            vec![ScriptSite::Attribute { name: "onerror".into(), quote: Some('"'), url_body: false }]
        );
    }

    #[test]
    fn test_single_quoted_site_uses_double_quotes() {
        let body = PayloadBody::from_template("<a onclick='{JS}'>", TOKEN, ContextTag::HtmlText);
        assert_eq!(body.render(), "<a onclick='top.document.title=\"spk1\"'>");
    }

    #[test]
    fn test_script_element_site() {
        let body = PayloadBody::from_template("<script>{JS}</script>", TOKEN, ContextTag::HtmlText);
        assert_eq!(body.scan().sites, vec![ScriptSite::ScriptElement]);
    }

    #[test]
    fn test_url_sites() {
        let bare = PayloadBody::from_template("javascript:void({JS})", TOKEN, ContextTag::Url);
        assert_eq!(bare.scan().sites, vec![ScriptSite::BareUrl]);

        let attr = PayloadBody::from_template(r#"<iframe src="javascript:void({JS})">"#, TOKEN, ContextTag::HtmlText);
        assert!(attr.scan().sites[0].in_url());
    }

    #[test]
    fn test_attr_breakout_initial_state() {
        let body = PayloadBody::from_template(r#"" autofocus onfocus="{JS}" x=""#, TOKEN, ContextTag::HtmlAttr);
        let map = body.scan();
        assert_eq!(
            map.sites[0],
            ScriptSite::Attribute { name: "onfocus".into(), quote: Some('"'), url_body: false }
        );
        let names: String = match &body.segments[0] {
            Segment::Markup(chars) => chars
                .iter()
                .zip(map.classes[0].iter())
                .filter(|(_, c)| **c == CharClass::AttrName)
                .map(|(ch, _)| *ch)
                .collect(),
            Segment::Script(_) => String::new(),
        };
        assert_eq!(names, "autofocusonfocus");
    }

    #[test]
    fn test_js_string_is_code_site() {
        let body = PayloadBody::from_template("';{JS};//", TOKEN, ContextTag::JsString);
        assert_eq!(body.scan().sites, vec![ScriptSite::Code]);
    }

    #[test]
    fn test_gaps_between_tags() {
        let body = PayloadBody::from_template(r#""><svg onload="{JS}">"#, TOKEN, ContextTag::HtmlAttr);
        let map = body.scan();
        assert!(map.gaps.contains(&(0, 0)));
        assert!(map.gaps.contains(&(0, 2)));
    }

    #[test]
    fn test_js_code_mask_skips_strings_and_comments() {
        let mask = js_code_mask("a='x';/*c*/b");
        let code: String = "a='x';/*c*/b"
            .chars()
            .zip(mask)
            .filter(|(_, m)| *m)
            .map(|(c, _)| c)
            .collect();
        assert_eq!(code, "a=;b");
    }
}
