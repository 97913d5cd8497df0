//! Seed-driven payload mutators.
//!
//! Draw order per candidate: one selection draw per transform kind in
//! `TransformKind::CANONICAL` order, then every selected transform that
//! applies to the body's context consumes its own draws, in the same order.
//! `EvasionLevel::Off` consumes nothing.

use data_encoding::BASE64;
use serde::{Deserialize, Serialize};

use crate::models::context::ContextTag;
use super::body::{js_code_mask, CharClass, PayloadBody, ScriptSite, Segment};
use super::rng::SeededStream;

const ZERO_WIDTH: char = '\u{200B}';
const MARKUP_COMMENT: &str = "<!---->";
const JS_COMMENT: &str = "/**/";
const MEMBER_WORDS: &[&str] = &["document", "title", "write", "cookie", "location"];
const GLOBAL_WORDS: &[&str] = &["setTimeout", "Function", "atob"];
const ENCODABLE: &[char] = &['(', ')', '\'', ';', '=', '[', ']', '+', '.', ',', '{', '}'];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvasionLevel {
    Off,
    #[default]
    Light,
    Aggressive,
}

impl EvasionLevel {
    fn selection_probability(&self) -> f64 {
        match self {
            Self::Off => 0.0,
            Self::Light => 0.3,
            Self::Aggressive => 0.6,
        }
    }

    /// Per-site probability once a transform is selected.
    fn density(&self) -> f64 {
        match self {
            Self::Off => 0.0,
            Self::Light => 0.35,
            Self::Aggressive => 0.7,
        }
    }
}

impl std::str::FromStr for EvasionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "light" => Ok(Self::Light),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(format!("unknown evasion level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Wrapper,
    KeywordSplit,
    CommentNoise,
    CaseShuffle,
    ZeroWidth,
    EntityEncode,
    PercentEncode,
}

impl TransformKind {
    pub const CANONICAL: [TransformKind; 7] = [
        TransformKind::Wrapper,
        TransformKind::KeywordSplit,
        TransformKind::CommentNoise,
        TransformKind::CaseShuffle,
        TransformKind::ZeroWidth,
        TransformKind::EntityEncode,
        TransformKind::PercentEncode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrapper => "wrapper",
            Self::KeywordSplit => "keyword_split",
            Self::CommentNoise => "comment_noise",
            Self::CaseShuffle => "case_shuffle",
            Self::ZeroWidth => "zero_width",
            Self::EntityEncode => "entity_encode",
            Self::PercentEncode => "percent_encode",
        }
    }

    /// Contexts whose payloads this transform may touch.
    pub fn applies_to(&self, context: ContextTag) -> bool {
        match self {
            Self::ZeroWidth => matches!(
                context,
                ContextTag::HtmlText | ContextTag::HtmlAttr | ContextTag::Svg | ContextTag::Style | ContextTag::Srcdoc
            ),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperStyle {
    Closure,
    TimerFn,
    ArrayMap,
    FunctionAtob,
    TimerAtob,
}

impl WrapperStyle {
    const PLAIN: [WrapperStyle; 3] = [Self::Closure, Self::TimerFn, Self::ArrayMap];
    const WITH_EVAL: [WrapperStyle; 5] =
        [Self::Closure, Self::TimerFn, Self::ArrayMap, Self::FunctionAtob, Self::TimerAtob];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closure => "closure",
            Self::TimerFn => "timer_fn",
            Self::ArrayMap => "array_map",
            Self::FunctionAtob => "function_atob",
            Self::TimerAtob => "timer_atob",
        }
    }

    pub fn uses_eval(&self) -> bool {
        matches!(self, Self::FunctionAtob | Self::TimerAtob)
    }

    fn wrap(&self, js: &str, token: &str, quote: char) -> String {
        match self {
            Self::Closure => format!("(()=>{{{}}})()", js),
            Self::TimerFn => format!("setTimeout(function(){{{}}},1)", js),
            Self::ArrayMap => format!("[1].map(function(){{{}}})", js),
            Self::FunctionAtob | Self::TimerAtob => {
                let q = quote;
                let literal = format!("{q}{token}{q}", q = q, token = token);
                let (inner, arg) = match js.find(&literal) {
                    Some(_) => (js.replacen(&literal, "t", 1), Some(literal)),
                    None => (js.to_string(), None),
                };
                let encoded = BASE64.encode(inner.as_bytes());
                let func = format!("Function({q}t{q},atob({q}{b}{q}))", q = q, b = encoded);
                match (self, arg) {
                    (Self::FunctionAtob, Some(arg)) => format!("{}({})", func, arg),
                    (Self::FunctionAtob, None) => format!("{}()", func),
                    (_, Some(arg)) => format!("setTimeout({},1,{})", func, arg),
                    (_, None) => format!("setTimeout({},1)", func),
                }
            }
        }
    }
}

/// Outcome of mutating one payload body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    /// Applied transforms in order, as `kind:detail`.
    pub trace: Vec<String>,
    pub uses_eval: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EvasionChain {
    level: EvasionLevel,
    allows_eval: bool,
}

impl EvasionChain {
    /// `allows_eval` comes from the verified CSP policy; eval-based wrappers
    /// are never offered without it.
    pub fn new(level: EvasionLevel, allows_eval: bool) -> Self {
        Self { level, allows_eval }
    }

    pub fn level(&self) -> EvasionLevel {
        self.level
    }

    pub fn mutate(&self, body: &mut PayloadBody, token: &str, rng: &mut SeededStream) -> Mutation {
        let mut mutation = Mutation::default();
        let p = self.level.selection_probability();
        if p <= 0.0 {
            return mutation;
        }

        let mut selected = Vec::new();
        for kind in TransformKind::CANONICAL {
            if rng.chance(p) {
                selected.push(kind);
            }
        }

        let context = body.context();
        let density = self.level.density();
        for kind in selected {
            if !kind.applies_to(context) {
                continue;
            }
            let detail = match kind {
                TransformKind::Wrapper => self.wrap(body, token, rng, &mut mutation.uses_eval),
                TransformKind::KeywordSplit => count_detail(split_keywords(body, rng)),
                TransformKind::CommentNoise => count_detail(comment_noise(body, density, rng)),
                TransformKind::CaseShuffle => count_detail(case_shuffle(body, density, rng)),
                TransformKind::ZeroWidth => count_detail(insert_gaps(body, &ZERO_WIDTH.to_string(), density, rng)),
                TransformKind::EntityEncode => count_detail(encode_scripts(body, density, rng, Encoding::Entity)),
                TransformKind::PercentEncode => count_detail(encode_scripts(body, density, rng, Encoding::Percent)),
            };
            if let Some(detail) = detail {
                mutation.trace.push(format!("{}:{}", kind.as_str(), detail));
            }
        }
        mutation
    }

    fn wrap(&self, body: &mut PayloadBody, token: &str, rng: &mut SeededStream, uses_eval: &mut bool) -> Option<String> {
        let styles: &[WrapperStyle] = if self.allows_eval {
            &WrapperStyle::WITH_EVAL
        } else {
            &WrapperStyle::PLAIN
        };
        let sites = body.sites().to_vec();
        let mut applied = None;
        for (js, site) in body.scripts_mut().zip(sites.iter()) {
            // `>` would end an unquoted attribute value.
            if matches!(site, ScriptSite::Attribute { quote: None, .. }) {
                continue;
            }
            let Some(style) = rng.pick(styles).copied() else {
                continue;
            };
            *js = style.wrap(js, token, site.inner_quote());
            *uses_eval |= style.uses_eval();
            applied.get_or_insert(style.as_str().to_string());
        }
        applied
    }
}

fn count_detail(count: usize) -> Option<String> {
    (count > 0).then(|| count.to_string())
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn word_at(chars: &[char], mask: &[bool], start: usize, word: &str) -> bool {
    let len = word.chars().count();
    if start + len > chars.len() {
        return false;
    }
    let matches = chars[start..start + len].iter().copied().eq(word.chars());
    let in_code = mask[start..start + len].iter().all(|m| *m);
    let bounded = chars.get(start + len).map_or(true, |c| !is_ident(*c));
    matches && in_code && bounded
}

fn split_literal(word: &str, at: usize, quote: char) -> String {
    let (head, tail) = word.split_at(at);
    format!("[{q}{h}{q}+{q}{t}{q}]", q = quote, h = head, t = tail)
}

fn split_keywords(body: &mut PayloadBody, rng: &mut SeededStream) -> usize {
    let sites = body.sites().to_vec();
    let mut count = 0;
    for (js, site) in body.scripts_mut().zip(sites.iter()) {
        let quote = site.inner_quote();
        let chars: Vec<char> = js.chars().collect();
        let mask = js_code_mask(js);
        let mut out = String::with_capacity(js.len() * 2);
        let mut i = 0;
        'scan: while i < chars.len() {
            if chars[i] == '.' && mask[i] {
                for word in MEMBER_WORDS {
                    if word_at(&chars, &mask, i + 1, word) {
                        let at = 1 + rng.below(word.len() - 1);
                        out.push_str(&split_literal(word, at, quote));
                        i += 1 + word.len();
                        count += 1;
                        continue 'scan;
                    }
                }
            }
            let starts_word = i == 0 || (!is_ident(chars[i - 1]) && chars[i - 1] != '.');
            if starts_word && mask[i] {
                for word in GLOBAL_WORDS {
                    if word_at(&chars, &mask, i, word) {
                        let at = 1 + rng.below(word.len() - 1);
                        out.push_str("self");
                        out.push_str(&split_literal(word, at, quote));
                        i += word.len();
                        count += 1;
                        continue 'scan;
                    }
                }
            }
            out.push(chars[i]);
            i += 1;
        }
        *js = out;
    }
    count
}

/// Positions in JS code after which an empty block comment is inert.
fn js_comment_slots(chars: &[char], mask: &[bool]) -> Vec<usize> {
    let mut slots = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        if !mask[i] || i + 1 >= chars.len() {
            continue;
        }
        let eligible = match c {
            '(' | ',' | ';' | '{' | '[' => true,
            '=' => {
                let next = chars[i + 1];
                let prev = if i > 0 { chars[i - 1] } else { ' ' };
                next != '=' && next != '>' && !"=!<>+-*/%&|^".contains(prev)
            }
            _ => false,
        };
        if eligible {
            slots.push(i + 1);
        }
    }
    slots
}

fn comment_noise(body: &mut PayloadBody, density: f64, rng: &mut SeededStream) -> usize {
    let mut count = 0;
    for js in body.scripts_mut() {
        let chars: Vec<char> = js.chars().collect();
        let mask = js_code_mask(js);
        let chosen: Vec<usize> = js_comment_slots(&chars, &mask)
            .into_iter()
            .filter(|_| rng.chance(density))
            .collect();
        if chosen.is_empty() {
            continue;
        }
        let mut out = String::with_capacity(js.len() + chosen.len() * JS_COMMENT.len());
        for (i, c) in chars.iter().enumerate() {
            if chosen.contains(&i) {
                out.push_str(JS_COMMENT);
            }
            out.push(*c);
        }
        *js = out;
        count += chosen.len();
    }

    let markup_context = matches!(
        body.context(),
        ContextTag::HtmlText | ContextTag::HtmlAttr | ContextTag::Svg | ContextTag::Srcdoc
    );
    if markup_context {
        count += insert_gaps(body, MARKUP_COMMENT, density, rng);
    }
    count
}

/// Insert `noise` into text gaps between tags (and before the first one).
fn insert_gaps(body: &mut PayloadBody, noise: &str, density: f64, rng: &mut SeededStream) -> usize {
    let gaps = body.scan().gaps;
    let chosen: Vec<(usize, usize)> = gaps.into_iter().filter(|_| rng.chance(density)).collect();
    let noise: Vec<char> = noise.chars().collect();
    for (markup_idx, chars) in body.markup_mut() {
        let mut positions: Vec<usize> = chosen
            .iter()
            .filter(|(seg, _)| *seg == markup_idx)
            .map(|(_, pos)| *pos)
            .collect();
        positions.sort_unstable_by(|a, b| b.cmp(a));
        for pos in positions {
            chars.splice(pos..pos, noise.iter().copied());
        }
    }
    chosen.len()
}

fn case_shuffle(body: &mut PayloadBody, density: f64, rng: &mut SeededStream) -> usize {
    let classes = body.scan().classes;
    let mut count = 0;
    for (markup_idx, chars) in body.markup_mut() {
        let Some(seg_classes) = classes.get(markup_idx) else {
            continue;
        };
        for (c, class) in chars.iter_mut().zip(seg_classes.iter()) {
            if !matches!(class, CharClass::TagName | CharClass::AttrName) || !c.is_ascii_alphabetic() {
                continue;
            }
            if rng.chance(density) {
                *c = if c.is_ascii_lowercase() {
                    c.to_ascii_uppercase()
                } else {
                    c.to_ascii_lowercase()
                };
                count += 1;
            }
        }
    }
    count
}

#[derive(Clone, Copy)]
enum Encoding {
    Entity,
    Percent,
}

impl Encoding {
    fn applies(&self, site: &ScriptSite) -> bool {
        match self {
            Encoding::Entity => matches!(site, ScriptSite::Attribute { url_body: false, .. }),
            Encoding::Percent => site.in_url(),
        }
    }
}

/// Encode punctuation in script segments whose site decodes it before the
/// script runs: entities in attribute values, percent-escapes in URL bodies.
fn encode_scripts(body: &mut PayloadBody, density: f64, rng: &mut SeededStream, encoding: Encoding) -> usize {
    let sites = body.sites().to_vec();
    let mut count = 0;
    for (js, site) in body.scripts_mut().zip(sites.iter()) {
        if !encoding.applies(site) {
            continue;
        }
        let mut out = String::with_capacity(js.len() * 2);
        for c in js.chars() {
            if !ENCODABLE.contains(&c) {
                out.push(c);
                continue;
            }
            let roll = rng.next_f64();
            if roll >= density {
                out.push(c);
                continue;
            }
            count += 1;
            match encoding {
                Encoding::Entity if roll < density / 2.0 => out.push_str(&format!("&#{};", c as u32)),
                Encoding::Entity => out.push_str(&format!("&#x{:x};", c as u32)),
                Encoding::Percent => out.push_str(&format!("%{:02X}", c as u32)),
            }
        }
        *js = out;
    }
    count
}

/// Plain-text view of the script segments, used by tests and logs.
pub fn scripts_of(body: &PayloadBody) -> Vec<String> {
    body.segments
        .iter()
        .filter_map(|s| match s {
            Segment::Script(js) => Some(js.clone()),
            Segment::Markup(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::*;
    use crate::payloads::PayloadCatalog;

    const TOKEN: &str = "spkabc123000001";

    fn body(template: &str, context: ContextTag) -> PayloadBody {
        PayloadBody::from_template(template, TOKEN, context)
    }

    #[test]
    fn test_off_consumes_no_draws() {
        let chain = EvasionChain::new(EvasionLevel::Off, true);
        let mut rng = SeededStream::new(1337);
        let mut b = body(r#"<svg onload="{JS}">"#, ContextTag::HtmlText);
        let before = b.render();
        let m = chain.mutate(&mut b, TOKEN, &mut rng);
        assert!(m.trace.is_empty());
        assert_eq!(rng.position(), 0);
        assert_eq!(b.render(), before);
    }

    #[test]
    fn test_same_seed_same_bytes() {
        let chain = EvasionChain::new(EvasionLevel::Aggressive, true);
        for seed in [1u64, 7, 1337, 99_999] {
            let mut a = body(r#"<img src=x onerror="{JS}">"#, ContextTag::HtmlText);
            let mut b = a.clone();
            let ma = chain.mutate(&mut a, TOKEN, &mut SeededStream::new(seed));
            let mb = chain.mutate(&mut b, TOKEN, &mut SeededStream::new(seed));
            assert_eq!(a.render(), b.render());
            assert_eq!(ma, mb);
        }
    }

    #[test]
    fn test_token_survives_every_seed() {
        let chain = EvasionChain::new(EvasionLevel::Aggressive, false);
        for seed in 0..200u64 {
            let mut b = body(r#"<svg onload="{JS}">"#, ContextTag::HtmlText);
            chain.mutate(&mut b, TOKEN, &mut SeededStream::new(seed));
            assert!(b.render().contains(TOKEN), "seed {} lost token: {}", seed, b.render());
        }
    }

    #[test]
    fn test_eval_wrappers_require_eval() {
        let chain = EvasionChain::new(EvasionLevel::Aggressive, false);
        for seed in 0..200u64 {
            let mut b = body("<script>{JS}</script>", ContextTag::HtmlText);
            let m = chain.mutate(&mut b, TOKEN, &mut SeededStream::new(seed));
            assert!(!m.uses_eval);
            assert!(!b.render().contains("atob"));
        }
    }

    #[test]
    fn test_eval_wrapper_keeps_token_as_argument() {
        let js = "top.document.title='tok'";
        let wrapped = WrapperStyle::FunctionAtob.wrap(js, "tok", '\'');
        let expected = format!("Function('t',atob('{}'))('tok')", BASE64.encode(b"top.document.title=t"));
        assert_eq!(wrapped, expected);
        let timer = WrapperStyle::TimerAtob.wrap(js, "tok", '"');
        assert!(timer.starts_with("setTimeout(Function(\"t\""));
    }

    #[test]
    fn test_double_quoted_attribute_never_gains_double_quote() {
        let chain = EvasionChain::new(EvasionLevel::Aggressive, true);
        for seed in 0..200u64 {
            let mut b = body(r#"<svg onload="{JS}">"#, ContextTag::HtmlText);
            chain.mutate(&mut b, TOKEN, &mut SeededStream::new(seed));
            for js in scripts_of(&b) {
                assert!(!js.contains('"'), "seed {}: {}", seed, js);
            }
        }
    }

    #[test]
    fn test_keyword_split_skips_strings() {
        let mut b = body("<script>{JS}</script>", ContextTag::HtmlText);
        let n = split_keywords(&mut b, &mut SeededStream::new(5));
        assert_eq!(n, 2);
        let js = &scripts_of(&b)[0];
        assert!(js.starts_with("top['"));
        assert!(js.ends_with(&format!("='{}'", TOKEN)));
        assert!(!js.contains(".document"));
    }

    #[test]
    fn test_comment_slots_avoid_arrows_and_comparisons() {
        let src: Vec<char> = "(()=>{a==b;c=1})".chars().collect();
        let mask = vec![true; src.len()];
        let slots = js_comment_slots(&src, &mask);
        // after '(' '(' '{' ';' and the assignment in c=1
        assert_eq!(slots, vec![1, 2, 6, 11, 13]);
    }

    #[test]
    fn test_case_shuffle_only_touches_names() {
        let mut b = body(r#"<img src=x onerror="{JS}">"#, ContextTag::HtmlText);
        let mut rng = SeededStream::new(3);
        case_shuffle(&mut b, 1.0, &mut rng);
        let out = b.render();
        assert!(out.starts_with("<IMG SRC=x ONERROR=\""));
        assert!(out.contains("top.document.title"));
    }

    #[test]
    fn test_percent_only_in_url_bodies() {
        let mut attr = body(r#"<svg onload="{JS}">"#, ContextTag::HtmlText);
        assert_eq!(encode_scripts(&mut attr, 1.0, &mut SeededStream::new(1), Encoding::Percent), 0);

        let mut url = body("javascript:void({JS})", ContextTag::Url);
        let n = encode_scripts(&mut url, 1.0, &mut SeededStream::new(1), Encoding::Percent);
        assert!(n > 0);
        assert!(url.render().contains("%3D%27"));
        assert_eq!(encode_scripts(&mut url, 1.0, &mut SeededStream::new(1), Encoding::Entity), 0);
    }

    #[test]
    fn test_zero_width_not_applied_to_js_string() {
        assert!(!TransformKind::ZeroWidth.applies_to(ContextTag::JsString));
        assert!(!TransformKind::ZeroWidth.applies_to(ContextTag::Url));
        assert!(TransformKind::ZeroWidth.applies_to(ContextTag::Srcdoc));
    }

    #[test]
    fn test_unquoted_attribute_is_not_wrapped() {
        let chain = EvasionChain::new(EvasionLevel::Aggressive, false);
        let mut b = body("<a onclick={JS}>", ContextTag::HtmlText);
        let mut rng = SeededStream::new(0);
        assert!(chain.wrap(&mut b, TOKEN, &mut rng, &mut false).is_none());
        assert_eq!(rng.position(), 0);
    }

    /// Every built-in template in every context it declares.
    fn builtin_bodies() -> Vec<(String, PayloadBody)> {
        let catalog = PayloadCatalog::builtin();
        catalog
            .templates()
            .iter()
            .flat_map(|t| {
                t.contexts
                    .iter()
                    .map(move |ctx| (format!("{}@{}", t.id, ctx.as_str()), body(&t.body, *ctx)))
            })
            .collect()
    }

    /// Render with each script segment passed through `decode`.
    fn decoded(mut b: PayloadBody, decode: impl Fn(&str) -> String) -> String {
        for js in b.scripts_mut() {
            *js = decode(js);
        }
        b.render()
    }

    fn join_keywords(js: &str) -> String {
        let re = Regex::new(r#"(self)?\[['"]([A-Za-z]+)['"]\+['"]([A-Za-z]+)['"]\]"#).unwrap();
        re.replace_all(js, |c: &regex::Captures| {
            let dot = if c.get(1).is_some() { "" } else { "." };
            format!("{}{}{}", dot, &c[2], &c[3])
        })
        .into_owned()
    }

    fn decode_entities(js: &str) -> String {
        let re = Regex::new(r"&#(x[0-9a-f]+|[0-9]+);").unwrap();
        re.replace_all(js, |c: &regex::Captures| {
            let code = match c[1].strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).unwrap(),
                None => c[1].parse().unwrap(),
            };
            char::from_u32(code).unwrap().to_string()
        })
        .into_owned()
    }

    fn decode_percent(js: &str) -> String {
        let re = Regex::new(r"%([0-9A-F]{2})").unwrap();
        re.replace_all(js, |c: &regex::Captures| {
            char::from(u8::from_str_radix(&c[1], 16).unwrap()).to_string()
        })
        .into_owned()
    }

    /// Inline the wrapper call back into the expression it runs.
    fn unwrap_script(js: &str) -> String {
        let plain = [
            ("(()=>{", "})()"),
            ("setTimeout(function(){", "},1)"),
            ("[1].map(function(){", "})"),
        ];
        for (prefix, suffix) in plain {
            if let Some(inner) = js.strip_prefix(prefix).and_then(|r| r.strip_suffix(suffix)) {
                return inner.to_string();
            }
        }
        let re = Regex::new(r#"^(setTimeout\()?Function\(['"]t['"],atob\(['"]([A-Za-z0-9+/=]*)['"]\)\)(.*)$"#).unwrap();
        let Some(c) = re.captures(js) else {
            return js.to_string();
        };
        let inner = String::from_utf8(BASE64.decode(c[2].as_bytes()).unwrap()).unwrap();
        let rest = &c[3];
        let arg = if c.get(1).is_some() {
            rest.strip_prefix(",1").and_then(|r| r.strip_suffix(')')).unwrap()
        } else {
            rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')).unwrap()
        };
        let arg = arg.strip_prefix(',').unwrap_or(arg);
        match inner.strip_suffix('t') {
            Some(head) if !arg.is_empty() => format!("{}{}", head, arg),
            _ => inner,
        }
    }

    #[test]
    fn test_each_transform_decodes_to_original_execution() {
        let bodies = builtin_bodies();
        assert!(!bodies.is_empty());
        for (label, original) in bodies {
            let expected = original.render();
            for seed in 0..8u64 {
                let mut rng = SeededStream::new(seed);

                let mut b = original.clone();
                split_keywords(&mut b, &mut rng);
                assert_eq!(decoded(b, join_keywords), expected, "keyword_split {}", label);

                let mut b = original.clone();
                comment_noise(&mut b, 1.0, &mut rng);
                let stripped = decoded(b, |js| js.replace(JS_COMMENT, "")).replace(MARKUP_COMMENT, "");
                assert_eq!(stripped, expected, "comment_noise {}", label);

                let mut b = original.clone();
                case_shuffle(&mut b, 1.0, &mut rng);
                assert_eq!(scripts_of(&b), scripts_of(&original), "case_shuffle {}", label);
                assert_eq!(b.render().to_ascii_lowercase(), expected.to_ascii_lowercase(), "case_shuffle {}", label);

                let mut b = original.clone();
                insert_gaps(&mut b, &ZERO_WIDTH.to_string(), 1.0, &mut rng);
                assert_eq!(b.render().replace(ZERO_WIDTH, ""), expected, "zero_width {}", label);

                let mut b = original.clone();
                encode_scripts(&mut b, 1.0, &mut rng, Encoding::Entity);
                assert_eq!(decoded(b, decode_entities), expected, "entity_encode {}", label);

                let mut b = original.clone();
                encode_scripts(&mut b, 1.0, &mut rng, Encoding::Percent);
                assert_eq!(decoded(b, decode_percent), expected, "percent_encode {}", label);
            }
        }
    }

    #[test]
    fn test_every_wrapper_runs_the_same_expression() {
        for (label, original) in builtin_bodies() {
            let expected = original.render();
            for style in WrapperStyle::WITH_EVAL {
                let mut b = original.clone();
                let sites = b.sites().to_vec();
                for (js, site) in b.scripts_mut().zip(sites.iter()) {
                    *js = style.wrap(js, TOKEN, site.inner_quote());
                }
                assert_eq!(decoded(b.clone(), unwrap_script), expected, "{} {}", style.as_str(), label);

                // Splitting the wrapper's own globals keeps it callable.
                split_keywords(&mut b, &mut SeededStream::new(11));
                let rejoined = decoded(b, |js| unwrap_script(&join_keywords(js)));
                assert_eq!(rejoined, expected, "{} + keyword_split {}", style.as_str(), label);
            }
        }
    }
}
