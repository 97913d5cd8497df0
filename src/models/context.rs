use serde::{Deserialize, Serialize};

/// Where an injected value lands in the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextTag {
    HtmlText,
    HtmlAttr,
    JsString,
    Url,
    Svg,
    Style,
    Srcdoc,
}

impl ContextTag {
    pub const ALL: [ContextTag; 7] = [
        ContextTag::HtmlText,
        ContextTag::HtmlAttr,
        ContextTag::JsString,
        ContextTag::Url,
        ContextTag::Svg,
        ContextTag::Style,
        ContextTag::Srcdoc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HtmlText => "html_text",
            Self::HtmlAttr => "html_attr",
            Self::JsString => "js_string",
            Self::Url => "url",
            Self::Svg => "svg",
            Self::Style => "style",
            Self::Srcdoc => "srcdoc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html_text" => Some(Self::HtmlText),
            "html_attr" => Some(Self::HtmlAttr),
            "js_string" => Some(Self::JsString),
            "url" => Some(Self::Url),
            "svg" => Some(Self::Svg),
            "style" => Some(Self::Style),
            "srcdoc" => Some(Self::Srcdoc),
            _ => None,
        }
    }

    /// Contexts where the payload is parsed as HTML markup after breaking out.
    pub fn is_markup(&self) -> bool {
        matches!(self, Self::HtmlText | Self::HtmlAttr | Self::Svg | Self::Style)
    }
}

impl std::fmt::Display for ContextTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
