use crate::models::{ContextTag, Finding, Severity, SinkFamily};

const AV_NETWORK: f64 = 0.85;
const AC_LOW: f64 = 0.77;
const AC_HIGH: f64 = 0.44;
const PR_NONE_CHANGED: f64 = 0.85;
const UI_REQUIRED: f64 = 0.62;
const CIA_LOW: f64 = 0.22;
const CIA_HIGH: f64 = 0.56;

/// CVSS v3.1 Roundup: smallest one-decimal value not below `x`.
fn roundup(x: f64) -> f64 {
    let int_input = (x * 100_000.0).round() as i64;
    if int_input % 10_000 == 0 {
        int_input as f64 / 100_000.0
    } else {
        ((int_input / 10_000) + 1) as f64 / 10.0
    }
}

/// Base score for `AV:N/AC:{L|H}/PR:N/UI:R/S:C/C:L/I:{L|H}/A:N`.
pub fn base_score(attack_complexity_low: bool, integrity_high: bool) -> f64 {
    let c = CIA_LOW;
    let i = if integrity_high { CIA_HIGH } else { CIA_LOW };
    let iss = 1.0 - (1.0 - c) * (1.0 - i);
    let impact = 7.52 * (iss - 0.029) - 3.25 * (iss - 0.02).powi(15);
    if impact <= 0.0 {
        return 0.0;
    }
    let ac = if attack_complexity_low { AC_LOW } else { AC_HIGH };
    let exploitability = 8.22 * AV_NETWORK * ac * PR_NONE_CHANGED * UI_REQUIRED;
    roundup((1.08 * (impact + exploitability)).min(10.0))
}

pub fn vector(attack_complexity_low: bool, integrity_high: bool) -> String {
    format!(
        "CVSS:3.1/AV:N/AC:{}/PR:N/UI:R/S:C/C:L/I:{}/A:N",
        if attack_complexity_low { "L" } else { "H" },
        if integrity_high { "H" } else { "L" }
    )
}

/// Confirmed execution means low attack complexity, except in URL and style
/// contexts, which need a click or a legacy engine. Markup sinks, script
/// contexts and CSP bypasses raise integrity impact.
pub fn score(finding: &Finding) -> (Severity, u8) {
    let context = finding.point.context;
    let ac_low = finding.is_confirmed() && !matches!(context, ContextTag::Url | ContextTag::Style);
    let integrity_high = finding.csp_bypass
        || finding.sink.map(|k| k.family()) == Some(SinkFamily::Markup)
        || matches!(context, ContextTag::JsString | ContextTag::Srcdoc);
    let base = base_score(ac_low, integrity_high);
    let label = match base {
        b if b >= 9.0 => Severity::Critical,
        b if b >= 7.0 => Severity::High,
        b if b >= 4.0 => Severity::Medium,
        b if b > 0.0 => Severity::Low,
        _ => Severity::Info,
    };
    (label, (base * 10.0).round() as u8)
}
