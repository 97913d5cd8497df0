use crate::models::{ContextTag, DeliveryMode, ExecutionSignal, Finding, Severity, SinkKind};
use super::band;

fn sink_weight(kind: Option<SinkKind>) -> i32 {
    match kind {
        Some(SinkKind::DocumentWrite) => 25,
        Some(SinkKind::DocumentWriteln) => 20,
        Some(SinkKind::InnerHtml) | Some(SinkKind::OuterHtml) | Some(SinkKind::InsertAdjacentHtml) => 22,
        Some(SinkKind::SetAttributeEvent) => 18,
        Some(SinkKind::LocationAssign) | Some(SinkKind::LocationReplace) => 12,
        Some(SinkKind::HistoryPushState) | Some(SinkKind::HistoryReplaceState) => 8,
        None => 0,
    }
}

/// Script and srcdoc contexts run without further markup; URL and style
/// contexts need a click or a legacy engine.
fn context_adjust(context: ContextTag) -> i32 {
    match context {
        ContextTag::JsString => 8,
        ContextTag::Srcdoc => 6,
        ContextTag::Svg => 4,
        ContextTag::HtmlText | ContextTag::HtmlAttr => 0,
        ContextTag::Url => -6,
        ContextTag::Style => -8,
    }
}

/// Base by signal plus sink weight, context adjustment, DOM-based and CSP
/// bypass bonuses.
pub fn score(finding: &Finding) -> (Severity, u8) {
    let base: i32 = match finding.signal {
        ExecutionSignal::Confirmed => 70,
        ExecutionSignal::Suspected => 25,
        ExecutionSignal::None => 0,
    };
    let mut total = base + sink_weight(finding.sink) + context_adjust(finding.point.context);
    if finding.delivery == DeliveryMode::DomBased {
        total += 5;
    }
    if finding.csp_bypass {
        total += 10;
    }
    let score = total.clamp(0, 100) as u8;
    (band(score), score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::fixtures::{finding, in_context};

    #[test]
    fn test_confirmed_document_write_dom() {
        let f = finding(ExecutionSignal::Confirmed, Some(SinkKind::DocumentWrite), DeliveryMode::DomBased, false);
        assert_eq!(score(&f), (Severity::Critical, 100));
    }

    #[test]
    fn test_title_only_reflected() {
        let f = finding(ExecutionSignal::Confirmed, None, DeliveryMode::Reflected, false);
        assert_eq!(score(&f), (Severity::High, 70));
    }

    #[test]
    fn test_suspected_is_low() {
        let f = finding(ExecutionSignal::Suspected, None, DeliveryMode::Reflected, false);
        assert_eq!(score(&f), (Severity::Low, 25));
    }

    #[test]
    fn test_bypass_bonus() {
        let f = finding(ExecutionSignal::Confirmed, Some(SinkKind::HistoryPushState), DeliveryMode::Reflected, true);
        assert_eq!(score(&f).1, 88);
    }

    #[test]
    fn test_context_adjusts_score() {
        let f = finding(ExecutionSignal::Confirmed, Some(SinkKind::InnerHtml), DeliveryMode::Reflected, false);
        assert_eq!(score(&f), (Severity::Critical, 92));
        assert_eq!(score(&in_context(f.clone(), ContextTag::JsString)), (Severity::Critical, 100));
        assert_eq!(score(&in_context(f.clone(), ContextTag::Url)), (Severity::High, 86));
        assert_eq!(score(&in_context(f, ContextTag::Style)), (Severity::High, 84));
    }

    #[test]
    fn test_context_never_goes_negative() {
        let f = in_context(finding(ExecutionSignal::None, None, DeliveryMode::Reflected, false), ContextTag::Style);
        assert_eq!(score(&f), (Severity::Info, 0));
    }
}
