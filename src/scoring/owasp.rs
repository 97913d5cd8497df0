use crate::models::{ContextTag, DeliveryMode, ExecutionSignal, Finding, Severity, SinkFamily};

/// Likelihood on the 1-3 scale. Reflected findings travel in a link; script
/// contexts raise it one step, URL and style contexts lower it one step.
fn likelihood(finding: &Finding) -> u8 {
    match finding.signal {
        ExecutionSignal::Confirmed => {
            let base: u8 = if finding.delivery == DeliveryMode::Reflected { 3 } else { 2 };
            match finding.point.context {
                ContextTag::JsString | ContextTag::Srcdoc => (base + 1).min(3),
                ContextTag::Url | ContextTag::Style => base - 1,
                _ => base,
            }
        }
        _ => 1,
    }
}

/// Impact on the 1-3 scale, from the sink family and CSP bypass.
fn impact(finding: &Finding) -> u8 {
    if finding.csp_bypass {
        return 3;
    }
    match finding.sink.map(|k| k.family()) {
        Some(SinkFamily::Markup) => 3,
        Some(SinkFamily::EventHandler) => 2,
        Some(SinkFamily::Navigation) => 1,
        None if finding.is_confirmed() => 2,
        None => 1,
    }
}

/// OWASP risk rating matrix over likelihood × impact.
pub fn score(finding: &Finding) -> (Severity, u8) {
    let l = likelihood(finding);
    let i = impact(finding);
    let label = match (i, l) {
        (3, 3) => Severity::Critical,
        (3, 2) | (2, 3) => Severity::High,
        (3, 1) | (2, 2) | (1, 3) => Severity::Medium,
        (2, 1) | (1, 2) => Severity::Low,
        _ => Severity::Info,
    };
    let score = (f64::from(l) * f64::from(i) * 100.0 / 9.0).round() as u8;
    (label, score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SinkKind;
    use crate::scoring::fixtures::{finding, in_context};

    #[test]
    fn test_matrix_corners() {
        let top = finding(ExecutionSignal::Confirmed, Some(SinkKind::InnerHtml), DeliveryMode::Reflected, false);
        assert_eq!(score(&top), (Severity::Critical, 100));
        let bottom = finding(ExecutionSignal::Suspected, Some(SinkKind::LocationAssign), DeliveryMode::Reflected, false);
        assert_eq!(score(&bottom), (Severity::Info, 11));
    }

    #[test]
    fn test_dom_event_handler() {
        let f = finding(ExecutionSignal::Confirmed, Some(SinkKind::SetAttributeEvent), DeliveryMode::DomBased, false);
        assert_eq!(score(&f), (Severity::Medium, 44));
    }

    #[test]
    fn test_context_moves_likelihood() {
        let dom = finding(ExecutionSignal::Confirmed, Some(SinkKind::InnerHtml), DeliveryMode::DomBased, false);
        assert_eq!(score(&dom), (Severity::High, 67));
        assert_eq!(score(&in_context(dom.clone(), ContextTag::JsString)), (Severity::Critical, 100));
        assert_eq!(score(&in_context(dom, ContextTag::Style)), (Severity::Medium, 33));

        let reflected = finding(ExecutionSignal::Confirmed, Some(SinkKind::InnerHtml), DeliveryMode::Reflected, false);
        assert_eq!(score(&in_context(reflected, ContextTag::Url)), (Severity::High, 67));
    }
}
