use tracing::trace;

use crate::csp::CspPolicy;
use crate::models::{Candidate, InjectionPoint};
use crate::session::ScanSession;
use super::body::PayloadBody;
use super::catalog::{PayloadCatalog, PayloadTemplate};
use super::evasion::{EvasionChain, EvasionLevel};
use super::rng::canary_token;

/// Why a candidate stream stopped yielding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Every eligible template has been offered for this point.
    Exhausted,
    /// The per-point cap was reached.
    PointBudget,
    /// The session-wide payload budget is spent.
    GlobalBudget,
}

/// Filters the catalog by context and CSP, orders by sink affinity and
/// mutates each template into a candidate.
#[derive(Debug, Clone)]
pub struct PayloadSelector {
    catalog: PayloadCatalog,
    policy: CspPolicy,
    chain: EvasionChain,
}

impl PayloadSelector {
    pub fn new(catalog: PayloadCatalog, policy: CspPolicy, evasion: EvasionLevel) -> Self {
        let chain = EvasionChain::new(evasion, policy.allows_eval);
        Self { catalog, policy, chain }
    }

    pub fn policy(&self) -> &CspPolicy {
        &self.policy
    }

    pub fn catalog(&self) -> &PayloadCatalog {
        &self.catalog
    }

    /// Templates compatible with `point` and permitted by the policy, in
    /// catalog order.
    pub fn eligible(&self, point: &InjectionPoint) -> Vec<&PayloadTemplate> {
        self.catalog
            .for_context(point.context)
            .filter(|t| self.policy.permits(&t.requirements))
            .collect()
    }

    pub fn candidates(&self, point: &InjectionPoint, per_point: usize) -> CandidateStream<'_> {
        let eligible = self.eligible(point);
        CandidateStream {
            selector: self,
            point: point.clone(),
            offered: vec![false; eligible.len()],
            eligible,
            yielded: 0,
            per_point,
        }
    }
}

/// Lazy, finite candidate sequence for one injection point.
///
/// Affinity ordering is recomputed on every call so sink activity seen
/// after the stream was created still promotes templates.
pub struct CandidateStream<'a> {
    selector: &'a PayloadSelector,
    point: InjectionPoint,
    eligible: Vec<&'a PayloadTemplate>,
    offered: Vec<bool>,
    yielded: usize,
    per_point: usize,
}

impl<'a> CandidateStream<'a> {
    pub fn point(&self) -> &InjectionPoint {
        &self.point
    }

    pub fn eligible_len(&self) -> usize {
        self.eligible.len()
    }

    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Start over from the first template. Stream budgets reset, the
    /// session budget does not.
    pub fn restart(&mut self) {
        self.offered.iter_mut().for_each(|o| *o = false);
        self.yielded = 0;
    }

    /// Index of the next template: promoted ones first, then catalog order.
    fn next_index(&self, session: &ScanSession) -> Option<usize> {
        let ledger = session.affinity();
        let pending = || self.offered.iter().enumerate().filter(|(_, o)| !**o).map(|(i, _)| i);
        pending()
            .find(|&i| ledger.is_promoted(self.eligible[i]))
            .or_else(|| pending().next())
    }

    pub fn next(&mut self, session: &mut ScanSession) -> Result<Candidate, StreamEnd> {
        if self.yielded >= self.per_point {
            return Err(StreamEnd::PointBudget);
        }
        let idx = self.next_index(session).ok_or(StreamEnd::Exhausted)?;
        let ordinal = session.take_payload().ok_or(StreamEnd::GlobalBudget)?;

        let template = self.eligible[idx];
        self.offered[idx] = true;
        self.yielded += 1;

        let token = canary_token(session.seed(), ordinal);
        let mut body = PayloadBody::from_template(&template.body, &token, self.point.context);
        let mutation = self.selector.chain.mutate(&mut body, &token, session.rng_mut());

        let candidate = Candidate {
            ordinal,
            point: self.point.clone(),
            template_id: template.id.clone(),
            requirements: template.requirements,
            uses_eval: mutation.uses_eval,
            token,
            body: body.render(),
            evasion_trace: mutation.trace,
        };
        trace!(
            point = %self.point.label(),
            template = %candidate.template_id,
            ordinal,
            rng_position = session.rng_position(),
            "Candidate prepared"
        );
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csp::resolve_policy;
    use crate::models::{ContextTag, SinkKind};
    use crate::session::Budgets;

    fn point(context: ContextTag) -> InjectionPoint {
        InjectionPoint {
            kind: crate::models::PointKind::UrlParam,
            name: "q".into(),
            position: 0,
            context,
            form: None,
        }
    }

    fn session(seed: u64) -> ScanSession {
        ScanSession::new("http://t.local/", seed, Budgets::default())
    }

    fn drain(selector: &PayloadSelector, p: &InjectionPoint, s: &mut ScanSession) -> Vec<Candidate> {
        let mut stream = selector.candidates(p, usize::MAX);
        let mut out = Vec::new();
        while let Ok(c) = stream.next(s) {
            out.push(c);
        }
        out
    }

    #[test]
    fn test_script_src_self_excludes_inline() {
        let policy = resolve_policy(&["script-src 'self'".to_string()], &[], true);
        let selector = PayloadSelector::new(PayloadCatalog::builtin(), policy, EvasionLevel::Aggressive);
        let mut s = session(1337);
        for ctx in ContextTag::ALL {
            for c in drain(&selector, &point(ctx), &mut s) {
                assert!(!c.requirements.requires_inline, "{} offered", c.template_id);
                assert!(!c.uses_eval);
            }
        }
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let selector = PayloadSelector::new(PayloadCatalog::builtin(), CspPolicy::unrestricted(), EvasionLevel::Aggressive);
        let a = drain(&selector, &point(ContextTag::HtmlText), &mut session(1337));
        let b = drain(&selector, &point(ContextTag::HtmlText), &mut session(1337));
        assert!(!a.is_empty());
        assert_eq!(a, b);
        let c = drain(&selector, &point(ContextTag::HtmlText), &mut session(7));
        assert_ne!(a.iter().map(|x| &x.body).collect::<Vec<_>>(), c.iter().map(|x| &x.body).collect::<Vec<_>>());
    }

    #[test]
    fn test_every_candidate_carries_its_token() {
        let selector = PayloadSelector::new(PayloadCatalog::builtin(), CspPolicy::unrestricted(), EvasionLevel::Light);
        let mut s = session(42);
        for ctx in ContextTag::ALL {
            for c in drain(&selector, &point(ctx), &mut s) {
                assert!(c.body.contains(&c.token), "{}: {}", c.template_id, c.body);
            }
        }
    }

    #[test]
    fn test_affinity_promotes_event_templates() {
        let selector = PayloadSelector::new(PayloadCatalog::builtin(), CspPolicy::unrestricted(), EvasionLevel::Off);
        let mut s = session(1);
        let attr = point(ContextTag::HtmlAttr);
        let first = selector.candidates(&attr, 10).next(&mut s).unwrap();
        assert_eq!(first.template_id, "ha-dq-script");

        s.affinity_mut().record("ht-img-onerror", &[SinkKind::SetAttributeEvent]);
        let promoted = selector.candidates(&attr, 10).next(&mut s).unwrap();
        let template = selector.catalog().get(&promoted.template_id).unwrap();
        assert!(s.affinity().is_promoted(template));
        assert_eq!(promoted.template_id, "ha-dq-svg");
    }

    #[test]
    fn test_budgets_and_restart() {
        let selector = PayloadSelector::new(PayloadCatalog::builtin(), CspPolicy::unrestricted(), EvasionLevel::Off);
        let mut s = ScanSession::new("http://t.local/", 1, Budgets { max_payloads: 3, ..Budgets::default() });
        let p = point(ContextTag::HtmlText);
        let mut stream = selector.candidates(&p, 2);
        assert!(stream.next(&mut s).is_ok());
        assert!(stream.next(&mut s).is_ok());
        assert_eq!(stream.next(&mut s), Err(StreamEnd::PointBudget));
        stream.restart();
        assert!(stream.next(&mut s).is_ok());
        assert_eq!(stream.next(&mut s), Err(StreamEnd::GlobalBudget));
    }

    #[test]
    fn test_exhausted_without_eligible_templates() {
        let selector = PayloadSelector::new(PayloadCatalog::builtin(), CspPolicy::conservative(), EvasionLevel::Off);
        let mut s = session(1);
        let mut stream = selector.candidates(&point(ContextTag::Svg), 10);
        assert_eq!(stream.eligible_len(), 0);
        assert_eq!(stream.next(&mut s), Err(StreamEnd::Exhausted));
        assert_eq!(s.payloads_used(), 0);
    }
}
