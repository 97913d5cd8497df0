use std::collections::{BTreeMap, BTreeSet};

use crate::models::{SinkFamily, SinkKind};
use crate::payloads::PayloadTemplate;

/// Sink activity observed so far in the session.
///
/// A template is promoted once any sink of a family it is tagged for has
/// fired, or once a sink fired while one of its own candidates was live.
#[derive(Debug, Clone, Default)]
pub struct AffinityLedger {
    fired: BTreeSet<SinkKind>,
    learned: BTreeMap<String, BTreeSet<SinkKind>>,
}

impl AffinityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the sink kinds seen during one attempt with `template_id`.
    pub fn record(&mut self, template_id: &str, kinds: &[SinkKind]) {
        if kinds.is_empty() {
            return;
        }
        self.fired.extend(kinds.iter().copied());
        self.learned
            .entry(template_id.to_string())
            .or_default()
            .extend(kinds.iter().copied());
    }

    pub fn has_fired(&self, kind: SinkKind) -> bool {
        self.fired.contains(&kind)
    }

    pub fn fired_kinds(&self) -> impl Iterator<Item = &SinkKind> {
        self.fired.iter()
    }

    fn fired_family(&self, family: SinkFamily) -> bool {
        self.fired.iter().any(|k| k.family() == family)
    }

    pub fn is_promoted(&self, template: &PayloadTemplate) -> bool {
        template.families.iter().any(|f| self.fired_family(*f))
            || self.learned.get(&template.id).map_or(false, |k| !k.is_empty())
    }
}
