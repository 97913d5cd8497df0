//! Page instrumentation installed before any page script runs.
//!
//! Every hook records into per-document buffers and then calls through to
//! the native DOM method unchanged.

use serde_json::Value;

use crate::models::{SinkEvent, SinkKind};

/// Sink hooks, title canary and token mutation observer.
pub const HOOKS_SCRIPT: &str = r#"
(() => {
  if (window.__sinkprobe) return;
  const state = window.__sinkprobe = {sinks: [], titles: [], mutations: []};
  const TOKEN = /spk[0-9a-f]{12}/g;
  const logSink = (name, detail) => {
    try { state.sinks.push({name, detail: String(detail == null ? '' : detail), ts: Date.now()}); } catch (e) {}
  };
  const noteTokens = (text) => {
    if (!text) return;
    const found = String(text).match(TOKEN);
    if (found) found.forEach((t) => { if (!state.mutations.includes(t)) state.mutations.push(t); });
  };

  try {
    const _w = document.write;
    document.write = function (...args) { logSink('document.write', args.join('')); return _w.apply(this, args); };
    const _wl = document.writeln;
    document.writeln = function (...args) { logSink('document.writeln', args.join('')); return _wl.apply(this, args); };
  } catch (e) {}

  ['innerHTML', 'outerHTML'].forEach((prop) => {
    try {
      const desc = Object.getOwnPropertyDescriptor(Element.prototype, prop);
      if (desc && desc.set) {
        Object.defineProperty(Element.prototype, prop, {
          get: desc.get,
          set: function (v) { logSink(prop, v); return desc.set.call(this, v); },
          configurable: true,
        });
      }
    } catch (e) {}
  });

  try {
    const _ins = Element.prototype.insertAdjacentHTML;
    Element.prototype.insertAdjacentHTML = function (pos, html) { logSink('insertAdjacentHTML', html); return _ins.call(this, pos, html); };
  } catch (e) {}

  try {
    const _sa = Element.prototype.setAttribute;
    Element.prototype.setAttribute = function (name, val) {
      if (String(name || '').toLowerCase().startsWith('on')) logSink('setAttribute', name + '=' + String(val == null ? '' : val));
      return _sa.call(this, name, val);
    };
  } catch (e) {}

  ['assign', 'replace'].forEach((fn) => {
    try {
      const _fn = window.location[fn].bind(window.location);
      window.location[fn] = function (v) { logSink('location.' + fn, v); return _fn(v); };
    } catch (e) {}
  });

  ['pushState', 'replaceState'].forEach((fn) => {
    try {
      const _fn = history[fn];
      history[fn] = function (...args) { logSink('history.' + fn, args[2] == null ? '' : args[2]); return _fn.apply(this, args); };
    } catch (e) {}
  });

  try {
    const desc = Object.getOwnPropertyDescriptor(Document.prototype, 'title');
    if (desc && desc.set) {
      Object.defineProperty(Document.prototype, 'title', {
        get: desc.get,
        set: function (v) { try { state.titles.push(String(v)); } catch (e) {} return desc.set.call(this, v); },
        configurable: true,
      });
    }
  } catch (e) {}

  // Only live, executable-looking structure counts: event handler
  // attributes, script bodies and script-capable URL attributes.
  const inspect = (node) => {
    if (!node || node.nodeType !== 1) return;
    const els = [node, ...node.querySelectorAll('*')];
    els.forEach((el) => {
      for (const attr of Array.from(el.attributes || [])) {
        const n = attr.name.toLowerCase();
        if (n.startsWith('on') || n === 'srcdoc' || /^\s*(javascript|data):/i.test(attr.value)) noteTokens(attr.value);
      }
      if (el.localName === 'script') noteTokens(el.textContent);
    });
  };
  try {
    new MutationObserver((records) => {
      records.forEach((r) => {
        try {
          if (r.type === 'childList') r.addedNodes.forEach(inspect);
          else if (r.type === 'attributes') inspect(r.target);
        } catch (e) {}
      });
    }).observe(document, {subtree: true, childList: true, attributes: true});
  } catch (e) {}
})();
"#;

/// Drain-free read of the sink buffer.
pub const READ_SINKS: &str = "(() => (window.__sinkprobe ? window.__sinkprobe.sinks : []))()";

/// Current title plus title assignments and mutation tokens since the last reset.
pub const READ_CANARIES: &str = "(() => { const s = window.__sinkprobe || {titles: [], mutations: []}; \
     return {title: document.title || '', titles: s.titles, mutations: s.mutations}; })()";

/// Clear every buffer and return the title baseline.
pub const RESET_BUFFERS: &str = "(() => { const s = window.__sinkprobe; \
     if (s) { s.sinks.length = 0; s.titles.length = 0; s.mutations.length = 0; } \
     return {title: document.title || ''}; })()";

/// Synthetic fragment change for client-side routers that only react to events.
pub const DISPATCH_HASHCHANGE: &str = "(() => { \
     window.dispatchEvent(new HashChangeEvent('hashchange', {newURL: location.href})); \
     window.dispatchEvent(new PopStateEvent('popstate', {state: history.state})); \
     return true; })()";

/// Decode the sink buffer. Unknown hook names and malformed entries are dropped.
pub fn parse_sink_events(value: &Value) -> Vec<SinkEvent> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let kind = SinkKind::from_hook_name(item.get("name")?.as_str()?)?;
            let detail = item.get("detail").and_then(Value::as_str).unwrap_or_default();
            let ts = item.get("ts").and_then(Value::as_f64).unwrap_or(0.0);
            Some(SinkEvent {
                kind,
                value: detail.to_string(),
                timestamp_ms: ts.max(0.0) as u64,
            })
        })
        .collect()
}

/// Title canary state read back from the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanaryReadout {
    pub title: String,
    pub titles: Vec<String>,
    pub mutations: Vec<String>,
}

impl CanaryReadout {
    pub fn from_value(value: &Value) -> Self {
        let strings = |key: &str| -> Vec<String> {
            value
                .get(key)
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default()
        };
        Self {
            title: value
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            titles: strings("titles"),
            mutations: strings("mutations"),
        }
    }

    pub fn title_carries(&self, token: &str) -> bool {
        self.title.contains(token) || self.titles.iter().any(|t| t.contains(token))
    }

    pub fn mutation_carries(&self, token: &str) -> bool {
        self.mutations.iter().any(|t| t == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_sink_events() {
        let raw = json!([
            {"name": "innerHTML", "detail": "<img src=x>", "ts": 1700000000123.0},
            {"name": "eval", "detail": "x", "ts": 1},
            {"detail": "missing name"},
            {"name": "setAttribute", "detail": "onclick=top.document.title='spk'", "ts": 5},
        ]);
        let events = parse_sink_events(&raw);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, SinkKind::InnerHtml);
        assert_eq!(events[0].timestamp_ms, 1_700_000_000_123);
        assert_eq!(events[1].kind, SinkKind::SetAttributeEvent);
        assert!(parse_sink_events(&json!(null)).is_empty());
    }

    #[test]
    fn test_canary_readout() {
        let raw = json!({"title": "Home", "titles": ["spkabcdef000001"], "mutations": ["spkabcdef000002"]});
        let c = CanaryReadout::from_value(&raw);
        assert!(c.title_carries("spkabcdef000001"));
        assert!(!c.title_carries("spkabcdef000002"));
        assert!(c.mutation_carries("spkabcdef000002"));
        assert_eq!(CanaryReadout::from_value(&json!({})), CanaryReadout::default());
    }

    #[test]
    fn test_hook_names_are_known_sinks() {
        for name in ["document.write", "document.writeln", "innerHTML", "outerHTML", "insertAdjacentHTML", "setAttribute", "history.pushState"] {
            assert!(HOOKS_SCRIPT.contains(name.rsplit('.').next().unwrap_or(name)));
            assert!(SinkKind::from_hook_name(name).is_some());
        }
    }
}
