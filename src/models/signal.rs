use serde::{Deserialize, Serialize};

/// A DOM or browser API entry point that can turn data into script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    DocumentWrite,
    DocumentWriteln,
    InnerHtml,
    OuterHtml,
    InsertAdjacentHtml,
    SetAttributeEvent,
    LocationAssign,
    LocationReplace,
    HistoryPushState,
    HistoryReplaceState,
}

/// Sinks grouped by the payload shapes that tend to reach them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkFamily {
    /// Markup parsed from a string (write, innerHTML, insertAdjacentHTML).
    Markup,
    /// Inline event handler attributes.
    EventHandler,
    /// Location and history mutation.
    Navigation,
}

impl SinkKind {
    /// Map the name recorded by the page instrumentation to a sink kind.
    pub fn from_hook_name(name: &str) -> Option<Self> {
        match name {
            "document.write" => Some(Self::DocumentWrite),
            "document.writeln" => Some(Self::DocumentWriteln),
            "innerHTML" => Some(Self::InnerHtml),
            "outerHTML" => Some(Self::OuterHtml),
            "insertAdjacentHTML" => Some(Self::InsertAdjacentHtml),
            "setAttribute" => Some(Self::SetAttributeEvent),
            "location.assign" => Some(Self::LocationAssign),
            "location.replace" => Some(Self::LocationReplace),
            "history.pushState" => Some(Self::HistoryPushState),
            "history.replaceState" => Some(Self::HistoryReplaceState),
            _ => None,
        }
    }

    pub fn hook_name(&self) -> &'static str {
        match self {
            Self::DocumentWrite => "document.write",
            Self::DocumentWriteln => "document.writeln",
            Self::InnerHtml => "innerHTML",
            Self::OuterHtml => "outerHTML",
            Self::InsertAdjacentHtml => "insertAdjacentHTML",
            Self::SetAttributeEvent => "setAttribute",
            Self::LocationAssign => "location.assign",
            Self::LocationReplace => "location.replace",
            Self::HistoryPushState => "history.pushState",
            Self::HistoryReplaceState => "history.replaceState",
        }
    }

    pub fn family(&self) -> SinkFamily {
        match self {
            Self::DocumentWrite
            | Self::DocumentWriteln
            | Self::InnerHtml
            | Self::OuterHtml
            | Self::InsertAdjacentHtml => SinkFamily::Markup,
            Self::SetAttributeEvent => SinkFamily::EventHandler,
            Self::LocationAssign
            | Self::LocationReplace
            | Self::HistoryPushState
            | Self::HistoryReplaceState => SinkFamily::Navigation,
        }
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.hook_name())
    }
}

/// One intercepted sink invocation during a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkEvent {
    pub kind: SinkKind,
    /// Markup, attribute assignment or URL passed to the sink.
    pub value: String,
    pub timestamp_ms: u64,
}

impl SinkEvent {
    pub fn carries(&self, token: &str) -> bool {
        self.value.contains(token)
    }
}

/// Verdict for one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionSignal {
    None,
    Suspected,
    Confirmed,
}

impl ExecutionSignal {
    pub fn is_positive(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Suspected => "suspected",
            Self::Confirmed => "confirmed",
        }
    }
}

impl std::fmt::Display for ExecutionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
