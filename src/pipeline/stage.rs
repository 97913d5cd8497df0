use serde::{Deserialize, Serialize};

/// Stages of a scan, in the only order they can be visited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FuzzStage {
    Init,
    EnumerateForms,
    FuzzForms,
    EnumerateUrlParams,
    FuzzUrlParams,
    FragmentFallback,
    Done,
}

impl std::fmt::Display for FuzzStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::EnumerateForms => write!(f, "enumerate-forms"),
            Self::FuzzForms => write!(f, "fuzz-forms"),
            Self::EnumerateUrlParams => write!(f, "enumerate-url-params"),
            Self::FuzzUrlParams => write!(f, "fuzz-url-params"),
            Self::FragmentFallback => write!(f, "fragment-fallback"),
            Self::Done => write!(f, "done"),
        }
    }
}

pub struct StageDefinition {
    pub stage: FuzzStage,
    pub display_name: &'static str,
    pub description: &'static str,
}

pub static STAGES: &[StageDefinition] = &[
    StageDefinition {
        stage: FuzzStage::Init,
        display_name: "Init",
        description: "Warm-up, CSP capture and instrumentation",
    },
    StageDefinition {
        stage: FuzzStage::EnumerateForms,
        display_name: "Form Enumeration",
        description: "Named form fields in document order",
    },
    StageDefinition {
        stage: FuzzStage::FuzzForms,
        display_name: "Form Fuzzing",
        description: "Candidate delivery through form submission",
    },
    StageDefinition {
        stage: FuzzStage::EnumerateUrlParams,
        display_name: "Parameter Enumeration",
        description: "Query parameters left to right",
    },
    StageDefinition {
        stage: FuzzStage::FuzzUrlParams,
        display_name: "Parameter Fuzzing",
        description: "Candidate delivery through query parameters",
    },
    StageDefinition {
        stage: FuzzStage::FragmentFallback,
        display_name: "Fragment Fallback",
        description: "Fragment delivery with a synthetic hashchange",
    },
    StageDefinition {
        stage: FuzzStage::Done,
        display_name: "Done",
        description: "Findings flushed",
    },
];

impl FuzzStage {
    pub fn display_name(&self) -> &'static str {
        STAGES
            .iter()
            .find(|d| d.stage == *self)
            .map(|d| d.display_name)
            .unwrap_or("Unknown")
    }

    pub fn is_terminal(&self) -> bool {
        *self == Self::Done
    }
}

/// Facts the transition function is allowed to look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageGuard {
    pub fuzz_forms: bool,
    pub fuzz_url: bool,
    /// Some earlier stage produced a confirmed finding.
    pub confirmed: bool,
    pub budget_exhausted: bool,
    pub cancelled: bool,
    /// The browser became unusable.
    pub aborted: bool,
}

impl FuzzStage {
    /// Next stage under `guard`. Budget exhaustion, cancellation and abort
    /// jump straight to `Done`; the fragment fallback runs only when nothing
    /// was confirmed before it.
    pub fn next(self, guard: &StageGuard) -> FuzzStage {
        if guard.budget_exhausted || guard.cancelled || guard.aborted {
            return FuzzStage::Done;
        }
        let after_forms = |g: &StageGuard| {
            if g.fuzz_url {
                FuzzStage::EnumerateUrlParams
            } else if g.confirmed {
                FuzzStage::Done
            } else {
                FuzzStage::FragmentFallback
            }
        };
        match self {
            FuzzStage::Init => {
                if guard.fuzz_forms {
                    FuzzStage::EnumerateForms
                } else {
                    after_forms(guard)
                }
            }
            FuzzStage::EnumerateForms => FuzzStage::FuzzForms,
            FuzzStage::FuzzForms => after_forms(guard),
            FuzzStage::EnumerateUrlParams => FuzzStage::FuzzUrlParams,
            FuzzStage::FuzzUrlParams => {
                if guard.confirmed {
                    FuzzStage::Done
                } else {
                    FuzzStage::FragmentFallback
                }
            }
            FuzzStage::FragmentFallback | FuzzStage::Done => FuzzStage::Done,
        }
    }
}
