use serde::{Deserialize, Serialize};
use super::context::ContextTag;

/// Delivery channel of an injection point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    FormField,
    UrlParam,
    Fragment,
}

impl PointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FormField => "form_field",
            Self::UrlParam => "url_param",
            Self::Fragment => "fragment",
        }
    }
}

/// The form a field belongs to, as seen in the loaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormTarget {
    /// Index of the form in document order.
    pub form_index: usize,
    pub action: Option<String>,
    pub method: String,
    /// Every named field of the form, including the fuzzed one.
    pub fields: Vec<String>,
}

/// A fuzzable location. Enumerated fresh per stage; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionPoint {
    pub kind: PointKind,
    pub name: String,
    /// Document order for form fields, left-to-right index for URL parameters.
    pub position: usize,
    pub context: ContextTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<FormTarget>,
}

impl InjectionPoint {
    pub fn fragment(context: ContextTag) -> Self {
        Self {
            kind: PointKind::Fragment,
            name: "#".to_string(),
            position: 0,
            context,
            form: None,
        }
    }

    /// Stable label used in logs and evidence tags.
    pub fn label(&self) -> String {
        match &self.form {
            Some(form) => format!("{}:{}:{}", self.kind.as_str(), form.form_index, self.name),
            None => format!("{}:{}", self.kind.as_str(), self.name),
        }
    }
}
