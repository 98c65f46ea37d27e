//! Device model to assistant/container lookup
//!
//! Front ends only know the device model printed on the unit; this table
//! tells them which assistant and document container answer for it.

use serde::{Deserialize, Serialize};

/// One catalog row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfuEntry {
    pub model: String,
    pub assistantid: String,
    pub containerid: String,
}

impl IfuEntry {
    fn new(model: &str, assistantid: &str, containerid: &str) -> Self {
        Self {
            model: model.to_string(),
            assistantid: assistantid.to_string(),
            containerid: containerid.to_string(),
        }
    }
}

/// Reply of `GET /get_ifu`; both fields are empty when nothing matched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfuLocation {
    pub assistantid: String,
    pub containerid: String,
}

impl From<&IfuEntry> for IfuLocation {
    fn from(entry: &IfuEntry) -> Self {
        Self {
            assistantid: entry.assistantid.clone(),
            containerid: entry.containerid.clone(),
        }
    }
}

const VISTA_ASSISTANT: &str = "fab9226e-cb6b-4ced-9310-e3560804e675";
const VISTA_CONTAINER: &str = "41f4f2b3-4ae1-42f3-b824-b7430ffb45c5";

/// Models known out of the box
pub fn builtin_catalog() -> Vec<IfuEntry> {
    vec![
        IfuEntry::new("Vista 300", VISTA_ASSISTANT, VISTA_CONTAINER),
        IfuEntry::new("Vista 120", VISTA_ASSISTANT, VISTA_CONTAINER),
        IfuEntry::new(
            "Atlan 100",
            "45bcc1e2-79f6-46bf-94fc-3e5c94168ee7",
            "e05d7522-891a-416a-8bed-cbefc0c64209",
        ),
        IfuEntry::new("Epic", VISTA_ASSISTANT, VISTA_CONTAINER),
    ]
}

/// Find the entry for `model`.
///
/// An exact match wins; otherwise the first entry (in catalog order) whose
/// name contains `model`, ignoring case.
pub fn lookup<'a>(catalog: &'a [IfuEntry], model: &str) -> Option<&'a IfuEntry> {
    let model = model.trim();
    if model.is_empty() {
        return None;
    }

    catalog.iter().find(|entry| entry.model == model).or_else(|| {
        let needle = model.to_lowercase();
        catalog
            .iter()
            .find(|entry| entry.model.to_lowercase().contains(&needle))
    })
}
