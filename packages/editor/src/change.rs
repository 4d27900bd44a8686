//! # Change bus
//!
//! Events the session reports to whoever renders or persists the document.
//! Subscribers are plain callbacks invoked synchronously, in subscription
//! order, on the thread that drives the session.

use crate::selection::KeyedRange;
use crate::validate::Resolution;
use folio_model::Patch;
use serde::Serialize;
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorChange {
    Patch {
        patch: Patch,
    },
    /// All patches produced by one local command
    Mutation {
        patches: Vec<Patch>,
    },
    Selection {
        selection: Option<KeyedRange>,
    },
    Throttle {
        throttle: bool,
    },
    Loading {
        #[serde(rename = "isLoading")]
        is_loading: bool,
    },
    Value {
        value: Option<Json>,
    },
    Unset {
        #[serde(rename = "previousValue")]
        previous_value: Json,
    },
    Focus,
    Blur,
    InvalidValue {
        resolutions: Vec<Resolution>,
    },
    Ready,
    Undo {
        patches: Vec<Patch>,
    },
    Redo {
        patches: Vec<Patch>,
    },
}

impl EditorChange {
    pub fn name(&self) -> &'static str {
        match self {
            EditorChange::Patch { .. } => "patch",
            EditorChange::Mutation { .. } => "mutation",
            EditorChange::Selection { .. } => "selection",
            EditorChange::Throttle { .. } => "throttle",
            EditorChange::Loading { .. } => "loading",
            EditorChange::Value { .. } => "value",
            EditorChange::Unset { .. } => "unset",
            EditorChange::Focus => "focus",
            EditorChange::Blur => "blur",
            EditorChange::InvalidValue { .. } => "invalidValue",
            EditorChange::Ready => "ready",
            EditorChange::Undo { .. } => "undo",
            EditorChange::Redo { .. } => "redo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&EditorChange) + Send>;

#[derive(Default)]
pub struct ChangeBus {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&EditorChange) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `false` when the subscription was already gone
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, change: EditorChange) {
        tracing::trace!(event = change.name(), listeners = self.listeners.len(), "emit");
        for (_, listener) in &mut self.listeners {
            listener(&change);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
