//! # Edit Session
//!
//! One editor's view of a document: the editable tree, the durable value it
//! stands for, the selection, history and the throttling window.
//!
//! ## Flows
//!
//! - **Local command**: the command's operations are applied, translated to
//!   patches and recorded as one history step, touched blocks are
//!   normalized, then `patch`/`mutation` events go out and the throttling
//!   window is rearmed
//! - **Remote patches**: outside the window they are adapted to operations
//!   and applied at once, then the selection is re-derived from keys; inside
//!   the window they are queued and the tree is left alone
//! - **tick**: closes an expired window and flushes the queue
//!
//! While patches are queued, commands keep working on the tree and its
//! selection. A [`Projection`] tracks where that selection lands once the
//! queue is applied; `selection()` and selection events report it.

use crate::adapter::{adapt, adjust_selection};
use crate::change::{ChangeBus, EditorChange, SubscriptionId};
use crate::clock::{Clock, SystemClock, Throttle};
use crate::config::EditorConfig;
use crate::convert::{from_internal, to_internal, IdentityCache};
use crate::errors::{EditorResult, OperationError};
use crate::node::{clamp_range, is_empty_tree, placeholder_block, EditorTree, Node, Range, Selection};
use crate::normalize;
use crate::operations::Operation;
use crate::selection::{to_index_range, to_stable_range, KeyedRange};
use crate::translate::{translate, verify};
use crate::undo_stack::{AppliedOperation, UndoStack};
use crate::validate::validate_value;
use folio_model::{apply_all_json, document_from_json, document_to_json, Document, KeyGenerator, Patch, Schema};
use serde_json::Value as Json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the session is doing right now; only local, undo and redo work
/// produces patches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Idle,
    ApplyingLocal,
    ApplyingRemote,
    Undoing,
    Redoing,
}

impl EditMode {
    fn produces_patches(self) -> bool {
        matches!(self, EditMode::ApplyingLocal | EditMode::Undoing | EditMode::Redoing)
    }
}

/// Patches and touched blocks of the command in progress
#[derive(Debug, Default)]
struct LocalEdit {
    patches: Vec<Patch>,
    dirty: BTreeSet<String>,
}

/// The tree and selection as they will be once the queued patches apply
#[derive(Debug, Clone)]
struct Projection {
    tree: EditorTree,
    selection: Selection,
}

impl Projection {
    fn new(tree: &EditorTree, selection: &Selection) -> Self {
        Self {
            tree: tree.clone(),
            selection: selection.clone(),
        }
    }

    /// Move the selection for `patch`, then apply it so the next patch
    /// resolves against the tree it was written for
    fn advance(&mut self, patch: &Patch, schema: &Schema, keys: &mut KeyGenerator) {
        if let Some(range) = &self.selection {
            self.selection = Some(adjust_selection(range, patch, &self.tree));
        }
        let Ok(adapted) = adapt(patch, &self.tree, schema, keys) else {
            return;
        };
        let mut next = self.tree.clone();
        if adapted.operations.iter().try_for_each(|op| op.apply(&mut next)).is_ok() {
            self.tree = next;
            self.selection = self.selection.as_ref().map(|r| clamp_range(&self.tree, r));
        }
    }

    fn keyed_selection(&self) -> Option<KeyedRange> {
        self.selection.as_ref().and_then(|r| to_stable_range(r, &self.tree))
    }
}

const MAX_HEALING_PASSES: usize = 3;

pub struct EditorSession {
    pub(crate) config: EditorConfig,
    pub(crate) schema: Schema,
    pub(crate) tree: EditorTree,
    value: Option<Document>,
    pub(crate) selection: Selection,
    pub(crate) pending_marks: Option<Vec<String>>,
    pub(crate) focused: bool,
    pub(crate) keys: KeyGenerator,
    cache: IdentityCache,
    history: UndoStack,
    throttle: Throttle,
    clock: Arc<dyn Clock>,
    pub(crate) bus: ChangeBus,
    mode: EditMode,
    edit: Option<LocalEdit>,
    queued: Vec<Patch>,
    projection: Option<Projection>,
    ready: bool,
}

impl EditorSession {
    pub fn new(config: EditorConfig, session_id: &str) -> Self {
        Self::with_clock(config, session_id, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EditorConfig, session_id: &str, clock: Arc<dyn Clock>) -> Self {
        let schema = config.schema();
        let mut keys = KeyGenerator::new(session_id);
        let tree = vec![Arc::new(placeholder_block(keys.new_key(), keys.new_key(), &schema))];
        Self {
            history: UndoStack::with_max_levels(config.history_limit),
            throttle: Throttle::new(config.throttle_ms),
            config,
            schema,
            tree,
            value: None,
            selection: None,
            pending_marks: None,
            focused: false,
            keys,
            cache: IdentityCache::new(),
            clock,
            bus: ChangeBus::new(),
            mode: EditMode::Idle,
            edit: None,
            queued: Vec::new(),
            projection: None,
            ready: false,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn tree(&self) -> &EditorTree {
        &self.tree
    }

    /// Durable value; `None` while the editor is empty
    pub fn value(&self) -> Option<&Document> {
        self.value.as_ref()
    }

    pub fn value_json(&self) -> Option<Json> {
        self.value.as_deref().map(document_to_json)
    }

    /// Current selection, moved by any queued remote patches
    pub fn selection(&self) -> Option<&Range> {
        match &self.projection {
            Some(projection) => projection.selection.as_ref(),
            None => self.selection.as_ref(),
        }
    }

    /// Selection in the coordinates of [`EditorSession::tree`]
    pub fn tree_selection(&self) -> Option<&Range> {
        self.selection.as_ref()
    }

    pub fn keyed_selection(&self) -> Option<KeyedRange> {
        match &self.projection {
            Some(projection) => projection.keyed_selection(),
            None => self.selection.as_ref().and_then(|r| to_stable_range(r, &self.tree)),
        }
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn is_throttling(&self) -> bool {
        self.throttle.is_active()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn queued_patches(&self) -> usize {
        self.queued.len()
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&EditorChange) + Send + 'static) -> SubscriptionId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Run `f` as one local command: one history step, one `mutation` event
    pub(crate) fn run_command<T>(&mut self, f: impl FnOnce(&mut Self) -> EditorResult<T>) -> EditorResult<T> {
        if self.mode != EditMode::Idle {
            return f(self);
        }

        let selection_before = self.selection.clone();
        self.history.begin_batch();
        self.edit = Some(LocalEdit::default());
        self.mode = EditMode::ApplyingLocal;

        let result = f(self).and_then(|value| self.normalize_dirty().map(|_| value));

        self.mode = EditMode::Idle;
        self.history.end_batch();
        let edit = self.edit.take().unwrap_or_default();
        let finished = self.finish_edit(edit.patches, selection_before, None);
        let value = result?;
        finished?;
        Ok(value)
    }

    /// Apply one operation inside a command
    pub(crate) fn apply_op(&mut self, op: Operation) -> EditorResult<()> {
        let before = self.tree.clone();
        op.apply(&mut self.tree)?;
        self.selection = match &op {
            Operation::SetSelection { new_properties, .. } => {
                new_properties.as_ref().map(|r| clamp_range(&self.tree, r))
            }
            _ => self
                .selection
                .as_ref()
                .map(|r| clamp_range(&self.tree, &op.transform_range(r))),
        };

        if self.mode.produces_patches() && !op.is_selection() {
            let patches = translate(&op, &before, &self.tree, &self.schema)?;
            if self.config.verify_patches {
                verify(&op, &before, &self.tree, &patches, &self.schema)?;
            }
            if let Some(edit) = &mut self.edit {
                edit.patches.extend(patches);
                if let Some(&b) = op.path().and_then(|p| p.first()) {
                    let touched = b.saturating_sub(1)..=b + 1;
                    edit.dirty
                        .extend(touched.filter_map(|i| self.tree.get(i)).map(|n| n.key().to_string()));
                }
            }
        }
        if self.mode == EditMode::ApplyingLocal {
            self.history.push(op);
        }
        Ok(())
    }

    fn normalize_dirty(&mut self) -> EditorResult<()> {
        if self.tree.is_empty() {
            let block = placeholder_block(self.keys.new_key(), self.keys.new_key(), &self.schema);
            self.apply_op(Operation::InsertNode {
                path: vec![0],
                node: Node::Block(block),
            })?;
        }

        let mut pending: Vec<String> = self
            .edit
            .as_mut()
            .map(|e| std::mem::take(&mut e.dirty).into_iter().collect())
            .unwrap_or_default();
        while let Some(key) = pending.pop() {
            while let Some(index) = self.tree.iter().position(|b| b.key() == key) {
                match normalize::next_operation(&self.tree, index, &mut self.keys)? {
                    Some(op) => self.apply_op(op)?,
                    None => break,
                }
            }
        }
        Ok(())
    }

    /// Emit events for a finished edit and refresh the durable value
    fn finish_edit(
        &mut self,
        patches: Vec<Patch>,
        selection_before: Selection,
        history_event: Option<EditorChange>,
    ) -> EditorResult<()> {
        self.reproject();
        if !patches.is_empty() {
            debug!(patches = patches.len(), "local edit");
            for patch in &patches {
                self.bus.emit(EditorChange::Patch { patch: patch.clone() });
            }
            self.bus.emit(EditorChange::Mutation {
                patches: patches.clone(),
            });
            if let Some(event) = history_event {
                self.bus.emit(event);
            }
            if self.throttle.arm(self.clock.now_ms()) {
                self.bus.emit(EditorChange::Throttle { throttle: true });
            }
        }
        if self.selection != selection_before {
            self.emit_selection();
        }
        if !patches.is_empty() {
            let previous = self.sync_value()?;
            if let (Some(previous), None) = (previous, &self.value) {
                self.bus.emit(EditorChange::Unset {
                    previous_value: document_to_json(&previous),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn emit_selection(&mut self) {
        let selection = self.keyed_selection();
        self.bus.emit(EditorChange::Selection { selection });
    }

    /// Recompute the durable value from the tree; returns the previous one
    fn sync_value(&mut self) -> EditorResult<Option<Document>> {
        let next = if is_empty_tree(&self.tree, &self.schema) {
            None
        } else {
            Some(from_internal(&self.tree, &self.schema, &mut self.cache)?)
        };
        Ok(std::mem::replace(&mut self.value, next))
    }

    /// Accept patches from another source
    pub fn receive_remote(&mut self, patches: Vec<Patch>) {
        if patches.is_empty() {
            return;
        }
        for patch in &patches {
            if let Ok(json) = serde_json::to_value(patch) {
                self.keys.reserve_in(&json);
            }
        }
        if self.throttle.is_active() {
            let projected_before = self.keyed_selection();
            let projection = self
                .projection
                .get_or_insert_with(|| Projection::new(&self.tree, &self.selection));
            for patch in patches {
                projection.advance(&patch, &self.schema, &mut self.keys);
                self.queued.push(patch);
            }
            debug!(queued = self.queued.len(), "remote patches queued while throttling");
            if self.keyed_selection() != projected_before {
                self.emit_selection();
            }
            return;
        }
        self.apply_remote(patches, None);
    }

    /// Rebuild the projection after the tree or its selection changed
    fn reproject(&mut self) {
        if self.queued.is_empty() {
            self.projection = None;
            return;
        }
        let mut projection = Projection::new(&self.tree, &self.selection);
        for patch in &self.queued {
            projection.advance(patch, &self.schema, &mut self.keys);
        }
        self.projection = Some(projection);
    }

    fn flush_queue(&mut self) {
        let projected = self.projection.take().map(|p| p.keyed_selection());
        if self.queued.is_empty() {
            return;
        }
        let patches = std::mem::take(&mut self.queued);
        debug!(patches = patches.len(), "flushing queued remote patches");
        self.apply_remote(patches, projected);
    }

    /// Apply remote patches to the tree. `projected` is where the queue
    /// placed the selection, if these patches were queued.
    fn apply_remote(&mut self, patches: Vec<Patch>, projected: Option<Option<KeyedRange>>) {
        let keyed_before = self.keyed_selection();
        let selection_before = self.selection.clone();
        let previous_mode = std::mem::replace(&mut self.mode, EditMode::ApplyingRemote);
        let mut changed = false;

        for patch in patches {
            let adapted = match adapt(&patch, &self.tree, &self.schema, &mut self.keys) {
                Ok(adapted) => adapted,
                Err(e) => {
                    warn!(path = %patch.path(), kind = patch.name(), error = %e, "skipping remote patch");
                    continue;
                }
            };

            let mut working = self.tree.clone();
            let mut selection = self.selection.clone();
            let applied: Result<(), OperationError> = adapted.operations.iter().try_for_each(|op| {
                op.apply(&mut working)?;
                selection = selection.as_ref().map(|r| op.transform_range(r));
                Ok(())
            });
            if let Err(e) = applied {
                warn!(path = %patch.path(), kind = patch.name(), error = %e, "remote patch did not apply");
                continue;
            }

            changed |= !adapted.operations.is_empty();
            self.tree = working;
            self.selection = selection.map(|r| clamp_range(&self.tree, &r));
            self.history.record_remote(patch, adapted.effect);
        }
        self.mode = previous_mode;

        self.selection = match projected {
            Some(Some(keyed)) => to_index_range(&keyed, &self.tree).or_else(|| self.rederive_selection(keyed_before)),
            _ => self.rederive_selection(keyed_before),
        };
        if !changed {
            return;
        }
        if let Err(e) = self.sync_value() {
            warn!(error = %e, "remote patches left the tree without a durable value");
        }
        let value = self.value_json();
        self.bus.emit(EditorChange::Value { value });
        if self.selection != selection_before {
            self.emit_selection();
        }
    }

    /// Prefer the transformed selection while it still names the same nodes,
    /// otherwise map the previous keys back into the tree
    fn rederive_selection(&self, keyed_before: Option<KeyedRange>) -> Selection {
        let transformed = self.selection.clone();
        let Some(keyed) = keyed_before else {
            return transformed;
        };
        let same_nodes = transformed
            .as_ref()
            .and_then(|r| to_stable_range(r, &self.tree))
            .is_some_and(|now| now.anchor.path == keyed.anchor.path && now.focus.path == keyed.focus.path);
        if same_nodes {
            return transformed;
        }
        to_index_range(&keyed, &self.tree).or(transformed)
    }

    /// Advance time-driven state: ends an expired throttling window
    pub fn tick(&mut self) {
        if self.throttle.expire(self.clock.now_ms()) {
            self.bus.emit(EditorChange::Throttle { throttle: false });
            self.flush_queue();
        }
    }

    /// Replace the value from outside, validating and healing it first
    pub fn set_value(&mut self, value: Option<Json>) -> EditorResult<()> {
        self.bus.emit(EditorChange::Loading { is_loading: true });
        let result = self.load_value(value.unwrap_or(Json::Null));
        self.bus.emit(EditorChange::Loading { is_loading: false });
        result?;

        if !self.ready {
            self.ready = true;
            info!(blocks = self.tree.len(), "editor ready");
            self.bus.emit(EditorChange::Ready);
        }
        Ok(())
    }

    fn load_value(&mut self, mut json: Json) -> EditorResult<()> {
        self.keys.reserve_in(&json);
        let mut healing = Vec::new();
        for _ in 0..MAX_HEALING_PASSES {
            let resolutions = validate_value(&json, &self.schema, &mut self.keys);
            if resolutions.is_empty() {
                break;
            }
            warn!(problems = resolutions.len(), "invalid value; healing");
            let patches: Vec<Patch> = resolutions.iter().flat_map(|r| r.patches.clone()).collect();
            self.bus.emit(EditorChange::InvalidValue { resolutions });
            json = apply_all_json(Some(json), &patches).value.unwrap_or(Json::Null);
            healing.extend(patches);
        }
        if !healing.is_empty() {
            self.bus.emit(EditorChange::Mutation { patches: healing });
        }

        let document = match json {
            Json::Null => Vec::new(),
            other => document_from_json(other, &self.schema)?,
        };
        let keyed = self.keyed_selection();

        self.tree = if document.is_empty() {
            vec![Arc::new(placeholder_block(self.keys.new_key(), self.keys.new_key(), &self.schema))]
        } else {
            to_internal(Some(document.as_slice()), &mut self.cache)
        };
        self.value = (!document.is_empty()).then_some(document);
        self.selection = keyed
            .and_then(|k| to_index_range(&k, &self.tree))
            .or_else(|| self.selection.as_ref().map(|r| clamp_range(&self.tree, r)));
        self.history.clear();
        self.queued.clear();
        self.projection = None;

        let value = self.value_json();
        self.bus.emit(EditorChange::Value { value });
        Ok(())
    }

    /// Undo the last step; `false` when there was nothing to undo
    pub fn undo(&mut self) -> EditorResult<bool> {
        let selection_before = self.selection.clone();
        let Some(applied) = self.history.undo(&mut self.tree)? else {
            return Ok(false);
        };
        self.finish_history(applied, EditMode::Undoing, selection_before)?;
        Ok(true)
    }

    /// Redo the last undone step; `false` when there was nothing to redo
    pub fn redo(&mut self) -> EditorResult<bool> {
        let selection_before = self.selection.clone();
        let Some(applied) = self.history.redo(&mut self.tree)? else {
            return Ok(false);
        };
        self.finish_history(applied, EditMode::Redoing, selection_before)?;
        Ok(true)
    }

    fn finish_history(
        &mut self,
        applied: Vec<AppliedOperation>,
        mode: EditMode,
        selection_before: Selection,
    ) -> EditorResult<()> {
        let previous_mode = std::mem::replace(&mut self.mode, mode);
        let mut patches = Vec::new();
        let mut translated = Ok(());
        for step in &applied {
            self.selection = match &step.operation {
                Operation::SetSelection { new_properties, .. } => {
                    new_properties.as_ref().map(|r| clamp_range(&step.after, r))
                }
                op => self
                    .selection
                    .as_ref()
                    .map(|r| clamp_range(&step.after, &op.transform_range(r))),
            };
            if step.operation.is_selection() || translated.is_err() {
                continue;
            }
            translated = translate(&step.operation, &step.before, &step.after, &self.schema)
                .map(|step_patches| patches.extend(step_patches));
        }
        self.mode = previous_mode;
        translated?;

        let event = match mode {
            EditMode::Redoing => EditorChange::Redo {
                patches: patches.clone(),
            },
            _ => EditorChange::Undo {
                patches: patches.clone(),
            },
        };
        self.finish_edit(patches, selection_before, Some(event))
    }
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("blocks", &self.tree.len())
            .field("selection", &self.selection)
            .field("mode", &self.mode)
            .field("throttle", &self.throttle)
            .field("queued", &self.queued.len())
            .finish()
    }
}
