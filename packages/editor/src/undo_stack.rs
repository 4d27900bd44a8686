//! # Undo/Redo History
//!
//! Tracks local operation batches and the remote patches applied since.
//!
//! ## Design
//!
//! - A local command's operations are grouped between `begin_batch` and
//!   `end_batch`; the finished group becomes one undo step or merges into the
//!   previous one (continued typing, selection moves)
//! - Remote patches are logged with a sequence number when they land in the
//!   tree, and seal the batch before them
//! - Undo/redo transform a batch against every remote entry newer than the
//!   batch, then apply it to a copy of the tree; nothing changes unless every
//!   operation applies
//! - New edits clear the redo stack; the oldest batches are trimmed past the
//!   configured limit

use crate::adapter::RemoteEffect;
use crate::errors::OperationResult;
use crate::node::{EditorTree, Point, Range};
use crate::operations::Operation;
use folio_model::Patch;
use tracing::{debug, error, warn};

/// Local operations undone and redone together
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// In application order
    pub operations: Vec<Operation>,

    /// History sequence number when the batch was started
    pub stamp: u64,

    /// A remote patch landed after this batch; nothing merges into it
    sealed: bool,
}

/// Remote patch as it was applied to the tree
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub seq: u64,
    pub patch: Patch,
    pub effect: RemoteEffect,
}

/// Operation applied by undo/redo, with the trees around it
#[derive(Debug, Clone)]
pub struct AppliedOperation {
    pub operation: Operation,
    pub before: EditorTree,
    pub after: EditorTree,
}

#[derive(Debug)]
pub struct UndoStack {
    undo_stack: Vec<Batch>,
    redo_stack: Vec<Batch>,
    remote: Vec<RemoteEntry>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    current_batch: Option<Vec<Operation>>,
    seq: u64,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            remote: Vec::new(),
            max_levels,
            current_batch: None,
            seq: 0,
        }
    }

    pub fn begin_batch(&mut self) {
        self.current_batch = Some(Vec::new());
    }

    /// Record an applied operation; outside a batch it forms its own step
    pub fn push(&mut self, operation: Operation) {
        match &mut self.current_batch {
            Some(batch) => batch.push(operation),
            None => self.commit(vec![operation]),
        }
    }

    pub fn end_batch(&mut self) {
        if let Some(operations) = self.current_batch.take() {
            if !operations.is_empty() {
                self.commit(operations);
            }
        }
    }

    fn commit(&mut self, operations: Vec<Operation>) {
        let selection_only = operations.iter().all(Operation::is_selection);
        if selection_only {
            // Selection moves never start a step of their own
            if let Some(last) = self.undo_stack.last_mut().filter(|b| !b.sealed) {
                for op in operations {
                    merge_selection(&mut last.operations, op);
                }
            }
            return;
        }

        self.redo_stack.clear();
        self.prune_remote();
        if let Some(last) = self.undo_stack.last_mut().filter(|b| !b.sealed) {
            if let ([next], Some(previous)) = (operations.as_slice(), last.operations.last()) {
                if continues_typing(previous, next) {
                    last.operations.extend(operations);
                    return;
                }
            }
        }

        self.seq += 1;
        self.undo_stack.push(Batch {
            operations,
            stamp: self.seq,
            sealed: false,
        });
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
            self.prune_remote();
        }
    }

    /// Log a remote patch that was just applied to the tree
    pub fn record_remote(&mut self, patch: Patch, effect: RemoteEffect) {
        if let Some(last) = self.undo_stack.last_mut() {
            last.sealed = true;
        }
        if self.undo_stack.is_empty() && self.redo_stack.is_empty() {
            return;
        }
        self.seq += 1;
        self.remote.push(RemoteEntry {
            seq: self.seq,
            patch,
            effect,
        });
    }

    fn prune_remote(&mut self) {
        let oldest = self
            .undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(|b| b.stamp)
            .min();
        match oldest {
            Some(stamp) => self.remote.retain(|entry| entry.seq > stamp),
            None => self.remote.clear(),
        }
    }

    /// Undo the most recent batch. `Ok(None)` when there is nothing to undo.
    ///
    /// On failure the batch is dropped and the tree is left untouched.
    pub fn undo(&mut self, tree: &mut EditorTree) -> OperationResult<Option<Vec<AppliedOperation>>> {
        let Some(batch) = self.undo_stack.pop() else {
            return Ok(None);
        };
        let inverted: Vec<Operation> = self
            .transform_batch(&batch)
            .iter()
            .rev()
            .map(Operation::inverse)
            .collect();

        match apply_atomic(&inverted, tree) {
            Ok(applied) => {
                debug!(operations = applied.len(), stamp = batch.stamp, "undo");
                self.redo_stack.push(batch);
                if let Some(last) = self.undo_stack.last_mut() {
                    last.sealed = true;
                }
                Ok(Some(applied))
            }
            Err(e) => {
                error!(error = %e, stamp = batch.stamp, "undo failed; discarding the step");
                self.prune_remote();
                Err(e)
            }
        }
    }

    /// Reapply the most recently undone batch
    pub fn redo(&mut self, tree: &mut EditorTree) -> OperationResult<Option<Vec<AppliedOperation>>> {
        let Some(mut batch) = self.redo_stack.pop() else {
            return Ok(None);
        };
        let operations = self.transform_batch(&batch);

        match apply_atomic(&operations, tree) {
            Ok(applied) => {
                debug!(operations = applied.len(), stamp = batch.stamp, "redo");
                batch.sealed = true;
                self.undo_stack.push(batch);
                Ok(Some(applied))
            }
            Err(e) => {
                error!(error = %e, stamp = batch.stamp, "redo failed; discarding the step");
                self.prune_remote();
                Err(e)
            }
        }
    }

    /// The batch's operations moved past every remote patch applied after it
    fn transform_batch(&self, batch: &Batch) -> Vec<Operation> {
        let mut operations = batch.operations.clone();
        for entry in self.remote.iter().filter(|entry| entry.seq > batch.stamp) {
            if entry.effect == RemoteEffect::DocumentReplaced {
                return Vec::new();
            }
            operations = operations
                .into_iter()
                .filter_map(|op| {
                    let transformed = transform(&op, &entry.effect);
                    if transformed.is_none() {
                        warn!(
                            operation = op.name(),
                            path = ?op.path(),
                            patch = %entry.patch.path(),
                            "remote change removed the target of a history step; dropping it"
                        );
                    }
                    transformed
                })
                .collect();
        }
        operations
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn remote_entries(&self) -> &[RemoteEntry] {
        &self.remote
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.remote.clear();
        self.current_batch = None;
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_atomic(operations: &[Operation], tree: &mut EditorTree) -> OperationResult<Vec<AppliedOperation>> {
    let mut working = tree.clone();
    let mut applied = Vec::with_capacity(operations.len());
    for operation in operations {
        let before = working.clone();
        operation.apply(&mut working)?;
        applied.push(AppliedOperation {
            operation: operation.clone(),
            before,
            after: working.clone(),
        });
    }
    *tree = working;
    Ok(applied)
}

/// Fold a selection change into the last selection op of a batch
fn merge_selection(operations: &mut Vec<Operation>, op: Operation) {
    match (operations.last_mut(), op) {
        (
            Some(Operation::SetSelection {
                new_properties: last, ..
            }),
            Operation::SetSelection { new_properties, .. },
        ) => *last = new_properties,
        (_, op) => operations.push(op),
    }
}

/// Typing or deleting that continues `previous` without crossing a word boundary
fn continues_typing(previous: &Operation, next: &Operation) -> bool {
    match (previous, next) {
        (
            Operation::InsertText {
                path: p1,
                offset: o1,
                text: t1,
            },
            Operation::InsertText {
                path: p2,
                offset: o2,
                text: t2,
            },
        ) => p1 == p2 && *o2 == o1 + t1.chars().count() && !t2.contains(' '),
        (
            Operation::RemoveText {
                path: p1, offset: o1, ..
            },
            Operation::RemoveText {
                path: p2,
                offset: o2,
                text: t2,
            },
        ) => {
            let backspace = o2 + t2.chars().count() == *o1;
            let forward = o2 == o1;
            p1 == p2 && (backspace || forward) && !t2.contains(' ')
        }
        _ => false,
    }
}

fn with_index(path: &[usize], depth: usize, index: usize) -> Vec<usize> {
    let mut path = path.to_vec();
    path[depth] = index;
    path
}

/// Move `op` past a remote change. `None` when the change removed its target.
pub fn transform(op: &Operation, effect: &RemoteEffect) -> Option<Operation> {
    if let Operation::SetSelection {
        properties,
        new_properties,
    } = op
    {
        let shift = |range: &Option<Range>| {
            range
                .as_ref()
                .map(|r| Range::new(shift_point(&r.anchor, effect), shift_point(&r.focus, effect)))
        };
        return Some(Operation::SetSelection {
            properties: shift(properties),
            new_properties: shift(new_properties),
        });
    }

    let path = op.path()?;
    let is_insert = matches!(op, Operation::InsertNode { .. });
    let mut op = op.clone();

    match *effect {
        RemoteEffect::BlocksInserted { index, count } => {
            if path[0] >= index {
                set_path(&mut op, with_index(path, 0, path[0] + count));
            }
            if let Operation::MoveNode { new_path, .. } = &mut op {
                if new_path[0] >= index {
                    new_path[0] += count;
                }
            }
        }
        RemoteEffect::BlockRemoved { index } => {
            if path[0] == index && !(is_insert && path.len() == 1) {
                return None;
            }
            if path[0] > index {
                set_path(&mut op, with_index(path, 0, path[0] - 1));
            }
            if let Operation::MoveNode { new_path, .. } = &mut op {
                if new_path[0] > index {
                    new_path[0] -= 1;
                }
            }
        }
        RemoteEffect::ChildrenInserted { block, index, count } => match path {
            [b, c] if *b == block && *c >= index => set_path(&mut op, with_index(path, 1, c + count)),
            [b] => shift_child_position(&mut op, *b, block, index, count as isize),
            _ => {}
        },
        RemoteEffect::ChildRemoved { block, index } => match path {
            [b, c] if *b == block && *c == index && !is_insert => return None,
            [b, c] if *b == block && *c > index => set_path(&mut op, with_index(path, 1, c - 1)),
            [b] => shift_child_position(&mut op, *b, block, index, -1),
            _ => {}
        },
        RemoteEffect::TextChanged {
            block,
            child,
            change_start,
            delta,
        } => {
            let shift = |offset: usize| {
                if change_start <= offset {
                    (offset as isize + delta).max(change_start as isize) as usize
                } else {
                    offset
                }
            };
            let same_leaf = path == [block, child];
            match &mut op {
                Operation::InsertText { offset, .. } | Operation::RemoveText { offset, .. } if same_leaf => {
                    *offset = shift(*offset)
                }
                Operation::SplitNode { position, .. } if same_leaf => *position = shift(*position),
                Operation::MergeNode { position, .. } if path == [block, child + 1] => {
                    *position = (*position as isize + delta).max(0) as usize
                }
                _ => {}
            }
        }
        RemoteEffect::DocumentReplaced => return None,
        RemoteEffect::Opaque => {}
    }
    Some(op)
}

/// Block-level split and merge positions count children
fn shift_child_position(op: &mut Operation, op_block: usize, block: usize, index: usize, delta: isize) {
    let shift = |position: &mut usize| *position = (*position as isize + delta).max(0) as usize;
    match op {
        Operation::SplitNode { position, .. } if op_block == block && index < *position => shift(position),
        Operation::MergeNode { position, .. } if op_block == block + 1 => shift(position),
        _ => {}
    }
}

fn set_path(op: &mut Operation, new: Vec<usize>) {
    match op {
        Operation::InsertText { path, .. }
        | Operation::RemoveText { path, .. }
        | Operation::InsertNode { path, .. }
        | Operation::RemoveNode { path, .. }
        | Operation::SplitNode { path, .. }
        | Operation::MergeNode { path, .. }
        | Operation::MoveNode { path, .. }
        | Operation::SetNode { path, .. } => *path = new,
        Operation::SetSelection { .. } => {}
    }
}

fn shift_point(point: &Point, effect: &RemoteEffect) -> Point {
    let (b, c, o) = (point.block(), point.child(), point.offset);
    match *effect {
        RemoteEffect::BlocksInserted { index, count } if b >= index => Point::new(b + count, c, o),
        RemoteEffect::BlockRemoved { index } if b > index => Point::new(b - 1, c, o),
        RemoteEffect::ChildrenInserted { block, index, count } if b == block && c >= index => {
            Point::new(b, c + count, o)
        }
        RemoteEffect::ChildRemoved { block, index } if b == block && c > index => Point::new(b, c - 1, o),
        RemoteEffect::TextChanged {
            block,
            child,
            change_start,
            delta,
        } if b == block && c == child && change_start <= o => {
            Point::new(b, c, (o as isize + delta).max(change_start as isize) as usize)
        }
        _ => point.clone(),
    }
}
