//! Reconstructed call frames
//!
//! Frames live in a per-thread arena and refer to each other through
//! [`FrameId`] indices, which gives cheap traversal in both directions
//! without reference cycles.

mod payload;
mod stack;

pub use self::{
    payload::{Decodable, Encoded},
    stack::{FrameStack, StackError},
};

use crate::{
    event::{Sequence, ThreadId},
    method::MethodInfo,
};
use clr_value::{DecodeError, Value};
use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

/// Index of a frame within a [`FrameTree`]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FrameId(u32);
//
impl FrameId {
    /// Synthetic root frame, which every tree has
    pub const ROOT: FrameId = FrameId(0);

    /// Position in the arena
    fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Life cycle of a frame
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FrameStatus {
    /// Method has been entered and has not exited yet
    Running,

    /// Method has exited normally
    Returned,

    /// Method was replaced by a tail call
    Replaced,

    /// Capture ended before the method exited
    Incomplete,
}

/// Values captured by detailed call events
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDetails {
    /// Parameters, if the frame was entered by a detailed event
    pub enter: Option<Encoded<Vec<Value>>>,

    /// Return value, if the frame exited through a detailed event
    pub exit: Option<Encoded<Value>>,
}

/// Node of the frame arena
#[derive(Clone, Debug, PartialEq)]
struct FrameNode {
    /// Method that was called, None for the root frame
    method: Option<Arc<MethodInfo>>,

    /// Parent frame, None for the root frame
    parent: Option<FrameId>,

    /// Child frames in call order
    children: Vec<FrameId>,

    /// Global call order
    sequence: Sequence,

    /// Thread on which the call happened
    thread_id: ThreadId,

    /// Life cycle state
    status: FrameStatus,

    /// Captured values, for detailed frames only
    details: Option<Box<FrameDetails>>,
}

/// Tree of frames rooted at a synthetic root frame
#[derive(Clone, Debug, PartialEq)]
pub struct FrameTree {
    /// Frames, the root being at index 0
    nodes: Vec<FrameNode>,
}
//
impl FrameTree {
    /// Set up a tree containing only the root frame of some thread
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            nodes: vec![FrameNode {
                method: None,
                parent: None,
                children: Vec::new(),
                sequence: 0,
                thread_id,
                status: FrameStatus::Running,
                details: None,
            }],
        }
    }

    /// Root frame
    pub fn root(&self) -> FrameRef {
        FrameRef {
            tree: self,
            id: FrameId::ROOT,
        }
    }

    /// Access a frame by index
    pub fn get(&self, id: FrameId) -> Option<FrameRef> {
        (id.idx() < self.nodes.len()).then_some(FrameRef { tree: self, id })
    }

    /// Number of frames, including the root frame
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Truth that this tree only has a root frame
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// All method frames (excluding the root), in creation order
    pub fn frames(&self) -> impl Iterator<Item = FrameRef> {
        (1..self.nodes.len()).map(move |idx| FrameRef {
            tree: self,
            id: FrameId(idx as u32),
        })
    }

    /// Append a new frame as the last child of `parent`
    pub(crate) fn push_child(
        &mut self,
        parent: FrameId,
        method: Arc<MethodInfo>,
        sequence: Sequence,
        thread_id: ThreadId,
        enter: Option<Encoded<Vec<Value>>>,
    ) -> FrameId {
        let details = enter.map(|enter| Box::new(FrameDetails { enter: Some(enter), exit: None }));
        self.push_node(FrameNode {
            method: Some(method),
            parent: Some(parent),
            children: Vec::new(),
            sequence,
            thread_id,
            status: FrameStatus::Running,
            details,
        })
    }

    /// Append a node and link it to its parent
    fn push_node(&mut self, node: FrameNode) -> FrameId {
        let id = FrameId(
            u32::try_from(self.nodes.len()).expect("more than u32::MAX frames in a single tree"),
        );
        if let Some(parent) = node.parent {
            self.nodes[parent.idx()].children.push(id);
        }
        self.nodes.push(node);
        id
    }

    /// Update the life cycle state of a frame
    pub(crate) fn set_status(&mut self, id: FrameId, status: FrameStatus) {
        self.nodes[id.idx()].status = status;
    }

    /// Attach a return value to a frame
    pub(crate) fn set_exit(&mut self, id: FrameId, exit: Encoded<Value>) {
        self.nodes[id.idx()]
            .details
            .get_or_insert_with(Default::default)
            .exit = Some(exit);
    }

    /// Copy a frame and its descendants from `source`, under `new_parent`
    ///
    /// The copy is structurally identical to the original, child order
    /// included, except for its parent. Returns the index of the copy.
    pub fn clone_with_new_parent(
        &mut self,
        source: &FrameTree,
        frame: FrameId,
        new_parent: FrameId,
    ) -> FrameId {
        assert!(new_parent.idx() < self.nodes.len(), "invalid new parent");
        let copy_node = |tree: &mut Self, id: FrameId, parent: FrameId| {
            let node = &source.nodes[id.idx()];
            tree.push_node(FrameNode {
                parent: Some(parent),
                children: Vec::new(),
                ..node.clone()
            })
        };
        let copy = copy_node(self, frame, new_parent);

        // Children are pushed in reverse so that they get popped, and thus
        // copied, in call order
        let mut pending = source.nodes[frame.idx()]
            .children
            .iter()
            .rev()
            .map(|&child| (child, copy))
            .collect::<Vec<_>>();
        while let Some((original, parent)) = pending.pop() {
            let child_copy = copy_node(self, original, parent);
            pending.extend(
                source.nodes[original.idx()]
                    .children
                    .iter()
                    .rev()
                    .map(|&child| (child, child_copy)),
            );
        }
        copy
    }
}

/// Hierarchical view of a frame
#[derive(Clone, Copy)]
pub struct FrameRef<'tree> {
    /// Tree which this frame belongs to
    tree: &'tree FrameTree,

    /// Frame which we are looking at
    id: FrameId,
}
//
impl<'tree> FrameRef<'tree> {
    /// Node data
    fn node(&self) -> &'tree FrameNode {
        &self.tree.nodes[self.id.idx()]
    }

    /// Look at another frame of the same tree
    fn sibling(&self, id: FrameId) -> Self {
        Self {
            tree: self.tree,
            id,
        }
    }

    /// Index of the frame in its tree
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Truth that this is the synthetic root frame
    pub fn is_root(&self) -> bool {
        self.node().parent.is_none()
    }

    /// Method that was called, None for the root frame
    pub fn method(&self) -> Option<&'tree Arc<MethodInfo>> {
        self.node().method.as_ref()
    }

    /// Global call order
    pub fn sequence(&self) -> Sequence {
        self.node().sequence
    }

    /// Thread on which the call happened
    pub fn thread_id(&self) -> ThreadId {
        self.node().thread_id
    }

    /// Life cycle state
    pub fn status(&self) -> FrameStatus {
        self.node().status
    }

    /// Caller frame, if any
    pub fn parent(&self) -> Option<Self> {
        self.node().parent.map(|id| self.sibling(id))
    }

    /// Frames that were directly called by this one, in call order
    pub fn children(&self) -> impl Iterator<Item = FrameRef<'tree>> + 'tree {
        let tree = self.tree;
        self.node()
            .children
            .iter()
            .map(move |&id| FrameRef { tree, id })
    }

    /// Number of ancestors, zero for the root frame
    pub fn depth(&self) -> usize {
        std::iter::successors(self.parent(), FrameRef::parent).count()
    }

    /// This frame and all frames it transitively called, in depth-first
    /// call order
    pub fn descendants(&self) -> impl Iterator<Item = FrameRef<'tree>> + 'tree {
        let mut pending = vec![*self];
        std::iter::from_fn(move || {
            let frame = pending.pop()?;
            let children = &frame.node().children;
            pending.extend(children.iter().rev().map(|&id| frame.sibling(id)));
            Some(frame)
        })
    }

    /// Captured values, if this is a detailed frame
    pub fn details(&self) -> Option<&'tree FrameDetails> {
        self.node().details.as_deref()
    }

    /// Decoded parameters, if they were captured
    pub fn enter_values(&self) -> Option<Result<&'tree [Value], DecodeError>> {
        let enter = self.details()?.enter.as_ref()?;
        Some(enter.get().map(Vec::as_slice))
    }

    /// Decoded return value, if it was captured
    pub fn exit_value(&self) -> Option<Result<&'tree Value, DecodeError>> {
        let exit = self.details()?.exit.as_ref()?;
        Some(exit.get())
    }
}
//
impl Debug for FrameRef<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let node = self.node();
        f.debug_struct("FrameRef")
            .field("id", &self.id)
            .field("method", &node.method)
            .field("sequence", &node.sequence)
            .field("thread_id", &node.thread_id)
            .field("status", &node.status)
            // Elide the tree, which can be huge
            .finish_non_exhaustive()
    }
}
//
impl PartialEq for FrameRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}
