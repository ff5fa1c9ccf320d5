//! Call stack of a single thread, building up a frame tree

use super::{Encoded, FrameId, FrameStatus, FrameTree};
use crate::{
    event::{Sequence, ThreadId},
    method::MethodInfo,
};
use clr_value::Value;
use std::sync::Arc;
use thiserror::Error;

/// Frame tree of one thread, along with the frames that are still open
#[derive(Clone, Debug, PartialEq)]
pub struct FrameStack {
    /// Thread which this stack belongs to
    thread_id: ThreadId,

    /// Every frame seen so far
    tree: FrameTree,

    /// Frames that have been entered and not exited yet, innermost last
    open: Vec<FrameId>,
}
//
impl FrameStack {
    /// Start with an empty stack above a fresh root frame
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            tree: FrameTree::new(thread_id),
            open: Vec::new(),
        }
    }

    /// Enter a method, as a child of the current top of stack
    pub fn push(
        &mut self,
        method: Arc<MethodInfo>,
        sequence: Sequence,
        enter: Option<Encoded<Vec<Value>>>,
    ) -> FrameId {
        let parent = self.top();
        let id = self
            .tree
            .push_child(parent, method, sequence, self.thread_id, enter);
        self.open.push(id);
        id
    }

    /// Leave the current top of stack, marking it as returned
    ///
    /// The frame stays in the tree, it is only removed from the set of open
    /// frames. Fails if no method frame is open.
    pub fn pop(&mut self) -> Result<FrameId, StackError> {
        let id = self.open.pop().ok_or(StackError::Empty)?;
        self.tree.set_status(id, FrameStatus::Returned);
        Ok(id)
    }

    /// Innermost open frame, which is the root frame if none is open
    pub fn top(&self) -> FrameId {
        self.open.last().copied().unwrap_or(FrameId::ROOT)
    }

    /// Number of open method frames
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Frame tree built so far
    pub fn tree(&self) -> &FrameTree {
        &self.tree
    }

    /// Override the status of a frame, e.g. after a tail call replaced it
    pub fn set_status(&mut self, id: FrameId, status: FrameStatus) {
        self.tree.set_status(id, status);
    }

    /// Attach a return value to a frame
    pub fn set_exit(&mut self, id: FrameId, exit: Encoded<Value>) {
        self.tree.set_exit(id, exit);
    }

    /// Close the stack, marking frames that are still open as incomplete
    ///
    /// Returns the number of frames that were still open.
    pub fn finalize(&mut self) -> usize {
        let incomplete = self.open.len();
        for id in self.open.drain(..) {
            self.tree.set_status(id, FrameStatus::Incomplete);
        }
        let root_status = if incomplete == 0 {
            FrameStatus::Returned
        } else {
            FrameStatus::Incomplete
        };
        self.tree.set_status(FrameId::ROOT, root_status);
        incomplete
    }

    /// Extract the frame tree
    pub fn into_tree(self) -> FrameTree {
        self.tree
    }
}

/// What can go wrong while manipulating a frame stack
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum StackError {
    /// Attempted to pop a frame while none is open
    #[error("no method frame is open")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::FunctionId;
    use pretty_assertions::assert_eq;

    fn method(id: u64) -> Arc<MethodInfo> {
        Arc::new(MethodInfo::new(FunctionId(id), "M", "T", format!("F{id}")))
    }

    #[test]
    fn push_pop() {
        let mut stack = FrameStack::new(4);
        assert_eq!(stack.top(), FrameId::ROOT);
        let a = stack.push(method(1), 1, None);
        let b = stack.push(method(2), 2, None);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.top(), b);
        assert_eq!(stack.pop(), Ok(b));
        let c = stack.push(method(3), 3, None);
        assert_eq!(stack.pop(), Ok(c));
        assert_eq!(stack.pop(), Ok(a));
        assert_eq!(stack.pop(), Err(StackError::Empty));

        let tree = stack.tree();
        let a = tree.get(a).unwrap();
        assert_eq!(
            a.children().map(|f| f.id()).collect::<Vec<_>>(),
            vec![b, c]
        );
        assert!(tree.frames().all(|f| f.status() == FrameStatus::Returned));
        assert!(tree.frames().all(|f| f.thread_id() == 4));
    }

    #[test]
    fn finalize_open_frames() {
        let mut stack = FrameStack::new(1);
        let a = stack.push(method(1), 1, None);
        let b = stack.push(method(2), 2, None);
        stack.pop().unwrap();
        let c = stack.push(method(3), 3, None);
        assert_eq!(stack.finalize(), 2);
        assert_eq!(stack.depth(), 0);

        let tree = stack.into_tree();
        let status = |id| tree.get(id).unwrap().status();
        assert_eq!(status(a), FrameStatus::Incomplete);
        assert_eq!(status(b), FrameStatus::Returned);
        assert_eq!(status(c), FrameStatus::Incomplete);
        assert_eq!(status(FrameId::ROOT), FrameStatus::Incomplete);
    }

    #[test]
    fn finalize_balanced() {
        let mut stack = FrameStack::new(1);
        stack.push(method(1), 1, None);
        stack.pop().unwrap();
        assert_eq!(stack.finalize(), 0);
        assert_eq!(stack.tree().root().status(), FrameStatus::Returned);
    }
}
