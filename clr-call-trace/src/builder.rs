//! Reconstruction of per-thread call trees from a stream of events

use crate::{
    event::{CallDetails, CallKind, Event, EventData, EventKind, Sequence, ThreadId},
    frame::{Decodable, Encoded, FrameId, FrameRef, FrameStack, FrameStatus, FrameTree, StackError},
    method::{FunctionId, MethodCache},
};
use clr_value::DecodeLimits;
use log::{debug, trace, warn};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Tunable trace builder behavior
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BuilderConfig {
    /// Limits applied when lazily decoding frame values
    pub decode_limits: DecodeLimits,

    /// Log a warning for each event that arrives after its thread (or the
    /// whole capture) has ended
    pub warn_late_events: bool,
}
//
impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            decode_limits: DecodeLimits::default(),
            warn_late_events: true,
        }
    }
}

/// Mechanism to build a [`CallTrace`] from events
///
/// Each thread is processed independently, from its own event subsequence
/// only, so no ordering between threads is assumed.
#[derive(Debug)]
pub struct TraceBuilder {
    /// Configuration
    config: BuilderConfig,

    /// Per-thread reconstruction state
    threads: HashMap<ThreadId, ThreadBuilder>,

    /// Sequence number that the next simple call event will get
    next_sequence: Sequence,

    /// Truth that a Shutdown event was received
    shut_down: bool,

    /// Number of events that were discarded because they came too late
    late_events: usize,
}
//
impl TraceBuilder {
    /// Set up a trace builder with default configuration
    pub fn new() -> Self {
        Self::with_config(BuilderConfig::default())
    }

    /// Set up a trace builder with custom configuration
    pub fn with_config(config: BuilderConfig) -> Self {
        Self {
            config,
            threads: HashMap::new(),
            next_sequence: 1,
            shut_down: false,
            late_events: 0,
        }
    }

    /// Process the next event
    ///
    /// Method identities are taken from and recorded into `methods`. If a
    /// frame was completed (returned or replaced by a tail call), it is
    /// reported back.
    pub fn process(&mut self, event: Event, methods: &mut MethodCache) -> Option<Completion> {
        let (kind, thread_id) = (event.kind(), event.thread_id);
        trace!("Processing {kind} event from thread {thread_id}");
        if self.shut_down {
            self.discard_late(kind, thread_id, "the capture was shut down");
            return None;
        }
        match event.data {
            EventData::MethodInfo(method) => {
                methods.insert(method);
                None
            }
            EventData::ThreadCreate => {
                if self.threads.contains_key(&thread_id) {
                    warn!("Ignoring duplicate creation of thread {thread_id}");
                } else {
                    self.threads.insert(thread_id, ThreadBuilder::new(thread_id));
                }
                None
            }
            EventData::Call {
                kind: call_kind,
                function_id,
                details,
            } => {
                if self.thread_state(thread_id) == ThreadState::Finished {
                    self.discard_late(kind, thread_id, "its thread was destroyed");
                    return None;
                }
                let sequence = self.assign_sequence(details.as_ref());
                let limits = self.config.decode_limits;
                let thread = self.threads.entry(thread_id).or_insert_with(|| {
                    debug!("Synthesizing root frame for never created thread {thread_id}");
                    ThreadBuilder::new(thread_id)
                });
                thread.call(call_kind, function_id, sequence, details, limits, methods)
            }
            EventData::ThreadDestroy => {
                match self.thread_state(thread_id) {
                    ThreadState::NoRoot => {
                        debug!("Thread {thread_id} was destroyed without making any call");
                        let mut thread = ThreadBuilder::new(thread_id);
                        thread.finish();
                        self.threads.insert(thread_id, thread);
                    }
                    ThreadState::InCall(_) => {
                        if let Some(thread) = self.threads.get_mut(&thread_id) {
                            thread.finish();
                        }
                    }
                    ThreadState::Finished => {
                        self.discard_late(kind, thread_id, "its thread was already destroyed")
                    }
                }
                None
            }
            EventData::Shutdown => {
                debug!("Capture shut down by thread {thread_id}");
                self.shut_down = true;
                for thread in self.threads.values_mut().filter(|t| !t.finished) {
                    thread.finish();
                }
                None
            }
        }
    }

    /// Truth that the capture was shut down
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Reconstruction state of a thread
    pub fn thread_state(&self, thread_id: ThreadId) -> ThreadState {
        match self.threads.get(&thread_id) {
            None => ThreadState::NoRoot,
            Some(thread) if thread.finished => ThreadState::Finished,
            Some(thread) => ThreadState::InCall(thread.stack.depth()),
        }
    }

    /// Look up a frame reported by [`TraceBuilder::process()`]
    pub fn frame(&self, completion: Completion) -> Option<FrameRef> {
        self.threads
            .get(&completion.thread_id)?
            .stack
            .tree()
            .get(completion.frame)
    }

    /// Number of events that were discarded because they came too late
    pub fn late_events(&self) -> usize {
        self.late_events
    }

    /// Finish building, finalizing every thread that is still running
    pub fn finish(self) -> CallTrace {
        let threads = self
            .threads
            .into_iter()
            .map(|(thread_id, mut thread)| {
                if !thread.finished {
                    thread.finish();
                }
                let ThreadBuilder {
                    stack,
                    issues,
                    incomplete_frames,
                    ..
                } = thread;
                (
                    thread_id,
                    ThreadTrace {
                        tree: stack.into_tree(),
                        issues,
                        incomplete_frames,
                    },
                )
            })
            .collect();
        CallTrace {
            threads,
            late_events: self.late_events,
        }
    }

    /// Pick the sequence number of a call event
    ///
    /// Detailed events carry their own sequence numbers, simple events are
    /// numbered after the highest sequence number seen so far.
    fn assign_sequence(&mut self, details: Option<&CallDetails>) -> Sequence {
        match details {
            Some(details) => {
                self.next_sequence = self.next_sequence.max(details.sequence.saturating_add(1));
                details.sequence
            }
            None => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                sequence
            }
        }
    }

    /// Record that an event was dropped
    fn discard_late(&mut self, kind: EventKind, thread_id: ThreadId, reason: &str) {
        self.late_events += 1;
        if self.config.warn_late_events {
            warn!("Discarding {kind} event from thread {thread_id} because {reason}");
        }
    }
}
//
impl Default for TraceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconstruct call trees from a sequence of events
///
/// Methods that were not announced by a MethodInfo event get placeholder
/// identities. Use a [`TraceSession`](crate::TraceSession) for more control.
pub fn build_trace(events: impl IntoIterator<Item = Event>) -> CallTrace {
    let mut builder = TraceBuilder::new();
    let mut methods = MethodCache::new();
    for event in events {
        builder.process(event, &mut methods);
    }
    builder.finish()
}

/// Where a thread stands in the reconstruction process
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ThreadState {
    /// No event was seen for this thread
    NoRoot,

    /// Thread is running with a certain number of open method frames
    InCall(usize),

    /// Thread was destroyed, or the capture was shut down
    Finished,
}

/// Frame that was just completed
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Completion {
    /// Thread on which the frame was running
    pub thread_id: ThreadId,

    /// Frame index in that thread's tree
    pub frame: FrameId,
}

/// Reconstruction state of a single thread
#[derive(Debug)]
struct ThreadBuilder {
    /// Thread identifier
    thread_id: ThreadId,

    /// Call stack and frames seen so far
    stack: FrameStack,

    /// Protocol inconsistencies detected so far
    issues: Vec<TraceIssue>,

    /// Highest sequence number seen so far on this thread
    last_sequence: Option<Sequence>,

    /// Truth that the thread was finalized
    finished: bool,

    /// Number of frames which were still open when the thread was finalized
    incomplete_frames: usize,
}
//
impl ThreadBuilder {
    /// Start tracking a thread
    fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            stack: FrameStack::new(thread_id),
            issues: Vec::new(),
            last_sequence: None,
            finished: false,
            incomplete_frames: 0,
        }
    }

    /// Process a call event
    fn call(
        &mut self,
        kind: CallKind,
        function_id: FunctionId,
        sequence: Sequence,
        details: Option<CallDetails>,
        limits: DecodeLimits,
        methods: &mut MethodCache,
    ) -> Option<Completion> {
        if let Some(last) = self.last_sequence {
            if sequence <= last {
                self.report(TraceIssue::SequenceRegression {
                    previous: last,
                    current: sequence,
                });
            }
        }
        self.last_sequence = Some(self.last_sequence.map_or(sequence, |last| last.max(sequence)));

        if let Some(status) = details.as_ref().map(|d| d.status).filter(|&s| s != 0) {
            debug!(
                "Agent reported status {status} for {kind:?} of {function_id} on thread {}",
                self.thread_id
            );
        }
        match kind {
            CallKind::Enter => {
                let method = methods.resolve(function_id);
                self.stack.push(method, sequence, encoded(details, limits));
                None
            }
            CallKind::Exit => {
                let frame = match self.stack.pop() {
                    Ok(frame) => frame,
                    Err(StackError::Empty) => {
                        self.report(TraceIssue::UnbalancedExit { function_id });
                        return None;
                    }
                };
                let expected = self
                    .stack
                    .tree()
                    .get(frame)
                    .and_then(|f| f.method().map(|m| m.function_id));
                if let Some(expected) = expected.filter(|&expected| expected != function_id) {
                    self.report(TraceIssue::MismatchedExit {
                        expected,
                        found: function_id,
                    });
                }
                if let Some(exit) = encoded(details, limits) {
                    self.stack.set_exit(frame, exit);
                }
                Some(self.completion(frame))
            }
            CallKind::Tailcall => {
                let replaced = match self.stack.pop() {
                    Ok(frame) => {
                        self.stack.set_status(frame, FrameStatus::Replaced);
                        Some(frame)
                    }
                    Err(StackError::Empty) => {
                        self.report(TraceIssue::UnbalancedTailcall { function_id });
                        None
                    }
                };
                let method = methods.resolve(function_id);
                self.stack.push(method, sequence, encoded(details, limits));
                replaced.map(|frame| self.completion(frame))
            }
        }
    }

    /// Finalize the thread's frame tree
    fn finish(&mut self) {
        self.incomplete_frames = self.stack.finalize();
        if self.incomplete_frames > 0 {
            debug!(
                "Thread {} ended with {} open frame(s)",
                self.thread_id, self.incomplete_frames
            );
        }
        self.finished = true;
    }

    /// Record a protocol inconsistency
    fn report(&mut self, issue: TraceIssue) {
        warn!("Inconsistent trace on thread {}: {issue}", self.thread_id);
        self.issues.push(issue);
    }

    /// Describe a completed frame
    fn completion(&self, frame: FrameId) -> Completion {
        Completion {
            thread_id: self.thread_id,
            frame,
        }
    }
}

/// Wrap the values of a detailed call event for lazy decoding
fn encoded<T: Decodable>(
    details: Option<CallDetails>,
    limits: DecodeLimits,
) -> Option<Encoded<T>> {
    details.map(|d| Encoded::new(d.status, d.values, limits))
}

/// Protocol inconsistency detected while reconstructing a thread's trace
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TraceIssue {
    /// A method exited while no method frame was open
    #[error("method {function_id} exited while no call was in progress")]
    UnbalancedExit { function_id: FunctionId },

    /// The method that exited is not the innermost running method
    #[error("method {found} exited while {expected} was the innermost call")]
    MismatchedExit {
        expected: FunctionId,
        found: FunctionId,
    },

    /// A tail call occured while no method frame was open
    #[error("tail call to {function_id} while no call was in progress")]
    UnbalancedTailcall { function_id: FunctionId },

    /// Sequence numbers went backwards
    #[error("sequence number went from {previous} to {current}")]
    SequenceRegression { previous: Sequence, current: Sequence },
}

/// Reconstructed call tree of one thread
#[derive(Clone, Debug, PartialEq)]
pub struct ThreadTrace {
    /// Frames, below a synthetic root
    tree: FrameTree,

    /// Protocol inconsistencies detected during reconstruction
    issues: Vec<TraceIssue>,

    /// Number of frames that never exited
    incomplete_frames: usize,
}
//
impl ThreadTrace {
    /// Root frame
    pub fn root(&self) -> FrameRef {
        self.tree.root()
    }

    /// Frame tree
    pub fn tree(&self) -> &FrameTree {
        &self.tree
    }

    /// Protocol inconsistencies detected during reconstruction
    pub fn issues(&self) -> &[TraceIssue] {
        &self.issues
    }

    /// Truth that no protocol inconsistency was detected
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }

    /// Truth that every method frame exited before the capture ended
    pub fn is_complete(&self) -> bool {
        self.incomplete_frames == 0
    }

    /// Number of frames that never exited
    pub fn incomplete_frames(&self) -> usize {
        self.incomplete_frames
    }
}

/// Reconstructed call trees of every thread of a capture
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallTrace {
    /// Per-thread call trees
    threads: BTreeMap<ThreadId, ThreadTrace>,

    /// Number of events discarded because they came too late
    late_events: usize,
}
//
impl CallTrace {
    /// Call tree of a specific thread
    pub fn thread(&self, thread_id: ThreadId) -> Option<&ThreadTrace> {
        self.threads.get(&thread_id)
    }

    /// Call trees of every thread, ordered by thread ID
    pub fn threads(&self) -> impl Iterator<Item = (ThreadId, &ThreadTrace)> {
        self.threads.iter().map(|(&id, trace)| (id, trace))
    }

    /// Root frames of every thread, ordered by thread ID
    pub fn roots(&self) -> BTreeMap<ThreadId, FrameRef> {
        self.threads
            .iter()
            .map(|(&id, trace)| (id, trace.root()))
            .collect()
    }

    /// Truth that no thread was traced
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Every method frame of every thread, by increasing sequence number
    ///
    /// Ties are broken by thread ID, so the output order does not depend on
    /// the order in which events of different threads were processed.
    pub fn frames_by_sequence(&self) -> Vec<FrameRef> {
        let mut frames = self
            .threads
            .values()
            .flat_map(|trace| trace.tree.frames())
            .collect::<Vec<_>>();
        frames.sort_by_key(|frame| (frame.sequence(), frame.thread_id()));
        frames
    }

    /// Graft the call trees of all threads under a single synthetic root
    ///
    /// Top-level frames of all threads become children of the new root,
    /// ordered by sequence number then thread ID.
    pub fn merged(&self) -> FrameTree {
        let mut merged = FrameTree::new(0);
        let mut tops = self
            .threads
            .values()
            .flat_map(|trace| trace.tree.root().children().map(move |frame| (trace, frame)))
            .collect::<Vec<_>>();
        tops.sort_by_key(|(_, frame)| (frame.sequence(), frame.thread_id()));
        for (trace, frame) in tops {
            merged.clone_with_new_parent(&trace.tree, frame.id(), FrameId::ROOT);
        }
        merged
    }

    /// Summary statistics
    pub fn stats(&self) -> TraceStats {
        let mut stats = TraceStats {
            threads: self.threads.len(),
            late_events: self.late_events,
            ..Default::default()
        };
        for trace in self.threads.values() {
            stats.frames += trace.tree.len() - 1;
            stats.incomplete_frames += trace.incomplete_frames;
            stats.issues += trace.issues.len();
            let depth = trace.tree.frames().map(|f| f.depth()).max().unwrap_or(0);
            stats.max_depth = stats.max_depth.max(depth);
        }
        stats
    }
}

/// Summary statistics of a [`CallTrace`]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TraceStats {
    /// Number of traced threads
    pub threads: usize,

    /// Number of method frames across all threads
    pub frames: usize,

    /// Deepest frame nesting across all threads
    pub max_depth: usize,

    /// Number of frames that never exited
    pub incomplete_frames: usize,

    /// Number of protocol inconsistencies
    pub issues: usize,

    /// Number of events discarded because they came too late
    pub late_events: usize,
}
