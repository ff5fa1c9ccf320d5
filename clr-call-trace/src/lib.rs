//! Reconstruction of per-thread call trees from the event stream of an
//! in-process method tracing agent.
//!
//! Raw events come from an [`EventSource`], such as a recorded capture read
//! by [`CaptureReader`]. A [`TraceSession`] decodes them and feeds them to a
//! [`TraceBuilder`], which maintains one frame stack per OS thread and
//! produces a [`CallTrace`]. Frames can then be selected using a
//! [`FrameFilter`], or by a [`WatchFilter`] while the capture is ongoing.
//!
//! Parameter and return values of detailed frames are kept in encoded form
//! until someone looks at them, see the `clr-value` crate for the format.

mod builder;
mod event;
mod filter;
mod frame;
mod method;
mod session;
mod source;

pub use self::{
    builder::{
        build_trace, BuilderConfig, CallTrace, Completion, ThreadState, ThreadTrace, TraceBuilder,
        TraceIssue, TraceStats,
    },
    event::{
        CallDetails, CallKind, Event, EventData, EventDecodeError, EventKind, RawEvent, Sequence,
        ThreadId,
    },
    filter::{
        FilterError, FilterOptions, FilteredFrames, FrameFilter, FrameMatch, ValueFilterOptions,
        WatchFilter, WildcardError, WildcardSet,
    },
    frame::{
        Decodable, Encoded, FrameDetails, FrameId, FrameRef, FrameStack, FrameStatus, FrameTree,
        StackError,
    },
    method::{FunctionId, MethodCache, MethodInfo, MethodResolver, NoResolver},
    session::{
        CancellationToken, Capture, CaptureEnd, CaptureError, SessionConfig, TraceSession,
    },
    source::{CaptureReader, CaptureWriter, EventSource},
};
pub use clr_value as value;
