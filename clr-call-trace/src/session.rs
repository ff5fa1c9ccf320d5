//! Capture sessions, tying an event source to a trace builder

use crate::{
    builder::{BuilderConfig, CallTrace, Completion, TraceBuilder},
    event::Event,
    filter::{FrameMatch, WatchFilter},
    frame::FrameStatus,
    method::{MethodCache, MethodResolver},
    source::EventSource,
};
use log::{debug, info, warn};
use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use thiserror::Error;

/// Session configuration
pub type SessionConfig = BuilderConfig;

/// Mechanism to interrupt an ongoing capture from another thread
///
/// Cancellation is cooperative: it is checked between events, never in the
/// middle of one.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);
//
impl CancellationToken {
    /// Set up a token that is not cancelled yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Truth that cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Tracing session
///
/// Holds everything that outlives a single capture: method identities that
/// were learned so far, and the cancellation mechanism.
pub struct TraceSession {
    /// Configuration
    config: SessionConfig,

    /// Known method identities
    methods: MethodCache,

    /// Cancellation mechanism
    cancel: CancellationToken,
}
//
impl TraceSession {
    /// Set up a session
    pub fn new(config: SessionConfig) -> Self {
        Self::with_methods(config, MethodCache::new())
    }

    /// Set up a session that resolves unannounced methods using `resolver`
    pub fn with_resolver(
        config: SessionConfig,
        resolver: impl MethodResolver + Send + 'static,
    ) -> Self {
        Self::with_methods(config, MethodCache::with_resolver(resolver))
    }

    /// Set up a session with a pre-populated method cache
    fn with_methods(config: SessionConfig, methods: MethodCache) -> Self {
        Self {
            config,
            methods,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that can be used to interrupt captures of this session
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Method identities known to this session
    pub fn methods(&self) -> &MethodCache {
        &self.methods
    }

    /// Capture events until the source is exhausted, the capture is shut
    /// down, or cancellation is requested
    pub fn capture(&mut self, source: impl EventSource) -> Result<Capture, CaptureError> {
        self.run(source, |_, _| {})
    }

    /// Like `capture()`, but also report completed frames that pass a filter
    /// as soon as they are completed
    ///
    /// Frames that are still open when the capture ends are checked last, in
    /// sequence order, with status `Incomplete`.
    pub fn watch(
        &mut self,
        source: impl EventSource,
        filter: &mut WatchFilter,
        mut on_match: impl FnMut(FrameMatch),
    ) -> Result<Capture, CaptureError> {
        let result = self.run(source, |builder, completion| {
            if let Some(frame) = builder.frame(completion) {
                if let Some(found) = filter.check_frame_and_clear(frame) {
                    on_match(found);
                }
            }
        });
        let trace = match &result {
            Ok(capture) => &capture.trace,
            Err(CaptureError::Io { partial, .. }) => &partial.trace,
        };
        for frame in trace
            .frames_by_sequence()
            .into_iter()
            .filter(|frame| frame.status() == FrameStatus::Incomplete)
        {
            if let Some(found) = filter.check_frame_and_clear(frame) {
                on_match(found);
            }
        }
        result
    }

    /// Event processing loop
    fn run(
        &mut self,
        mut source: impl EventSource,
        mut on_completion: impl FnMut(&TraceBuilder, Completion),
    ) -> Result<Capture, CaptureError> {
        let mut builder = TraceBuilder::with_config(self.config);
        let mut skipped_events = 0;
        let mut events = 0;
        let end = loop {
            if self.cancel.is_cancelled() {
                info!("Capture cancelled after {events} event(s)");
                break CaptureEnd::Cancelled;
            }
            let raw = match source.next_event() {
                Ok(Some(raw)) => raw,
                Ok(None) => break CaptureEnd::Exhausted,
                Err(source) => {
                    let partial = Box::new(Capture {
                        trace: builder.finish(),
                        end: CaptureEnd::Failed,
                        skipped_events,
                    });
                    return Err(CaptureError::Io { source, partial });
                }
            };
            events += 1;
            let event = match Event::decode(raw) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Skipping undecodable event: {e}");
                    skipped_events += 1;
                    continue;
                }
            };
            if let Some(completion) = builder.process(event, &mut self.methods) {
                on_completion(&builder, completion);
            }
            if builder.is_shut_down() {
                break CaptureEnd::Shutdown;
            }
        };
        let capture = Capture {
            trace: builder.finish(),
            end,
            skipped_events,
        };
        debug!(
            "Capture ended ({end:?}) after {events} event(s), {} skipped: {:?}",
            skipped_events,
            capture.trace.stats()
        );
        Ok(capture)
    }
}
//
impl Default for TraceSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

/// Outcome of a capture
#[derive(Clone, Debug, PartialEq)]
pub struct Capture {
    /// Everything that was reconstructed
    pub trace: CallTrace,

    /// Why the capture ended
    pub end: CaptureEnd,

    /// Number of events which could not be decoded
    pub skipped_events: usize,
}

/// Reason why a capture ended
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CaptureEnd {
    /// Event source has no more events
    Exhausted,

    /// Shutdown event was received
    Shutdown,

    /// Cancellation was requested
    Cancelled,

    /// Event source failed
    Failed,
}

/// What can go wrong during a capture
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Failed to read events from the source
    #[error("failed to read events ({source})")]
    Io {
        source: io::Error,
        partial: Box<Capture>,
    },
}
//
impl CaptureError {
    /// What was captured before the error occured
    pub fn into_partial(self) -> Capture {
        match self {
            Self::Io { partial, .. } => *partial,
        }
    }
}
