//! Selection of interesting frames from a call trace
//!
//! Frames can be selected by method identity (with wildcard patterns), by
//! the identity of their caller, and by the values of their parameters.
//! Selection can happen in bulk over a whole [`CallTrace`], or one frame at a
//! time while a capture is ongoing.

mod values;
mod wildcard;

pub use self::{
    values::ValueFilterOptions,
    wildcard::{WildcardError, WildcardSet},
};

use self::values::ValueFilter;
use crate::{builder::CallTrace, frame::FrameRef, method::FunctionId};
use serde::Deserialize;
use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;

/// Frame selection criteria
///
/// Can be deserialized from JSON, e.g.
/// `{ "include": ["*.Parse*"], "values": { "int32": [0] } }`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FilterOptions {
    /// Only keep frames whose method matches one of these patterns (all
    /// frames are kept if this is empty)
    pub include: Vec<String>,

    /// Drop frames whose method matches one of these patterns
    pub exclude: Vec<String>,

    /// Only keep frames whose caller matches one of these patterns
    pub parent_method: Vec<String>,

    /// Only report the first frame of each method
    pub unique: bool,

    /// Parameter value predicates
    pub values: ValueFilterOptions,
}

/// Frame that was selected by a filter
#[derive(Clone, Debug, PartialEq)]
pub struct FrameMatch<'trace> {
    /// Selected frame
    pub frame: FrameRef<'trace>,

    /// Indices of the parameters that satisfied the value predicates, empty
    /// if no value predicate is configured
    pub matched_parameters: Vec<usize>,
}

/// Compiled frame selection criteria
#[derive(Debug)]
pub struct FrameFilter {
    /// Patterns that methods must match, if any
    include: Option<WildcardSet>,

    /// Patterns that methods must not match
    exclude: WildcardSet,

    /// Patterns that the caller must match, if any
    parent_method: Option<WildcardSet>,

    /// Parameter value predicates, if any
    values: Option<ValueFilter>,

    /// Only report the first frame of each method
    unique: bool,

    /// Methods that were already reported by `process_frame()`
    seen: Mutex<HashSet<FunctionId>>,
}
//
impl FrameFilter {
    /// Compile selection criteria
    pub fn new(options: FilterOptions) -> Result<Self, FilterError> {
        if let Some(pattern) = options
            .include
            .iter()
            .find(|pattern| options.exclude.contains(pattern))
        {
            return Err(FilterError::IncludedAndExcluded(pattern.clone()));
        }
        let optional_set = |patterns: &[String]| -> Result<_, WildcardError> {
            if patterns.is_empty() {
                Ok(None)
            } else {
                WildcardSet::new(patterns).map(Some)
            }
        };
        Ok(Self {
            include: optional_set(&options.include)?,
            exclude: WildcardSet::new(&options.exclude)?,
            parent_method: optional_set(&options.parent_method)?,
            values: ValueFilter::new(options.values)?,
            unique: options.unique,
            seen: Mutex::new(HashSet::new()),
        })
    }

    /// Evaluate everything but uniqueness on one frame
    pub fn matches<'trace>(&self, frame: FrameRef<'trace>) -> Option<FrameMatch<'trace>> {
        let method = frame.method()?;
        if let Some(include) = &self.include {
            if !include.matches_method(method) {
                return None;
            }
        }
        if self.exclude.matches_method(method) {
            return None;
        }
        if let Some(parent_method) = &self.parent_method {
            let parent = frame.parent()?.method()?;
            if !parent_method.matches_method(parent) {
                return None;
            }
        }
        let matched_parameters = match &self.values {
            Some(values) => {
                let parameters = frame.enter_values()?.ok()?;
                let matched = values.matching_parameters(parameters);
                if matched.is_empty() {
                    return None;
                }
                matched
            }
            None => Vec::new(),
        };
        Some(FrameMatch {
            frame,
            matched_parameters,
        })
    }

    /// Evaluate one frame, in incremental mode
    ///
    /// In unique mode, methods are only reported the first time one of their
    /// frames is processed, across all calls to this function. This can be
    /// called concurrently with bulk [`filter()`](FrameFilter::filter)
    /// queries.
    pub fn process_frame<'trace>(&self, frame: FrameRef<'trace>) -> Option<FrameMatch<'trace>> {
        let found = self.matches(frame)?;
        if self.unique {
            let function_id = found.frame.method()?.function_id;
            let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            if !seen.insert(function_id) {
                return None;
            }
        }
        Some(found)
    }

    /// Forget which methods were reported by `process_frame()`
    pub fn reset(&self) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Select frames from a call trace, by increasing sequence number
    ///
    /// Frames are selected lazily as the output is iterated over. Each call
    /// starts from scratch, independently of other calls and of
    /// `process_frame()`.
    pub fn filter<'self_, 'trace>(
        &'self_ self,
        trace: &'trace CallTrace,
    ) -> FilteredFrames<'self_, 'trace> {
        FilteredFrames {
            filter: self,
            frames: trace.frames_by_sequence().into_iter(),
            seen: HashSet::new(),
        }
    }
}

/// Lazy output of [`FrameFilter::filter()`]
pub struct FilteredFrames<'filter, 'trace> {
    /// Selection criteria
    filter: &'filter FrameFilter,

    /// Frames that remain to be examined
    frames: std::vec::IntoIter<FrameRef<'trace>>,

    /// Methods that were already reported, in unique mode
    seen: HashSet<FunctionId>,
}
//
impl<'trace> Iterator for FilteredFrames<'_, 'trace> {
    type Item = FrameMatch<'trace>;

    fn next(&mut self) -> Option<Self::Item> {
        for frame in self.frames.by_ref() {
            let Some(found) = self.filter.matches(frame) else {
                continue;
            };
            if self.filter.unique {
                let Some(method) = found.frame.method() else {
                    continue;
                };
                if !self.seen.insert(method.function_id) {
                    continue;
                }
            }
            return Some(found);
        }
        None
    }
}

/// Frame filter for watch mode
///
/// Each frame is judged on its own: nothing about one frame affects the
/// verdict on the next, which is why unique mode is not available.
#[derive(Debug)]
pub struct WatchFilter(FrameFilter);
//
impl WatchFilter {
    /// Compile selection criteria
    pub fn new(options: FilterOptions) -> Result<Self, FilterError> {
        if options.unique {
            return Err(FilterError::UniqueInWatchMode);
        }
        FrameFilter::new(options).map(Self)
    }

    /// Evaluate one frame, then clear any per-frame bookkeeping
    pub fn check_frame_and_clear<'trace>(
        &mut self,
        frame: FrameRef<'trace>,
    ) -> Option<FrameMatch<'trace>> {
        let result = self.0.process_frame(frame);
        self.0.reset();
        result
    }
}

/// What can go wrong while setting up a frame filter
#[derive(Debug, Error)]
pub enum FilterError {
    /// A wildcard pattern is malformed
    #[error("invalid wildcard pattern ({0})")]
    Wildcard(#[from] WildcardError),

    /// The same pattern is both included and excluded
    #[error("pattern {0:?} is both included and excluded")]
    IncludedAndExcluded(String),

    /// Unique mode makes no sense when frames are judged one at a time
    #[error("unique mode is not supported in watch mode")]
    UniqueInWatchMode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::{build_trace, TraceBuilder},
        event::{CallDetails, CallKind, Event, EventData},
        method::{MethodCache, MethodInfo},
    };
    use assert_matches::assert_matches;
    use clr_value::{encode_parameters, Value};
    use pretty_assertions::assert_eq;

    const FOO_BAR: FunctionId = FunctionId(1);
    const FOO_BAZ: FunctionId = FunctionId(2);
    const QUX_BAR: FunctionId = FunctionId(3);

    fn announce(function_id: FunctionId, type_name: &str, method_name: &str) -> Event {
        Event {
            thread_id: 0,
            data: EventData::MethodInfo(MethodInfo::new(
                function_id,
                "App.dll",
                type_name,
                method_name,
            )),
        }
    }

    fn call(
        thread_id: u64,
        kind: CallKind,
        function_id: FunctionId,
        details: Option<CallDetails>,
    ) -> Event {
        Event {
            thread_id,
            data: EventData::Call {
                kind,
                function_id,
                details,
            },
        }
    }

    fn leaf(thread_id: u64, function_id: FunctionId) -> [Event; 2] {
        [
            call(thread_id, CallKind::Enter, function_id, None),
            call(thread_id, CallKind::Exit, function_id, None),
        ]
    }

    fn methods() -> Vec<Event> {
        vec![
            announce(FOO_BAR, "Foo", "Bar"),
            announce(FOO_BAZ, "Foo", "Baz"),
            announce(QUX_BAR, "Qux", "Bar"),
        ]
    }

    /// Foo.Bar calls Foo.Baz then Qux.Bar, then Foo.Bar is called again
    fn sample_trace() -> CallTrace {
        let mut events = methods();
        events.push(call(1, CallKind::Enter, FOO_BAR, None));
        events.extend(leaf(1, FOO_BAZ));
        events.extend(leaf(1, QUX_BAR));
        events.push(call(1, CallKind::Exit, FOO_BAR, None));
        events.extend(leaf(1, FOO_BAR));
        build_trace(events)
    }

    fn names(filter: &FrameFilter, trace: &CallTrace) -> Vec<String> {
        filter
            .filter(trace)
            .map(|found| found.frame.method().unwrap().full_name())
            .collect()
    }

    fn filter(options: FilterOptions) -> FrameFilter {
        FrameFilter::new(options).unwrap()
    }

    #[test]
    fn include_exclude_unique() {
        let trace = sample_trace();
        let everything = filter(FilterOptions::default());
        assert_eq!(
            names(&everything, &trace),
            ["Foo.Bar", "Foo.Baz", "Qux.Bar", "Foo.Bar"]
        );

        let bar = FilterOptions {
            include: vec!["*.Bar".into()],
            ..Default::default()
        };
        assert_eq!(
            names(&filter(bar.clone()), &trace),
            ["Foo.Bar", "Qux.Bar", "Foo.Bar"]
        );

        let not_qux = FilterOptions {
            exclude: vec!["Qux.*".into()],
            ..bar.clone()
        };
        assert_eq!(names(&filter(not_qux.clone()), &trace), ["Foo.Bar", "Foo.Bar"]);

        let unique = filter(FilterOptions {
            unique: true,
            ..not_qux
        });
        assert_eq!(names(&unique, &trace), ["Foo.Bar"]);
        // Bulk queries are restartable
        assert_eq!(names(&unique, &trace), ["Foo.Bar"]);
    }

    #[test]
    fn parent_method() {
        let trace = sample_trace();
        let callees = filter(FilterOptions {
            parent_method: vec!["Foo.Bar".into()],
            ..Default::default()
        });
        assert_eq!(names(&callees, &trace), ["Foo.Baz", "Qux.Bar"]);
    }

    #[test]
    fn incremental_unique() {
        let trace = sample_trace();
        let unique = filter(FilterOptions {
            unique: true,
            ..Default::default()
        });
        let frames = trace.frames_by_sequence();
        let reported = frames
            .iter()
            .filter(|&&frame| unique.process_frame(frame).is_some())
            .count();
        assert_eq!(reported, 3);
        assert!(unique.process_frame(frames[0]).is_none());
        unique.reset();
        assert!(unique.process_frame(frames[0]).is_some());
    }

    #[test]
    fn value_predicates() {
        let detailed = |sequence, params: &[Value]| {
            Some(CallDetails {
                sequence,
                status: 0,
                values: encode_parameters(params).into(),
            })
        };
        let mut events = methods();
        events.extend([
            call(1, CallKind::Enter, FOO_BAR, detailed(1, &[Value::Int32(3)])),
            call(1, CallKind::Exit, FOO_BAR, None),
            call(
                1,
                CallKind::Enter,
                FOO_BAZ,
                detailed(3, &[Value::Bool(true), Value::Int32(42)]),
            ),
            call(1, CallKind::Exit, FOO_BAZ, None),
            call(1, CallKind::Enter, QUX_BAR, None),
            call(1, CallKind::Exit, QUX_BAR, None),
        ]);
        let trace = build_trace(events);
        let answer = filter(FilterOptions {
            values: ValueFilterOptions {
                int32: vec![42],
                ..Default::default()
            },
            ..Default::default()
        });
        let found = answer.filter(&trace).collect::<Vec<_>>();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].frame.method().unwrap().function_id, FOO_BAZ);
        assert_eq!(found[0].matched_parameters, [1]);
    }

    #[test]
    fn interleaved_threads() {
        let mut events = methods();
        events.extend([
            call(2, CallKind::Enter, FOO_BAR, None),
            call(1, CallKind::Enter, FOO_BAZ, None),
            call(2, CallKind::Exit, FOO_BAR, None),
            call(1, CallKind::Enter, QUX_BAR, None),
            call(2, CallKind::Enter, FOO_BAZ, None),
        ]);
        let trace = build_trace(events);
        let everything = filter(FilterOptions::default());
        let order = everything
            .filter(&trace)
            .map(|found| (found.frame.sequence(), found.frame.thread_id()))
            .collect::<Vec<_>>();
        assert_eq!(order, [(1, 2), (2, 1), (4, 1), (5, 2)]);
    }

    #[test]
    fn watch_mode() {
        assert_matches!(
            WatchFilter::new(FilterOptions {
                unique: true,
                ..Default::default()
            }),
            Err(FilterError::UniqueInWatchMode)
        );

        let mut builder = TraceBuilder::new();
        let mut cache = MethodCache::new();
        let mut watch = WatchFilter::new(FilterOptions {
            include: vec!["Foo.*".into()],
            ..Default::default()
        })
        .unwrap();
        let mut verdicts = Vec::new();
        let mut events = methods();
        events.extend(leaf(1, FOO_BAR));
        events.extend(leaf(1, QUX_BAR));
        events.extend(leaf(1, FOO_BAR));
        for event in events {
            if let Some(completion) = builder.process(event, &mut cache) {
                let frame = builder.frame(completion).unwrap();
                verdicts.push(watch.check_frame_and_clear(frame).is_some());
            }
        }
        assert_eq!(verdicts, [true, false, true]);
    }

    #[test]
    fn user_errors() {
        assert_matches!(
            FrameFilter::new(FilterOptions {
                include: vec!["[oops".into()],
                ..Default::default()
            }),
            Err(FilterError::Wildcard(WildcardError::UnterminatedClass))
        );
        assert_matches!(
            FrameFilter::new(FilterOptions {
                include: vec!["A".into(), "B".into()],
                exclude: vec!["B".into()],
                ..Default::default()
            }),
            Err(FilterError::IncludedAndExcluded(pattern)) if pattern == "B"
        );
        assert_matches!(
            FrameFilter::new(FilterOptions {
                values: ValueFilterOptions {
                    class_types: vec!["`".into()],
                    ..Default::default()
                },
                ..Default::default()
            }),
            Err(FilterError::Wildcard(WildcardError::TrailingEscape))
        );
    }

    #[test]
    fn from_json() {
        let options: FilterOptions = serde_json::from_str(
            r#"{ "include": ["*.Bar"], "unique": true, "values": { "strings": ["x"] } }"#,
        )
        .unwrap();
        assert_eq!(
            options,
            FilterOptions {
                include: vec!["*.Bar".into()],
                unique: true,
                values: ValueFilterOptions {
                    strings: vec!["x".into()],
                    ..Default::default()
                },
                ..Default::default()
            }
        );
        assert!(serde_json::from_str::<FilterOptions>(r#"{ "parent": [] }"#).is_err());
    }
}
