//! Events emitted by the in-process tracing agent
//!
//! The transport hands us each event as a kind tag, the OS thread that
//! emitted it and an opaque payload. This module gives these raw events a
//! typed representation, and can also produce raw events for recording
//! synthetic captures.

use crate::method::{FunctionId, MethodInfo};
use clr_value::{DecodeError, ValueReader, ValueWriter};
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// OS thread identifier in the target process
pub type ThreadId = u64;

/// Position of a call in the global order of events
pub type Sequence = u64;

/// Kind of event, as tagged by the transport
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::FromRepr, strum::AsRefStr)]
#[repr(u8)]
pub enum EventKind {
    /// Identity of a function ID, sent before its first call
    MethodInfo = 1,

    /// A method was entered
    CallEnter = 2,

    /// A method returned
    CallExit = 3,

    /// A method was replaced by a tail call to another method
    Tailcall = 4,

    /// Like CallEnter, with parameter values
    CallEnterDetailed = 5,

    /// Like CallExit, with the return value
    CallExitDetailed = 6,

    /// Like Tailcall, with parameter values of the tail-called method
    TailcallDetailed = 7,

    /// A thread was created
    ThreadCreate = 8,

    /// A thread was destroyed
    ThreadDestroy = 9,

    /// The capture is over
    Shutdown = 10,
}
//
impl EventKind {
    /// Wire tag of this event kind
    pub fn tag(self) -> u8 {
        self as u8
    }
}
//
impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// Event in its transport representation
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawEvent {
    /// Event kind tag
    pub kind: u8,

    /// Thread on which the event occured
    pub thread_id: ThreadId,

    /// Kind-specific payload
    pub payload: Vec<u8>,
}
//
impl RawEvent {
    /// Raw event with an empty payload
    fn bare(kind: EventKind, thread_id: ThreadId) -> Self {
        Self {
            kind: kind.tag(),
            thread_id,
            payload: Vec::new(),
        }
    }

    /// Announce that a thread was created
    pub fn thread_create(thread_id: ThreadId) -> Self {
        Self::bare(EventKind::ThreadCreate, thread_id)
    }

    /// Announce that a thread was destroyed
    pub fn thread_destroy(thread_id: ThreadId) -> Self {
        Self::bare(EventKind::ThreadDestroy, thread_id)
    }

    /// Announce the end of the capture
    pub fn shutdown(thread_id: ThreadId) -> Self {
        Self::bare(EventKind::Shutdown, thread_id)
    }

    /// Describe a function ID
    pub fn method_info(thread_id: ThreadId, method: &MethodInfo) -> Self {
        let mut writer = ValueWriter::new();
        writer.write_u64(method.function_id.0);
        for s in [&method.method_name, &method.type_name, &method.module_name] {
            writer.write_string(Some(&**s));
        }
        Self {
            kind: EventKind::MethodInfo.tag(),
            thread_id,
            payload: writer.into_bytes(),
        }
    }

    /// Record a call event without value details
    pub fn call(thread_id: ThreadId, kind: CallKind, function_id: FunctionId) -> Self {
        let kind = match kind {
            CallKind::Enter => EventKind::CallEnter,
            CallKind::Exit => EventKind::CallExit,
            CallKind::Tailcall => EventKind::Tailcall,
        };
        Self {
            kind: kind.tag(),
            thread_id,
            payload: function_id.0.to_le_bytes().to_vec(),
        }
    }

    /// Record a call event with encoded values
    ///
    /// `values` should be an encoded parameter list for enter and tailcall
    /// events, and a single encoded value for exit events.
    pub fn detailed_call(
        thread_id: ThreadId,
        kind: CallKind,
        function_id: FunctionId,
        details: &CallDetails,
    ) -> Self {
        let kind = match kind {
            CallKind::Enter => EventKind::CallEnterDetailed,
            CallKind::Exit => EventKind::CallExitDetailed,
            CallKind::Tailcall => EventKind::TailcallDetailed,
        };
        let mut writer = ValueWriter::new();
        writer.write_u64(function_id.0);
        writer.write_u64(details.sequence);
        writer.write_i32(details.status);
        writer.write_i32(details.values.len() as i32);
        writer.write_bytes(&details.values);
        Self {
            kind: kind.tag(),
            thread_id,
            payload: writer.into_bytes(),
        }
    }
}

/// Flavor of call event
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CallKind {
    /// Method entry
    Enter,

    /// Method exit
    Exit,

    /// Replacement of the current method by a tail call
    Tailcall,
}

/// Extra data carried by detailed call events
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CallDetails {
    /// Sequence number assigned by the agent
    pub sequence: Sequence,

    /// Status reported by the agent when capturing values, zero on success
    pub status: i32,

    /// Encoded values, decoded only when someone looks at them
    pub values: Box<[u8]>,
}

/// Typed event
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Thread on which the event occured
    pub thread_id: ThreadId,

    /// What happened
    pub data: EventData,
}
//
impl Event {
    /// Decode a raw event
    pub fn decode(raw: RawEvent) -> Result<Self, EventDecodeError> {
        let kind =
            EventKind::from_repr(raw.kind).ok_or(EventDecodeError::UnknownKind(raw.kind))?;
        let malformed = |source| EventDecodeError::Malformed { kind, source };
        let mut reader = ValueReader::new(&raw.payload);
        let data = match kind {
            EventKind::MethodInfo => {
                EventData::MethodInfo(decode_method_info(&mut reader).map_err(malformed)?)
            }
            EventKind::CallEnter | EventKind::CallExit | EventKind::Tailcall => EventData::Call {
                kind: call_kind(kind),
                function_id: read_function_id(&mut reader).map_err(malformed)?,
                details: None,
            },
            EventKind::CallEnterDetailed
            | EventKind::CallExitDetailed
            | EventKind::TailcallDetailed => {
                let (function_id, details) =
                    decode_detailed_call(&mut reader).map_err(malformed)?;
                EventData::Call {
                    kind: call_kind(kind),
                    function_id,
                    details: Some(details),
                }
            }
            EventKind::ThreadCreate => EventData::ThreadCreate,
            EventKind::ThreadDestroy => EventData::ThreadDestroy,
            EventKind::Shutdown => EventData::Shutdown,
        };
        reader.expect_end().map_err(malformed)?;
        Ok(Self {
            thread_id: raw.thread_id,
            data,
        })
    }

    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match &self.data {
            EventData::MethodInfo(_) => EventKind::MethodInfo,
            EventData::Call {
                kind,
                details: None,
                ..
            } => match kind {
                CallKind::Enter => EventKind::CallEnter,
                CallKind::Exit => EventKind::CallExit,
                CallKind::Tailcall => EventKind::Tailcall,
            },
            EventData::Call {
                kind,
                details: Some(_),
                ..
            } => match kind {
                CallKind::Enter => EventKind::CallEnterDetailed,
                CallKind::Exit => EventKind::CallExitDetailed,
                CallKind::Tailcall => EventKind::TailcallDetailed,
            },
            EventData::ThreadCreate => EventKind::ThreadCreate,
            EventData::ThreadDestroy => EventKind::ThreadDestroy,
            EventData::Shutdown => EventKind::Shutdown,
        }
    }
}

/// Payload of a typed event
#[derive(Clone, Debug, PartialEq)]
pub enum EventData {
    /// Identity of a function ID
    MethodInfo(MethodInfo),

    /// Method entry, exit or tail call
    Call {
        /// What kind of call event this is
        kind: CallKind,

        /// Method that is entered, exited or tail-called
        function_id: FunctionId,

        /// Values and sequencing information, for detailed events
        details: Option<CallDetails>,
    },

    /// Thread creation
    ThreadCreate,

    /// Thread destruction
    ThreadDestroy,

    /// End of capture
    Shutdown,
}

/// Map call event kinds to the matching CallKind
fn call_kind(kind: EventKind) -> CallKind {
    match kind {
        EventKind::CallEnter | EventKind::CallEnterDetailed => CallKind::Enter,
        EventKind::CallExit | EventKind::CallExitDetailed => CallKind::Exit,
        EventKind::Tailcall | EventKind::TailcallDetailed => CallKind::Tailcall,
        other => unreachable!("{other} is not a call event"),
    }
}

/// Read a 64-bit function ID
fn read_function_id(reader: &mut ValueReader) -> Result<FunctionId, DecodeError> {
    reader.read_u64().map(FunctionId)
}

/// Decode the payload of a MethodInfo event
///
/// The three names are packed back to back, each spanning exactly twice its
/// NUL-inclusive character count.
fn decode_method_info(reader: &mut ValueReader) -> Result<MethodInfo, DecodeError> {
    let function_id = read_function_id(reader)?;
    let mut read_name = || -> Result<Box<str>, DecodeError> {
        Ok(reader.read_string()?.unwrap_or_default().into_boxed_str())
    };
    let method_name = read_name()?;
    let type_name = read_name()?;
    let module_name = read_name()?;
    Ok(MethodInfo {
        function_id,
        module_name,
        type_name,
        method_name,
    })
}

/// Decode the payload of a detailed call event
fn decode_detailed_call(
    reader: &mut ValueReader,
) -> Result<(FunctionId, CallDetails), DecodeError> {
    let function_id = read_function_id(reader)?;
    let sequence = reader.read_u64()?;
    let status = reader.read_i32()?;
    let position = reader.position();
    let len = reader.read_i32()?;
    let len =
        usize::try_from(len).map_err(|_| DecodeError::NegativeLength { length: len, position })?;
    let values = Box::from(reader.read_bytes(len)?);
    Ok((
        function_id,
        CallDetails {
            sequence,
            status,
            values,
        },
    ))
}

/// What can go wrong while decoding a raw event
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EventDecodeError {
    /// The transport used an event kind tag that we don't know about
    #[error("unknown event kind {0}")]
    UnknownKind(u8),

    /// The payload does not match the layout of its event kind
    #[error("malformed {kind} payload ({source})")]
    Malformed {
        kind: EventKind,
        source: DecodeError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use clr_value::{encode_parameters, Value};
    use pretty_assertions::assert_eq;

    fn sample_method() -> MethodInfo {
        MethodInfo::new(FunctionId(0x7ffe_0000_1234), "App.dll", "App.Program", "Main")
    }

    #[test]
    fn method_info() {
        let raw = RawEvent::method_info(3, &sample_method());
        assert_eq!(raw.kind, EventKind::MethodInfo.tag());
        let event = Event::decode(raw).unwrap();
        assert_eq!(event.thread_id, 3);
        assert_eq!(event.kind(), EventKind::MethodInfo);
        assert_eq!(event.data, EventData::MethodInfo(sample_method()));
    }

    #[test]
    fn method_info_layout() {
        // Each name spans exactly (NUL-inclusive length) * 2 bytes
        let mut payload = 42u64.to_le_bytes().to_vec();
        for name in ["M", "T", "Mod"] {
            payload.extend_from_slice(&(name.len() as i32 + 1).to_le_bytes());
            for b in name.bytes() {
                payload.extend_from_slice(&[b, 0]);
            }
            payload.extend_from_slice(&[0, 0]);
        }
        let event = Event::decode(RawEvent {
            kind: 1,
            thread_id: 0,
            payload,
        })
        .unwrap();
        assert_eq!(
            event.data,
            EventData::MethodInfo(MethodInfo::new(FunctionId(42), "Mod", "T", "M"))
        );
    }

    #[test]
    fn simple_calls() {
        for kind in [CallKind::Enter, CallKind::Exit, CallKind::Tailcall] {
            let event = Event::decode(RawEvent::call(7, kind, FunctionId(99))).unwrap();
            assert_eq!(
                event,
                Event {
                    thread_id: 7,
                    data: EventData::Call {
                        kind,
                        function_id: FunctionId(99),
                        details: None,
                    }
                }
            );
        }
    }

    #[test]
    fn detailed_calls() {
        let details = CallDetails {
            sequence: 12,
            status: 0,
            values: encode_parameters(&[Value::Int32(1), Value::Bool(false)]).into(),
        };
        let raw = RawEvent::detailed_call(1, CallKind::Enter, FunctionId(5), &details);
        assert_eq!(raw.kind, EventKind::CallEnterDetailed.tag());
        let event = Event::decode(raw).unwrap();
        assert_eq!(event.kind(), EventKind::CallEnterDetailed);
        assert_eq!(
            event.data,
            EventData::Call {
                kind: CallKind::Enter,
                function_id: FunctionId(5),
                details: Some(details),
            }
        );
    }

    #[test]
    fn lifecycle() {
        let decode = |raw| Event::decode(raw).unwrap().data;
        assert_eq!(decode(RawEvent::thread_create(1)), EventData::ThreadCreate);
        assert_eq!(decode(RawEvent::thread_destroy(1)), EventData::ThreadDestroy);
        assert_eq!(decode(RawEvent::shutdown(0)), EventData::Shutdown);
    }

    #[test]
    fn malformed_events() {
        assert_eq!(
            Event::decode(RawEvent {
                kind: 0xee,
                thread_id: 0,
                payload: vec![],
            }),
            Err(EventDecodeError::UnknownKind(0xee))
        );
        assert_matches!(
            Event::decode(RawEvent {
                kind: EventKind::CallEnter.tag(),
                thread_id: 0,
                payload: vec![1, 2, 3],
            }),
            Err(EventDecodeError::Malformed {
                kind: EventKind::CallEnter,
                source: DecodeError::UnexpectedEnd { .. }
            })
        );
        assert_matches!(
            Event::decode(RawEvent {
                kind: EventKind::ThreadCreate.tag(),
                thread_id: 0,
                payload: vec![0],
            }),
            Err(EventDecodeError::Malformed {
                kind: EventKind::ThreadCreate,
                source: DecodeError::TrailingBytes { remaining: 1 }
            })
        );

        // Value payload claims more bytes than there are
        let mut raw = RawEvent::detailed_call(
            0,
            CallKind::Exit,
            FunctionId(1),
            &CallDetails {
                sequence: 1,
                status: 0,
                values: Box::new([0x02, 1]),
            },
        );
        raw.payload.pop();
        assert_matches!(
            Event::decode(raw),
            Err(EventDecodeError::Malformed {
                kind: EventKind::CallExitDetailed,
                source: DecodeError::UnexpectedEnd { needed: 2, .. }
            })
        );
    }
}
