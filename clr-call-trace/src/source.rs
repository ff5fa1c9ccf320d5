//! Sources of raw events
//!
//! Live transports are outside the scope of this crate, but captures can be
//! recorded to and replayed from any byte stream using a simple framing:
//! `[kind: u8][thread: u64 LE][payload length: u32 LE][payload]`.

use crate::event::RawEvent;
use std::io::{self, ErrorKind, Read, Write};

/// Something that produces raw events in order
pub trait EventSource {
    /// Fetch the next event, or `None` if the capture is over
    fn next_event(&mut self) -> io::Result<Option<RawEvent>>;
}
//
impl EventSource for std::vec::IntoIter<RawEvent> {
    fn next_event(&mut self) -> io::Result<Option<RawEvent>> {
        Ok(self.next())
    }
}
//
impl<S: EventSource + ?Sized> EventSource for &mut S {
    fn next_event(&mut self) -> io::Result<Option<RawEvent>> {
        (**self).next_event()
    }
}

/// Size of the frame header that precedes each payload
const HEADER_LEN: usize = 1 + 8 + 4;

/// Reader of framed event captures
pub struct CaptureReader<R: Read> {
    /// Underlying byte stream
    input: R,
}
//
impl<R: Read> CaptureReader<R> {
    /// Read events from some byte stream
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Get back the underlying byte stream
    pub fn into_inner(self) -> R {
        self.input
    }

    /// Fill the header buffer, telling apart a clean end of stream
    fn read_header(&mut self) -> io::Result<Option<[u8; HEADER_LEN]>> {
        let mut header = [0; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            match self.input.read(&mut header[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "capture ends in the middle of an event header",
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Some(header))
    }
}
//
impl<R: Read> EventSource for CaptureReader<R> {
    fn next_event(&mut self) -> io::Result<Option<RawEvent>> {
        let Some(header) = self.read_header()? else {
            return Ok(None);
        };
        let [kind, rest @ ..] = header;
        let mut thread_id = [0; 8];
        thread_id.copy_from_slice(&rest[..8]);
        let thread_id = u64::from_le_bytes(thread_id);
        let mut len = [0; 4];
        len.copy_from_slice(&rest[8..]);
        let len = u32::from_le_bytes(len);
        let mut payload = Vec::new();
        (&mut self.input)
            .take(u64::from(len))
            .read_to_end(&mut payload)?;
        if payload.len() != len as usize {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "capture ends in the middle of an event payload ({} of {len} bytes)",
                    payload.len()
                ),
            ));
        }
        Ok(Some(RawEvent {
            kind,
            thread_id,
            payload,
        }))
    }
}

/// Writer of framed event captures
pub struct CaptureWriter<W: Write> {
    /// Underlying byte stream
    output: W,
}
//
impl<W: Write> CaptureWriter<W> {
    /// Write events to some byte stream
    pub fn new(output: W) -> Self {
        Self { output }
    }

    /// Append an event to the capture
    pub fn write_event(&mut self, event: &RawEvent) -> io::Result<()> {
        let len = u32::try_from(event.payload.len())
            .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "event payload is too large"))?;
        self.output.write_all(&[event.kind])?;
        self.output.write_all(&event.thread_id.to_le_bytes())?;
        self.output.write_all(&len.to_le_bytes())?;
        self.output.write_all(&event.payload)
    }

    /// Flush and get back the underlying byte stream
    pub fn finish(mut self) -> io::Result<W> {
        self.output.flush()?;
        Ok(self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event::CallKind, method::FunctionId};
    use pretty_assertions::assert_eq;

    fn events() -> Vec<RawEvent> {
        vec![
            RawEvent::thread_create(1),
            RawEvent::call(1, CallKind::Enter, FunctionId(0xabc)),
            RawEvent::call(1, CallKind::Exit, FunctionId(0xabc)),
            RawEvent::shutdown(1),
        ]
    }

    fn record(events: &[RawEvent]) -> Vec<u8> {
        let mut writer = CaptureWriter::new(Vec::new());
        for event in events {
            writer.write_event(event).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn replay() {
        let bytes = record(&events());
        assert_eq!(bytes.len(), 4 * HEADER_LEN + 16);
        let mut reader = CaptureReader::new(&bytes[..]);
        let mut replayed = Vec::new();
        while let Some(event) = reader.next_event().unwrap() {
            replayed.push(event);
        }
        assert_eq!(replayed, events());
    }

    #[test]
    fn truncated() {
        let bytes = record(&events()[..2]);
        for cut in [HEADER_LEN + 3, 2 * HEADER_LEN + 4] {
            let mut reader = CaptureReader::new(&bytes[..cut]);
            assert!(reader.next_event().unwrap().is_some());
            let error = reader.next_event().unwrap_err();
            assert_eq!(error.kind(), ErrorKind::UnexpectedEof);
        }
    }

    #[test]
    fn in_memory() {
        let mut source = events().into_iter();
        assert_eq!(source.next_event().unwrap(), Some(RawEvent::thread_create(1)));
        assert_eq!((&mut source).count(), 3);
        assert_eq!(source.next_event().unwrap(), None);
    }
}
