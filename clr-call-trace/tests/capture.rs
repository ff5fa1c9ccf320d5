//! Tests of whole captures, from recorded bytes to filtered frames

use clr_call_trace::{
    value::{encode_parameters, encode_value, ClassValue, Value},
    CallDetails, CallKind, CaptureEnd, CaptureReader, CaptureWriter, FilterOptions, FrameFilter,
    FrameStatus, FunctionId, MethodInfo, RawEvent, TraceSession, ValueFilterOptions, WatchFilter,
};
use pretty_assertions::assert_eq;
use std::{
    fs::File,
    io::{BufReader, BufWriter, Seek, SeekFrom},
};
use tempfile::tempfile;

const MAIN: FunctionId = FunctionId(0x1000);
const PARSE: FunctionId = FunctionId(0x2000);
const LOG: FunctionId = FunctionId(0x3000);

/// Test fixture that records a capture to a temporary file
struct CaptureFixture {
    /// Capture file, being written
    writer: CaptureWriter<BufWriter<File>>,

    /// Next sequence number of detailed events
    next_sequence: u64,
}
//
impl CaptureFixture {
    /// Start recording, announcing the methods used by these tests
    pub fn new() -> Self {
        let file = tempfile().expect("Failed to create capture file");
        let mut fixture = Self {
            writer: CaptureWriter::new(BufWriter::new(file)),
            next_sequence: 1,
        };
        for (function_id, type_name, method_name) in [
            (MAIN, "App.Program", "Main"),
            (PARSE, "App.Config", "Parse"),
            (LOG, "App.Logger", "Write"),
        ] {
            fixture.record(RawEvent::method_info(
                0,
                &MethodInfo::new(function_id, "App.dll", type_name, method_name),
            ));
        }
        fixture
    }

    /// Append an event
    pub fn record(&mut self, event: RawEvent) -> &mut Self {
        self.writer
            .write_event(&event)
            .expect("Failed to record event");
        self
    }

    /// Append a detailed call event
    pub fn detailed(
        &mut self,
        thread_id: u64,
        kind: CallKind,
        function_id: FunctionId,
        values: Vec<u8>,
    ) -> &mut Self {
        let details = CallDetails {
            sequence: self.next_sequence,
            status: 0,
            values: values.into(),
        };
        self.next_sequence += 1;
        self.record(RawEvent::detailed_call(thread_id, kind, function_id, &details))
    }

    /// Stop recording and get a reader for the capture
    pub fn replay(self) -> CaptureReader<BufReader<File>> {
        let mut file = self
            .writer
            .finish()
            .expect("Failed to flush capture")
            .into_inner()
            .expect("Failed to flush capture");
        file.seek(SeekFrom::Start(0))
            .expect("Failed to rewind capture");
        CaptureReader::new(BufReader::new(file))
    }
}

/// Two threads parse configuration files, one of them logs in between
fn record_sample() -> CaptureFixture {
    let mut fixture = CaptureFixture::new();
    let path = |p: &str| encode_parameters(&[Value::String(Some(p.into()))]);
    fixture
        .record(RawEvent::thread_create(1))
        .record(RawEvent::thread_create(2))
        .detailed(1, CallKind::Enter, MAIN, encode_parameters(&[]))
        .detailed(2, CallKind::Enter, PARSE, path("b.toml"))
        .detailed(1, CallKind::Enter, PARSE, path("a.toml"))
        .detailed(
            1,
            CallKind::Enter,
            LOG,
            encode_parameters(&[Value::Class(Some(ClassValue::new(
                "App.Message",
                vec![Value::Int32(3)],
            )))]),
        )
        .detailed(1, CallKind::Exit, LOG, encode_value(&Value::Void))
        .detailed(2, CallKind::Exit, PARSE, encode_value(&Value::Bool(false)))
        .detailed(1, CallKind::Exit, PARSE, encode_value(&Value::Bool(true)))
        .record(RawEvent::thread_destroy(2));
    fixture
}

#[test]
fn replay_sample() {
    let mut session = TraceSession::default();
    let capture = session.capture(record_sample().replay()).unwrap();
    assert_eq!(capture.end, CaptureEnd::Exhausted);
    assert_eq!(capture.skipped_events, 0);
    assert_eq!(session.methods().len(), 3);

    let trace = capture.trace;
    let main_thread = trace.thread(1).unwrap();
    assert!(main_thread.is_consistent());
    assert_eq!(main_thread.incomplete_frames(), 1);
    let main = main_thread.root().children().next().unwrap();
    assert_eq!(main.status(), FrameStatus::Incomplete);
    assert_eq!(main.enter_values(), Some(Ok(&[][..])));
    let parse = main.children().next().unwrap();
    assert_eq!(parse.method().unwrap().full_name(), "App.Config.Parse");
    assert_eq!(
        parse.enter_values(),
        Some(Ok(&[Value::String(Some("a.toml".into()))][..]))
    );
    assert_eq!(parse.exit_value(), Some(Ok(&Value::Bool(true))));
    assert_eq!(parse.children().count(), 1);

    let worker = trace.thread(2).unwrap();
    assert!(worker.is_complete());
    assert_eq!(worker.root().status(), FrameStatus::Returned);

    let stats = trace.stats();
    assert_eq!((stats.threads, stats.frames, stats.max_depth), (2, 4, 3));
}

#[test]
fn bulk_filter() {
    let mut session = TraceSession::default();
    let trace = session.capture(record_sample().replay()).unwrap().trace;
    let run = |options: FilterOptions| {
        FrameFilter::new(options)
            .unwrap()
            .filter(&trace)
            .map(|found| {
                let frame = found.frame;
                (frame.sequence(), frame.method().unwrap().method_name.to_string())
            })
            .collect::<Vec<_>>()
    };

    let all = run(FilterOptions::default());
    assert_eq!(
        all,
        [
            (1, "Main".to_string()),
            (2, "Parse".to_string()),
            (3, "Parse".to_string()),
            (4, "Write".to_string()),
        ]
    );

    let parsers = run(FilterOptions {
        include: vec!["*.Parse".into()],
        unique: true,
        ..Default::default()
    });
    assert_eq!(parsers, [(2, "Parse".to_string())]);

    let called_by_parse = run(FilterOptions {
        parent_method: vec!["App.Config.*".into()],
        ..Default::default()
    });
    assert_eq!(called_by_parse, [(4, "Write".to_string())]);

    let by_value = run(FilterOptions {
        values: ValueFilterOptions {
            strings: vec!["a.toml".into()],
            class_types: vec!["*.Message".into()],
            ..Default::default()
        },
        ..Default::default()
    });
    assert_eq!(
        by_value,
        [(3, "Parse".to_string()), (4, "Write".to_string())]
    );
}

#[test]
fn watch_capture() {
    let mut session = TraceSession::default();
    let mut filter = WatchFilter::new(FilterOptions {
        include: vec!["Parse".into()],
        ..Default::default()
    })
    .unwrap();
    let mut results = Vec::new();
    let capture = session
        .watch(record_sample().replay(), &mut filter, |found| {
            let ret = found.frame.exit_value().unwrap().unwrap().clone();
            results.push((found.frame.thread_id(), ret));
        })
        .unwrap();
    assert_eq!(
        results,
        [(2, Value::Bool(false)), (1, Value::Bool(true))]
    );
    assert_eq!(capture.trace.stats().frames, 4);
}

#[test]
fn truncated_capture() {
    let mut fixture = record_sample();
    fixture.record(RawEvent {
        kind: 2,
        thread_id: 1,
        payload: vec![0; 8],
    });
    let mut reader = fixture.replay();
    let mut file = reader.into_inner().into_inner();
    let len = file.seek(SeekFrom::End(0)).unwrap();
    file.set_len(len - 3).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    reader = CaptureReader::new(BufReader::new(file));

    let mut session = TraceSession::default();
    let partial = session.capture(reader).unwrap_err().into_partial();
    assert_eq!(partial.end, CaptureEnd::Failed);
    assert_eq!(partial.trace.stats().frames, 4);
}
