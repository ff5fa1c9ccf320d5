//! Textual output on stdout

use crate::display::{frame::frame_string, truncate_string};
use clr_call_trace::{
    CallTrace, Capture, CaptureEnd, FrameFilter, FrameId, FrameMatch, FrameRef, ThreadId,
};
use std::collections::HashSet;
use termtree::{GlyphPalette, Tree};
use unicode_width::UnicodeWidthStr;

/// Glyphs used to draw call trees
const PALETTE: GlyphPalette = GlyphPalette {
    middle_item: "├",
    last_item: "└",
    item_indent: "─",
    middle_skip: "│",
    last_skip: " ",
    skip_indent: " ",
};

/// Display a flat list of selected frames, in call order
pub fn print_matches<'trace>(
    matches: impl IntoIterator<Item = FrameMatch<'trace>>,
    max_cols: u16,
) {
    let mut count = 0;
    for found in matches {
        print_match(&found, max_cols);
        count += 1;
    }
    if count == 0 {
        println!("No call matched the filter");
    }
}

/// Display a single selected frame
pub fn print_match(found: &FrameMatch, max_cols: u16) {
    println!("{}", match_line(found.frame, max_cols));
}

/// One-line description of a selected frame
fn match_line(frame: FrameRef, max_cols: u16) -> String {
    let indent = "  ".repeat(frame.depth().saturating_sub(1));
    let line = format!(
        "{:>6} [{}] {indent}{}",
        frame.sequence(),
        frame.thread_id(),
        frame_string(frame)
    );
    truncate_string(&line, max_cols.max(1))
}

/// Display the call tree of each thread
///
/// Only selected frames and their callers are shown. Selected frames are
/// marked with a star if `mark_selected` is set. Frames are selected as in
/// the flat listing, so in unique mode the earliest call by sequence number
/// wins even if it is on a later thread.
pub fn print_trees(trace: &CallTrace, filter: &FrameFilter, mark_selected: bool, max_cols: u16) {
    let selected = selected_frames(trace, filter);
    for (thread_id, root) in trace.roots() {
        match call_tree(&selected, root, mark_selected, max_cols.max(1)) {
            Some(tree) => println!("{tree}"),
            None => println!("Thread {thread_id}: no call matched the filter\n"),
        }
    }
}

/// Frames of a trace that pass a filter
fn selected_frames(trace: &CallTrace, filter: &FrameFilter) -> HashSet<(ThreadId, FrameId)> {
    filter
        .filter(trace)
        .map(|found| (found.frame.thread_id(), found.frame.id()))
        .collect()
}

/// Make a tree display of a frame and its selected callees
///
/// Returns None if neither this frame nor any of its callees is selected.
fn call_tree(
    selected: &HashSet<(ThreadId, FrameId)>,
    frame: FrameRef,
    mark_selected: bool,
    max_cols: u16,
) -> Option<Tree<Box<str>>> {
    let is_selected = selected.contains(&(frame.thread_id(), frame.id()));

    // Render callees, unless there is no space left to do so
    let child_cols = max_cols
        .saturating_sub(PALETTE.middle_item.width() as u16)
        .saturating_sub(PALETTE.item_indent.width() as u16);
    let leaves = if child_cols == 0 {
        Vec::new()
    } else {
        frame
            .children()
            .filter_map(|child| call_tree(selected, child, mark_selected, child_cols))
            .collect::<Vec<_>>()
    };
    if !(is_selected || frame.is_root() || !leaves.is_empty()) {
        return None;
    }

    // Render this frame
    let mut label = frame_string(frame);
    if is_selected && mark_selected {
        label.insert_str(0, "* ");
    }
    let label = truncate_string(&label, max_cols).into_boxed_str();
    Some(Tree::new(label).with_glyphs(PALETTE).with_leaves(leaves))
}

/// Display what happened during a capture, on stderr
pub fn print_summary(capture: &Capture) {
    let stats = capture.trace.stats();
    let end = match capture.end {
        CaptureEnd::Exhausted => "end of capture",
        CaptureEnd::Shutdown => "runtime shutdown",
        CaptureEnd::Cancelled => "interrupted",
        CaptureEnd::Failed => "read error",
    };
    eprintln!(
        "Traced {} call(s) over {} thread(s), stopped by {end}",
        stats.frames, stats.threads
    );
    if stats.incomplete_frames > 0 {
        eprintln!("- {} call(s) never returned", stats.incomplete_frames);
    }
    if capture.skipped_events > 0 {
        eprintln!("- {} undecodable event(s) skipped", capture.skipped_events);
    }
    if stats.late_events > 0 {
        eprintln!("- {} late event(s) discarded", stats.late_events);
    }
    for (thread_id, thread) in capture.trace.threads() {
        for issue in thread.issues() {
            eprintln!("- Thread {thread_id}: {issue}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clr_call_trace::{
        build_trace, CallKind, Event, FilterOptions, FunctionId, MethodInfo, RawEvent,
    };
    use pretty_assertions::assert_eq;

    fn sample_trace() -> CallTrace {
        let events = [
            RawEvent::method_info(1, &MethodInfo::new(FunctionId(1), "a.dll", "App", "Run")),
            RawEvent::method_info(1, &MethodInfo::new(FunctionId(2), "a.dll", "App", "Step")),
            RawEvent::method_info(1, &MethodInfo::new(FunctionId(3), "a.dll", "Io", "Read")),
            RawEvent::thread_create(1),
            RawEvent::call(1, CallKind::Enter, FunctionId(1)),
            RawEvent::call(1, CallKind::Enter, FunctionId(2)),
            RawEvent::call(1, CallKind::Enter, FunctionId(3)),
            RawEvent::call(1, CallKind::Exit, FunctionId(3)),
            RawEvent::call(1, CallKind::Exit, FunctionId(2)),
            RawEvent::call(1, CallKind::Enter, FunctionId(2)),
            RawEvent::call(1, CallKind::Exit, FunctionId(2)),
            RawEvent::call(1, CallKind::Exit, FunctionId(1)),
            RawEvent::thread_destroy(1),
        ];
        build_trace(events.into_iter().map(|raw| Event::decode(raw).unwrap()))
    }

    /// Render call trees, keeping only the label of each line
    fn render(trace: &CallTrace, options: FilterOptions) -> Vec<Vec<String>> {
        let filter = FrameFilter::new(options).unwrap();
        let selected = selected_frames(trace, &filter);
        trace
            .roots()
            .into_values()
            .filter_map(|root| call_tree(&selected, root, true, 80))
            .map(|tree| {
                tree.to_string()
                    .lines()
                    .map(|line| line.trim_start_matches(['├', '└', '─', '│', ' ']).to_owned())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn full_tree() {
        let trace = sample_trace();
        assert_eq!(
            render(&trace, FilterOptions::default()),
            [[
                "Thread 1",
                "* App.Run(…)",
                "* App.Step(…)",
                "* Io.Read(…)",
                "* App.Step(…)",
            ]]
        );
    }

    #[test]
    fn pruned_tree() {
        let trace = sample_trace();
        let include = |pattern: &str| FilterOptions {
            include: vec![pattern.into()],
            ..Default::default()
        };
        assert_eq!(
            render(&trace, include("Read")),
            [["Thread 1", "App.Run(…)", "App.Step(…)", "* Io.Read(…)"]]
        );
        assert_eq!(render(&trace, include("Write")), [["Thread 1"]]);
    }

    #[test]
    fn unique_follows_call_order_across_threads() {
        let events = [
            RawEvent::method_info(1, &MethodInfo::new(FunctionId(1), "a.dll", "App", "Run")),
            RawEvent::method_info(1, &MethodInfo::new(FunctionId(3), "a.dll", "Io", "Read")),
            RawEvent::call(1, CallKind::Enter, FunctionId(1)),
            RawEvent::call(2, CallKind::Enter, FunctionId(3)),
            RawEvent::call(2, CallKind::Exit, FunctionId(3)),
            RawEvent::call(1, CallKind::Enter, FunctionId(3)),
            RawEvent::call(1, CallKind::Exit, FunctionId(3)),
            RawEvent::call(1, CallKind::Exit, FunctionId(1)),
        ];
        let trace = build_trace(events.into_iter().map(|raw| Event::decode(raw).unwrap()));
        let options = FilterOptions {
            include: vec!["Read".into()],
            unique: true,
            ..Default::default()
        };
        assert_eq!(
            render(&trace, options),
            [vec!["Thread 1"], vec!["Thread 2", "* Io.Read(…)"]]
        );
    }

    #[test]
    fn match_lines() {
        let trace = sample_trace();
        let read = trace.frames_by_sequence()[2];
        assert_eq!(match_line(read, 80), "     3 [1]     Io.Read(…)");
        assert_eq!(match_line(read, 10), "     …d(…)");
    }
}
