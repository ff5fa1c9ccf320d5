//! Generic utilities to display things

pub mod frame;
pub mod value;

use unicode_width::UnicodeWidthChar;

/// Truncate a string so that it only eats up n columns, by eating up the middle
pub fn truncate_string(input: &str, max_cols: u16) -> String {
    debug_assert!(max_cols >= 1);
    let width = |c: char| c.width().unwrap_or(0);
    let total_cols = input.chars().map(width).sum::<usize>();
    let max_cols = usize::from(max_cols);
    if total_cols <= max_cols {
        return input.to_owned();
    }

    // Split our column budget into a header and trailer
    let trailer_cols = (max_cols - 1) / 2;
    let header_cols = max_cols - 1 - trailer_cols;

    // Take as many leading characters as fit in the header
    let mut result = String::new();
    let mut cols = 0;
    for c in input.chars() {
        cols += width(c);
        if cols > header_cols {
            break;
        }
        result.push(c);
    }
    result.push('…');

    // Same for trailing characters
    let mut cols = 0;
    let trailer_start = input
        .char_indices()
        .rev()
        .take_while(|&(_, c)| {
            cols += width(c);
            cols <= trailer_cols
        })
        .last()
        .map_or(input.len(), |(idx, _)| idx);
    result.push_str(&input[trailer_start..]);
    result
}
