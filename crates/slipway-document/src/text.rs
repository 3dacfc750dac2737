// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Hard wrapping of plain text to a fixed column count.

/// Wrap `text` into lines of at most `width` characters.
///
/// Whitespace runs (including newlines and tabs) collapse to single spaces
/// and lines never start or end with a space. Words longer than `width` are
/// split, starting in whatever room is left on the current line. Empty or
/// all-whitespace input produces no lines.
///
/// Joining the lines with single spaces gives back the whitespace-normalized
/// input only when no word is longer than `width`; a split word gains a
/// space at each break.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_len = 0usize;

    for word in text.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        let mut start = 0usize;

        while start < chars.len() {
            let remaining = chars.len() - start;
            let sep = usize::from(line_len > 0);

            if line_len + sep + remaining <= width {
                if sep == 1 {
                    line.push(' ');
                }
                line.extend(&chars[start..]);
                line_len += sep + remaining;
                break;
            }

            if remaining <= width {
                // Fits on a fresh line.
                lines.push(std::mem::take(&mut line));
                line_len = 0;
                continue;
            }

            let room = width.saturating_sub(line_len + sep);
            if room == 0 {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
                continue;
            }
            if sep == 1 {
                line.push(' ');
            }
            line.extend(&chars[start..start + room]);
            start += room;
            lines.push(std::mem::take(&mut line));
            line_len = 0;
        }
    }

    if line_len > 0 {
        lines.push(line);
    }
    lines
}
