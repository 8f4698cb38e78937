//! Wrapped-text height estimation.
//!
//! Box heights are derived from an estimated wrapped-line count. The renderer
//! feeds the same line lists through the same functions, so what the layout
//! sized for is what gets drawn.

/// Pixel height of one rendered text line.
pub const LINE_HEIGHT: i64 = 15;

/// Vertical padding added to every text box.
pub const BOX_PADDING: i64 = 20;

/// Horizontal padding (left + right) inside a text box.
pub const HORIZONTAL_PADDING: i64 = 24;

/// Average glyph width in pixels at the body font size.
pub const CHAR_WIDTH: i64 = 7;

/// Lower bound on characters per line, for very narrow boxes.
pub const MIN_CHARS_PER_LINE: usize = 12;

/// Characters that fit on one line of a box `width` pixels wide.
pub fn chars_per_line(width: i64) -> usize {
    let usable = (width - HORIZONTAL_PADDING).max(0) / CHAR_WIDTH;
    (usable as usize).max(MIN_CHARS_PER_LINE)
}

/// Visual lines taken by one logical line.
///
/// Embedded newlines split the text into segments estimated independently.
/// An empty segment still takes one line.
pub fn wrapped_lines(text: &str, chars_per_line: usize) -> usize {
    let per_line = chars_per_line.max(1);
    text.split('\n')
        .map(|segment| segment.chars().count().div_ceil(per_line).max(1))
        .sum()
}

/// Visual lines taken by a list of logical lines.
pub fn wrapped_line_count<S: AsRef<str>>(lines: &[S], width: i64) -> usize {
    let per_line = chars_per_line(width);
    lines
        .iter()
        .map(|l| wrapped_lines(l.as_ref(), per_line))
        .sum()
}

/// Height of a text box holding `lines`, never below `min_height`.
pub fn box_height<S: AsRef<str>>(lines: &[S], width: i64, min_height: i64) -> i64 {
    let count = wrapped_line_count(lines, width) as i64;
    (count * LINE_HEIGHT + BOX_PADDING).max(min_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_boxes_wrap_more() {
        let text = "x".repeat(200);
        assert!(wrapped_line_count(&[&text], 200) > wrapped_line_count(&[&text], 500));
    }

    #[test]
    fn test_segments_counted_separately() {
        assert_eq!(wrapped_lines("ab\ncd", 10), 2);
        assert_eq!(wrapped_lines("", 10), 1);
        assert_eq!(wrapped_lines("\n", 10), 2);
        assert_eq!(wrapped_lines(&"a".repeat(21), 10), 3);
    }

    #[test]
    fn test_chars_per_line_floor() {
        assert_eq!(chars_per_line(0), MIN_CHARS_PER_LINE);
        assert_eq!(chars_per_line(24 + 7 * 60), 60);
    }

    #[test]
    fn test_height_monotonic_in_appended_lines() {
        let base = vec!["Mission".to_string(), "Deliver the payment API".to_string()];
        let mut longer = base.clone();
        longer.push("and the mobile wallet".to_string());
        for width in [120, 300, 488] {
            assert!(box_height(&longer, width, 0) > box_height(&base, width, 0));
            assert!(box_height(&longer, width, 96) >= box_height(&base, width, 96));
        }
    }

    #[test]
    fn test_height_monotonic_in_text_length() {
        let mut previous = 0;
        for n in 0..300 {
            let h = box_height(&["y".repeat(n)], 300, 40);
            assert!(h >= previous);
            previous = h;
        }
    }
}
