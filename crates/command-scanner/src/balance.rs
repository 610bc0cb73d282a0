//! Balanced-delimiter matching for nested payload objects

/// Find the byte index of the `}` that closes the `{` at `open`.
///
/// Braces inside JSON string literals are ignored. Returns `None` when
/// `open` is not a `{` or the text ends before depth returns to zero,
/// which is the normal state of a payload that is still streaming in.
pub fn find_closing_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
