/// Split a reply into chunks no longer than `max_len` bytes for platforms
/// with a message size cap.
///
/// Prefers line boundaries; a single line over the limit is cut on char
/// boundaries.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len || max_len == 0 {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for line in text.split('\n') {
        let separator = usize::from(!current.is_empty());
        if current.len() + separator + line.len() > max_len && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }

        let mut rest = line;
        while rest.len() > max_len {
            let cut = floor_char_boundary(rest, max_len);
            parts.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(rest);
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    // a limit smaller than one char still has to make progress
    if i == 0 {
        s.chars().next().map(char::len_utf8).unwrap_or(0)
    } else {
        i
    }
}
