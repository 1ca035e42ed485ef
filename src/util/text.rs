use std::borrow::Cow;

/// Maximum summary length in characters, ellipsis included.
pub const MAX_SUMMARY_CHARS: usize = 300;

/// Ellipsis string used for truncation
const ELLIPSIS: &str = "...";

/// Tags replaced outright before the generic bracket pass.
const KNOWN_TAGS: &[&str] = &[
    "<p>", "</p>", "<br>", "<br/>", "<div>", "</div>", "<span>", "</span>", "<strong>",
    "</strong>", "<b>", "</b>", "<em>", "</em>", "<i>", "</i>", "<a href=\"", "</a>",
];

/// Turns an HTML description into a short plain-text summary.
///
/// Runs in four passes:
/// 1. Known tags are replaced by a space.
/// 2. Any remaining `<...>` span is replaced by a space. A `<` with no
///    closing `>` after it stops the pass, so malformed markup is left as text.
/// 3. Newlines, carriage returns and tabs become spaces, runs of spaces
///    collapse to one, and the ends are trimmed.
/// 4. The result is capped at [`MAX_SUMMARY_CHARS`] characters.
///
/// # Examples
///
/// ```
/// use feedpulse::util::clean_description;
///
/// assert_eq!(clean_description("<p>Hello <b>World</b></p>"), "Hello World");
/// assert_eq!(clean_description("1 < 2"), "1 < 2");
/// ```
pub fn clean_description(description: &str) -> String {
    let mut cleaned = description.to_string();

    for tag in KNOWN_TAGS {
        if cleaned.contains(tag) {
            cleaned = cleaned.replace(tag, " ");
        }
    }

    while let Some(start) = cleaned.find('<') {
        match cleaned[start..].find('>') {
            Some(offset) => cleaned.replace_range(start..=start + offset, " "),
            None => break,
        }
    }

    let normalized = strip_control_chars(&cleaned)
        .split(|c: char| c == ' ' || c == '\n' || c == '\r' || c == '\t')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    truncate_chars(&normalized, MAX_SUMMARY_CHARS).into_owned()
}

/// Truncates to at most `max_chars` characters, ending with "..." when cut.
///
/// Counts Unicode scalar values, so multi-byte text is never split
/// mid-character. Widths of three or fewer get no ellipsis.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    let Some((cut, _)) = s.char_indices().nth(max_chars) else {
        return Cow::Borrowed(s);
    };

    if max_chars <= ELLIPSIS.len() {
        return Cow::Owned(s[..cut].to_string());
    }

    let keep = max_chars - ELLIPSIS.len();
    let end = s
        .char_indices()
        .nth(keep)
        .map(|(idx, _)| idx)
        .unwrap_or(cut);
    Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS))
}

fn is_stripped_control(c: char) -> bool {
    (c.is_ascii_control() && c != '\t' && c != '\n' && c != '\r') || c == '\u{7f}'
}

/// Strips terminal control characters and ANSI escape sequences.
///
/// Feed titles and summaries are attacker-controlled; consumers often print
/// them straight to a terminal. Removes C0 controls (except tab, newline and
/// carriage return), DEL, CSI sequences (`ESC [ ... final`), OSC sequences
/// (`ESC ] ...` up to BEL or `ESC \`) and bare ESC.
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if ('\u{40}'..='\u{7e}').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\u{07}' {
                            break;
                        }
                        if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_stripped_control(c) {
            out.push(c);
        }
    }

    Cow::Owned(out)
}
