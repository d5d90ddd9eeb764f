//! Incremental projection of a reply buffer onto its displayable text.
//!
//! The scanner walks the growing reply buffer once, copying prose into the
//! visible text and skipping everything between `<ACTION>` and `</ACTION>`.
//! Each call only looks at the part of the buffer it has not consumed yet, so
//! a long reply is not rescanned from the start on every chunk.
//!
//! A trailing fragment that might be the beginning of a tag (`<`, `<AC`, ...)
//! is held back until the next chunk decides whether it is a tag or prose.

const OPEN_TAG: &[u8] = b"<action>";
const CLOSE_TAG: &[u8] = b"</action>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Prose,
    /// Inside an action block whose closing tag has not arrived yet.
    Directive,
}

#[derive(Debug, Clone)]
pub struct ActionScanner {
    visible: String,
    /// Bytes of the buffer already classified as prose or directive.
    consumed: usize,
    state: ScanState,
}

impl Default for ActionScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionScanner {
    pub fn new() -> Self {
        Self {
            visible: String::new(),
            consumed: 0,
            state: ScanState::Prose,
        }
    }

    /// Visible text so far (untrimmed).
    pub fn visible(&self) -> &str {
        &self.visible
    }

    /// Consumes whatever `buffer` gained since the previous call.
    ///
    /// `buffer` must be the same append-only buffer on every call.
    pub fn advance(&mut self, buffer: &str) {
        debug_assert!(self.consumed <= buffer.len());

        loop {
            let rest = &buffer.as_bytes()[self.consumed..];
            match self.state {
                ScanState::Prose => {
                    if let Some(pos) = find_ignore_ascii_case(rest, OPEN_TAG) {
                        let tag_start = self.consumed + pos;
                        self.visible.push_str(&buffer[self.consumed..tag_start]);
                        self.consumed = tag_start + OPEN_TAG.len();
                        self.state = ScanState::Directive;
                        continue;
                    }
                    let held = partial_tag_len(rest, OPEN_TAG);
                    let end = buffer.len() - held;
                    self.visible.push_str(&buffer[self.consumed..end]);
                    self.consumed = end;
                    return;
                }
                ScanState::Directive => {
                    if let Some(pos) = find_ignore_ascii_case(rest, CLOSE_TAG) {
                        self.consumed += pos + CLOSE_TAG.len();
                        self.state = ScanState::Prose;
                        continue;
                    }
                    self.consumed = buffer.len() - partial_tag_len(rest, CLOSE_TAG);
                    return;
                }
            }
        }
    }

    /// Finishes the scan once no more text will arrive.
    ///
    /// A held-back prose fragment turned out not to be a tag and becomes
    /// visible; an unterminated action block is dropped.
    pub fn finish(mut self, buffer: &str) -> String {
        self.advance(buffer);
        if self.state == ScanState::Prose {
            self.visible.push_str(&buffer[self.consumed..]);
        }
        self.visible
    }
}

/// Finds `needle` (ASCII, lowercase) in `haystack`, ignoring ASCII case.
///
/// Matches always start on an ASCII byte, so the returned offset is a char
/// boundary of the UTF-8 text the haystack came from.
fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Length of the longest proper prefix of `tag` that ends `haystack`.
fn partial_tag_len(haystack: &[u8], tag: &[u8]) -> usize {
    let max = haystack.len().min(tag.len() - 1);
    (1..=max)
        .rev()
        .find(|&len| haystack[haystack.len() - len..].eq_ignore_ascii_case(&tag[..len]))
        .unwrap_or(0)
}
