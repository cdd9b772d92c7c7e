/// SSE line parser for the upstream byte stream.
///
/// The upstream speaks newline-delimited `data: ` events. Chunks arrive at
/// arbitrary byte boundaries, so the parser keeps the trailing incomplete
/// segment as carry-over and yields only complete lines, in order.
use memchr::memchr_iter;

/// The terminal sentinel line, forwarded verbatim exactly once per exchange.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Incremental newline splitter with carry-over.
///
/// Feed it raw byte chunks and it yields fully-assembled lines. Invalid
/// UTF-8 inside a line is replaced rather than rejected; line boundaries are
/// byte-exact since `\n` never occurs inside a multi-byte sequence.
pub struct LineParser {
    buffer: Vec<u8>,
    read_offset: usize,
}

impl LineParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            read_offset: 0,
        }
    }

    /// Feed one raw chunk and append every complete line to `out`.
    ///
    /// A trailing `\r` is stripped from each line. The final segment without
    /// a newline stays buffered until a later chunk completes it.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        self.buffer.extend_from_slice(chunk);
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &self.buffer[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let [head @ .., b'\r'] = line {
                line = head;
            }
            out.push(String::from_utf8_lossy(line).into_owned());
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the payload of a `data: ` line. Lines without the prefix are not
/// events and the caller discards them.
#[must_use]
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data: ")
}

/// True for the exact `data: [DONE]` sentinel (after trimming whitespace).
#[must_use]
pub fn is_done_line(line: &str) -> bool {
    line.trim() == "data: [DONE]"
}
