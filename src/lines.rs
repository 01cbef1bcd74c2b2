/// Splits a stream of byte chunks into complete lines.
///
/// A line ends at `\n`, `\r\n` or a lone `\r`. Bytes after the last terminator are kept until a
/// later chunk completes them, so a line written in several pieces is still produced once.
///
/// ```rust
/// # use filetail::LineBuffer;
/// let mut buffer = LineBuffer::new();
/// let mut lines = vec![];
/// buffer.push(b"Line", |line| lines.push(line));
/// assert!(lines.is_empty());
/// buffer.push(b" one\nLine two\r\n", |line| lines.push(line));
/// assert_eq!(lines, vec!["Line one", "Line two"]);
/// ```
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// previous chunk ended right after `\r`, so a leading `\n` belongs to that terminator
    after_cr: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed next chunk, calling `emit` for every line completed by it. Returns number of lines emitted.
    pub fn push(&mut self, mut chunk: &[u8], mut emit: impl FnMut(String)) -> usize {
        if self.after_cr {
            self.after_cr = false;
            if let Some(rest) = chunk.strip_prefix(b"\n") {
                chunk = rest;
            }
        }

        let mut emitted = 0;
        while let Some(end) = chunk.iter().position(|&b| b == b'\n' || b == b'\r') {
            self.pending.extend_from_slice(&chunk[..end]);
            emit(String::from_utf8_lossy(&self.pending).into_owned());
            self.pending.clear();
            emitted += 1;

            let mut next = end + 1;
            if chunk[end] == b'\r' {
                match chunk.get(next) {
                    Some(b'\n') => next += 1,
                    Some(_) => {}
                    None => self.after_cr = true,
                }
            }
            chunk = &chunk[next..];
        }
        self.pending.extend_from_slice(chunk);
        emitted
    }

    /// Number of buffered bytes that do not form a complete line yet
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Forget unterminated fragment, eg. because the file it came from was replaced
    pub fn clear(&mut self) {
        self.pending.clear();
        self.after_cr = false;
    }
}
