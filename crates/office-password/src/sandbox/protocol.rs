//! Bounded reads for the worker's JSON-line protocol, shared by host and worker.

use std::io::{self, BufRead, BufReader, Read};

const ERROR_LINE_PREFIX_BYTES: usize = 4 * 1024;
const LINE_TRUNCATED_SUFFIX: &str = "…(truncated)";

/// A `BufRead` adaptor similar to `Read::take`, but without losing any buffered bytes.
///
/// Bounds `read_until` so a protocol line cannot cause unbounded allocations.
struct BufReadTake<'a, R> {
    inner: &'a mut R,
    remaining: usize,
}

impl<'a, R> BufReadTake<'a, R> {
    fn new(inner: &'a mut R, limit: usize) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }
}

impl<R: BufRead> Read for BufReadTake<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        if available.is_empty() {
            return Ok(0);
        }
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for BufReadTake<'_, R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.remaining == 0 {
            return Ok(&[]);
        }
        let buf = self.inner.fill_buf()?;
        let n = buf.len().min(self.remaining);
        Ok(&buf[..n])
    }

    fn consume(&mut self, amt: usize) {
        let n = amt.min(self.remaining);
        self.remaining -= n;
        self.inner.consume(n);
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineError {
    Io(String),
    TooLong { max_bytes: usize },
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineError::Io(err) => write!(f, "failed to read protocol line: {err}"),
            LineError::TooLong { max_bytes } => {
                write!(f, "protocol line exceeded maximum size ({max_bytes} bytes)")
            }
        }
    }
}

/// Reads one `\n`-terminated line of at most `max_bytes` (excluding the terminator).
///
/// Returns `Ok(None)` at EOF. A trailing `\r` is stripped.
pub(crate) fn read_line_bounded<R: BufRead>(
    reader: &mut R,
    max_bytes: usize,
) -> Result<Option<String>, LineError> {
    let mut buf = Vec::new();
    let limit = max_bytes.saturating_add(2);
    let mut limited = BufReadTake::new(reader, limit);
    let read = limited
        .read_until(b'\n', &mut buf)
        .map_err(|e| LineError::Io(e.to_string()))?;

    if read == 0 {
        return Ok(None);
    }

    let had_newline = buf.last() == Some(&b'\n');
    if had_newline {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }

    if buf.len() > max_bytes || (!had_newline && read == limit) {
        return Err(LineError::TooLong { max_bytes });
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| LineError::Io("protocol line is not valid UTF-8".to_string()))
}

/// Error text for a line that is not valid JSON, quoting at most a short prefix of it.
pub(crate) fn invalid_json_line_error(err: serde_json::Error, line: &str) -> String {
    let snippet = if line.len() <= ERROR_LINE_PREFIX_BYTES {
        line.to_string()
    } else {
        let mut end = ERROR_LINE_PREFIX_BYTES;
        while end > 0 && !line.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}{}", &line[..end], LINE_TRUNCATED_SUFFIX)
    };
    format!("invalid JSON line: {err}: {snippet}")
}

/// Reads at most `max_bytes` of `reader` (marking truncation), then drains the rest so the
/// writer never blocks on a full pipe.
pub(crate) fn read_stream_lossy_truncated<R: Read>(
    reader: R,
    max_bytes: usize,
    marker: &str,
) -> io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    (&mut reader)
        .take((max_bytes as u64).saturating_add(1))
        .read_to_end(&mut buf)?;
    if buf.len() > max_bytes {
        let marker = marker.as_bytes();
        if marker.len() >= max_bytes {
            buf = marker[..max_bytes].to_vec();
        } else {
            buf.truncate(max_bytes - marker.len());
            buf.extend_from_slice(marker);
        }
    }

    let _ = io::copy(&mut reader, &mut io::sink());
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
