//! Line cursor shared by the memory and file backends.
//!
//! Encoded payloads are newline-terminated text lines interleaved with raw
//! byte runs of known length. [`LineReader`] and [`LineWriter`] implement
//! those two primitives once over `BufRead` / `Write`, tracking the absolute
//! byte position so the indexer can record offsets.

use std::io::{self, BufRead, Read, Write};

use crate::error::{CodecError, Result};

/// Reads lines and raw byte runs from a buffered source.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    pos: u64,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_offset(inner, 0)
    }

    /// Start counting positions from `pos` (for sources that were seeked).
    pub fn with_offset(inner: R, pos: u64) -> Self {
        Self { inner, pos }
    }

    /// Absolute byte position of the next unread byte.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read one line, without its terminating `\n`.
    ///
    /// A line with no terminator before end of input is an error.
    pub fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let n = self.inner.read_until(b'\n', &mut buf)?;
        self.pos += n as u64;
        if buf.pop() != Some(b'\n') {
            return Err(CodecError::UnexpectedEof);
        }
        String::from_utf8(buf).map_err(|_| CodecError::InvalidUtf8("line"))
    }

    /// Read exactly `n` raw bytes.
    pub fn read_exact(&mut self, n: u64) -> Result<Vec<u8>> {
        // Grow with the data rather than trusting the length up front.
        let mut buf = Vec::new();
        let got = (&mut self.inner).take(n).read_to_end(&mut buf)?;
        self.pos += got as u64;
        if (got as u64) < n {
            return Err(CodecError::UnexpectedEof);
        }
        Ok(buf)
    }

    /// Skip exactly `n` raw bytes.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        let got = io::copy(&mut (&mut self.inner).take(n), &mut io::sink())?;
        self.pos += got;
        if got < n {
            return Err(CodecError::UnexpectedEof);
        }
        Ok(())
    }

    /// Fail with [`CodecError::TrailingData`] unless the source is exhausted.
    pub fn finish(mut self) -> Result<()> {
        let rest = io::copy(&mut self.inner, &mut io::sink())?;
        if rest > 0 {
            return Err(CodecError::TrailingData(rest));
        }
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes lines and raw byte runs to a sink.
#[derive(Debug)]
pub struct LineWriter<W> {
    inner: W,
    pos: u64,
}

impl<W: Write> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, pos: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Write `line` followed by `\n`.
    pub fn write_line(&mut self, line: impl AsRef<[u8]>) -> Result<()> {
        let line = line.as_ref();
        self.inner.write_all(line)?;
        self.inner.write_all(b"\n")?;
        self.pos += line.len() as u64 + 1;
        Ok(())
    }

    /// Write raw bytes with no delimiter.
    pub fn write_exact(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_lines_and_raw_runs() {
        let mut reader = LineReader::new(&b"3\nabc12\n"[..]);
        assert_eq!(reader.read_line().unwrap(), "3");
        assert_eq!(reader.position(), 2);
        assert_eq!(reader.read_exact(3).unwrap(), b"abc");
        assert_eq!(reader.position(), 5);
        assert_eq!(reader.read_line().unwrap(), "12");
        assert_eq!(reader.position(), 8);
        reader.finish().unwrap();
    }

    #[test]
    fn raw_runs_may_contain_newlines() {
        let mut reader = LineReader::new(&b"a\nb\nc"[..]);
        assert_eq!(reader.read_exact(4).unwrap(), b"a\nb\n");
        reader.skip(1).unwrap();
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn unterminated_line_is_eof() {
        let mut reader = LineReader::new(&b"12"[..]);
        assert!(matches!(reader.read_line(), Err(CodecError::UnexpectedEof)));
    }

    #[test]
    fn short_runs_are_eof() {
        let mut reader = LineReader::new(&b"ab"[..]);
        assert!(matches!(reader.read_exact(3), Err(CodecError::UnexpectedEof)));
        let mut reader = LineReader::new(&b"ab"[..]);
        assert!(matches!(reader.skip(5), Err(CodecError::UnexpectedEof)));
    }

    #[test]
    fn huge_length_does_not_preallocate() {
        let mut reader = LineReader::new(&b"abc"[..]);
        assert!(matches!(
            reader.read_exact(u64::MAX),
            Err(CodecError::UnexpectedEof)
        ));
    }

    #[test]
    fn invalid_utf8_line() {
        let mut reader = LineReader::new(&b"\xff\n"[..]);
        assert!(matches!(
            reader.read_line(),
            Err(CodecError::InvalidUtf8("line"))
        ));
    }

    #[test]
    fn finish_reports_trailing_bytes() {
        let mut reader = LineReader::new(&b"1\nxyz"[..]);
        reader.read_line().unwrap();
        assert!(matches!(reader.finish(), Err(CodecError::TrailingData(3))));
    }

    #[test]
    fn writer_tracks_position() {
        let mut writer = LineWriter::new(Vec::new());
        writer.write_line("5").unwrap();
        writer.write_exact(b"hello").unwrap();
        writer.write_line(b"true").unwrap();
        assert_eq!(writer.position(), 12);
        assert_eq!(writer.into_inner(), b"5\nhellotrue\n");
    }
}
