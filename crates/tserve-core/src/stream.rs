//! Buffered, seekable request body
//!
//! The body arrives as a one-shot, forward-only byte stream. Every byte
//! pulled from it is retained so the cursor can move backwards freely:
//! first in memory, then, once more than `max_buffer_size` bytes have been
//! consumed, in an overflow file that is removed when the stream is dropped.
//!
//! ```
//! use std::io::Cursor;
//! use tserve_core::{BufferedSeekableStream, RawInput, StreamConfig};
//!
//! let body = Cursor::new(b"12345ab\ncdef".to_vec());
//! let mut input = BufferedSeekableStream::new(body, StreamConfig::default());
//!
//! input.seek_to(5).unwrap();
//! assert_eq!(&input.read_up_to(2).unwrap()[..], b"ab");
//! assert_eq!(input.tell(), 7);
//!
//! input.seek_to(0).unwrap();
//! assert_eq!(&input.read_line_bytes().unwrap()[..], b"12345ab\n");
//! ```

use crate::config::{format_size, StreamConfig};
use crate::input::RawInput;
use crate::source::BodySource;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// Disk-backed store holding every consumed byte after a spill
struct Overflow {
    file: NamedTempFile,
    len: u64,
}

impl Overflow {
    fn create(dir: Option<&Path>, initial: &[u8]) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("tserve-body-");
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(initial)?;

        Ok(Self {
            file,
            len: initial.len() as u64,
        })
    }

    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(self.len))?;
        self.file.write_all(data)?;
        self.len += data.len() as u64;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }
}

enum Storage {
    Memory(BytesMut),
    Spilled(Overflow),
}

impl Storage {
    /// Copy `buf.len()` stored bytes starting at `offset`
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        match self {
            Storage::Memory(data) => {
                let start = to_len(offset)?;
                buf.copy_from_slice(&data[start..start + buf.len()]);
                Ok(())
            }
            Storage::Spilled(overflow) => overflow.read_at(offset, buf),
        }
    }
}

/// Seekable view over a one-shot byte source
///
/// Bytes are pulled from the source lazily, only as far as an operation
/// needs them. The source is never read twice for the same offset.
pub struct BufferedSeekableStream<R> {
    source: R,
    storage: Storage,
    position: u64,
    consumed: u64,
    exhausted: bool,
    poisoned: bool,
    config: StreamConfig,
    chunk: Vec<u8>,
}

impl<R: Read> BufferedSeekableStream<R> {
    /// Wrap `source`; nothing is read until the first operation
    pub fn new(source: R, config: StreamConfig) -> Self {
        let chunk = vec![0; config.chunk_size.max(1)];
        Self {
            source,
            storage: Storage::Memory(BytesMut::new()),
            position: 0,
            consumed: 0,
            exhausted: false,
            poisoned: false,
            config,
            chunk,
        }
    }

    /// Bytes pulled from the source so far
    pub fn total_consumed(&self) -> u64 {
        self.consumed
    }

    /// Whether the source has reported its end
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Whether buffered bytes have moved to the overflow file
    pub fn is_spilled(&self) -> bool {
        matches!(self.storage, Storage::Spilled(_))
    }

    /// Location of the overflow file while it exists
    pub fn spill_path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Memory(_) => None,
            Storage::Spilled(overflow) => Some(overflow.file.path()),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Pull one chunk from the source; returns 0 at end of source
    fn pull(&mut self) -> io::Result<usize> {
        if self.poisoned {
            return Err(io::Error::other(
                "request body storage failed earlier; buffered data is incomplete",
            ));
        }
        if self.exhausted {
            return Ok(0);
        }

        let n = loop {
            match self.source.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if n == 0 {
            self.exhausted = true;
            trace!(consumed = self.consumed, "request body source exhausted");
            return Ok(0);
        }

        let total = self.consumed + n as u64;
        if !self.is_spilled() && total > self.config.max_buffer_size as u64 {
            if let Err(e) = self.spill() {
                // Keep the pulled bytes so nothing consumed is lost; the
                // next pull retries the spill.
                if let Storage::Memory(data) = &mut self.storage {
                    data.extend_from_slice(&self.chunk[..n]);
                }
                self.consumed = total;
                return Err(e);
            }
        }

        match &mut self.storage {
            Storage::Memory(data) => data.extend_from_slice(&self.chunk[..n]),
            Storage::Spilled(overflow) => {
                if let Err(e) = overflow.append(&self.chunk[..n]) {
                    self.poisoned = true;
                    return Err(e);
                }
            }
        }
        self.consumed = total;
        trace!(pulled = n, consumed = self.consumed, "pulled request body bytes");
        Ok(n)
    }

    /// Move every buffered byte into a fresh overflow file
    fn spill(&mut self) -> io::Result<()> {
        let Storage::Memory(data) = &self.storage else {
            return Ok(());
        };
        let overflow = Overflow::create(self.config.spill_dir.as_deref(), data)?;
        debug!(
            threshold = %format_size(self.config.max_buffer_size as u64),
            consumed = self.consumed,
            path = %overflow.file.path().display(),
            "request body exceeded in-memory threshold, spilling to disk"
        );
        self.storage = Storage::Spilled(overflow);
        Ok(())
    }

    /// Pull until at least `target` bytes are consumed or the source ends
    fn fill_to(&mut self, target: u64) -> io::Result<()> {
        while self.consumed < target {
            if self.pull()? == 0 {
                break;
            }
        }
        Ok(())
    }

    fn fill_to_end(&mut self) -> io::Result<()> {
        while self.pull()? > 0 {}
        Ok(())
    }

    fn copy_range(&mut self, start: u64, len: u64) -> io::Result<Bytes> {
        let mut out = vec![0; to_len(len)?];
        self.storage.read_at(start, &mut out)?;
        Ok(Bytes::from(out))
    }
}

impl<R: Read> BufferedSeekableStream<BodySource<R>> {
    /// Stream over a connection body with an optional declared length
    pub fn from_body(reader: R, content_length: Option<u64>, config: StreamConfig) -> Self {
        Self::new(BodySource::new(reader, content_length), config)
    }
}

impl<R: Read> RawInput for BufferedSeekableStream<R> {
    fn seek_to(&mut self, offset: u64) -> io::Result<u64> {
        self.fill_to(offset)?;
        self.position = offset.min(self.consumed);
        Ok(self.position)
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn read_up_to(&mut self, n: usize) -> io::Result<Bytes> {
        let target = self.position.saturating_add(n as u64);
        self.fill_to(target)?;
        let end = target.min(self.consumed);
        let bytes = self.copy_range(self.position, end - self.position)?;
        self.position = end;
        Ok(bytes)
    }

    fn read_remaining(&mut self) -> io::Result<Bytes> {
        self.fill_to_end()?;
        let bytes = self.copy_range(self.position, self.consumed - self.position)?;
        self.position = self.consumed;
        Ok(bytes)
    }

    fn read_line_bytes(&mut self) -> io::Result<Bytes> {
        let mut line = BytesMut::new();
        let mut scan = self.position;
        let window = self.config.chunk_size.max(1) as u64;

        loop {
            if scan == self.consumed && self.pull()? == 0 {
                break;
            }
            let len = (self.consumed - scan).min(window);
            let segment = self.copy_range(scan, len)?;
            if let Some(i) = segment.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&segment[..=i]);
                scan += i as u64 + 1;
                break;
            }
            line.extend_from_slice(&segment);
            scan += len;
        }

        self.position = scan;
        Ok(line.freeze())
    }
}

impl<R: Read> Read for BufferedSeekableStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let target = self.position.saturating_add(buf.len() as u64);
        self.fill_to(target)?;
        let n = to_len(target.min(self.consumed) - self.position)?;
        self.storage.read_at(self.position, &mut buf[..n])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read> Seek for BufferedSeekableStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => offset_by(self.position, delta)?,
            SeekFrom::End(delta) => {
                self.fill_to_end()?;
                offset_by(self.consumed, delta)?
            }
        };
        self.seek_to(target)
    }
}

impl<R> fmt::Debug for BufferedSeekableStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spill_path = match &self.storage {
            Storage::Memory(_) => None,
            Storage::Spilled(overflow) => Some(overflow.file.path()),
        };
        f.debug_struct("BufferedSeekableStream")
            .field("position", &self.position)
            .field("consumed", &self.consumed)
            .field("exhausted", &self.exhausted)
            .field("spill_path", &spill_path)
            .field("max_buffer_size", &self.config.max_buffer_size)
            .finish_non_exhaustive()
    }
}

fn offset_by(base: u64, delta: i64) -> io::Result<u64> {
    base.checked_add_signed(delta).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid seek to a negative or overflowing position",
        )
    })
}

fn to_len(n: u64) -> io::Result<usize> {
    usize::try_from(n).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "range exceeds addressable memory")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(body: &[u8], max_buffer_size: usize) -> BufferedSeekableStream<Cursor<Vec<u8>>> {
        BufferedSeekableStream::new(
            Cursor::new(body.to_vec()),
            StreamConfig::default().max_buffer_size(max_buffer_size),
        )
    }

    /// Hands out at most `step` bytes per read, like a slow socket
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    /// Yields `data` and then fails
    struct Broken {
        data: Cursor<Vec<u8>>,
    }

    impl Read for Broken {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_seek_read_tell() {
        let mut input = stream(b"12345ab\ncdef", 1024);

        assert_eq!(input.seek_to(5).unwrap(), 5);
        assert_eq!(&input.read_up_to(2).unwrap()[..], b"ab");
        assert_eq!(input.tell(), 7);

        input.seek_to(0).unwrap();
        assert_eq!(&input.read_line_bytes().unwrap()[..], b"12345ab\n");
        assert_eq!(input.tell(), 8);

        assert_eq!(&input.read_remaining().unwrap()[..], b"cdef");
        assert_eq!(input.tell(), 12);

        input.seek_to(0).unwrap();
        assert_eq!(&input.read_remaining().unwrap()[..], b"12345ab\ncdef");

        input.seek_to(0).unwrap();
        let lines = input.read_lines().unwrap();
        assert_eq!(lines, vec![Bytes::from("12345ab\n"), Bytes::from("cdef")]);
        assert!(!input.is_spilled());
    }

    #[test]
    fn test_seek_past_buffer_spills() {
        let mut input = stream(&[b'1'; 20], 10);

        input.seek_to(5).unwrap();
        assert_eq!(&input.read_up_to(2).unwrap()[..], b"11");
        assert_eq!(input.tell(), 7);
        assert!(input.is_spilled());

        assert_eq!(input.seek_to(0).unwrap(), 0);
        assert_eq!(input.tell(), 0);
        assert_eq!(input.read_remaining().unwrap().len(), 20);
    }

    #[test]
    fn test_lines_iteration() {
        let mut input = stream(b"12345\nabcdef\r\nzyxwv", 1024);
        let lines: Vec<Bytes> = input.lines().collect::<io::Result<_>>().unwrap();
        assert_eq!(
            lines,
            vec![
                Bytes::from("12345\n"),
                Bytes::from("abcdef\r\n"),
                Bytes::from("zyxwv")
            ]
        );
        assert_eq!(input.tell(), 19);
        assert_eq!(input.lines().count(), 0);
    }

    #[test]
    fn test_lines_iteration_after_spill() {
        let mut input = BufferedSeekableStream::new(
            Trickle {
                data: b"12345\nabcdef\r\nzyxwv".to_vec(),
                pos: 0,
                step: 3,
            },
            StreamConfig::default().max_buffer_size(10),
        );

        let first = input.lines().next().unwrap().unwrap();
        assert_eq!(&first[..], b"12345\n");
        assert!(!input.is_spilled());

        let rest: Vec<Bytes> = input.lines().collect::<io::Result<_>>().unwrap();
        assert_eq!(rest, vec![Bytes::from("abcdef\r\n"), Bytes::from("zyxwv")]);
        assert!(input.is_spilled());
    }

    #[test]
    fn test_lazy_pull() {
        let mut input = BufferedSeekableStream::new(
            Trickle {
                data: b"abcdefghij".to_vec(),
                pos: 0,
                step: 2,
            },
            StreamConfig::default().chunk_size(2),
        );

        assert_eq!(input.total_consumed(), 0);
        input.seek_to(3).unwrap();
        assert_eq!(input.total_consumed(), 4);
        assert_eq!(input.tell(), 3);
        assert!(!input.is_exhausted());
    }

    #[test]
    fn test_seek_beyond_end_clamps() {
        let mut input = stream(b"abc", 1024);
        assert_eq!(input.seek_to(100).unwrap(), 3);
        assert_eq!(input.tell(), 3);
        assert!(input.read_up_to(10).unwrap().is_empty());
        assert!(input.read_line_bytes().unwrap().is_empty());
        assert!(input.is_exhausted());
    }

    #[test]
    fn test_spill_happens_only_past_threshold() {
        let mut input = stream(&[b'x'; 10], 10);
        input.read_remaining().unwrap();
        assert!(!input.is_spilled());

        let mut input = stream(&[b'x'; 11], 10);
        input.read_remaining().unwrap();
        assert!(input.is_spilled());
    }

    #[test]
    fn test_spill_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let config = StreamConfig::default()
            .max_buffer_size(4)
            .spill_dir(dir.path());
        let mut input = BufferedSeekableStream::new(Cursor::new(vec![7u8; 64]), config);

        input.read_up_to(8).unwrap();
        let path = input.spill_path().unwrap().to_path_buf();
        assert!(path.starts_with(dir.path()));
        assert!(path.exists());

        drop(input);
        assert!(!path.exists());
    }

    #[test]
    fn test_source_error_propagates() {
        let mut input = BufferedSeekableStream::new(
            Broken {
                data: Cursor::new(b"abc".to_vec()),
            },
            StreamConfig::default(),
        );

        assert_eq!(&input.read_up_to(3).unwrap()[..], b"abc");
        let err = input.read_remaining().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

        // Already consumed bytes stay available
        input.seek_to(0).unwrap();
        assert_eq!(&input.read_up_to(3).unwrap()[..], b"abc");
    }

    #[test]
    fn test_early_close_from_body() {
        let mut input = BufferedSeekableStream::from_body(
            Cursor::new(b"short".to_vec()),
            Some(10),
            StreamConfig::default(),
        );
        let err = input.read_remaining().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_content_length_bounds_body() {
        let mut input = BufferedSeekableStream::from_body(
            Cursor::new(b"bodyGARBAGE".to_vec()),
            Some(4),
            StreamConfig::default(),
        );
        assert_eq!(&input.read_remaining().unwrap()[..], b"body");
        assert!(input.is_exhausted());
    }

    #[test]
    fn test_std_read_and_seek() {
        let mut input = stream(b"0123456789abcdef", 8);

        let mut buf = [0u8; 4];
        input.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"0123");

        assert_eq!(input.seek(SeekFrom::Current(-2)).unwrap(), 2);
        assert_eq!(input.seek(SeekFrom::End(-3)).unwrap(), 13);
        let mut rest = Vec::new();
        input.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"def");

        let err = input.seek(SeekFrom::Current(-100)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(input.stream_position().unwrap(), 16);
        assert!(input.is_spilled());
    }

    #[test]
    fn test_line_longer_than_chunk() {
        let body = [b"a".repeat(50), b"\nb".to_vec()].concat();
        let mut input = BufferedSeekableStream::new(
            Cursor::new(body),
            StreamConfig::default().chunk_size(7).max_buffer_size(16),
        );

        let line = input.read_line_bytes().unwrap();
        assert_eq!(line.len(), 51);
        assert_eq!(input.tell(), 51);
        assert_eq!(&input.read_line_bytes().unwrap()[..], b"b");
    }

    #[test]
    fn test_boxed_raw_input() {
        let mut input: Box<dyn RawInput + Send> = Box::new(stream(b"a\nb\n", 1024));
        let lines: Vec<Bytes> = input.lines().collect::<io::Result<_>>().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(input.tell(), 4);
    }
}
