//! File-like access to a request body
//!
//! Handlers see the body through [`RawInput`] rather than a concrete stream
//! type, so test doubles and alternative storages can stand in for it.

use bytes::Bytes;
use std::io;

/// Random access over a request body
///
/// Offsets are absolute byte positions from the start of the body. Seeking
/// past the end clamps to the end.
pub trait RawInput {
    /// Move the cursor to `offset`, returning the resulting position
    fn seek_to(&mut self, offset: u64) -> io::Result<u64>;

    /// Current cursor position
    fn tell(&self) -> u64;

    /// Read at most `n` bytes from the cursor
    fn read_up_to(&mut self, n: usize) -> io::Result<Bytes>;

    /// Read everything from the cursor to the end of the body
    fn read_remaining(&mut self) -> io::Result<Bytes>;

    /// Read through the next `\n` (inclusive), or to the end of the body
    ///
    /// Returns an empty buffer once the cursor is at the end.
    fn read_line_bytes(&mut self) -> io::Result<Bytes>;

    /// Read all remaining lines
    fn read_lines(&mut self) -> io::Result<Vec<Bytes>> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line_bytes()?;
            if line.is_empty() {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    /// Lazily iterate the remaining lines
    fn lines(&mut self) -> Lines<'_, Self>
    where
        Self: Sized,
    {
        Lines::new(self)
    }
}

impl<T: RawInput + ?Sized> RawInput for Box<T> {
    fn seek_to(&mut self, offset: u64) -> io::Result<u64> {
        (**self).seek_to(offset)
    }

    fn tell(&self) -> u64 {
        (**self).tell()
    }

    fn read_up_to(&mut self, n: usize) -> io::Result<Bytes> {
        (**self).read_up_to(n)
    }

    fn read_remaining(&mut self) -> io::Result<Bytes> {
        (**self).read_remaining()
    }

    fn read_line_bytes(&mut self) -> io::Result<Bytes> {
        (**self).read_line_bytes()
    }

    fn read_lines(&mut self) -> io::Result<Vec<Bytes>> {
        (**self).read_lines()
    }
}

/// Iterator over the lines of a [`RawInput`]
///
/// Each step behaves like one [`RawInput::read_line_bytes`] call. Iteration
/// ends at the end of the body or after the first error.
#[derive(Debug)]
pub struct Lines<'a, S: ?Sized> {
    input: &'a mut S,
    done: bool,
}

impl<'a, S: RawInput + ?Sized> Lines<'a, S> {
    pub fn new(input: &'a mut S) -> Self {
        Self { input, done: false }
    }
}

impl<S: RawInput + ?Sized> Iterator for Lines<'_, S> {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.input.read_line_bytes() {
            Ok(line) if line.is_empty() => {
                self.done = true;
                None
            }
            Ok(line) => Some(Ok(line)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<S: RawInput + ?Sized> std::iter::FusedIterator for Lines<'_, S> {}
