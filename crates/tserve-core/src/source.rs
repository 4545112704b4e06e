//! Content-length bounded body source
//!
//! Wraps the connection reader so the body ends at the declared length,
//! whether or not the peer keeps the connection open afterwards.

use std::io::{self, Read};

/// One-shot, forward-only request body reader
#[derive(Debug)]
pub struct BodySource<R> {
    inner: R,
    remaining: Option<u64>,
}

impl<R: Read> BodySource<R> {
    /// Body of exactly `content_length` bytes
    pub fn with_length(inner: R, content_length: u64) -> Self {
        Self {
            inner,
            remaining: Some(content_length),
        }
    }

    /// Body that runs until the reader reports EOF
    pub fn until_eof(inner: R) -> Self {
        Self {
            inner,
            remaining: None,
        }
    }

    pub fn new(inner: R, content_length: Option<u64>) -> Self {
        Self {
            inner,
            remaining: content_length,
        }
    }

    /// Bytes still expected, if the length was declared
    pub fn remaining(&self) -> Option<u64> {
        self.remaining
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for BodySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = match self.remaining {
            Some(0) => return Ok(0),
            Some(remaining) => buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX)),
            None => buf.len(),
        };
        if want == 0 {
            return Ok(0);
        }

        let n = loop {
            match self.inner.read(&mut buf[..want]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };

        if let Some(remaining) = self.remaining.as_mut() {
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed with {remaining} body bytes outstanding"),
                ));
            }
            *remaining -= n as u64;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_stops_at_content_length() {
        let mut source = BodySource::with_length(Cursor::new(b"hello world".to_vec()), 5);
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
        assert_eq!(source.remaining(), Some(0));
    }

    #[test]
    fn test_early_close_is_an_error() {
        let mut source = BodySource::with_length(Cursor::new(b"abc".to_vec()), 10);
        let mut out = Vec::new();
        let err = source.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_until_eof() {
        let mut source = BodySource::until_eof(Cursor::new(b"abc".to_vec()));
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(source.remaining(), None);
    }

    #[test]
    fn test_zero_length_body() {
        let mut source = BodySource::with_length(Cursor::new(b"ignored".to_vec()), 0);
        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }
}
