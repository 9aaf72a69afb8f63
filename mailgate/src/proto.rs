use crate::response::Response;
use crate::utils::trim;
use bufstream::BufStream;
use std::io;
use std::io::{BufRead, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// The line-oriented protocol stream shared by a session and the readers it
/// hands out. All access to the underlying connection serializes on the
/// inner mutex; the dot-reader obtained during DATA pulls the same stream
/// the command loop reads from.
pub(crate) struct TextStream<S: Read + Write> {
    stream: Arc<Mutex<BufStream<S>>>,
}

impl<S: Read + Write> Clone for TextStream<S> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream.clone(),
        }
    }
}

impl<S: Read + Write> TextStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Arc::new(Mutex::new(BufStream::new(stream))),
        }
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, BufStream<S>>> {
        self.stream
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "connection lock poisoned"))
    }

    /// Read one command line, stripped of its CRLF terminator.
    /// A closed connection surfaces as `UnexpectedEof`.
    pub fn read_line(&self) -> io::Result<Vec<u8>> {
        let mut stream = self.lock()?;
        let mut line = Vec::with_capacity(80);
        let num_bytes = stream.read_until(b'\n', &mut line)?;
        if num_bytes == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        trim(&mut line);
        Ok(line)
    }

    /// Format a reply onto the wire and flush it.
    pub fn write_response(&self, res: &Response) -> io::Result<()> {
        let mut stream = self.lock()?;
        res.write_to(&mut *stream)?;
        stream.flush()
    }

    /// A reader over the DATA payload that removes dot-stuffing and stops
    /// at the terminating `.` line.
    pub fn dot_reader(&self) -> DotReader<S> {
        DotReader {
            stream: self.clone(),
            pending: Vec::new(),
            offset: 0,
            done: false,
        }
    }

    /// Recover the underlying connection. Fails while any other handle on
    /// the stream is still alive.
    pub fn into_inner(self) -> io::Result<S> {
        let mutex = Arc::try_unwrap(self.stream)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "connection still shared"))?;
        let stream = mutex
            .into_inner()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "connection lock poisoned"))?;
        stream.into_inner().map_err(|e| e.into())
    }
}

/// Presents the dot-stuffed DATA payload as a plain byte stream. Payload
/// lines keep their CRLF; a line holding a single dot ends the stream and a
/// doubled leading dot is reduced to one.
pub(crate) struct DotReader<S: Read + Write> {
    stream: TextStream<S>,
    pending: Vec<u8>,
    offset: usize,
    done: bool,
}

impl<S: Read + Write> Read for DotReader<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.offset < self.pending.len() {
                let n = (self.pending.len() - self.offset).min(buf.len());
                buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
                self.offset += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }
            self.pending.clear();
            self.offset = 0;
            let num_bytes = {
                let mut stream = self.stream.lock()?;
                stream.read_until(b'\n', &mut self.pending)?
            };
            if num_bytes == 0 {
                self.done = true;
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before end of DATA",
                ));
            }
            if self.pending == b".\r\n" || self.pending == b".\n" {
                self.done = true;
                self.pending.clear();
                return Ok(0);
            }
            if self.pending.first() == Some(&b'.') {
                self.pending.remove(0);
            }
        }
    }
}
