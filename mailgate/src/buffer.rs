use std::io;
use std::io::Read;
use std::sync::{Arc, Mutex};

// State shared by every clone of a buffer: the single-use source, the bytes
// captured from it so far, and whether the source has finished.
struct Tee {
    source: Box<dyn Read + Send>,
    captured: Vec<u8>,
    done: bool,
}

/// A shared view over a single-use byte stream. Cloning a `MailBuffer`
/// yields an independent reader positioned at offset zero; every clone can
/// read the full stream while the underlying source is read exactly once.
///
/// Whichever clone reaches the capture frontier first pulls the source
/// forward for everyone; clones behind the frontier replay captured bytes
/// without touching the source. The whole message is kept in memory for the
/// lifetime of the buffer.
pub struct MailBuffer {
    shared: Arc<Mutex<Tee>>,
    pos: usize,
}

impl MailBuffer {
    pub(crate) fn new<R>(source: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            shared: Arc::new(Mutex::new(Tee {
                source: Box::new(source),
                captured: Vec::new(),
                done: false,
            })),
            pos: 0,
        }
    }

    // A buffer over an already finished stream, used between transactions.
    pub(crate) fn empty() -> Self {
        Self::new(io::empty())
    }
}

impl Clone for MailBuffer {
    /// The clone shares the captured bytes and starts at offset zero.
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            pos: 0,
        }
    }
}

impl Read for MailBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let MailBuffer { shared, pos } = self;
        let mut tee = shared
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "mail buffer lock poisoned"))?;
        // Behind the frontier: replay from the capture.
        if *pos < tee.captured.len() {
            let n = (tee.captured.len() - *pos).min(buf.len());
            buf[..n].copy_from_slice(&tee.captured[*pos..*pos + n]);
            *pos += n;
            return Ok(n);
        }
        if tee.done {
            return Ok(0);
        }
        // At the frontier: pull the source and mirror what arrived. The
        // lock is held across the source read; a slow source stalls every
        // clone equally.
        match tee.source.read(buf) {
            Ok(0) => {
                tee.done = true;
                Ok(0)
            }
            Ok(n) => {
                tee.captured.extend_from_slice(&buf[..n]);
                *pos += n;
                Ok(n)
            }
            Err(err) => {
                // The source is finished for everyone; bytes already
                // captured stay readable.
                tee.done = true;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::thread;
    use std::time::Duration;

    // A source that yields its payload a few bytes at a time and counts
    // how often it is read.
    struct SlowSource {
        payload: Vec<u8>,
        pos: usize,
        reads: Arc<Mutex<usize>>,
    }

    impl Read for SlowSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            *self.reads.lock().unwrap() += 1;
            thread::sleep(Duration::from_millis(1));
            if self.pos >= self.payload.len() {
                return Ok(0);
            }
            let n = (self.payload.len() - self.pos).min(buf.len()).min(3);
            buf[..n].copy_from_slice(&self.payload[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn single_reader_reads_everything() {
        let mut buffer = MailBuffer::new(Cursor::new(b"hello world".to_vec()));
        let mut out = Vec::new();
        buffer.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn clone_restarts_at_offset_zero() {
        let mut buffer = MailBuffer::new(Cursor::new(b"hello world".to_vec()));
        let mut out = Vec::new();
        buffer.read_to_end(&mut out).unwrap();

        // A clone taken after the source is exhausted replays the capture.
        let mut replay = buffer.clone();
        let mut out2 = Vec::new();
        replay.read_to_end(&mut out2).unwrap();
        assert_eq!(out, out2);
    }

    #[test]
    fn source_is_read_once() {
        let reads = Arc::new(Mutex::new(0));
        let source = SlowSource {
            payload: b"some message payload".to_vec(),
            pos: 0,
            reads: reads.clone(),
        };
        let buffer = MailBuffer::new(source);

        let mut first = buffer.clone();
        let mut out = Vec::new();
        first.read_to_end(&mut out).unwrap();
        let reads_after_first = *reads.lock().unwrap();

        let mut second = buffer.clone();
        let mut out2 = Vec::new();
        second.read_to_end(&mut out2).unwrap();

        assert_eq!(out, out2);
        assert_eq!(*reads.lock().unwrap(), reads_after_first);
    }

    #[test]
    fn concurrent_clones_see_identical_bytes() {
        let reads = Arc::new(Mutex::new(0));
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let source = SlowSource {
            payload: payload.clone(),
            pos: 0,
            reads,
        };
        let buffer = MailBuffer::new(source);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let mut reader = buffer.clone();
                thread::spawn(move || {
                    let mut out = Vec::new();
                    reader.read_to_end(&mut out).unwrap();
                    out
                })
            })
            .collect();

        for worker in workers {
            assert_eq!(worker.join().unwrap(), payload);
        }
    }

    #[test]
    fn error_terminates_the_source_but_keeps_captured_bytes() {
        struct FailingSource {
            sent: bool,
        }
        impl Read for FailingSource {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.sent {
                    return Err(io::Error::new(io::ErrorKind::ConnectionReset, "gone"));
                }
                self.sent = true;
                let n = buf.len().min(4);
                buf[..n].copy_from_slice(&b"data"[..n]);
                Ok(n)
            }
        }

        let buffer = MailBuffer::new(FailingSource { sent: false });
        let mut first = buffer.clone();
        let mut out = Vec::new();
        assert!(first.read_to_end(&mut out).is_err());
        assert_eq!(out, b"data");

        // Other clones still see the captured prefix, then EOF.
        let mut second = buffer.clone();
        let mut out2 = Vec::new();
        second.read_to_end(&mut out2).unwrap();
        assert_eq!(out2, b"data");
    }
}
