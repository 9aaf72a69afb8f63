use crate::buffer::MailBuffer;
use mail_parser::{Message, MessageParser};
use once_cell::sync::OnceCell;
use std::io::Read;
use std::sync::Arc;

/// A single mail transaction: the envelope collected from MAIL and RCPT
/// plus the message payload received in DATA.
///
/// The payload is only pulled from the connection when it is read, either
/// through [`Mail::raw_reader`] or through the parsed view returned by
/// [`Mail::message`]. Clones share the payload and the memoized raw bytes,
/// so concurrent consumers never re-read the connection.
#[derive(Clone)]
pub struct Mail {
    /// Reverse lookup of the client connection, or the name the client
    /// advertised when no reverse entry exists.
    pub client: String,
    /// Client connection name as advertised by the client itself
    pub hello_name: String,
    /// Mail sender as advertised by client. Empty for the null return path.
    pub from: String,
    /// The client announced an 8 bit clean payload with BODY=8BITMIME.
    pub is8bit: bool,
    /// Recipients in the order the client registered them, duplicates kept.
    pub rcpts: Vec<String>,
    body: MailBuffer,
    raw: Arc<OnceCell<Vec<u8>>>,
}

impl Mail {
    pub(crate) fn new() -> Self {
        Self {
            client: String::new(),
            hello_name: String::new(),
            from: String::new(),
            is8bit: false,
            rcpts: Vec::new(),
            body: MailBuffer::empty(),
            raw: Arc::new(OnceCell::new()),
        }
    }

    /// A fresh reader over the raw message, positioned at the start.
    /// Readers taken by concurrent consumers are independent.
    pub fn raw_reader(&self) -> MailBuffer {
        self.body.clone()
    }

    /// The complete raw message. The payload is drained from the
    /// connection on first use and memoized; concurrent callers block
    /// until the first one finishes.
    pub fn raw_bytes(&self) -> std::io::Result<&[u8]> {
        let raw = self.raw.get_or_try_init(|| {
            let mut out = Vec::new();
            self.raw_reader().read_to_end(&mut out)?;
            Ok::<_, std::io::Error>(out)
        })?;
        Ok(raw.as_slice())
    }

    /// A parsed view of the message, or `None` when the payload cannot be
    /// read or does not parse as a message.
    pub fn message(&self) -> Option<Message<'_>> {
        let raw = self.raw_bytes().ok()?;
        MessageParser::default().parse(raw)
    }

    pub(crate) fn attach_body(&mut self, body: MailBuffer) {
        self.body = body;
        self.raw = Arc::new(OnceCell::new());
    }

    // Clears the envelope after a completed transaction or a RSET; the
    // connection identity survives until the next HELO/EHLO.
    pub(crate) fn reset(&mut self) {
        self.from.clear();
        self.is8bit = false;
        self.rcpts.clear();
        self.body = MailBuffer::empty();
        self.raw = Arc::new(OnceCell::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn mail_with_body(raw: &[u8]) -> Mail {
        let mut mail = Mail::new();
        mail.attach_body(MailBuffer::new(Cursor::new(raw.to_vec())));
        mail
    }

    #[test]
    fn parses_headers_lazily() {
        let mail = mail_with_body(b"Subject: greetings\r\nFrom: a@example.org\r\n\r\nhi\r\n");
        let message = mail.message().unwrap();
        assert_eq!(message.subject(), Some("greetings"));
    }

    #[test]
    fn parse_does_not_consume_the_reader() {
        let mail = mail_with_body(b"Subject: t\r\n\r\nbody\r\n");
        let _ = mail.message().unwrap();
        let mut out = Vec::new();
        mail.raw_reader().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"Subject: t\r\n\r\nbody\r\n");
    }

    #[test]
    fn clones_share_the_memoized_payload() {
        let mail = mail_with_body(b"Subject: shared\r\n\r\n.\r\n");
        let clone = mail.clone();
        assert_eq!(mail.raw_bytes().unwrap(), clone.raw_bytes().unwrap());
    }

    #[test]
    fn reset_clears_the_envelope() {
        let mut mail = mail_with_body(b"x");
        mail.from = "a@example.org".to_string();
        mail.is8bit = true;
        mail.rcpts.push("b@example.net".to_string());
        mail.reset();
        assert!(mail.from.is_empty());
        assert!(!mail.is8bit);
        assert!(mail.rcpts.is_empty());
        assert_eq!(mail.raw_bytes().unwrap(), b"");
    }
}
