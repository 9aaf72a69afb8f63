use std::io;
use std::io::Write;

//------ Responses -------------------------------------------------------------

pub(crate) const OK: Response = Response::constant(250, "OK", false, Action::Reply);
pub(crate) const GOODBYE: Response =
    Response::constant(221, "Closing transmission channel", false, Action::Close);
pub(crate) const VERIFY_RESPONSE: Response =
    Response::constant(252, "Administrative prohibition", false, Action::Reply);
pub(crate) const START_DATA: Response = Response::constant(
    354,
    "Start mail input; end with <CRLF>.<CRLF>",
    false,
    Action::Reply,
);
pub(crate) const START_TLS: Response =
    Response::constant(220, "Ready to start TLS", false, Action::UpgradeTls);
pub(crate) const TLS_NOT_AVAILABLE: Response = Response::constant(
    454,
    "TLS not available due to temporary reason",
    true,
    Action::Reply,
);
pub(crate) const LOOKUP_ABORTED: Response = Response::constant(
    451,
    "Requested action aborted: error in processing",
    true,
    Action::Close,
);
pub(crate) const SYNTAX_ERROR: Response =
    Response::constant(500, "Syntax error, command unrecognized", true, Action::Reply);
pub(crate) const MISSING_PARAMETER: Response = Response::constant(
    501,
    "Syntax error in parameters or arguments",
    true,
    Action::Reply,
);
pub(crate) const BAD_SEQUENCE_COMMANDS: Response =
    Response::constant(503, "Bad sequence of commands", true, Action::Reply);
pub(crate) const MISSING_FROM: Response = Response::constant(
    503,
    "MAIL sequence must come before DATA",
    true,
    Action::Reply,
);
pub(crate) const MISSING_RCPT: Response = Response::constant(
    503,
    "RCPT sequence must come before DATA",
    true,
    Action::Reply,
);
pub(crate) const NOT_TAKEN: Response =
    Response::constant(550, "Requested action not taken", true, Action::Reply);
pub(crate) const BAD_MAILBOX: Response = Response::constant(
    553,
    "Requested action not taken: mailbox name not allowed",
    true,
    Action::Reply,
);

//------ Types -----------------------------------------------------------------

/// Response contains a code and message to be sent back to the client
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Response {
    /// The three digit response code
    pub code: u16,
    message: Message,
    /// Is the response an error response?
    pub is_error: bool,
    /// The action to take after sending the response to the client
    pub action: Action,
}

#[derive(Clone, Debug, PartialEq)]
enum Message {
    Dynamic(String, Vec<&'static str>),
    Fixed(&'static str),
}

/// Action indicates the recommended action to take on a response
#[derive(PartialEq, Clone, Debug)]
pub(crate) enum Action {
    /// Send the response and close the connection
    Close,
    /// Upgrade the connection to use TLS
    UpgradeTls,
    /// Send a reply and keep the connection open
    Reply,
}

impl Response {
    // A response that can be used in const definitions
    pub(crate) const fn constant(
        code: u16,
        message: &'static str,
        is_error: bool,
        action: Action,
    ) -> Self {
        Self {
            code,
            message: Message::Fixed(message),
            is_error,
            action,
        }
    }

    // A response that is built dynamically and can be a multiline response
    pub(crate) fn dynamic(code: u16, head: String, tail: Vec<&'static str>) -> Self {
        Self {
            code,
            message: Message::Dynamic(head, tail),
            is_error: code < 200 || code >= 400,
            action: Action::Reply,
        }
    }

    /// Write the response to the given writer
    pub(crate) fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        match self.message {
            Message::Dynamic(ref head, ref tail) => {
                if tail.is_empty() {
                    write!(out, "{} {}\r\n", self.code, head)?;
                } else {
                    write!(out, "{}-{}\r\n", self.code, head)?;
                    for i in 0..tail.len() {
                        if i < tail.len() - 1 {
                            write!(out, "{}-{}\r\n", self.code, tail[i])?;
                        } else {
                            write!(out, "{} {}\r\n", self.code, tail[i])?;
                        }
                    }
                }
            }
            Message::Fixed(s) => write!(out, "{} {}\r\n", self.code, s)?,
        };
        Ok(())
    }
}
