use crate::buffer::MailBuffer;
use crate::cmd::Cmd;
use crate::err::{Error, Result};
use crate::handler::Handler;
use crate::mail::Mail;
use crate::parser::parse;
use crate::proto::TextStream;
use crate::rdns::ReverseDns;
use crate::response::{
    Action, Response, BAD_SEQUENCE_COMMANDS, GOODBYE, LOOKUP_ABORTED, MISSING_FROM, MISSING_RCPT,
    NOT_TAKEN, OK, START_DATA, START_TLS, TLS_NOT_AVAILABLE, VERIFY_RESPONSE,
};
use log::{debug, error, log_enabled, trace, Level};
use std::io;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

// The command timeout follows the five minute minimum that rfc5321
// 4.5.3.2 proposes for most server timeouts.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// Re-armed while a command is in flight. Handlers may legitimately run
// long; this only reaps sessions that look dead.
const PROCESSING_TIMEOUT: Duration = Duration::from_secs(8 * 60 * 60);

pub(crate) enum SessionResult {
    Finished,
    UpgradeTls,
}

/// Drives the ESMTP conversation on one connection: reads command lines,
/// replies, and hands each completed transaction to the handler.
pub(crate) struct Session<S>
where
    S: Read + Write + Send + 'static,
{
    wire: TextStream<S>,
    // A second handle on the socket, used for read deadlines. Closing the
    // conversation from a deadline invalidates the read in progress.
    ctrl: TcpStream,
    peer: SocketAddr,
    name: String,
    handler: Arc<dyn Handler>,
    rdns: Arc<dyn ReverseDns>,
    // STARTTLS may be offered
    starttls: bool,
    // EHLO/HELO ran
    past_hello: bool,
    // MAIL ran; the null return path makes this distinct from `from`
    from_set: bool,
    mail: Mail,
}

impl<S> Session<S>
where
    S: Read + Write + Send + 'static,
{
    pub fn new(
        wire: TextStream<S>,
        ctrl: TcpStream,
        peer: SocketAddr,
        name: String,
        handler: Arc<dyn Handler>,
        rdns: Arc<dyn ReverseDns>,
        starttls: bool,
    ) -> Self {
        Self {
            wire,
            ctrl,
            peer,
            name,
            handler,
            rdns,
            starttls,
            past_hello: false,
            from_set: false,
            mail: Mail::new(),
        }
    }

    fn greeting(&self) -> Response {
        Response::dynamic(220, format!("{} ESMTP", self.name), Vec::new())
    }

    /// The command loop. Returns when the client quits, the connection
    /// dies, a deadline fires, or the session is to continue over TLS.
    pub fn run(&mut self, banner: bool) -> Result<SessionResult> {
        if banner {
            self.write(&self.greeting())?;
        }
        loop {
            self.ctrl.set_read_timeout(Some(COMMAND_TIMEOUT))?;
            let line = match self.wire.read_line() {
                Ok(line) => line,
                Err(err) if is_timeout(&err) => {
                    debug!("({}) session timed out", self.peer);
                    return Ok(SessionResult::Finished);
                }
                Err(err) => return Err(err.into()),
            };
            // We are in the middle of something, keep the reaper away.
            self.ctrl.set_read_timeout(Some(PROCESSING_TIMEOUT))?;
            trace!("({}) > {}", self.peer, String::from_utf8_lossy(&line));
            if line.is_empty() {
                continue;
            }
            let res = match parse(&line) {
                Ok(cmd) => self.dispatch(cmd)?,
                Err(res) => res,
            };
            self.write(&res)?;
            match res.action {
                Action::Reply => (),
                Action::Close => return Ok(SessionResult::Finished),
                Action::UpgradeTls => return Ok(SessionResult::UpgradeTls),
            }
        }
    }

    fn dispatch(&mut self, cmd: Cmd) -> Result<Response> {
        match cmd {
            Cmd::Rset => {
                self.reset_envelope();
                Ok(OK)
            }
            Cmd::Noop => Ok(OK),
            Cmd::Vrfy => Ok(VERIFY_RESPONSE),
            Cmd::Quit => Ok(GOODBYE),
            Cmd::Helo { domain } => self.hello(domain, false),
            Cmd::Ehlo { domain } => self.hello(domain, true),
            _ if !self.past_hello => Ok(BAD_SEQUENCE_COMMANDS),
            Cmd::Mail {
                reverse_path,
                is8bit,
            } => {
                // Last MAIL wins; an empty path is the null return path.
                self.mail.from = reverse_path.to_string();
                self.mail.is8bit = is8bit;
                self.from_set = true;
                Ok(OK)
            }
            Cmd::Rcpt { forward_path } => {
                self.mail.rcpts.push(forward_path.to_string());
                Ok(OK)
            }
            Cmd::Data => self.data(),
            Cmd::StartTls if self.starttls => Ok(START_TLS),
            Cmd::StartTls => Ok(TLS_NOT_AVAILABLE),
        }
    }

    fn hello(&mut self, domain: &str, esmtp: bool) -> Result<Response> {
        let ip = self.peer.ip();
        let client = match self.rdns.reverse_dns(ip) {
            Ok(Some(name)) => name,
            // No reverse entry: fall back to the advertised name.
            Ok(None) => domain.to_string(),
            Err(err) => {
                error!("({}) error during reverse lookup: {}", self.peer, err);
                return Ok(LOOKUP_ABORTED);
            }
        };
        self.reset_envelope();
        self.mail.client = client;
        self.mail.hello_name = domain.to_string();
        self.past_hello = true;
        let head = format!("{} Hello {} [{}]", self.name, self.mail.client, ip);
        let res = if esmtp {
            let mut extensions = vec!["8BITMIME", "SIZE"];
            if self.starttls {
                extensions.push("STARTTLS");
            }
            Response::dynamic(250, head, extensions)
        } else {
            Response::dynamic(250, head, Vec::new())
        };
        Ok(res)
    }

    fn data(&mut self) -> Result<Response> {
        if !self.from_set {
            return Ok(MISSING_FROM);
        }
        if self.mail.rcpts.is_empty() {
            return Ok(MISSING_RCPT);
        }
        self.write(&START_DATA)?;
        self.mail
            .attach_body(MailBuffer::new(self.wire.dot_reader()));
        let outcome = self.handler.handle_mail(&self.mail);
        // Pull whatever of the payload is still on the wire so the next
        // command line starts after the terminating dot, even when the
        // handler read nothing.
        let drained = io::copy(&mut self.mail.raw_reader(), &mut io::sink());
        self.reset_envelope();
        drained?;
        let res = match outcome {
            Err(err) => {
                error!("({}) error in handler: {}", self.peer, err);
                NOT_TAKEN
            }
            Ok(0) | Ok(250) => OK,
            Ok(code) => {
                Response::dynamic(code, "Error during processing".to_string(), Vec::new())
            }
        };
        Ok(res)
    }

    fn reset_envelope(&mut self) {
        self.mail.reset();
        self.from_set = false;
    }

    fn write(&self, res: &Response) -> Result<()> {
        if res.is_error {
            debug!("({}) rejected with {}", self.peer, res.code);
        }
        if log_enabled!(Level::Trace) {
            let mut buf = Vec::new();
            let _ = res.write_to(&mut buf);
            trace!(
                "({}) < {}",
                self.peer,
                String::from_utf8_lossy(&buf).trim_end()
            );
        }
        self.wire.write_response(res).map_err(Error::from)
    }
}

// A fired read deadline surfaces as WouldBlock or TimedOut depending on
// the platform.
fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
