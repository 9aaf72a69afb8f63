use crate::err::Result;
use crate::handler::{Handler, NullHandler};
use crate::mail::Mail;
use log::error;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

/// Dispatches a mail to one handler per recipient.
///
/// Handlers are registered per address; recipients without a registered
/// handler go to the default handler, a [`NullHandler`] unless replaced.
/// Dispatch runs the handlers in parallel and answers with the first
/// non-250 result, or 250 once every handler accepted. Registration is not
/// supported once the muxer is serving.
pub struct Muxer {
    rcpt_handlers: HashMap<String, Arc<dyn Handler>>,
    default_handler: Arc<dyn Handler>,
}

impl Muxer {
    pub fn new() -> Self {
        Self {
            rcpt_handlers: HashMap::new(),
            default_handler: Arc::new(NullHandler),
        }
    }

    /// Register a handler for a recipient address.
    pub fn add_rcpt_handler<H>(&mut self, rcpt: &str, handler: H)
    where
        H: Handler + 'static,
    {
        self.rcpt_handlers
            .insert(rcpt.to_ascii_lowercase(), Arc::new(handler));
    }

    /// Replace the handler used for unregistered recipients.
    pub fn set_default_handler<H>(&mut self, handler: H)
    where
        H: Handler + 'static,
    {
        self.default_handler = Arc::new(handler);
    }

    fn lookup(&self, rcpt: &str) -> Arc<dyn Handler> {
        self.rcpt_handlers
            .get(&rcpt.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| self.default_handler.clone())
    }
}

impl Default for Muxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for Muxer {
    fn handle_mail(&self, mail: &Mail) -> Result<u16> {
        let (tx, rx) = mpsc::sync_channel(mail.rcpts.len().max(1));
        let mut workers = 0;
        for rcpt in &mail.rcpts {
            let handler = self.lookup(rcpt);
            let mail = mail.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let code = match handler.handle_mail(&mail) {
                    Ok(code) => code,
                    Err(err) => {
                        error!("handler error: {}", err);
                        500
                    }
                };
                // The dispatcher may already have answered; a closed
                // channel just means the result is discarded.
                let _ = tx.send(code);
            });
            workers += 1;
        }
        drop(tx);
        for _ in 0..workers {
            match rx.recv() {
                Ok(code) if code != 0 && code != 250 => return Ok(code),
                Ok(_) => (),
                Err(_) => break,
            }
        }
        Ok(250)
    }
}
