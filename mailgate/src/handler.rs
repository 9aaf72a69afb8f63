use crate::err::Result;
use crate::mail::Mail;

/// Processes a mail once its DATA payload has been received.
///
/// The returned code decides the reply the client sees: an error becomes a
/// `550`, `0` and `250` become `250 OK`, and any other code is echoed back
/// as a processing failure. Handlers run while the session waits, possibly
/// on several threads at once for the same message, so implementations take
/// `&self` and read the payload through their own [`Mail::raw_reader`].
pub trait Handler: Send + Sync {
    fn handle_mail(&self, mail: &Mail) -> Result<u16>;
}

/// Accepts and discards every message.
pub struct NullHandler;

impl Handler for NullHandler {
    fn handle_mail(&self, _mail: &Mail) -> Result<u16> {
        Ok(250)
    }
}
