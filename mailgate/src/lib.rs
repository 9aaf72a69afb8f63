//! An SMTP server that can be embedded into another program.
//!
//! The server accepts mail transfer sessions, drives the ESMTP
//! conversation, and hands every received message to a [`Handler`]. A
//! handler decides what a message is worth: deliver it, log it, route it,
//! or throw it away. The crate ships a [`Maildir`] handler, a discarding
//! [`NullHandler`], and a [`Muxer`] that fans a message out to one handler
//! per recipient.
//!
//! Handlers read the raw message through [`Mail::raw_reader`]; readers are
//! independent, so several handlers can consume the same message
//! concurrently while it is still arriving on the socket.
//!
//! # Examples
//! ```no_run
//! use mailgate::{Maildir, Muxer, Server};
//!
//! let mut muxer = Muxer::new();
//! let maildir = Maildir::new("./maildir").unwrap();
//! muxer.add_rcpt_handler("postmaster@example.org", maildir);
//!
//! let mut server = Server::new(muxer);
//! server.with_name("example.org");
//! server.with_addr("127.0.0.1:2525").unwrap();
//! server.serve_forever().unwrap();
//! ```

#![forbid(unsafe_code)]

mod buffer;
mod cmd;
mod err;
mod handler;
mod mail;
mod maildir;
mod muxer;
mod parser;
mod proto;
mod rdns;
mod response;
mod server;
mod session;
mod ssl;
mod utils;

pub use crate::buffer::MailBuffer;
pub use crate::err::{Error, Result};
pub use crate::handler::{Handler, NullHandler};
pub use crate::mail::Mail;
pub use crate::maildir::Maildir;
pub use crate::muxer::Muxer;
pub use crate::rdns::{ReverseDns, SystemDns};
pub use crate::server::Server;
pub use crate::ssl::SslConfig;
