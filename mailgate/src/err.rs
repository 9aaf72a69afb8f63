use std::io;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible mailgate errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The listen address could not be opened.
    #[error("cannot bind {0}")]
    Bind(String, #[source] io::Error),
    /// TLS certificate or key material could not be loaded.
    #[error("{0}")]
    TlsSetup(String),
    /// The TLS session with a client could not be established.
    #[error("TLS handshake failure")]
    TlsHandshake(#[source] rustls::Error),
    /// Reverse DNS lookup of a connected peer failed.
    #[error("{0} - reverse lookup failure")]
    Lookup(String),
    /// A mail handler failed while processing a message.
    #[error("{0}")]
    Handler(String),
    /// I/O failure on a connection or the filesystem.
    #[error(transparent)]
    Io(#[from] io::Error),
}
