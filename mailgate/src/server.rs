use crate::err::{Error, Result};
use crate::handler::Handler;
use crate::proto::TextStream;
use crate::rdns::{ReverseDns, SystemDns};
use crate::session::{Session, SessionResult};
use crate::ssl::{SslConfig, SslImpl};
use log::{debug, error, info};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use threadpool::ThreadPool;

// The smtp service port on all interfaces.
const DEFAULT_ADDR: &str = "0.0.0.0:25";

/// `Server` is used to configure and start the SMTP server
pub struct Server {
    handler: Arc<dyn Handler>,
    name: Option<String>,
    ssl_config: SslConfig,
    rdns: Arc<dyn ReverseDns>,
    num_threads: usize,
    tcp_listener: Option<TcpListener>,
    socket_address: Vec<SocketAddr>,
}

impl Server {
    /// Create a new server with the given Handler
    pub fn new<H>(handler: H) -> Self
    where
        H: Handler + 'static,
    {
        Self {
            handler: Arc::new(handler),
            name: None,
            ssl_config: SslConfig::None,
            rdns: Arc::new(SystemDns),
            num_threads: 4,
            tcp_listener: None,
            socket_address: Vec::with_capacity(4),
        }
    }

    /// Give the server a name. Without one the OS hostname is used.
    pub fn with_name<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Set the SSL configuration of the server
    pub fn with_ssl(&mut self, ssl_config: SslConfig) -> &mut Self {
        self.ssl_config = ssl_config;
        self
    }

    /// Replace the reverse DNS used to identify connecting clients.
    pub fn with_reverse_dns<R>(&mut self, rdns: R) -> &mut Self
    where
        R: ReverseDns + 'static,
    {
        self.rdns = Arc::new(rdns);
        self
    }

    /// Set the size of the threadpool which is equal to the maximum number
    /// of concurrent SMTP sessions.
    pub fn with_num_threads(&mut self, num_threads: usize) -> &mut Self {
        self.num_threads = num_threads;
        self
    }

    /// Set a tcp listener from an already open socket
    pub fn with_tcp_listener(&mut self, listener: TcpListener) -> &mut Self {
        self.tcp_listener = Some(listener);
        self
    }

    /// Add ip addresses and ports to listen on.
    /// Returns an error if the given socket addresses are not valid.
    pub fn with_addr<A: ToSocketAddrs>(&mut self, addr: A) -> Result<&mut Self> {
        for addr in addr.to_socket_addrs()? {
            self.socket_address.push(addr);
        }
        Ok(self)
    }

    /// Serve plaintext SMTP forever. STARTTLS is advertised and accepted
    /// when certificate material has been configured with
    /// [`Server::with_ssl`].
    pub fn serve_forever(self) -> Result<()> {
        self.serve(false)
    }

    /// Serve SMTP over implicit TLS forever: every accepted connection is
    /// wrapped in a TLS stream before the banner is sent. Requires
    /// certificate material.
    pub fn serve_forever_tls(self) -> Result<()> {
        self.serve(true)
    }

    fn serve(self, implicit_tls: bool) -> Result<()> {
        let ssl = SslImpl::setup(self.ssl_config)?;
        if implicit_tls && ssl.is_none() {
            return Err(Error::TlsSetup(
                "cannot serve TLS without certificate material".to_string(),
            ));
        }
        let listener = match self.tcp_listener {
            Some(listener) => listener,
            None => {
                let addrs: Vec<SocketAddr> = if self.socket_address.is_empty() {
                    DEFAULT_ADDR.to_socket_addrs()?.collect()
                } else {
                    self.socket_address
                };
                TcpListener::bind(&addrs[..])
                    .map_err(|err| Error::Bind(format_addrs(&addrs), err))?
            }
        };
        let name = match self.name {
            Some(name) => name,
            None => hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "localhost".to_string()),
        };
        let local_addr = listener.local_addr()?;
        info!("{} SMTP started on {}", name, local_addr);
        let state = Arc::new(ServerState {
            name,
            handler: self.handler,
            rdns: self.rdns,
            ssl,
            implicit_tls,
        });
        let pool = ThreadPool::with_name("smtp-session".to_string(), self.num_threads);
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let state = state.clone();
                    pool.execute(move || handle_connection(stream, peer, &state));
                }
                Err(err) => error!("error during accept: {}", err),
            }
        }
    }
}

struct ServerState {
    name: String,
    handler: Arc<dyn Handler>,
    rdns: Arc<dyn ReverseDns>,
    ssl: Option<SslImpl>,
    implicit_tls: bool,
}

//--- Helper functions ---------------------------------------------------------

fn handle_connection(stream: TcpStream, peer: SocketAddr, state: &ServerState) {
    debug!("new connection from {}", peer);
    if let Err(err) = serve_connection(stream, peer, state) {
        error!("({}) {}", peer, err);
    }
    debug!("connection from {} closed", peer);
}

fn serve_connection(stream: TcpStream, peer: SocketAddr, state: &ServerState) -> Result<()> {
    let ctrl = stream.try_clone()?;
    if state.implicit_tls {
        let tls_stream = tls_acceptor(state)?.accept(stream)?;
        let wire = TextStream::new(tls_stream);
        let mut session = new_session(wire, ctrl, peer, state, false);
        session.run(true)?;
        return Ok(());
    }
    let wire = TextStream::new(stream);
    let mut session = new_session(wire.clone(), ctrl.try_clone()?, peer, state, state.ssl.is_some());
    match session.run(true)? {
        SessionResult::Finished => Ok(()),
        SessionResult::UpgradeTls => {
            drop(session);
            let inner_stream = wire.into_inner()?;
            let tls_stream = tls_acceptor(state)?.accept(inner_stream)?;
            let wire = TextStream::new(tls_stream);
            let mut session = new_session(wire, ctrl, peer, state, false);
            // The client introduces itself again on the encrypted stream;
            // no second banner.
            session.run(false)?;
            Ok(())
        }
    }
}

fn new_session<S>(
    wire: TextStream<S>,
    ctrl: TcpStream,
    peer: SocketAddr,
    state: &ServerState,
    starttls: bool,
) -> Session<S>
where
    S: std::io::Read + std::io::Write + Send + 'static,
{
    Session::new(
        wire,
        ctrl,
        peer,
        state.name.clone(),
        state.handler.clone(),
        state.rdns.clone(),
        starttls,
    )
}

fn tls_acceptor(state: &ServerState) -> Result<&SslImpl> {
    state
        .ssl
        .as_ref()
        .ok_or_else(|| Error::TlsSetup("TLS not configured".to_string()))
}

fn format_addrs(addrs: &[SocketAddr]) -> String {
    let formatted: Vec<String> = addrs.iter().map(|a| a.to_string()).collect();
    formatted.join(", ")
}
