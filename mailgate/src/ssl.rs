use crate::err::{Error, Result};
use crate::utils::slurp;
use rustls::{Certificate, PrivateKey, ServerConfig, ServerConnection, StreamOwned};
use std::net::TcpStream;
use std::sync::Arc;

/// `SslConfig` is used to configure the STARTTLS configuration of the server
pub enum SslConfig {
    /// Do not support STARTTLS
    None,
    /// Use a self-signed certificate for STARTTLS
    SelfSigned {
        /// Certificate path
        cert_path: String,
        /// Path to key file
        key_path: String,
    },
    /// Use a certificate from an authority
    Trusted {
        /// Certificate path
        cert_path: String,
        /// Key file path
        key_path: String,
        /// Path to CA bundle
        chain_path: String,
    },
}

pub(crate) type SslStream = StreamOwned<ServerConnection, TcpStream>;

// Rustls wrapper
#[derive(Clone)]
pub(crate) struct SslImpl {
    tls_config: Arc<ServerConfig>,
}

impl SslImpl {
    pub fn setup(ssl_config: SslConfig) -> Result<Option<Self>> {
        let config = match ssl_config {
            SslConfig::Trusted {
                cert_path,
                key_path,
                chain_path,
            } => {
                let mut certs = load_certs(&cert_path)?;
                let mut chain = load_certs(&chain_path)?;
                certs.append(&mut chain);
                let key = load_key(&key_path)?;
                Some(server_config(certs, key)?)
            }
            SslConfig::SelfSigned {
                cert_path,
                key_path,
            } => {
                let certs = load_certs(&cert_path)?;
                let key = load_key(&key_path)?;
                Some(server_config(certs, key)?)
            }
            SslConfig::None => None,
        };
        let ret = config.map(|c| SslImpl {
            tls_config: Arc::new(c),
        });
        Ok(ret)
    }

    pub fn accept(&self, stream: TcpStream) -> Result<SslStream> {
        let session =
            ServerConnection::new(self.tls_config.clone()).map_err(Error::TlsHandshake)?;
        Ok(StreamOwned::new(session, stream))
    }
}

fn server_config(certs: Vec<Certificate>, key: PrivateKey) -> Result<ServerConfig> {
    ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| Error::TlsSetup(format!("invalid certificate material: {}", err)))
}

fn load_certs(filename: &str) -> Result<Vec<Certificate>> {
    let data = slurp(filename)?;
    let certs = rustls_pemfile::certs(&mut &data[..])
        .map_err(|_| Error::TlsSetup(format!("unparseable certificates in {}", filename)))?;
    Ok(certs.into_iter().map(Certificate).collect())
}

fn load_key(filename: &str) -> Result<PrivateKey> {
    let data = slurp(filename)?;
    let rsa_keys = rustls_pemfile::rsa_private_keys(&mut &data[..])
        .map_err(|_| Error::TlsSetup(format!("unparseable RSA key in {}", filename)))?;
    let pkcs8_keys = rustls_pemfile::pkcs8_private_keys(&mut &data[..])
        .map_err(|_| Error::TlsSetup(format!("unparseable PKCS8 key in {}", filename)))?;

    // Prefer to load pkcs8 keys
    pkcs8_keys
        .first()
        .or_else(|| rsa_keys.first())
        .cloned()
        .map(PrivateKey)
        .ok_or_else(|| Error::TlsSetup(format!("no RSA or PKCS8 keys found in {}", filename)))
}
