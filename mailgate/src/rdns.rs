use crate::err::{Error, Result};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::Resolver;
use log::debug;
use std::net::IpAddr;

/// Reverse DNS used to identify connecting clients.
///
/// The server resolves every peer that says HELO or EHLO. `Ok(None)` means
/// the lookup worked but no name is registered for the address, in which
/// case the session falls back to the name the client advertised. An `Err`
/// aborts the session.
pub trait ReverseDns: Send + Sync {
    fn reverse_dns(&self, ip: IpAddr) -> Result<Option<String>>;
}

/// Reverse lookups through the system resolver configuration.
pub struct SystemDns;

impl ReverseDns for SystemDns {
    fn reverse_dns(&self, ip: IpAddr) -> Result<Option<String>> {
        let resolver = Resolver::from_system_conf()
            .map_err(|err| Error::Lookup(format!("{}: {}", ip, err)))?;
        match resolver.reverse_lookup(ip) {
            Ok(names) => {
                let name = names.iter().next().map(|name| name.to_string());
                debug!("reverse lookup {} -> {:?}", ip, name);
                Ok(name)
            }
            Err(err) => match err.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(None),
                _ => Err(Error::Lookup(format!("{}: {}", ip, err))),
            },
        }
    }
}
