use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

use tracing::trace;

use crate::error::HwError;

/// Resolver backed by the operating system (DNS, and mDNS `.local` names
/// when the host runs a resolver such as nss-mdns).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl shelf_traits::Resolver for SystemResolver {
    fn lookup(
        &mut self,
        name: &str,
    ) -> Result<Ipv4Addr, Box<dyn std::error::Error + Send + Sync>> {
        let addrs = (name, 0u16)
            .to_socket_addrs()
            .map_err(|e| HwError::Lookup(format!("{name}: {e}")))?;
        for addr in addrs {
            trace!(%name, %addr, "lookup candidate");
            if let SocketAddr::V4(v4) = addr {
                return Ok(*v4.ip());
            }
        }
        Err(Box::new(HwError::Lookup(format!("{name}: no IPv4 address"))))
    }
}

/// Fixed name table; unknown names fail like an unanswered mDNS query.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    table: HashMap<String, Ipv4Addr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, name: impl Into<String>, addr: Ipv4Addr) -> Self {
        self.table.insert(name.into(), addr);
        self
    }
}

impl shelf_traits::Resolver for StaticResolver {
    fn lookup(
        &mut self,
        name: &str,
    ) -> Result<Ipv4Addr, Box<dyn std::error::Error + Send + Sync>> {
        self.table
            .get(name)
            .copied()
            .ok_or_else(|| Box::new(HwError::Lookup(format!("{name}: no answer"))) as _)
    }
}
