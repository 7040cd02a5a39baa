//! The DNS/SRV resolution seam (spec §1 "Out of scope": "consumed as
//! `(host) -> [(addr,port,weight)]`").

use async_trait::async_trait;
use std::net::IpAddr;

/// One resolved target, SRV-style: an address, port, and relative weight
/// (higher is more preferred) the caller should try in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub addr: IpAddr,
    pub port: u16,
    pub weight: u16,
}

/// `(host) -> [(addr,port,weight)]` (spec §1). Implemented by the host;
/// this crate never does its own DNS/SRV resolution.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Vec<ResolvedTarget>;
}

/// A fixed-table resolver for tests and hosts with a static peer list --
/// never does a real lookup, just echoes back what it was configured
/// with.
#[derive(Default)]
pub struct StaticResolver {
    entries: std::collections::HashMap<String, Vec<ResolvedTarget>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, host: impl Into<String>, targets: Vec<ResolvedTarget>) {
        self.entries.insert(host.into(), targets);
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Vec<ResolvedTarget> {
        self.entries.get(host).cloned().unwrap_or_default()
    }
}
