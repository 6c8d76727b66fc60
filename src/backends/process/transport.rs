// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Where child-process services listen, and how the pipeline reaches them.

use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use crate::backends::remote::Connector;
use crate::config::consts::{DEFAULT_PORT_RANGE, DEFAULT_SERVICE_PORT};
use crate::errors::DeploymentError;

/// Transport dependency of the child-process deployment mode.
pub trait TransportAdapter: Send + Sync {
    /// Host the launched services are reached on.
    fn host(&self) -> &str;

    /// Reserve a port for a new service instance.
    fn allocate_port(&self) -> Result<u16, DeploymentError>;

    /// Return a port reserved by [`allocate_port`](Self::allocate_port).
    fn release_port(&self, port: u16);

    /// Connector used to open channels to launched services.
    fn connector(&self) -> Arc<dyn Connector>;
}

/// Hands out loopback ports from a fixed range.
///
/// A port is handed out only if it is not reserved and can be bound.
pub struct PortRangeTransport {
    start: u16,
    range: u16,
    in_use: Mutex<HashSet<u16>>,
    connector: Arc<dyn Connector>,
}

impl PortRangeTransport {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_range(connector, DEFAULT_SERVICE_PORT, DEFAULT_PORT_RANGE)
    }

    pub fn with_range(connector: Arc<dyn Connector>, start: u16, range: u16) -> Self {
        Self {
            start,
            range,
            in_use: Mutex::new(HashSet::new()),
            connector,
        }
    }

    fn bindable(port: u16) -> bool {
        TcpListener::bind(("127.0.0.1", port)).is_ok()
    }
}

impl TransportAdapter for PortRangeTransport {
    fn host(&self) -> &str {
        "127.0.0.1"
    }

    fn allocate_port(&self) -> Result<u16, DeploymentError> {
        let mut in_use = self.in_use.lock().unwrap_or_else(|e| e.into_inner());
        let end = u32::from(self.start) + u32::from(self.range);
        let free = (u32::from(self.start)..end)
            .filter_map(|p| u16::try_from(p).ok())
            .find(|p| !in_use.contains(p) && Self::bindable(*p));
        match free {
            Some(port) => {
                in_use.insert(port);
                Ok(port)
            }
            None => Err(DeploymentError::NoFreePort {
                start: self.start,
                end,
            }),
        }
    }

    fn release_port(&self, port: u16) {
        self.in_use
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&port);
    }

    fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }
}
