//! Local port selection
//!
//! Picks random ports for tunnels whose local port was not given. The
//! in-use probe binds a throwaway listener; the port can still be taken
//! between the probe and the session manager's own bind.

use std::io;
use std::net::{Ipv4Addr, TcpListener};

use rand::Rng;

use et_core::config::PortRangeConfig;
use et_core::TunnelError;

/// Draws local ports from a configured range
#[derive(Debug, Clone)]
pub struct PortAllocator {
    min: u16,
    max: u16,
    max_attempts: u32,
}

impl PortAllocator {
    /// Create an allocator from configuration
    pub fn from_config(config: &PortRangeConfig) -> Self {
        Self::new(config.min, config.max, config.max_attempts)
    }

    /// Create an allocator drawing from `min..=max`
    pub fn new(min: u16, max: u16, max_attempts: u32) -> Self {
        Self {
            min: min.min(max),
            max: max.max(min),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Return `explicit` unchanged, or draw a random port.
    ///
    /// `Some(0)` counts as no explicit port. With `check_in_use` the drawn
    /// port is probed and redrawn while it is already bound.
    pub fn allocate(&self, explicit: Option<u16>, check_in_use: bool) -> Result<u16, TunnelError> {
        if let Some(port) = explicit.filter(|p| *p != 0) {
            return Ok(port);
        }

        if !check_in_use {
            return Ok(self.draw());
        }

        self.allocate_with(probe)
    }

    /// Draw ports until `probe` accepts one.
    ///
    /// An `AddrInUse` error redraws; any other error is returned as
    /// [`TunnelError::Allocation`].
    pub fn allocate_with<F>(&self, probe: F) -> Result<u16, TunnelError>
    where
        F: Fn(u16) -> io::Result<()>,
    {
        for _ in 0..self.max_attempts {
            let candidate = self.draw();
            match probe(candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    tracing::trace!("Port {} in use, drawing another", candidate);
                }
                Err(e) => return Err(TunnelError::Allocation(e)),
            }
        }

        Err(TunnelError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }

    fn draw(&self) -> u16 {
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::from_config(&PortRangeConfig::default())
    }
}

fn probe(port: u16) -> io::Result<()> {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).map(drop)
}
