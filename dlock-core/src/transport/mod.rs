//! Datagram transports.
//!
//! - [`UdpTransport`]: one bound UDP socket per node.
//! - [`MemoryNetwork`]: in-process network with per-link FIFO delivery, used by
//!   tests and the benchmark.

mod memory;
mod udp;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use udp::{MAX_DATAGRAM, UdpTransport};
