//! OS-facing plumbing: named pipes and host identity.

pub mod fifo;
pub mod host;

pub use fifo::{Fifo, FifoWriter};
pub use host::HostIdentity;
