//! Transports for the Hypha actor runtime.
//!
//! A transport realizes [`TransportContext`](hypha_runtime::TransportContext):
//! it owns the wall clock, the host registry, and the actual movement of
//! packets between hosts. The runtime never cares which realization it is
//! bound to; that is what makes local and remote delivery interchangeable.
//!
//! The only realization shipped here is [`MemoryCluster`], an in-process
//! cluster used by the end-to-end tests and by embedders who want several
//! hosts inside one program.

pub mod memory;

pub use memory::MemoryCluster;
