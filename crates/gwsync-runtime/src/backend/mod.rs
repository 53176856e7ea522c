//! Coordination-service backends.
//!
//! | Backend | Feature | Use |
//! |---------|---------|-----|
//! | [`MemoryCoordinator`] | always | tests, single-node development |
//! | [`EtcdCoordinator`] | `etcd` | production, etcd v3 lease + election API |

pub mod memory;

#[cfg(feature = "etcd")]
pub mod etcd;

pub use memory::MemoryCoordinator;

#[cfg(feature = "etcd")]
pub use etcd::EtcdCoordinator;
