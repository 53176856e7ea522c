//! Coordination-service contract.
//!
//! The election engine is a *client* of an external, already-consistent
//! coordination service (etcd or anything shaped like it). This module pins
//! down the minimum surface the engine needs from such a service:
//!
//! ```text
//! CoordinationClient ──create_session(ttl, lease?)──▶ Session ─┬─ lease_id / ttl
//!        │                                                     ├─ done()  (fires on lease loss)
//!        │                                                     └─ close()
//!        ├──new_election(session, name)────────────▶ Election ─┬─ leader()
//!        └──resume_election(session, name, record)──▶          ├─ campaign(value)
//!                                                              ├─ observe()
//!                                                              └─ resign()
//! ```

pub mod client;
pub mod error;
pub mod types;

pub use client::{CoordinationClient, Election, LeaderStream, Session};
pub use error::{CoordinationError, CoordinationResult};
pub use types::{LeaderRecord, LeaseId};
