//! `gwsync-kernel`: contracts shared by the gwsync leader-election engine.
//!
//! No coordination logic lives here. This crate only defines:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`coordination`] | [`CoordinationClient`], [`Session`], [`Election`] traits and their value types |
//! | [`election`] | [`CandidateIdentity`] and [`ElectionConfig`] |
//! | [`config`] | multi-format configuration loader (feature `config`) |
//!
//! Concrete backends and the election state machine live in `gwsync-runtime`.

pub mod coordination;
pub mod election;

#[cfg(feature = "config")]
pub mod config;

pub use coordination::{
    CoordinationClient, CoordinationError, CoordinationResult, Election, LeaderRecord,
    LeaderStream, LeaseId, Session,
};
pub use election::{CandidateIdentity, ElectionConfig, ElectionConfigError};
