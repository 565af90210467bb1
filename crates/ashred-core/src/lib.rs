//! # ashred-core — Types and trait definitions for ashred
//!
//! This crate defines the seams of the overwrite pipeline. Each trait
//! models one collaborator of the overwrite pump:
//!
//! | Trait          | Default Impl (ashred-module) | Alternatives              |
//! |----------------|------------------------------|---------------------------|
//! | WriteBackend   | UringBackend                 | WorkerBackend, MemoryBackend |
//! | RandomSource   | DevRandom                    | any deterministic source  |
//!
//! The pump itself lives in `ashred-executor` and depends only on the
//! traits here, never on concrete backends. Swapping the I/O facility is
//! a type change at the call site.

pub mod error;
pub mod config;
pub mod env;
pub mod buffer;
pub mod backend;
pub mod source;
pub mod extent;
