//! # ashred-module — Default implementations
//!
//! Concrete collaborators for the overwrite pump. Each impl prioritizes
//! correctness and simplicity; the pump only sees the `ashred-core` traits.
//!
//! ## Default stack
//!
//! | Trait / role   | Default Impl  | Alternatives                   |
//! |----------------|---------------|--------------------------------|
//! | WriteBackend   | UringBackend  | WorkerBackend, MemoryBackend   |
//! | RandomSource   | DevRandom     | —                              |
//! | Extent sizing  | query_extent  | —                              |
//!
//! `AnyBackend` picks between io_uring and the worker pool at runtime.

pub mod extent;
pub mod urandom;
pub mod uring_backend;
pub mod worker_backend;
pub mod eventfd;
pub mod any_backend;
pub mod memory_backend;
