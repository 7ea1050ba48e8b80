//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use outbound_breaker::prelude::*;
//! ```

pub use crate::{
    DispatchError, Dispatcher, DistributedBreaker, HalfOpenMode, InMemoryStore, LocalBreaker,
    Outcome, Request, Response, State, Transport, TransportError, TripPolicy,
};
