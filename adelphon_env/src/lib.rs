//! Adelphon Transport Abstraction Layer
//!
//! Agents exchange short ASCII frames. This crate hides *how* those frames
//! travel so that the same relayer and runner loops run over:
//! - **Production**: newline-framed TCP (`tcp_impl`)
//! - **Simulation**: in-process channels (`memory`)
//!
//! # Core Concept: one readiness loop per process
//!
//! A relayer talks to many peers at once but handles one frame at a time.
//! The [`Multiplexer`] turns any number of [`Link`]s into a single stream of
//! [`NetEvent`]s, tagged with the [`ConnId`] they arrived on.
//!
//! # Example
//!
//! ```ignore
//! use adelphon_env::{Multiplexer, NetEvent};
//!
//! async fn relayer_loop(mut mux: Multiplexer) {
//!     while let Some(event) = mux.next_event().await {
//!         match event {
//!             NetEvent::Frame(conn, frame) => handle(conn, frame),
//!             NetEvent::Closed(conn) => mux.deregister(conn),
//!             NetEvent::Incoming(link) => { mux.register(link); }
//!         }
//!     }
//! }
//! ```

mod error;
mod link;
pub mod memory;
mod mux;
pub mod tcp_impl;
mod types;

pub use error::EnvError;
pub use link::{Acceptor, FrameReader, FrameWriter, Link};
pub use mux::Multiplexer;
pub use types::{ConnId, NetEvent};
