#![doc = include_str!("../README.md")]
#![cfg_attr(feature = "doc_cfg", feature(doc_cfg))]
#![warn(missing_docs, clippy::panic_in_result_fn, clippy::indexing_slicing)]

//! A small, cross-platform local IPC library: a bidirectional byte-stream transport between
//! processes on one host, plus a server that multiplexes many concurrent clients over a single
//! cooperative event-loop tick.
//!
//! - [`connect`] opens the client side of the transport.
//! - [`Server::listen`] opens the server side and starts accepting connections.
//! - [`Server::process_events`] drives exactly one tick of the event loop, invoking whichever of
//!   the [`Callbacks`] are registered.
//!
//! There is no framing above the raw byte stream and no in-library threading; see the crate's
//! `README.md` for an end-to-end walkthrough.

mod error;
mod path;
mod socket;

pub mod callbacks;
pub mod server;

pub mod os {
    //! Platform-specific transport plumbing.
    //!
    //! Only one of these modules is visible at a time, depending on the target platform.
    #[cfg(unix)]
    #[cfg_attr(feature = "doc_cfg", doc(cfg(unix)))]
    pub(crate) mod unix;
    #[cfg(windows)]
    #[cfg_attr(feature = "doc_cfg", doc(cfg(windows)))]
    pub(crate) mod windows;
}

pub use crate::{
    callbacks::Callbacks,
    error::IpcError,
    server::{ClientId, Server, ServerOptions, Timeout},
    socket::{connect, ReadOptions, Socket},
};

pub use server::Client;

#[cfg(test)]
#[path = "../tests/index.rs"]
#[allow(clippy::unwrap_used)]
mod tests;
