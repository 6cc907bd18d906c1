//! Daemon side: control socket, frame pipeline and request handling.

mod dispatch;
mod pipeline;
mod runtime;
mod server;

pub use server::{client_request, run_daemon};
