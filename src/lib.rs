//! # Stroke Relay
//!
//! A real-time collaborative drawing relay. Clients submit pen strokes tagged
//! with a frame index over a WebSocket; the server buffers strokes per frame,
//! rebroadcasts a frame to every connected client on request, and evicts the
//! oldest stroke of every frame on a fixed timer.
//!
//! ## Layout
//! - [`canvas`]: strokes, frame buffers, the canvas and the eviction scheduler
//! - [`server`]: client registry, event dispatch, WebSocket and HTTP plumbing
//! - [`config`]: environment-driven configuration and TLS setup

pub mod canvas;
pub mod config;
pub mod server;
pub mod utils;
