//! # Synchronization Hub
//!
//! Fan-out of projected playback state to every connected observer and
//! fan-in of actions from any observer, over HTTP and WebSocket.
//!
//! ## Architecture Overview
//!
//! 1. **Ingress**: REST endpoints and inbound WebSocket messages parse into
//!    the closed action vocabulary (or a performer-settings patch, or a
//!    library mutation) and submit envelopes to the session actor.
//!
//! 2. **Egress**: each observer socket pushes one full snapshot on connect,
//!    then forwards every accepted transition from the session's broadcast
//!    channel. Late joiners reach consistency from the snapshot alone, with
//!    no history replay.
//!
//! 3. **Signals**: audience display-mode hints are relayed verbatim through
//!    the same broadcast channel without touching the state machine.
//!
//! A disconnecting observer is silently dropped and never affects state or
//! delivery to other observers; a reconnect is treated exactly like a first
//! connection.

pub mod server;
