//! HTTP adaptation layer for the bridge
//!
//! Provides the POST-only endpoint logic mounted by both the owned-listener and the
//! embedded transports.

pub mod handlers;
