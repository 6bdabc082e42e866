//! Conversational interface: command routing, per-user navigation state and
//! reply rendering.

pub mod action;
pub mod handler;
pub mod navigation;
pub mod replies;
pub mod sessions;
