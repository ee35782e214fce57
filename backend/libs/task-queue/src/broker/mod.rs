//! Broker implementations of [`crate::TaskBroker`].

pub mod memory;
pub mod redis;
