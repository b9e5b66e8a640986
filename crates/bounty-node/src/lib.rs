//! Bounty escrow payout daemon: configuration, logging, key management and
//! the [`BountyNode`] runtime that drives the state machine.

pub mod config;
pub mod keys;
pub mod logging;
pub mod node;

pub use config::NodeConfig;
pub use node::BountyNode;
