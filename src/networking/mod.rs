//! Pluggable peer-to-peer (P2P) networking.
//!
//! A chain node exchanges messages with the other members of its committees through a
//! [`Network`](network::Network) provided by the library user. Messages are grouped by
//! [`PeeringID`](crate::types::data_types::PeeringID), and within a peering group by
//! [`ReceiverTag`](messages::ReceiverTag), so that several components of several chains can share
//! a single provider.

pub mod messages;

pub mod network;

pub(crate) mod sending;
