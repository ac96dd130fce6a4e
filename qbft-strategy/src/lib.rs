//! Quorum Strategy: decides how many and which peers participate in the
//! next consensus round, informed by topology, observed reliability, and
//! fault-tolerance targets. Reads the Peer Registry's view of the network;
//! never talks to peers directly.

pub mod membership;
pub mod scoring;
pub mod sizing;
pub mod topology;

pub use membership::{select_membership, AdjustmentTriggers, QuorumMembership, WeightedPeer};
pub use sizing::{byzantine_min, partition_min, minimum_membership_size, QuorumInfeasible, SizingConfig};
pub use topology::{NetworkTopology, PeerObservation};
