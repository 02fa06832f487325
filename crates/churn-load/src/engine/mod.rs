pub mod client;
pub mod stats;
pub mod swarm;
pub mod wait;
