pub mod engine;
pub mod metrics;

pub use engine::client::{TaskOutcome, TcpClient, OPEN_CONNECTIONS};
pub use engine::swarm::{Swarm, ACTIVE_USERS};
