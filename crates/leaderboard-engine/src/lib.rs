pub mod assembler;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod gate;
pub mod registry;
pub mod service;

pub use broadcast::{BroadcastEngine, DeliveryReport, NotificationPublisher, Target};
pub use config::LeaderboardConfig;
pub use error::{BroadcastError, RegistryError};
pub use gate::SubmissionGate;
pub use registry::{ConnectionRegistry, Outbound};
pub use service::{LeaderboardService, Stats};
