pub mod admin;
pub mod scheduler;

pub use admin::{AdminError, Applied, CampaignAdmin};
pub use scheduler::{ExpirationScheduler, TickReport, Transition};
