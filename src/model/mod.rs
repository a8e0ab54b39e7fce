pub mod countdown;
pub mod patch;
pub mod placements;
pub mod runtime;

pub use countdown::Countdown;
pub use patch::{AdminPatch, PlacementPatch};
pub use placements::{
    AdPlacement, ConflictingEvents, DeactivationReason, ExpirationEvent, ExpirationEvents,
    NotificationMethod, PlacementType,
};
pub use runtime::{DurationError, RuntimeInput, RuntimeToken};
