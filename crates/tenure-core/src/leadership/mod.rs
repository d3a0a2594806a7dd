mod lease;
mod notification;
mod store;

pub use lease::Lease;
pub use notification::{LeadershipAction, LeadershipEvent, Notification, LEADERSHIP_CHANNEL};
pub use store::LeaseStore;
