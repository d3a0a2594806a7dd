pub mod config;
pub mod error;
pub mod leadership;

pub use config::TenureConfig;
pub use error::{Result, TenureError};
pub use leadership::{
    Lease, LeaseStore, LeadershipAction, LeadershipEvent, Notification, LEADERSHIP_CHANNEL,
};
