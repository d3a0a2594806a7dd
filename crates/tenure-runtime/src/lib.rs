pub mod db;
pub mod elector;
pub mod notifier;
pub mod store;
pub mod testing;

pub use elector::{Elector, ElectorConfig, Subscription};
pub use notifier::{Notifier, NotifierConfig};
pub use store::PgLeaseStore;
