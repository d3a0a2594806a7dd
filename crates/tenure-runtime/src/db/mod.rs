mod pool;
mod schema;

pub use pool::{connect, health_check};
pub use schema::ensure_schema;
