mod postgres;

pub use postgres::PgLeaseStore;
