pub mod postgres;

pub use postgres::PgMembershipStore;
