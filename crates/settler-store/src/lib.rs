//! Durable state for the settlement worker (spec §6 "Store capability").
//!
//! `settler-core` depends only on the `Store` trait; this crate is the
//! one concrete implementation, over Postgres via `sqlx`.

mod postgres;

pub use postgres::PostgresStore;
