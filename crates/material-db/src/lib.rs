pub mod items;
pub mod requests;
pub mod types;

pub use sqlx::postgres::PgPool;
pub use types::*;
