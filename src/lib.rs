mod auth;
mod case_insensitive_string_ext;
mod config;
mod error;
mod routes;
mod store;
mod types;

pub use auth::*;
pub use config::*;
pub use error::*;
pub use routes::*;
pub use store::*;
pub use types::*;
