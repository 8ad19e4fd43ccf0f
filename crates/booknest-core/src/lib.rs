pub mod config;
pub mod error;
pub mod listing;
pub mod models;
pub mod slug;
pub mod store;
pub mod time;

pub use error::*;
pub use listing::*;
pub use models::*;
pub use store::Store;
