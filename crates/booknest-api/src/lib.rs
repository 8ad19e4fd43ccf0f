pub mod auth;
pub mod error;
pub mod handlers;
pub mod media;
pub mod routes;
pub mod server;
pub mod services;
pub mod state;

pub use auth::{AdminUser, AuthUser, Claims, MaybeUser, TokenKeys};
pub use error::{ApiError, ApiResult, JsonBody};
pub use media::{CloudinaryHost, ImageHost, ImageUpload, MediaError, PosterPage};
pub use routes::create_router;
pub use server::{seed_defaults, Server};
pub use state::AppState;
