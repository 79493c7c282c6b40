pub mod access;
pub mod url;
pub mod user;

pub use access::{AccessEvent, ClickRecord};
pub use url::{CreateUrlRequest, NewUrl, ShortenResponse, ShortenedUrl, UpdateUrlRequest, UrlChanges};
pub use user::{ApiKey, CreateUserRequest, Stats, User};
