mod token;

pub use token::{AccessToken, AdminToken, RefreshToken, REFRESH_TOKEN_COOKIE};
