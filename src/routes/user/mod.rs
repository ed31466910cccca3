mod handler;
mod model;

pub use handler::{login, protected, read_user, refresh_token, register};
pub use model::{
    LoginRequest, LoginResponse, ProtectedResponse, PublicUser, RefreshTokenRequest,
    RefreshTokenResponse, RegisterRequest, RegisterResponse,
};
