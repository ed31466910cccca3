pub mod item;
pub mod quota;
pub mod user;
pub mod upload;
