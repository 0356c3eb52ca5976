//! Account registration, sign-in and identity lookup.

pub mod commands;
pub mod queries;
pub mod validators;

pub use commands::{Login, LoginResponse, RegisterAdmin, RegisterUser, RegisteredUser, Registration};
pub use queries::{CurrentUserResponse, GetCurrentUser};

pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const EMAIL_TAKEN: &str = "User with this email already exists";
