//! Authentication helpers.
//!
//! # Data Flow
//! ```text
//! Login:
//!     password.rs (bcrypt check) → token.rs (TokenIssuer::create)
//!
//! Authenticated request:
//!     Authorization: Bearer <token>
//!     → middleware::auth::login_required
//!     → TokenIssuer::verify → user loader → ctx.set("user", ..)
//! ```
//!
//! # Design Decisions
//! - Token format is behind the `TokenIssuer` trait; `JwtIssuer` is the default
//! - Tokens carry only the subject id and the expiry

pub mod password;
pub mod token;

pub use password::{check_password_hash, hash_password, hash_password_with_cost, PasswordError};
pub use token::{JwtIssuer, TokenError, TokenIssuer};
