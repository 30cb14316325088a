//! Client identities, the protected API key, and session token models.

pub mod id;
pub mod record;
pub mod secret;
pub mod token;

pub use id::*;
pub use record::*;
pub use secret::*;
pub use token::*;
