//! Credential entities and their capabilities.

mod application;
mod scope;
mod secret;
mod token;

pub use application::Application;
pub use scope::{ScopeHolder, Scopes};
pub use secret::{Secret, SecretHolder};
pub use token::Token;
