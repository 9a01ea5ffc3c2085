pub mod oauth;

pub use oauth::{OAuthConfig, ProviderConnection, TokenResponse};
