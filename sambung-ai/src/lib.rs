pub mod auth;
pub mod client;
pub mod error;
pub mod factory;
pub mod models;
pub mod providers;
pub mod stream;
pub mod translate;
pub mod types;
pub mod validate;

// Re-exports for convenience
pub use auth::sniff::ProviderDefaults;
pub use auth::store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, NoCredentials};
pub use client::{ChatClient, ChatClientBuilder, ModelValidation, complete};
pub use error::{AppError, ErrorDetails, ErrorKind};
pub use factory::{ProviderFactory, ResolvedClient};
pub use models::ModelRegistry;
pub use providers::base_url::sanitize_base_url;
pub use providers::{Provider, ProviderError};
pub use stream::{ChatStream, StreamState, stream};
pub use translate::ErrorTranslator;
pub use types::*;
pub use validate::ParameterValidator;
