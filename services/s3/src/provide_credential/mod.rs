mod callback;
pub use callback::CallbackCredentialProvider;

mod chain;
pub use chain::ProvideCredentialChain;

mod env;
pub use env::EnvCredentialProvider;

mod r#static;
pub use r#static::StaticCredentialProvider;
