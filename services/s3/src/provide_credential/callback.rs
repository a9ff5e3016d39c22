use crate::Credential;
use async_trait::async_trait;
use s3sign_core::{Context, ProvideCredential, Result};
use std::fmt::{self, Debug};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type CredentialFuture = Pin<Box<dyn Future<Output = Result<Option<Credential>>> + Send>>;

/// CallbackCredentialProvider asks the host application for fresh credentials.
///
/// The callback runs every time the credential store refreshes, e.g. after the server
/// rejected a request with 400 or 403.
///
/// ```
/// use s3sign_s3::{CallbackCredentialProvider, Credential};
///
/// let provider = CallbackCredentialProvider::new(|| async {
///     Ok(Some(Credential::new("access_key_id", "secret_access_key")))
/// });
/// ```
#[derive(Clone)]
pub struct CallbackCredentialProvider {
    callback: Arc<dyn Fn() -> CredentialFuture + Send + Sync>,
}

impl CallbackCredentialProvider {
    /// Create a provider from an async closure.
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Credential>>> + Send + 'static,
    {
        Self {
            callback: Arc::new(move || -> CredentialFuture { Box::pin(callback()) }),
        }
    }
}

impl Debug for CallbackCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackCredentialProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl ProvideCredential for CallbackCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _: &Context) -> Result<Option<Self::Credential>> {
        (self.callback)().await
    }
}
