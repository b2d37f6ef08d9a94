//! Outgoing request decoration

use std::sync::Arc;

use storefront_auth::{CredentialStore, TokenSlot};
use tracing::{debug, warn};

use crate::descriptor::RequestDescriptor;
use crate::public_paths::PublicPathSet;

/// Attaches the stored bearer token to non-public requests on the backend.
///
/// Decoration never fails the request: whatever goes wrong with the stored
/// credential, the request is still sent, just without one.
#[derive(Clone)]
pub struct RequestGate {
    public_paths: Arc<PublicPathSet>,
    credentials: CredentialStore,
}

impl RequestGate {
    pub fn new(public_paths: Arc<PublicPathSet>, credentials: CredentialStore) -> Self {
        Self {
            public_paths,
            credentials,
        }
    }

    pub async fn decorate(&self, mut request: RequestDescriptor) -> RequestDescriptor {
        if self
            .public_paths
            .is_public_get(request.method(), request.url())
        {
            // Public reads go out anonymous even if the caller set a header.
            request.strip_authorization();
            return request;
        }

        if !self.public_paths.is_backend_url(request.url()) {
            debug!(url = %request.url(), "request leaves the backend origin, sending without credentials");
            request.strip_authorization();
            return request;
        }

        match self.credentials.access().await {
            TokenSlot::WellFormed(token) => {
                if let Err(e) = request.set_bearer(&token) {
                    warn!(error = %e, "stored access token not usable as header, sending without it");
                }
            }
            TokenSlot::Malformed => {
                warn!(url = %request.url(), "stored access token is malformed, purging credentials");
                if let Err(e) = self.credentials.purge_all().await {
                    warn!(error = %e, "failed to purge malformed credentials");
                }
            }
            TokenSlot::Absent => {
                debug!(url = %request.url(), "no stored access token");
            }
        }
        request
    }
}
