use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::secrets::SecretsManager;

/// CinetPay merchant credentials. `secret_key` doubles as the HMAC key
/// for webhook signatures.
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub api_key: String,
    pub site_id: String,
    pub secret_key: String,
}

/// Hot-swappable credential holder. Readers grab a consistent snapshot;
/// rotation never blocks an in-flight payment call.
pub struct CredentialStore {
    inner: ArcSwap<GatewayCredentials>,
}

impl CredentialStore {
    pub fn new(initial: GatewayCredentials) -> Arc<Self> {
        Arc::new(CredentialStore {
            inner: ArcSwap::from_pointee(initial),
        })
    }

    pub fn current(&self) -> Arc<GatewayCredentials> {
        self.inner.load_full()
    }

    pub fn replace(&self, next: GatewayCredentials) {
        self.inner.store(Arc::new(next));
    }

    /// Spawns a background task that re-reads credentials from Vault on a
    /// fixed interval. Failures keep the previous snapshot in place.
    pub fn spawn_vault_refresher(store: Arc<Self>, refresh_interval: Duration) {
        tokio::spawn(async move {
            loop {
                sleep(refresh_interval).await;

                let manager = match SecretsManager::new().await {
                    Ok(manager) => manager,
                    Err(error) => {
                        tracing::warn!(%error, "vault login failed, keeping current gateway credentials");
                        continue;
                    }
                };

                match manager.get_gateway_credentials().await {
                    Ok(credentials) => {
                        store.replace(credentials);
                        tracing::info!("gateway credentials refreshed from vault");
                    }
                    Err(error) => {
                        tracing::warn!(%error, "vault read failed, keeping current gateway credentials");
                    }
                }
            }
        });
    }
}
