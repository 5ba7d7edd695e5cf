use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result};
use vaultrs::auth::approle;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

use crate::gateway::GatewayCredentials;

pub struct SecretsManager {
    client: VaultClient,
    kv_mount: String,
}

impl SecretsManager {
    /// Vault is opt-in; without a role id the service runs on env-provided
    /// credentials alone.
    pub fn vault_enabled() -> bool {
        env::var("VAULT_ROLE_ID").is_ok()
    }

    pub async fn new() -> Result<Self> {
        let vault_addr =
            env::var("VAULT_ADDR").unwrap_or_else(|_| "http://127.0.0.1:8200".to_string());
        let role_id = env::var("VAULT_ROLE_ID").context("VAULT_ROLE_ID is required")?;
        let secret_id = env::var("VAULT_SECRET_ID").context("VAULT_SECRET_ID is required")?;
        let auth_mount = env::var("VAULT_AUTH_MOUNT").unwrap_or_else(|_| "approle".to_string());
        let kv_mount = env::var("VAULT_KV_MOUNT").unwrap_or_else(|_| "secret".to_string());

        let mut client = VaultClient::new(
            VaultClientSettingsBuilder::default()
                .address(&vault_addr)
                .build()
                .context("failed to build Vault client settings")?,
        )
        .context("failed to create Vault client")?;

        let auth = approle::login(&mut client, &auth_mount, &role_id, &secret_id)
            .await
            .context("failed to authenticate to Vault with AppRole")?;
        client.set_token(&auth.client_token);

        Ok(Self { client, kv_mount })
    }

    /// Reads the CinetPay merchant credentials from `secret/cinetpay`.
    pub async fn get_gateway_credentials(&self) -> Result<GatewayCredentials> {
        let secret: HashMap<String, String> = kv2::read(&self.client, &self.kv_mount, "cinetpay")
            .await
            .context("failed to read secret/cinetpay from Vault")?;

        let api_key = secret
            .get("api_key")
            .cloned()
            .context("api_key not found in Vault secret/cinetpay")?;
        let site_id = secret
            .get("site_id")
            .cloned()
            .context("site_id not found in Vault secret/cinetpay")?;
        let secret_key = secret
            .get("secret_key")
            .cloned()
            .context("secret_key not found in Vault secret/cinetpay")?;

        Ok(GatewayCredentials {
            api_key,
            site_id,
            secret_key,
        })
    }
}
