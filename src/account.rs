use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::client::{CloudClient, CloudClientBuilder};
use crate::poller::{AccountPoller, DeviceRegistry, PollerConfig};
use crate::signing::decode_key_hex;
use crate::types::*;
use crate::{Error, Result};

/// Account settings as stored by the host.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub login_id: Option<i64>,
    pub private_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub poll_interval_secs: u64,
    pub offline_poll_interval_secs: u64,
    pub initial_delay_secs: u64,
    /// PEM file holding the only CA trusted for the cloud endpoint.
    pub trust_anchor_pem: Option<PathBuf>,
    pub base_url: Option<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            login_id: None,
            private_key: None,
            username: None,
            password: None,
            poll_interval_secs: 60,
            offline_poll_interval_secs: 120,
            initial_delay_secs: 5,
            trust_anchor_pem: None,
            base_url: None,
        }
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("login_id", &self.login_id)
            .field("username", &self.username)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("offline_poll_interval_secs", &self.offline_poll_interval_secs)
            .field("initial_delay_secs", &self.initial_delay_secs)
            .field("trust_anchor_pem", &self.trust_anchor_pem)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AccountConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pick the credential to use. A signing key wins over a password.
    pub fn credential(&self) -> Result<Credential> {
        if let (Some(login_id), Some(key)) = (self.login_id, non_blank(&self.private_key)) {
            decode_key_hex(key).map_err(|e| Error::Config(e.to_string()))?;
            return Ok(Credential::Signed {
                login_id,
                private_key: key.to_string(),
            });
        }
        if let (Some(username), Some(password)) =
            (non_blank(&self.username), non_blank(&self.password))
        {
            return Ok(Credential::Password {
                username: username.to_string(),
                password: password.to_string(),
            });
        }
        Err(Error::Config(
            "either login id and private key or username and password are required".to_string(),
        ))
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            online_interval: Duration::from_secs(self.poll_interval_secs),
            offline_interval: Duration::from_secs(self.offline_poll_interval_secs),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// Cloud client builder with the endpoint and trust anchor applied.
    pub fn client_builder(&self) -> Result<CloudClientBuilder> {
        let mut builder = CloudClient::builder();
        if let Some(url) = &self.base_url {
            builder = builder.base_url(url.as_str());
        }
        if let Some(path) = &self.trust_anchor_pem {
            let pem = std::fs::read(path).map_err(|e| {
                Error::Config(format!("cannot read trust anchor {}: {e}", path.display()))
            })?;
            builder = builder.trust_anchor_pem(pem);
        }
        Ok(builder)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Signed { login_id: i64, private_key: String },
    Password { username: String, password: String },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Signed { login_id, .. } => f
                .debug_struct("Signed")
                .field("login_id", login_id)
                .finish_non_exhaustive(),
            Credential::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

struct Connected {
    client: Arc<CloudClient>,
    poller: AccountPoller<CloudClient>,
}

/// One Adax account attached to the host: owns the cloud client and its poller.
pub struct AccountBridge {
    config: AccountConfig,
    registry: Arc<dyn DeviceRegistry>,
    handle: Handle,
    connected: Mutex<Option<Connected>>,
}

impl AccountBridge {
    pub fn new(config: AccountConfig, registry: Arc<dyn DeviceRegistry>, handle: Handle) -> Self {
        Self {
            config,
            registry,
            handle,
            connected: Mutex::new(None),
        }
    }

    /// Validate credentials, build the client and start polling.
    ///
    /// Password credentials are exchanged for a signing key first, which is
    /// the only step that touches the network.
    pub async fn initialize(&self) -> Result<()> {
        debug!(config = ?self.config, "initializing account");
        let credential = match self.config.credential() {
            Ok(c) => c,
            Err(e) => return Err(self.fail(StatusDetail::ConfigurationError, e)),
        };

        let (login_id, private_key) = match credential {
            Credential::Signed {
                login_id,
                private_key,
            } => (login_id, private_key),
            Credential::Password { username, password } => {
                match self.login(&username, &password).await {
                    Ok(data) => (data.id, data.private_key),
                    Err(e) => {
                        let detail = if e.is_transport() {
                            StatusDetail::CommunicationError
                        } else {
                            StatusDetail::ConfigurationError
                        };
                        return Err(self.fail(detail, e));
                    }
                }
            }
        };

        let client = self
            .config
            .client_builder()
            .and_then(|b| b.credentials(login_id, private_key).build());
        let client = match client {
            Ok(c) => Arc::new(c),
            Err(e) => return Err(self.fail(StatusDetail::ConfigurationError, e)),
        };

        self.registry
            .set_status(ThingStatus::Unknown, StatusDetail::None, None);

        let poller = AccountPoller::new(
            Arc::clone(&client),
            Arc::clone(&self.registry),
            self.config.poller_config(),
            self.handle.clone(),
        );
        poller.schedule(self.config.initial_delay(), true);
        info!(login_id, "account initialized");

        // Replacing a previous connection drops its poller, which cancels it.
        *self.lock() = Some(Connected { client, poller });
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> Result<UserLoginData> {
        let client = self.config.client_builder()?.build()?;
        client
            .login(username, password)
            .await?
            .ok_or(Error::ObjectMapping)
    }

    fn fail(&self, detail: StatusDetail, e: Error) -> Error {
        warn!(error = %e, "account initialization failed");
        self.registry
            .set_status(ThingStatus::Offline, detail, Some(e.to_string()));
        e
    }

    pub fn client(&self) -> Option<Arc<CloudClient>> {
        self.lock().as_ref().map(|c| Arc::clone(&c.client))
    }

    pub fn status(&self) -> ThingStatus {
        self.registry.status()
    }

    /// Poll immediately. Does nothing before `initialize` succeeds.
    pub async fn refresh(&self) {
        let tick = self.lock().as_ref().map(|c| c.poller.poll_now());
        if let Some(tick) = tick {
            tick.await;
        }
    }

    /// Fetch one zone and push it to its observer, if registered.
    pub async fn refresh_zone(&self, zone_id: i64) -> Result<Option<Zone>> {
        let zone = self.connected_client()?.zone(zone_id).await?;
        if let Some(zone) = &zone {
            if let Some(observer) = self.registry.zone_observers().get(&zone_id) {
                observer.update_data(zone)?;
            }
        }
        Ok(zone)
    }

    /// Set a zone's target in display degrees, e.g. `21.0`.
    pub async fn set_zone_target_temperature(
        &self,
        zone_id: i64,
        celsius: f64,
    ) -> Result<Option<Zone>> {
        let client = self.connected_client()?;
        let zone = client
            .set_zone_target_temperature(zone_id, Temperature::from_celsius(celsius))
            .await?;
        if self.registry.status() != ThingStatus::Online {
            self.registry
                .set_status(ThingStatus::Online, StatusDetail::None, None);
        }
        Ok(zone)
    }

    /// Stop polling and release the client.
    pub fn dispose(&self) {
        if let Some(connected) = self.lock().take() {
            connected.poller.cancel();
            debug!("account disposed");
        }
    }

    fn connected_client(&self) -> Result<Arc<CloudClient>> {
        self.client()
            .ok_or_else(|| Error::Config("account is not initialized".to_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Connected>> {
        self.connected.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AccountBridge {
    fn drop(&mut self) {
        self.dispose();
    }
}
