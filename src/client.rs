use std::time::Duration;

use reqwest::header::{ACCEPT_LANGUAGE, CONNECTION, CONTENT_TYPE};
use tracing::{debug, trace};

use crate::protocol::{
    CLOUD_BASE_URL, GOOGLE_REGISTER_PATH, LOGIN_PATH, WireRecord, decode_envelope, encode_params,
    heater_path, heaters_list_path, zone_path, zone_target_temperature_path, zones_list_path,
};
use crate::signing::{RequestSigner, SignPart};
use crate::types::*;
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct CloudClientBuilder {
    base_url: String,
    credentials: Option<(i64, String)>,
    trust_anchor_pem: Option<Vec<u8>>,
    connect_timeout: Duration,
    timeout: Duration,
}

impl Default for CloudClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: CLOUD_BASE_URL.to_string(),
            credentials: None,
            trust_anchor_pem: None,
            connect_timeout: CONNECT_TIMEOUT,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Account id and hex PKCS#8 DSA key used to sign account requests.
    pub fn credentials(mut self, login_id: i64, private_key_hex: impl Into<String>) -> Self {
        self.credentials = Some((login_id, private_key_hex.into()));
        self
    }

    /// Trust only this PEM bundle for TLS instead of the built-in roots.
    pub fn trust_anchor_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.trust_anchor_pem = Some(pem.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<CloudClient> {
        let mut http = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .pool_max_idle_per_host(0);
        if let Some(pem) = &self.trust_anchor_pem {
            let anchor = reqwest::Certificate::from_pem(pem)?;
            http = http.tls_built_in_root_certs(false).add_root_certificate(anchor);
        }

        let identity = match self.credentials {
            Some((login_id, key)) => Some(Identity {
                login_id,
                signer: RequestSigner::from_hex(&key)?,
            }),
            None => None,
        };

        Ok(CloudClient {
            http: http.build()?,
            base_url: self.base_url,
            identity,
        })
    }
}

#[derive(Debug)]
struct Identity {
    login_id: i64,
    signer: RequestSigner,
}

/// Client for the signed Adax cloud API.
///
/// Every call is a form-encoded POST answered with an error/content envelope.
/// Account calls are signed with the account's DSA key; `login` and
/// `register_with_google` are not.
#[derive(Debug)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    identity: Option<Identity>,
}

impl CloudClient {
    pub fn builder() -> CloudClientBuilder {
        CloudClientBuilder::new()
    }

    pub fn login_id(&self) -> Option<i64> {
        self.identity.as_ref().map(|i| i.login_id)
    }

    pub async fn all_heaters(&self) -> Result<Vec<HeaterInfo>> {
        let login_id = self.identity()?.login_id;
        self.post_signed(&heaters_list_path(login_id), &[SignPart::Long(login_id)])
            .await
    }

    pub async fn heater(&self, heater_id: i64) -> Result<Option<HeaterInfo>> {
        let login_id = self.identity()?.login_id;
        let res = self
            .post_signed(
                &heater_path(heater_id, login_id),
                &[SignPart::Long(login_id), SignPart::Long(heater_id)],
            )
            .await?;
        Ok(res.into_iter().next())
    }

    pub async fn all_zones(&self) -> Result<Vec<Zone>> {
        let login_id = self.identity()?.login_id;
        self.post_signed(&zones_list_path(login_id), &[SignPart::Long(login_id)])
            .await
    }

    pub async fn zone(&self, zone_id: i64) -> Result<Option<Zone>> {
        let login_id = self.identity()?.login_id;
        let res = self
            .post_signed(
                &zone_path(zone_id, login_id),
                &[SignPart::Long(login_id), SignPart::Long(zone_id)],
            )
            .await?;
        Ok(res.into_iter().next())
    }

    /// Set a zone's target temperature; returns the zone as updated by the server.
    pub async fn set_zone_target_temperature(
        &self,
        zone_id: i64,
        target: Temperature,
    ) -> Result<Option<Zone>> {
        let login_id = self.identity()?.login_id;
        let value = target.wire();
        debug!(zone_id, value, "setting zone target temperature");
        let res = self
            .post_signed(
                &zone_target_temperature_path(zone_id, login_id, value),
                &[SignPart::Long(zone_id), SignPart::Long(login_id), SignPart::Int(value)],
            )
            .await?;
        Ok(res.into_iter().next())
    }

    /// Exchange e-mail and password for the account's signing identity.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<UserLoginData>> {
        let res = self
            .post(LOGIN_PATH, &[("login", email), ("password", password)])
            .await?;
        Ok(res.into_iter().next())
    }

    pub async fn register_with_google(
        &self,
        id_token: &str,
        time_zone_offset_minutes: i32,
        locale_name: &str,
    ) -> Result<Option<UserLoginData>> {
        let offset = time_zone_offset_minutes.to_string();
        let res = self
            .post(
                GOOGLE_REGISTER_PATH,
                &[
                    ("idToken", id_token),
                    ("localeName", locale_name),
                    ("timeOffset", offset.as_str()),
                ],
            )
            .await?;
        Ok(res.into_iter().next())
    }

    fn identity(&self) -> Result<&Identity> {
        self.identity
            .as_ref()
            .ok_or_else(|| Error::Config("no login id and private key configured".to_string()))
    }

    async fn post_signed<T: WireRecord>(&self, path: &str, parts: &[SignPart<'_>]) -> Result<Vec<T>> {
        let signature = self.identity()?.signer.sign(parts)?;
        self.post(path, &[("signature", signature.as_str())]).await
    }

    async fn post<T: WireRecord>(&self, path: &str, params: &[(&str, &str)]) -> Result<Vec<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!(endpoint = %path, "cloud request");

        let resp = self
            .http
            .post(&url)
            .header(CONNECTION, "close")
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encode_params(params))
            .send()
            .await?;
        let status = resp.status();
        trace!(endpoint = %path, status = status.as_u16(), "cloud response");

        let body = resp.error_for_status()?.bytes().await?;
        decode_envelope(&body, false)
    }
}
