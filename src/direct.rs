//! Same-LAN access to a single heater over its plain HTTP `/client` endpoint.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONNECTION};
use tracing::{debug, trace};

use crate::protocol::{WireRecord, decode_envelope};
use crate::signing::basic_auth_digest;
use crate::types::*;
use crate::Result;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const LONG_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectCommand {
    Status,
    Info,
    GetTime,
    SetTime,
    RefreshData,
    SetTargetTemperature,
    StartBlink,
    StopBlink,
    SetName,
    SetPassword,
    SetAway,
    SetAwayHeatingMode,
    SetCalibrationTemperature,
    GetHeatingModes,
    AddHeatingMode,
    RemoveHeatingMode,
    SetHeatingModeTemperature,
    SetHeatingModeName,
    SetHeatingModeColor,
    GetSchedules,
    GetScheduleIntervals,
    AddSchedule,
    RemoveSchedule,
    SetActiveSchedule,
    SetScheduleNames,
    SetScheduleIntervals,
    StartChunkedIntervals,
    SetChunkedIntervalsChunk,
    JoinWifi,
    SetCloudParams,
    FirmwareStart,
    FirmwareChunk,
    FirmwareEnd,
    GetWithLocale,
    SetWithLocale,
}

impl DirectCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectCommand::Status => "status",
            DirectCommand::Info => "info",
            DirectCommand::GetTime => "get_time",
            DirectCommand::SetTime => "set_time",
            DirectCommand::RefreshData => "refresh_data",
            DirectCommand::SetTargetTemperature => "set_target_temperature",
            DirectCommand::StartBlink => "start_leds_blink",
            DirectCommand::StopBlink => "stop_leds_blink",
            DirectCommand::SetName => "set_name",
            DirectCommand::SetPassword => "set_password",
            DirectCommand::SetAway => "set_away",
            DirectCommand::SetAwayHeatingMode => "set_away_mode",
            DirectCommand::SetCalibrationTemperature => "set_calibration_temp",
            DirectCommand::GetHeatingModes => "heating_modes",
            DirectCommand::AddHeatingMode => "add_mode",
            DirectCommand::RemoveHeatingMode => "remove_mode",
            DirectCommand::SetHeatingModeTemperature => "set_mode_temperature",
            DirectCommand::SetHeatingModeName => "set_mode_name",
            DirectCommand::SetHeatingModeColor => "set_mode_color",
            DirectCommand::GetSchedules => "schedules",
            DirectCommand::GetScheduleIntervals => "schedule_intervals",
            DirectCommand::AddSchedule => "add_schedule",
            DirectCommand::RemoveSchedule => "remove_schedule",
            DirectCommand::SetActiveSchedule => "change_schedule",
            DirectCommand::SetScheduleNames => "set_schedule_names",
            DirectCommand::SetScheduleIntervals => "set_schedule_intervals",
            DirectCommand::StartChunkedIntervals => "start_chunked_intervals",
            DirectCommand::SetChunkedIntervalsChunk => "set_chunked_intervals_chunk",
            DirectCommand::JoinWifi => "join_wifi",
            DirectCommand::SetCloudParams => "save_key_and_finish",
            DirectCommand::FirmwareStart => "start",
            DirectCommand::FirmwareChunk => "data",
            DirectCommand::FirmwareEnd => "reset",
            DirectCommand::GetWithLocale => "get_withlocale",
            DirectCommand::SetWithLocale => "set_withlocale",
        }
    }

    /// Commands the device may take a while to answer.
    pub fn is_long_running(&self) -> bool {
        matches!(self, DirectCommand::Status | DirectCommand::RefreshData)
    }

    /// Whole-request deadline for this command, covering connect, send and body read.
    pub fn request_timeout(&self) -> Duration {
        if self.is_long_running() {
            LONG_REQUEST_TIMEOUT
        } else {
            REQUEST_TIMEOUT
        }
    }
}

pub struct DirectClientBuilder {
    ip: String,
    password: String,
    base_url: Option<String>,
    basic_auth_signing: bool,
    sign_url_param: bool,
}

impl DirectClientBuilder {
    pub fn new(ip: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            password: password.into(),
            base_url: None,
            basic_auth_signing: true,
            sign_url_param: false,
        }
    }

    /// Override `http://<ip>/client`, e.g. to reach a device through a proxy.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Send `time` and the SHA-1 `Authorization` header with each command.
    pub fn basic_auth_signing(mut self, enabled: bool) -> Self {
        self.basic_auth_signing = enabled;
        self
    }

    /// Legacy firmware: also pass the device password as a `sign` query parameter.
    pub fn sign_url_param(mut self, enabled: bool) -> Self {
        self.sign_url_param = enabled;
        self
    }

    pub fn build(self) -> Result<DirectClient> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(DirectClient {
            http,
            base_url: self
                .base_url
                .unwrap_or_else(|| format!("http://{}/client", self.ip)),
            password: self.password,
            basic_auth_signing: self.basic_auth_signing,
            sign_url_param: self.sign_url_param,
        })
    }
}

pub struct DirectClient {
    http: reqwest::Client,
    base_url: String,
    password: String,
    basic_auth_signing: bool,
    sign_url_param: bool,
}

impl DirectClient {
    pub fn builder(ip: impl Into<String>, password: impl Into<String>) -> DirectClientBuilder {
        DirectClientBuilder::new(ip, password)
    }

    /// Current heater state, reported in zone form.
    pub async fn status(&self) -> Result<Option<Zone>> {
        first(self.command(DirectCommand::Status, None).await?)
    }

    /// Raw device descriptor. Not authenticated.
    pub async fn info(&self) -> Result<String> {
        let url = format!("{}?command={}", self.base_url, DirectCommand::Info.as_str());
        debug!(command = "info", "device request");
        let resp = self
            .http
            .get(&url)
            .header(CONNECTION, "close")
            .timeout(DirectCommand::Info.request_timeout())
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }

    /// Device clock, seconds since the epoch.
    pub async fn time(&self) -> Result<Option<i64>> {
        first(self.command(DirectCommand::GetTime, None).await?)
    }

    /// Ask the device to push fresh data to the cloud.
    pub async fn refresh_data(&self) -> Result<Option<bool>> {
        first(self.command(DirectCommand::RefreshData, None).await?)
    }

    pub async fn start_blink(&self) -> Result<Option<bool>> {
        first(self.command(DirectCommand::StartBlink, None).await?)
    }

    pub async fn stop_blink(&self) -> Result<Option<bool>> {
        first(self.command(DirectCommand::StopBlink, None).await?)
    }

    pub async fn set_target_temperature(&self, target: Temperature) -> Result<Option<bool>> {
        let value = target.wire().to_string();
        first(
            self.command(DirectCommand::SetTargetTemperature, Some(&value))
                .await?,
        )
    }

    pub async fn set_calibration_temperature(&self, offset: Temperature) -> Result<Option<bool>> {
        let value = offset.wire().to_string();
        first(
            self.command(DirectCommand::SetCalibrationTemperature, Some(&value))
                .await?,
        )
    }

    pub async fn set_name(&self, name: &str) -> Result<Option<bool>> {
        first(self.command(DirectCommand::SetName, Some(name)).await?)
    }

    /// Send any device command and decode the reply as `T`.
    pub async fn command<T: WireRecord>(
        &self,
        command: DirectCommand,
        value: Option<&str>,
    ) -> Result<Vec<T>> {
        let cmd = command.as_str();
        let mut url = format!("{}?command={cmd}", self.base_url);
        if let Some(v) = value {
            url.push_str(&format!("&value={}", urlencoding::encode(v)));
        }

        let mut authorization = None;
        if self.basic_auth_signing {
            let time = chrono::Utc::now().timestamp().to_string();
            url.push_str(&format!("&time={time}"));
            let mut parts = vec![cmd];
            parts.extend(value);
            parts.push(&time);
            parts.push(&self.password);
            authorization = Some(format!("Basic {}", basic_auth_digest(&parts)?));
        }
        if self.sign_url_param {
            url.push_str(&format!("&sign={}", urlencoding::encode(&self.password)));
        }

        debug!(command = cmd, "device request");
        let mut req = self
            .http
            .get(&url)
            .header(CONNECTION, "close")
            .timeout(command.request_timeout());
        if let Some(auth) = authorization {
            req = req.header(AUTHORIZATION, auth);
        }

        let resp = req.send().await?;
        trace!(command = cmd, status = resp.status().as_u16(), "device response");
        let body = resp.error_for_status()?.bytes().await?;
        decode_envelope(&body, false)
    }
}

fn first<T>(items: Vec<T>) -> Result<Option<T>> {
    Ok(items.into_iter().next())
}
