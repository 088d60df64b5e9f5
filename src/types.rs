use std::fmt;

use chrono::{DateTime, Utc};

/// Temperature as carried on the wire: hundredths of a degree Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Temperature(i32);

impl Temperature {
    pub fn from_wire(hundredths: i32) -> Self {
        Self(hundredths)
    }

    /// Display degrees to wire value, e.g. 21 -> 2100.
    pub fn from_celsius(c: f64) -> Self {
        Self((c * 100.0).round() as i32)
    }

    pub fn wire(&self) -> i32 {
        self.0
    }

    pub fn celsius(&self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.celsius())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaterInfo {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub firmware: Option<String>,
    pub hardware: Option<String>,
    pub reporting_interval_secs: i32,
    pub current_temperature: Option<Temperature>,
    pub target_temperature: Temperature,
    pub calibration_temperature: Option<Temperature>,
    pub last_seen: Option<DateTime<Utc>>,
    pub heating_mode: Option<i64>,
    pub zone: Option<i64>,
    pub zone_name: Option<String>,
    pub schedule: Option<i64>,
    pub has_firmware_update: Option<bool>,
}

impl HeaterInfo {
    /// A heater record always carries its target temperature and reporting interval.
    pub fn new(target_temperature: Temperature, reporting_interval_secs: i32) -> Self {
        Self {
            id: None,
            name: None,
            ip: None,
            firmware: None,
            hardware: None,
            reporting_interval_secs,
            current_temperature: None,
            target_temperature,
            calibration_temperature: None,
            last_seen: None,
            heating_mode: None,
            zone: None,
            zone_name: None,
            schedule: None,
            has_firmware_update: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Zone {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub away: bool,
    pub away_mode: Option<i64>,
    pub away_till: Option<DateTime<Utc>>,
    pub current_heating_mode: Option<i64>,
    pub current_temperature: Option<Temperature>,
    pub scheduled_heating_mode: Option<i64>,
    pub heating_mode_name: Option<String>,
    pub heating_mode_till: Option<DateTime<Utc>>,
    pub temperature_calibration: Option<Temperature>,
    pub schedule_id: Option<i64>,
    pub schedule_name: Option<String>,
    pub schedule_target_temperature: Option<Temperature>,
    pub target_temperature: Option<Temperature>,
    pub to_hour: Option<i32>,
    pub to_minute: Option<i32>,
    pub to_week_day: Option<i32>,
}

/// Reply to a login or registration call: the signing identity for the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLoginData {
    pub id: i64,
    pub name: Option<String>,
    pub private_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientErrorHolder {
    pub error_type_id: i64,
}

impl ClientErrorHolder {
    pub fn new(error_type_id: i64) -> Self {
        Self { error_type_id }
    }

    pub fn is_error(&self) -> bool {
        self.error_type_id != 0
    }

    pub fn error_type(&self) -> Option<ClientErrorType> {
        ClientErrorType::from_code(self.error_type_id)
    }
}

impl From<ClientErrorType> for ClientErrorHolder {
    fn from(kind: ClientErrorType) -> Self {
        Self::new(kind.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientErrorType {
    InvalidSignature,
    SignupInvalidParams,
    SignupDuplicateUser,
    InvalidLoginParameters,
    BadLoginOrPassword,
    BadRemoteServiceReply,
    InvalidSignatureData,
    PasswordResetTimeExpired,
    ConnectionTimeout,
    HeatingModeInUse,
    HeatingModeIsFixed,
    UnregisteredHeatingMode,
    HeaterRegisteredToOtherUser,
    UnregisteredHeater,
    NotOwnedHeater,
    InvalidZone,
    ObjectMappingError,
    SqlError,
    UnexpectedState,
    OfflineHeaterNotFound,
    DeviceCommandCancelled,
    ScheduleInUse,
    UnregisteredSchedule,
    UnknownHeaterCommand,
    FirmwareUpdateFailed,
    DeviceBusy,
    InvalidParam,
    InvalidWifiPassword,
    HttpNotAcceptable,
    HttpInternalServerError,
    HttpForbidden,
    HttpBadRequest,
    HttpServiceNotAvailable,
}

impl ClientErrorType {
    const ALL: [ClientErrorType; 33] = [
        ClientErrorType::InvalidSignature,
        ClientErrorType::SignupInvalidParams,
        ClientErrorType::SignupDuplicateUser,
        ClientErrorType::InvalidLoginParameters,
        ClientErrorType::BadLoginOrPassword,
        ClientErrorType::BadRemoteServiceReply,
        ClientErrorType::InvalidSignatureData,
        ClientErrorType::PasswordResetTimeExpired,
        ClientErrorType::ConnectionTimeout,
        ClientErrorType::HeatingModeInUse,
        ClientErrorType::HeatingModeIsFixed,
        ClientErrorType::UnregisteredHeatingMode,
        ClientErrorType::HeaterRegisteredToOtherUser,
        ClientErrorType::UnregisteredHeater,
        ClientErrorType::NotOwnedHeater,
        ClientErrorType::InvalidZone,
        ClientErrorType::ObjectMappingError,
        ClientErrorType::SqlError,
        ClientErrorType::UnexpectedState,
        ClientErrorType::OfflineHeaterNotFound,
        ClientErrorType::DeviceCommandCancelled,
        ClientErrorType::ScheduleInUse,
        ClientErrorType::UnregisteredSchedule,
        ClientErrorType::UnknownHeaterCommand,
        ClientErrorType::FirmwareUpdateFailed,
        ClientErrorType::DeviceBusy,
        ClientErrorType::InvalidParam,
        ClientErrorType::InvalidWifiPassword,
        ClientErrorType::HttpNotAcceptable,
        ClientErrorType::HttpInternalServerError,
        ClientErrorType::HttpForbidden,
        ClientErrorType::HttpBadRequest,
        ClientErrorType::HttpServiceNotAvailable,
    ];

    pub fn code(&self) -> i64 {
        match self {
            ClientErrorType::InvalidSignature => 10001,
            ClientErrorType::SignupInvalidParams => 10002,
            ClientErrorType::SignupDuplicateUser => 10003,
            ClientErrorType::InvalidLoginParameters => 10004,
            ClientErrorType::BadLoginOrPassword => 10005,
            ClientErrorType::BadRemoteServiceReply => 10006,
            ClientErrorType::InvalidSignatureData => 10007,
            ClientErrorType::PasswordResetTimeExpired => 10008,
            ClientErrorType::ConnectionTimeout => 10009,
            ClientErrorType::HeatingModeInUse => 20001,
            ClientErrorType::HeatingModeIsFixed => 20002,
            ClientErrorType::UnregisteredHeatingMode => 20003,
            ClientErrorType::HeaterRegisteredToOtherUser => 30001,
            ClientErrorType::UnregisteredHeater => 30002,
            ClientErrorType::NotOwnedHeater => 30003,
            ClientErrorType::InvalidZone => 40001,
            ClientErrorType::ObjectMappingError => 50001,
            ClientErrorType::SqlError => 50002,
            ClientErrorType::UnexpectedState => 50003,
            ClientErrorType::OfflineHeaterNotFound => 50004,
            ClientErrorType::DeviceCommandCancelled => 50005,
            ClientErrorType::ScheduleInUse => 60001,
            ClientErrorType::UnregisteredSchedule => 60002,
            ClientErrorType::UnknownHeaterCommand => 70001,
            ClientErrorType::FirmwareUpdateFailed => 9001,
            ClientErrorType::DeviceBusy => 9002,
            ClientErrorType::InvalidParam => 9003,
            ClientErrorType::InvalidWifiPassword => 9004,
            ClientErrorType::HttpNotAcceptable => 406,
            ClientErrorType::HttpInternalServerError => 500,
            ClientErrorType::HttpForbidden => 403,
            ClientErrorType::HttpBadRequest => 400,
            ClientErrorType::HttpServiceNotAvailable => 503,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.code() == code)
    }
}

/// Health of the account bridge as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThingStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusDetail {
    #[default]
    None,
    ConfigurationError,
    CommunicationError,
}
