use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, trace};

use crate::types::*;
use crate::{Error, Result};

pub const CLOUD_BASE_URL: &str = "https://sheater.adax.lt/sheater-client-api";

pub const LOGIN_PATH: &str = "/rest/users/login/id";
pub const GOOGLE_REGISTER_PATH: &str = "/rest/users/google-android/id";

pub fn heaters_list_path(login_id: i64) -> String {
    format!("/rest/heaters/list/{login_id}")
}

pub fn heater_path(heater_id: i64, login_id: i64) -> String {
    format!("/rest/heaters/heater/{heater_id}/{login_id}")
}

pub fn zones_list_path(login_id: i64) -> String {
    format!("/rest/zones/list/{login_id}")
}

pub fn zone_path(zone_id: i64, login_id: i64) -> String {
    format!("/rest/zones/{zone_id}/{login_id}")
}

pub fn zone_target_temperature_path(zone_id: i64, login_id: i64, value: i32) -> String {
    format!("/rest/zones/{zone_id}/target_temperature/{login_id}/{value}")
}

/// `application/x-www-form-urlencoded` body from ordered key/value pairs.
pub fn encode_params(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// A value the Adax API sends or accepts as a JSON node.
pub trait WireRecord: Sized {
    /// `None` when the node lacks a field this record cannot exist without.
    fn from_node(node: &Value) -> Option<Self>;
    fn to_node(&self) -> Value;
}

fn node_i64(node: &Value) -> Option<i64> {
    let Value::Number(n) = node else {
        return None;
    };
    if let Some(v) = n.as_i64() {
        return Some(v);
    }
    // Integral floats such as `2100.0` are accepted; anything else out of range is absent.
    let f = n.as_f64()?;
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

fn field_i64(node: &Value, name: &str) -> Option<i64> {
    node.get(name).and_then(node_i64)
}

fn field_i32(node: &Value, name: &str) -> Option<i32> {
    field_i64(node, name).and_then(|v| i32::try_from(v).ok())
}

fn field_temp(node: &Value, name: &str) -> Option<Temperature> {
    field_i32(node, name).map(Temperature::from_wire)
}

fn field_str(node: &Value, name: &str) -> Option<String> {
    node.get(name).and_then(Value::as_str).map(str::to_string)
}

fn field_bool(node: &Value, name: &str) -> Option<bool> {
    node.get(name).and_then(Value::as_bool)
}

/// Timestamps travel as milliseconds since the epoch.
fn field_millis(node: &Value, name: &str) -> Option<DateTime<Utc>> {
    field_i64(node, name).and_then(DateTime::from_timestamp_millis)
}

fn put(map: &mut Map<String, Value>, name: &str, value: Option<impl Into<Value>>) {
    if let Some(v) = value {
        map.insert(name.to_string(), v.into());
    }
}

fn put_temp(map: &mut Map<String, Value>, name: &str, value: Option<Temperature>) {
    put(map, name, value.map(|t| t.wire()));
}

fn put_millis(map: &mut Map<String, Value>, name: &str, value: Option<DateTime<Utc>>) {
    put(map, name, value.map(|t| t.timestamp_millis()));
}

impl WireRecord for i64 {
    fn from_node(node: &Value) -> Option<Self> {
        node_i64(node)
    }

    fn to_node(&self) -> Value {
        json!(self)
    }
}

impl WireRecord for i32 {
    fn from_node(node: &Value) -> Option<Self> {
        node_i64(node).and_then(|v| i32::try_from(v).ok())
    }

    fn to_node(&self) -> Value {
        json!(self)
    }
}

impl WireRecord for bool {
    fn from_node(node: &Value) -> Option<Self> {
        node.as_bool()
    }

    fn to_node(&self) -> Value {
        json!(self)
    }
}

impl WireRecord for ClientErrorHolder {
    fn from_node(node: &Value) -> Option<Self> {
        field_i64(node, "errorTypeId").map(ClientErrorHolder::new)
    }

    fn to_node(&self) -> Value {
        json!({ "errorTypeId": self.error_type_id })
    }
}

impl WireRecord for UserLoginData {
    fn from_node(node: &Value) -> Option<Self> {
        Some(UserLoginData {
            id: field_i64(node, "id")?,
            name: field_str(node, "name"),
            private_key: field_str(node, "privateKey")?,
        })
    }

    fn to_node(&self) -> Value {
        let mut map = Map::new();
        put(&mut map, "id", Some(self.id));
        put(&mut map, "name", self.name.clone());
        put(&mut map, "privateKey", Some(self.private_key.clone()));
        Value::Object(map)
    }
}

impl WireRecord for HeaterInfo {
    fn from_node(node: &Value) -> Option<Self> {
        node.as_object()?;
        let mut heater = HeaterInfo::new(
            field_temp(node, "targetTemperature")?,
            field_i32(node, "reportingInterval")?,
        );
        heater.id = field_i64(node, "id");
        heater.name = field_str(node, "name");
        heater.ip = field_str(node, "ip");
        heater.firmware = field_str(node, "firmware");
        heater.hardware = field_str(node, "hardware");
        heater.current_temperature = field_temp(node, "currentTemperature");
        heater.calibration_temperature = field_temp(node, "calibrationTemperature");
        heater.last_seen = field_millis(node, "lastSeen");
        heater.heating_mode = field_i64(node, "heatingMode");
        heater.zone = field_i64(node, "zone");
        heater.zone_name = field_str(node, "zoneName");
        heater.schedule = field_i64(node, "schedule");
        heater.has_firmware_update = field_bool(node, "hasFirmwareUpdate");
        Some(heater)
    }

    fn to_node(&self) -> Value {
        let mut map = Map::new();
        put(&mut map, "id", self.id);
        put(&mut map, "name", self.name.clone());
        put(&mut map, "ip", self.ip.clone());
        put(&mut map, "firmware", self.firmware.clone());
        put(&mut map, "hardware", self.hardware.clone());
        put(&mut map, "reportingInterval", Some(self.reporting_interval_secs));
        put_temp(&mut map, "currentTemperature", self.current_temperature);
        put_temp(&mut map, "targetTemperature", Some(self.target_temperature));
        put_temp(&mut map, "calibrationTemperature", self.calibration_temperature);
        put_millis(&mut map, "lastSeen", self.last_seen);
        put(&mut map, "heatingMode", self.heating_mode);
        put(&mut map, "zone", self.zone);
        put(&mut map, "zoneName", self.zone_name.clone());
        put(&mut map, "schedule", self.schedule);
        put(&mut map, "hasFirmwareUpdate", self.has_firmware_update);
        Value::Object(map)
    }
}

impl WireRecord for Zone {
    fn from_node(node: &Value) -> Option<Self> {
        node.as_object()?;
        Some(Zone {
            id: field_i64(node, "id"),
            name: field_str(node, "name"),
            away: field_bool(node, "away").unwrap_or(false),
            away_mode: field_i64(node, "awayMode"),
            away_till: field_millis(node, "awayTill"),
            current_heating_mode: field_i64(node, "currentHeatingMode"),
            current_temperature: field_temp(node, "currentTemperature"),
            scheduled_heating_mode: field_i64(node, "scheduledHeatingMode"),
            heating_mode_name: field_str(node, "heatingModeName"),
            heating_mode_till: field_millis(node, "heatingModeTill"),
            temperature_calibration: field_temp(node, "temperatureCalibration"),
            schedule_id: field_i64(node, "scheduleId"),
            schedule_name: field_str(node, "scheduleName"),
            schedule_target_temperature: field_temp(node, "scheduleTargetTemperature"),
            target_temperature: field_temp(node, "targetTemperature"),
            to_hour: field_i32(node, "toHour"),
            to_minute: field_i32(node, "toMinute"),
            to_week_day: field_i32(node, "toWeekDay"),
        })
    }

    fn to_node(&self) -> Value {
        let mut map = Map::new();
        put(&mut map, "id", self.id);
        put(&mut map, "name", self.name.clone());
        put(&mut map, "away", Some(self.away));
        put(&mut map, "awayMode", self.away_mode);
        put_millis(&mut map, "awayTill", self.away_till);
        put(&mut map, "currentHeatingMode", self.current_heating_mode);
        put_temp(&mut map, "currentTemperature", self.current_temperature);
        put(&mut map, "scheduledHeatingMode", self.scheduled_heating_mode);
        put(&mut map, "heatingModeName", self.heating_mode_name.clone());
        put_millis(&mut map, "heatingModeTill", self.heating_mode_till);
        put_temp(&mut map, "temperatureCalibration", self.temperature_calibration);
        put(&mut map, "scheduleId", self.schedule_id);
        put(&mut map, "scheduleName", self.schedule_name.clone());
        put_temp(&mut map, "scheduleTargetTemperature", self.schedule_target_temperature);
        put_temp(&mut map, "targetTemperature", self.target_temperature);
        put(&mut map, "toHour", self.to_hour);
        put(&mut map, "toMinute", self.to_minute);
        put(&mut map, "toWeekDay", self.to_week_day);
        Value::Object(map)
    }
}

/// One record or an array of records; any unreadable element voids the whole list.
fn parse_list<T: WireRecord>(node: &Value) -> Option<Vec<T>> {
    match node {
        Value::Array(items) => items.iter().map(T::from_node).collect(),
        single => T::from_node(single).map(|item| vec![item]),
    }
}

/// Decode a response envelope into records of type `T`.
///
/// The body is either a bare object, a bare array, or an `[error, content]`
/// pair. A non-zero `errorTypeId` always wins over any content. With
/// `error_is_inline` a bare object is read as the error itself.
pub fn decode_envelope<T: WireRecord>(raw: &[u8], error_is_inline: bool) -> Result<Vec<T>> {
    let root: Value = match serde_json::from_slice(raw) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, len = raw.len(), "response is not JSON, treating as empty");
            return Ok(Vec::new());
        }
    };
    trace!(len = raw.len(), "decoding envelope");

    let (error_node, content_node) = match &root {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => (items.first(), items.get(1)),
        _ if error_is_inline => (Some(&root), None),
        _ => {
            match field_i64(&root, "errorTypeId") {
                Some(code) if code != 0 => return Err(Error::remote(code)),
                _ => {}
            }
            (None, Some(&root))
        }
    };

    let holder = error_node.and_then(ClientErrorHolder::from_node);
    let mut content = None;
    if let Some(node) = content_node.filter(|n| !n.is_null()) {
        content = parse_list::<T>(node);
        if content.is_none() && holder.is_none_or(|h| !h.is_error()) {
            return Err(Error::ObjectMapping);
        }
    }

    if let Some(h) = holder.filter(ClientErrorHolder::is_error) {
        return Err(Error::remote(h.error_type_id));
    }
    Ok(content.unwrap_or_default())
}

/// The `[error, content]` form the cloud replies with.
pub fn encode_envelope<T: WireRecord>(error: ClientErrorHolder, content: &[T]) -> Value {
    Value::Array(vec![
        error.to_node(),
        Value::Array(content.iter().map(WireRecord::to_node).collect()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode<T: WireRecord>(body: &str) -> Result<Vec<T>> {
        decode_envelope(body.as_bytes(), false)
    }

    #[test]
    fn encode_params_percent_encodes() {
        let body = encode_params(&[("signature", "30:2C:AB"), ("login", "a b&c")]);
        assert_eq!(body, "signature=30%3A2C%3AAB&login=a%20b%26c");
        assert_eq!(encode_params(&[]), "");
    }

    #[test]
    fn endpoint_paths() {
        assert_eq!(heaters_list_path(7), "/rest/heaters/list/7");
        assert_eq!(heater_path(3, 7), "/rest/heaters/heater/3/7");
        assert_eq!(zones_list_path(7), "/rest/zones/list/7");
        assert_eq!(zone_path(5, 7), "/rest/zones/5/7");
        assert_eq!(
            zone_target_temperature_path(5, 7, 2100),
            "/rest/zones/5/target_temperature/7/2100"
        );
    }

    #[test]
    fn error_pair_raises_even_with_content() {
        let err = decode::<Zone>(r#"[{"errorTypeId": 10001}, null]"#).unwrap_err();
        assert!(matches!(
            err,
            Error::Remote { code: 10001, kind: Some(ClientErrorType::InvalidSignature) }
        ));

        let err = decode::<Zone>(r#"[{"errorTypeId": 10001}, [{"id": 1}]]"#).unwrap_err();
        assert_eq!(err.error_code(), Some(10001));
    }

    #[test]
    fn unknown_code_keeps_raw_number() {
        let err = decode::<Zone>(r#"[{"errorTypeId": 77777}]"#).unwrap_err();
        assert!(matches!(err, Error::Remote { code: 77777, kind: None }));
    }

    #[test]
    fn bare_object_is_single_record() {
        let zones = decode::<Zone>("{}").unwrap();
        assert_eq!(zones, vec![Zone::default()]);

        let zones = decode::<Zone>(r#"{"id": 4, "name": "Hall"}"#).unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].id, Some(4));
        assert_eq!(zones[0].name.as_deref(), Some("Hall"));
    }

    #[test]
    fn bare_object_with_error_code_raises() {
        let err = decode::<Zone>(r#"{"errorTypeId": 40001}"#).unwrap_err();
        assert!(matches!(
            err,
            Error::Remote { code: 40001, kind: Some(ClientErrorType::InvalidZone) }
        ));
        assert_eq!(decode::<Zone>(r#"{"errorTypeId": 0}"#).unwrap().len(), 1);
    }

    #[test]
    fn inline_error_object() {
        let err = decode_envelope::<bool>(br#"{"errorTypeId": 9002}"#, true).unwrap_err();
        assert!(matches!(
            err,
            Error::Remote { code: 9002, kind: Some(ClientErrorType::DeviceBusy) }
        ));
        let ok = decode_envelope::<bool>(br#"{"errorTypeId": 0}"#, true).unwrap();
        assert!(ok.is_empty());
    }

    #[test]
    fn unparseable_body_is_empty() {
        assert!(decode::<Zone>("").unwrap().is_empty());
        assert!(decode::<Zone>("<html>").unwrap().is_empty());
        assert!(decode::<Zone>("null").unwrap().is_empty());
    }

    #[test]
    fn heater_missing_required_field_is_mapping_error() {
        let err = decode::<HeaterInfo>(r#"[{"errorTypeId": 0}, [{"id": 1, "targetTemperature": 2000}]]"#)
            .unwrap_err();
        assert!(matches!(err, Error::ObjectMapping));
        assert_eq!(err.error_code(), Some(50001));
    }

    #[test]
    fn one_bad_element_voids_the_list() {
        let body = r#"[{"errorTypeId": 0}, [
            {"reportingInterval": 60, "targetTemperature": 2000},
            {"reportingInterval": 60}
        ]]"#;
        assert!(matches!(decode::<HeaterInfo>(body), Err(Error::ObjectMapping)));
    }

    #[test]
    fn out_of_range_numbers_are_absent() {
        let body = r#"[{"errorTypeId": 0}, [{"reportingInterval": 5000000000, "targetTemperature": 2000}]]"#;
        assert!(matches!(decode::<HeaterInfo>(body), Err(Error::ObjectMapping)));

        assert!(matches!(decode::<i32>("3000000000"), Err(Error::ObjectMapping)));
        assert!(matches!(decode::<i64>("18446744073709551615"), Err(Error::ObjectMapping)));
        assert!(matches!(decode::<i64>("1e300"), Err(Error::ObjectMapping)));

        let zones = decode::<Zone>(r#"{"id": 4, "currentTemperature": 21.5}"#).unwrap();
        assert_eq!(zones[0].current_temperature, None);
        let zones = decode::<Zone>(r#"{"id": 4.0, "currentTemperature": 2150.0}"#).unwrap();
        assert_eq!(zones[0].id, Some(4));
        assert_eq!(zones[0].current_temperature, Some(Temperature::from_wire(2150)));
    }

    #[test]
    fn scalar_content() {
        assert_eq!(decode::<bool>(r#"[{"errorTypeId": 0}, true]"#).unwrap(), vec![true]);
        assert_eq!(decode::<i64>("1700000000").unwrap(), vec![1_700_000_000]);
        assert!(matches!(decode::<bool>(r#"[{"errorTypeId": 0}, 3]"#), Err(Error::ObjectMapping)));
    }

    #[test]
    fn error_pair_without_content_is_empty() {
        assert!(decode::<Zone>(r#"[{"errorTypeId": 0}]"#).unwrap().is_empty());
        assert!(decode::<Zone>(r#"[{"errorTypeId": 0}, null]"#).unwrap().is_empty());
    }

    #[test]
    fn heater_fields_read() {
        let body = r#"[{"errorTypeId": 0}, [{
            "id": 10, "name": "Bedroom", "ip": "10.0.0.8", "firmware": "1.0.1",
            "reportingInterval": 300, "currentTemperature": 1850, "targetTemperature": 2100,
            "lastSeen": 1700000000123, "zone": 1, "hasFirmwareUpdate": false,
            "registerTime": 1, "macId": 99
        }]]"#;
        let heaters = decode::<HeaterInfo>(body).unwrap();
        let h = &heaters[0];
        assert_eq!(h.id, Some(10));
        assert_eq!(h.reporting_interval_secs, 300);
        assert_eq!(h.current_temperature.map(|t| t.celsius()), Some(18.5));
        assert_eq!(h.target_temperature.wire(), 2100);
        assert_eq!(h.last_seen.unwrap().timestamp_millis(), 1_700_000_000_123);
        assert_eq!(h.zone, Some(1));
        assert_eq!(h.has_firmware_update, Some(false));
        assert_eq!(h.schedule, None);
    }

    #[test]
    fn login_data_requires_id_and_key() {
        let ok = decode::<UserLoginData>(r#"{"id": 5, "privateKey": "30:82"}"#).unwrap();
        assert_eq!(ok[0].id, 5);
        assert!(matches!(
            decode::<UserLoginData>(r#"{"id": 5, "name": "x"}"#),
            Err(Error::ObjectMapping)
        ));
    }

    #[test]
    fn envelope_round_trip() {
        let mut heater = HeaterInfo::new(Temperature::from_wire(2100), 60);
        heater.id = Some(10);
        heater.zone = Some(1);
        heater.last_seen = DateTime::from_timestamp_millis(1_700_000_000_500);
        heater.calibration_temperature = Some(Temperature::from_wire(-50));
        let heaters = vec![heater];
        let raw = encode_envelope(ClientErrorHolder::default(), &heaters).to_string();
        assert_eq!(decode::<HeaterInfo>(&raw).unwrap(), heaters);

        let zones = vec![
            Zone {
                id: Some(1),
                name: Some("Living".into()),
                away: true,
                away_till: DateTime::from_timestamp_millis(1_650_000_000_000),
                target_temperature: Some(Temperature::from_wire(2050)),
                to_week_day: Some(3),
                ..Default::default()
            },
            Zone::default(),
        ];
        let raw = encode_envelope(ClientErrorHolder::default(), &zones).to_string();
        assert_eq!(decode::<Zone>(&raw).unwrap(), zones);

        let login = vec![UserLoginData { id: 9, name: None, private_key: "AB:CD".into() }];
        let raw = encode_envelope(ClientErrorHolder::default(), &login).to_string();
        assert_eq!(decode::<UserLoginData>(&raw).unwrap(), login);

        let raw = encode_envelope(ClientErrorHolder::default(), &[true, false]).to_string();
        assert_eq!(decode::<bool>(&raw).unwrap(), vec![true, false]);

        let raw = encode_envelope(ClientErrorHolder::default(), &[42i64]).to_string();
        assert_eq!(decode::<i64>(&raw).unwrap(), vec![42]);

        let raw = encode_envelope(ClientErrorHolder::default(), &[-7i32]).to_string();
        assert_eq!(decode::<i32>(&raw).unwrap(), vec![-7]);
    }
}
