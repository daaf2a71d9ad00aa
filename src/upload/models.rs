//! Request bodies for the telemetry feed.

use serde::Serialize;
use serde_json::value::RawValue;

use crate::db::models::{LocationFix, Reading};

#[derive(Debug, Serialize)]
pub struct MeasurementBody<'a> {
    pub datastreams: Vec<Datastream<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Datastream<'a> {
    pub id: &'a str,
    pub datapoints: Vec<Datapoint<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Datapoint<'a> {
    pub value: String,
    pub at: &'a str,
}

impl<'a> MeasurementBody<'a> {
    /// One datastream (`channel`) holding every reading, oldest first.
    pub fn new(channel: &'a str, readings: &'a [Reading]) -> Self {
        let datapoints = readings
            .iter()
            .map(|r| Datapoint {
                value: java_double(r.value),
                at: &r.timestamp,
            })
            .collect();
        Self {
            datastreams: vec![Datastream { id: channel, datapoints }],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LocationBody {
    pub location: LocationPayload,
}

#[derive(Debug, Serialize)]
pub struct LocationPayload {
    /// Raw JSON numbers in [`json_number`] form.
    pub lon: Box<RawValue>,
    pub lat: Box<RawValue>,
    /// Elevation travels as a string.
    pub ele: String,
    pub disposition: &'static str,
}

impl TryFrom<&LocationFix> for LocationBody {
    type Error = serde_json::Error;

    /// Fails when a coordinate is not finite.
    fn try_from(fix: &LocationFix) -> Result<Self, Self::Error> {
        Ok(Self {
            location: LocationPayload {
                lon: RawValue::from_string(json_number(fix.longitude))?,
                lat: RawValue::from_string(json_number(fix.latitude))?,
                ele: java_double(fix.altitude),
                disposition: "mobile",
            },
        })
    }
}

/// Renders a double as a JSON number the way the feed's reference client
/// did: whole values as integers, `-0.0` as `-0`, anything else through
/// [`java_double`]. Non-finite values produce text that is not valid JSON.
pub fn json_number(value: f64) -> String {
    if value == 0.0 && value.is_sign_negative() {
        return "-0".to_owned();
    }
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return (value as i64).to_string();
    }
    java_double(value)
}

/// Renders a double the way the feed's reference client did:
/// plain decimals with at least one fractional digit for magnitudes in
/// `[1e-3, 1e7)`, otherwise `d.dddE±n`. Digits are the shortest that
/// round-trip.
pub fn java_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_owned();
    }

    if (1e-3..1e7).contains(&value.abs()) {
        let plain = value.to_string();
        return if plain.contains('.') { plain } else { format!("{plain}.0") };
    }

    let sci = format!("{value:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    if mantissa.contains('.') {
        format!("{mantissa}E{exponent}")
    } else {
        format!("{mantissa}.0E{exponent}")
    }
}
