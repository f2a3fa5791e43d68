use std::fmt::{self, Display, Formatter};

use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    // malformed http request parameter
    HttpError = 1001,
    // configuration error
    DeviceConfigError = 1002,
    // no device or channel at the requested address
    DeviceNotFound = 1003,
    // device or serial link failure
    DeviceError = 1004,
}

/// Error handed back to http callers, rendered as a 500 carrying `msg`
#[derive(Debug)]
pub struct DeviceServerError {
    pub code: ErrorCode,
    pub msg: String,
}

impl DeviceServerError {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        DeviceServerError { code, msg: msg.into() }
    }
}

impl Display for DeviceServerError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "device server error code: {}, msg: {}", self.code as u16, self.msg)
    }
}

impl std::error::Error for DeviceServerError {}

impl ResponseError for DeviceServerError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::InternalServerError()
            .insert_header((header::CONTENT_TYPE, "text/plain; charset=utf-8"))
            .body(self.msg.clone())
    }
}

impl From<XapError> for DeviceServerError {
    fn from(e: XapError) -> Self {
        let code = match e {
            XapError::Config(_) => ErrorCode::DeviceConfigError,
            XapError::ChannelNotFound { .. } => ErrorCode::DeviceNotFound,
            _ => ErrorCode::DeviceError,
        };
        DeviceServerError::new(code, e.to_string())
    }
}

/// Failures of the XAP serial link and of the device/channel model built on it
#[derive(Error, Debug)]
pub enum XapError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("cannot open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("no response")]
    NoResponse,

    #[error("invalid response")]
    InvalidResponse,

    #[error("invalid response: bad {field} value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    /// Message reported by the device itself, passed through verbatim
    #[error("{0}")]
    Device(String),

    #[error("device closed")]
    Closed,

    #[error("no channel {number} in group {group}")]
    ChannelNotFound { group: String, number: usize },

    #[error("channel {group}{number} failed to initialize: {source}")]
    ChannelInit {
        group: String,
        number: u32,
        #[source]
        source: Box<XapError>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid process configuration, fatal to startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid device id {0}, must be within 0..=7")]
    InvalidDeviceId(i64),

    #[error("invalid heartbeat interval {0}ms, must be positive")]
    InvalidHeartbeat(i64),

    #[error("unknown device type '{0}'")]
    UnknownDeviceType(String),

    #[error("device type {0} does not report its channel count, set device.inputs and device.outputs")]
    UnknownChannelCount(String),

    #[error("registry slot {0} out of range")]
    SlotOutOfRange(usize),

    #[error("registry slot {0} already taken")]
    SlotTaken(usize),
}
