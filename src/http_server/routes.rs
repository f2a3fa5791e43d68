//! http routes
//! thin translation from path segments to registry/device/channel lookups

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::common::error::{DeviceServerError, ErrorCode};
use crate::device_controller::device_registry::{DeviceRegistry, MAX_DEVICES};
use crate::driver::xap::entity::Group;
use crate::driver::xap::xap_channel::Channel;
use crate::driver::xap::xap_device::Device;
use crate::info;

const LOG_TAG: &str = "http routes";

/// `value` of a mutation, from a urlencoded body or the query string
#[derive(Debug, Deserialize)]
pub struct ValueQuery {
    value: Option<String>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/{device}", web::get().to(state))
        .route("/{device}/info", web::get().to(info))
        .route("/{device}/{group}/{channel}/gain", web::route().to(gain_adjust))
        .route("/{device}/{group}/{channel}/mute", web::route().to(mute));
}

async fn index() -> HttpResponse {
    HttpResponse::Ok().finish()
}

async fn state(
    registry: web::Data<DeviceRegistry>,
    path: web::Path<String>,
) -> Result<HttpResponse, DeviceServerError> {
    let device = device(&registry, &path)?;
    Ok(HttpResponse::Ok().json(device.state().await))
}

async fn info(
    registry: web::Data<DeviceRegistry>,
    path: web::Path<String>,
) -> Result<HttpResponse, DeviceServerError> {
    let device = device(&registry, &path)?;
    Ok(HttpResponse::Ok().json(device.info()))
}

async fn gain_adjust(
    registry: web::Data<DeviceRegistry>,
    path: web::Path<(String, String, String)>,
    query: web::Query<ValueQuery>,
    form: Option<web::Form<ValueQuery>>,
) -> Result<HttpResponse, DeviceServerError> {
    let (device_seg, group_seg, channel_seg) = path.into_inner();
    let device = device(&registry, &device_seg)?;
    let raw = required_value(form.as_deref(), &query)?;
    let value: i32 = raw.parse().map_err(|e| {
        DeviceServerError::new(ErrorCode::HttpError, format!("invalid gain value '{}': {}", raw, e))
    })?;
    let ch = channel(device, &group_seg, &channel_seg)?;

    info!(LOG_TAG, "set gain of {}{} to {}", ch.group(), ch.number(), value);
    let gain = ch.set_gain(value as f32).await?;
    Ok(text(gain.to_string()))
}

async fn mute(
    registry: web::Data<DeviceRegistry>,
    path: web::Path<(String, String, String)>,
    query: web::Query<ValueQuery>,
    form: Option<web::Form<ValueQuery>>,
) -> Result<HttpResponse, DeviceServerError> {
    let (device_seg, group_seg, channel_seg) = path.into_inner();
    let device = device(&registry, &device_seg)?;
    let raw = required_value(form.as_deref(), &query)?;
    let value = parse_bool(raw).ok_or_else(|| {
        DeviceServerError::new(ErrorCode::HttpError, format!("invalid mute value '{}'", raw))
    })?;
    let ch = channel(device, &group_seg, &channel_seg)?;

    info!(LOG_TAG, "set mute of {}{} to {}", ch.group(), ch.number(), value);
    let muted = ch.mute(value).await?;
    Ok(text(muted.to_string()))
}

fn text(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(body)
}

fn device<'a>(registry: &'a DeviceRegistry, raw: &str) -> Result<&'a Device, DeviceServerError> {
    let slot: usize = raw.parse().map_err(|_| {
        DeviceServerError::new(ErrorCode::HttpError, format!("invalid device id '{}'", raw))
    })?;
    if slot >= MAX_DEVICES {
        return Err(DeviceServerError::new(ErrorCode::DeviceNotFound, "device id out of range"));
    }
    registry.get(slot).map(|d| d.as_ref()).ok_or_else(|| {
        DeviceServerError::new(ErrorCode::DeviceNotFound, format!("no device at slot {}", slot))
    })
}

fn channel<'a>(device: &'a Device, group: &str, number: &str) -> Result<&'a Channel, DeviceServerError> {
    let group: Group = group
        .parse()
        .map_err(|e: String| DeviceServerError::new(ErrorCode::HttpError, e))?;
    let number: usize = number.parse().map_err(|_| {
        DeviceServerError::new(ErrorCode::HttpError, format!("invalid channel '{}'", number))
    })?;
    Ok(device.channel(group, number)?)
}

/// a body value wins over the query string
fn required_value<'a>(
    form: Option<&'a ValueQuery>,
    query: &'a ValueQuery,
) -> Result<&'a str, DeviceServerError> {
    form.and_then(|form| form.value.as_deref())
        .or(query.value.as_deref())
        .ok_or_else(|| DeviceServerError::new(ErrorCode::HttpError, "missing value"))
}

/// the boolean spellings the bundled control page and curl users send
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
