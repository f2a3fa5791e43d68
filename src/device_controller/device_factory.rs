//! builds the devices described by the settings

use std::sync::Arc;

use crate::common::error::XapError;
use crate::common::setting::{Settings, TransportMode};
use crate::driver::xap::dummy_transport::DummyXap;
use crate::driver::xap::transport::{SerialTransport, Transport};
use crate::driver::xap::xap_device::{Device, DeviceOptions};
use crate::info;

use super::device_registry::DeviceRegistry;
use super::workers::heartbeating_worker;

const LOG_TAG: &str = "device_factory";

fn make_transport(settings: &Settings) -> Result<Box<dyn Transport>, XapError> {
    let device = &settings.device;
    match settings.serial.mode {
        TransportMode::Real => {
            info!(LOG_TAG, "connecting to xap on {}", settings.serial.port);
            let transport = SerialTransport::open(
                &settings.serial.port,
                settings.serial.baudrate,
                settings.serial.read_timeout(),
            )?;
            Ok(Box::new(transport))
        }
        TransportMode::Dummy => {
            info!(LOG_TAG, "dummy mode, serial port will not be opened");
            let (inputs, outputs) = device.channel_counts()?;
            Ok(Box::new(DummyXap::new(
                device.device_type()?,
                device.device_id()?,
                inputs as u32,
                outputs as u32,
            )))
        }
    }
}

/// open the configured device, its channels are loaded when this returns
pub async fn make_device(settings: &Settings) -> Result<Arc<Device>, XapError> {
    let device = &settings.device;
    let (inputs, outputs) = device.channel_counts()?;
    let options = DeviceOptions {
        inputs,
        outputs,
        init_policy: device.init_policy,
    };
    let transport = make_transport(settings)?;
    Device::open(device.device_id()?, device.device_type()?, transport, options).await
}

/// open the configured device, start its heartbeat and register it
pub async fn make_registry(settings: &Settings) -> Result<DeviceRegistry, XapError> {
    let device = make_device(settings).await?;
    heartbeating_worker::start(&device, settings.device.heartbeat_interval()?)?;

    let mut registry = DeviceRegistry::new();
    registry.insert(settings.device.slot, device)?;
    Ok(registry)
}
