//! XAP matrix mixer driver
//! - codec: ASCII command framing and response extraction
//! - transport: half-duplex byte link (serial port or simulated unit)
//! - device / channel: serialized command path and cached channel state

pub mod codec;
pub mod dummy_transport;
pub mod entity;
pub mod transport;
pub mod xap_channel;
pub mod xap_device;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::dummy_transport::DummyXap;
    use super::entity::{DeviceType, InitPolicy};
    use super::xap_device::{Device, DeviceOptions};
    use crate::common::error::XapError;

    /// open XAP800 #0 behind `xap`, provisioning the channels it simulates
    pub async fn open_dummy(xap: DummyXap) -> Result<Arc<Device>, XapError> {
        let (inputs, outputs) = xap.channel_counts();
        open_dummy_with(xap, DeviceType::XAP800, 0, inputs, outputs).await
    }

    pub async fn open_dummy_with(
        xap: DummyXap,
        device_type: DeviceType,
        id: u8,
        inputs: usize,
        outputs: usize,
    ) -> Result<Arc<Device>, XapError> {
        let options = DeviceOptions {
            inputs,
            outputs,
            init_policy: InitPolicy::Tolerate,
        };
        Device::open(id, device_type, Box::new(xap), options).await
    }
}
