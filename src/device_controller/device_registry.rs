//! slot indexed set of opened devices
//! filled once at startup, then shared read-only with the http layer

use std::sync::Arc;

use crate::common::error::ConfigError;
use crate::driver::xap::xap_device::Device;
use crate::{error, info};

const LOG_TAG: &str = "device_registry";

/// number of addressable slots, one per possible unit id
pub const MAX_DEVICES: usize = 8;

pub struct DeviceRegistry {
    slots: Vec<Option<Arc<Device>>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        DeviceRegistry {
            slots: vec![None; MAX_DEVICES],
        }
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: usize, device: Arc<Device>) -> Result<(), ConfigError> {
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(ConfigError::SlotOutOfRange(slot))?;
        if entry.is_some() {
            return Err(ConfigError::SlotTaken(slot));
        }
        info!(LOG_TAG, "device #{} registered at slot {}", device.id(), slot);
        *entry = Some(device);
        Ok(())
    }

    pub fn get(&self, slot: usize) -> Option<&Arc<Device>> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Arc<Device>> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.devices().count()
    }

    /// close every device, errors are logged so the rest still get closed
    pub async fn close_all(&self) {
        for device in self.devices() {
            if let Err(e) = device.close().await {
                error!(LOG_TAG, "cannot close device #{}: {}", device.id(), e);
            }
        }
    }
}
