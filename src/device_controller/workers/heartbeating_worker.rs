//! per-device heartbeat
//! refreshes the level of every unmuted channel at a fixed interval.
//! one task runs the ticks back to back, so a slow link delays the next tick
//! instead of piling level queries onto the unit.

use std::sync::Arc;
use std::time::Duration;

use crate::common::error::{ConfigError, XapError};
use crate::driver::xap::xap_device::Device;
use crate::{debug, info, warn};

const LOG_TAG: &str = "heartbeating_worker";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub refreshed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// start the heartbeat of `device`, a zero interval is a configuration error
/// the task only holds a weak reference and ends with the device
pub fn start(device: &Arc<Device>, interval: Duration) -> Result<(), XapError> {
    if interval.is_zero() {
        return Err(ConfigError::InvalidHeartbeat(0).into());
    }
    if device.heartbeat_running() {
        warn!(LOG_TAG, "heartbeat of device #{} already running", device.id());
        return Ok(());
    }

    let weak = Arc::downgrade(device);
    let handle = tokio::spawn(async move {
        info!(LOG_TAG, "heartbeat starting, interval: {:?}", interval);
        loop {
            tokio::time::sleep(interval).await;
            let Some(device) = weak.upgrade() else {
                break;
            };
            let report = run_tick(&device).await;
            debug!(
                LOG_TAG,
                "tick done, refreshed: {}, skipped: {}, failed: {}",
                report.refreshed,
                report.skipped,
                report.failed
            );
        }
        info!(LOG_TAG, "heartbeat stopped, device is gone");
    });

    if !device.attach_heartbeat(handle) {
        warn!(LOG_TAG, "heartbeat of device #{} started twice", device.id());
    }
    Ok(())
}

/// one pass over every channel; muted channels are skipped without touching the link
/// a failing channel is logged and the pass goes on
pub async fn run_tick(device: &Device) -> TickReport {
    let mut report = TickReport::default();
    for ch in device.all_channels() {
        if ch.is_muted().await {
            report.skipped += 1;
            continue;
        }
        match ch.heartbeat().await {
            Ok(_) => report.refreshed += 1,
            Err(e) => {
                warn!(
                    LOG_TAG,
                    "level refresh of channel {}{} failed: {}",
                    ch.group(),
                    ch.number(),
                    e
                );
                report.failed += 1;
            }
        }
    }
    report
}
