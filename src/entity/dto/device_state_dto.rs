//! cached device state as served to http callers

use std::collections::BTreeMap;

use serde::Serialize;

use crate::driver::xap::entity::Group;
use crate::driver::xap::xap_channel::ChannelState;

/// channels keyed by group, identity fields are left out
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStateDto {
    pub channels: BTreeMap<Group, Vec<ChannelState>>,
}
