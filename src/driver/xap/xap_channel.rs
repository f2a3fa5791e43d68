//! one input or output slot of a unit
//! cached fields only ever hold what the unit last echoed

use std::sync::Weak;

use serde::Serialize;
use tokio::sync::{RwLock, RwLockReadGuard};

use super::codec::{self, Command};
use super::entity::Group;
use super::xap_device::Device;
use crate::common::error::XapError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelState {
    pub label: String,
    pub muted: bool,
    pub gain: f32,
    pub level: f32,
}

pub struct Channel {
    number: u32,
    group: Group,
    device: Weak<Device>,
    state: RwLock<ChannelState>,
}

impl Channel {
    pub(super) fn new(number: u32, group: Group, device: Weak<Device>) -> Self {
        Channel {
            number,
            group,
            device,
            state: RwLock::new(ChannelState::default()),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn group(&self) -> Group {
        self.group
    }

    /// consistent copy of every cached field
    #[cfg(test)]
    pub async fn snapshot(&self) -> ChannelState {
        self.state.read().await.clone()
    }

    pub(super) async fn read_state(&self) -> RwLockReadGuard<'_, ChannelState> {
        self.state.read().await
    }

    pub async fn is_muted(&self) -> bool {
        self.state.read().await.muted
    }

    /// full refresh: mute, gain then label, stopping at the first failure
    pub async fn update(&self) -> Result<(), XapError> {
        self.query_mute("").await?;
        self.query_gain(None).await?;
        self.query_label().await?;
        Ok(())
    }

    /// returns the mute state the unit echoed back
    pub async fn mute(&self, mute: bool) -> Result<bool, XapError> {
        self.query_mute(if mute { "1" } else { "0" }).await
    }

    /// returns the gain the unit echoed back, which may differ from `value`
    pub async fn set_gain(&self, value: f32) -> Result<f32, XapError> {
        let value = format!("{:.6}", value);
        self.query_gain(Some(&value)).await
    }

    /// refresh the level reading, holding this channel's state exclusively for the round trip
    pub async fn heartbeat(&self) -> Result<f32, XapError> {
        let mut state = self.state.write().await;
        let number = self.number.to_string();
        let resp = self
            .send(Command::Lvl, &[&number, self.group.code(), "A", ""])
            .await?;
        let level = codec::parse_f32("level", codec::value(Command::Lvl, &resp)?)?;
        state.level = level;
        Ok(level)
    }

    async fn query_mute(&self, value: &str) -> Result<bool, XapError> {
        let number = self.number.to_string();
        let resp = self
            .send(Command::Mute, &[&number, self.group.code(), value])
            .await?;
        let muted = codec::value(Command::Mute, &resp)? == "1";
        self.state.write().await.muted = muted;
        Ok(muted)
    }

    async fn query_gain(&self, value: Option<&str>) -> Result<f32, XapError> {
        let number = self.number.to_string();
        let resp = match value {
            Some(value) => {
                self.send(Command::Gain, &[&number, self.group.code(), value, "A"])
                    .await?
            }
            None => self.send(Command::Gain, &[&number, self.group.code(), ""]).await?,
        };
        let gain = codec::parse_f32("gain", codec::value(Command::Gain, &resp)?)?;
        self.state.write().await.gain = gain;
        Ok(gain)
    }

    async fn query_label(&self) -> Result<String, XapError> {
        let number = self.number.to_string();
        let resp = self
            .send(Command::Label, &[&number, self.group.code(), ""])
            .await?;
        let label = codec::value(Command::Label, &resp)?.to_string();
        self.state.write().await.label = label.clone();
        Ok(label)
    }

    async fn send(&self, command: Command, args: &[&str]) -> Result<String, XapError> {
        let device = self.device.upgrade().ok_or(XapError::Closed)?;
        device.send(command, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::dummy_transport::DummyXap;
    use super::super::entity::DeviceType;
    use super::super::testing::open_dummy;
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn update_fills_every_cached_field_but_level() {
        let xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12).with_muted(Group::Output, 4);
        let device = open_dummy(xap).await.unwrap();

        let ch = device.channel(Group::Output, 4).unwrap();
        assert_eq!(
            ch.snapshot().await,
            ChannelState {
                label: String::from("O4"),
                muted: true,
                gain: 0.0,
                level: 0.0,
            }
        );
    }

    #[tokio::test]
    async fn mute_returns_and_caches_the_echo() {
        let device = open_dummy(DummyXap::new(DeviceType::XAP800, 0, 12, 12)).await.unwrap();
        let ch = device.channel(Group::Input, 2).unwrap();

        assert!(ch.mute(true).await.unwrap());
        assert!(ch.snapshot().await.muted);
        assert!(!ch.mute(false).await.unwrap());
        assert!(!ch.is_muted().await);
    }

    #[tokio::test]
    async fn set_gain_caches_what_the_unit_settled_on() {
        let xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12);
        let journal = xap.journal();
        let device = open_dummy(xap).await.unwrap();
        let ch = device.channel(Group::Input, 1).unwrap();

        assert_eq!(ch.set_gain(-12.5).await.unwrap(), -12.5);
        assert!(journal
            .lock()
            .unwrap()
            .contains(&String::from("#50 GAIN 1 I -12.500000 A")));

        // the unit clamps at +20
        assert_eq!(ch.set_gain(35.0).await.unwrap(), 20.0);
        assert_eq!(ch.snapshot().await.gain, 20.0);
    }

    #[tokio::test]
    async fn heartbeat_reads_level() {
        let xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12).with_level(Group::Input, 5, -7.5);
        let device = open_dummy(xap).await.unwrap();
        let ch = device.channel(Group::Input, 5).unwrap();

        assert_eq!(ch.heartbeat().await.unwrap(), -7.5);
        assert_eq!(ch.snapshot().await.level, -7.5);
    }

    #[tokio::test]
    async fn device_error_reaches_the_caller_verbatim() {
        let xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12);
        let device = open_dummy(xap).await.unwrap();
        // the unit only knows 12 inputs, ask for a 13th through the raw primitive
        let err = device
            .send(Command::Mute, &["13", "I", "1"])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "bad channel");
    }

    #[tokio::test]
    async fn muted_result_is_visible_to_readers_once_mute_returns() {
        let device = open_dummy(DummyXap::new(DeviceType::XAP800, 0, 12, 12)).await.unwrap();
        let reader = device.clone();

        let ch = device.channel(Group::Output, 1).unwrap();
        assert!(ch.mute(true).await.unwrap());
        let seen = tokio::spawn(async move {
            reader.channel(Group::Output, 1).unwrap().snapshot().await.muted
        })
        .await
        .unwrap();
        assert!(seen);
    }

    #[tokio::test]
    async fn dropped_device_reports_closed() {
        let device = open_dummy(DummyXap::new(DeviceType::XAP800, 0, 1, 1)).await.unwrap();
        let weak = std::sync::Arc::downgrade(&device);
        let orphan = Channel::new(1, Group::Input, weak);
        drop(device);
        assert!(matches!(orphan.mute(true).await.unwrap_err(), XapError::Closed));
    }
}
