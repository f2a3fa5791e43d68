//! XAP unit on a half-duplex serial link
//! design
//! - every exchange goes through `send`, which holds the link for the whole write/read round trip,
//!   so exactly one command is outstanding per unit
//! - request frame and receive buffer live only for one exchange
//! - identity (VER, UID) is read once at construction, then every channel gets a full refresh

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::{
    bytes::BytesMut,
    codec::{Decoder, Encoder},
};

use super::codec::{Command, Request, XapCodec, RECV_BUF_SIZE};
use super::entity::{DeviceType, Group, InitPolicy};
use super::transport::Transport;
use super::xap_channel::Channel;
use crate::common::error::{ConfigError, XapError};
use crate::entity::dto::device_info_dto::DeviceInfoDto;
use crate::entity::dto::device_state_dto::DeviceStateDto;
use crate::{debug, info, warn};

const LOG_TAG: &str = "xap_device.rs | xap unit";

/// highest unit id the 3 bit address field can carry
pub const MAX_DEVICE_ID: u8 = 7;

#[derive(Debug, Clone, Copy)]
pub struct DeviceOptions {
    pub inputs: usize,
    pub outputs: usize,
    pub init_policy: InitPolicy,
}

struct CommandLink {
    codec: XapCodec,
    port: Mutex<Option<Box<dyn Transport>>>,
}

impl CommandLink {
    async fn send(&self, command: Command, args: &[&str]) -> Result<String, XapError> {
        let mut port = self.port.lock().await;
        let transport = port.as_mut().ok_or(XapError::Closed)?;
        let mut codec = self.codec;

        let mut request = BytesMut::new();
        codec.encode(Request { command, args }, &mut request)?;
        debug!(LOG_TAG, "Tx: {}", String::from_utf8_lossy(&request).trim_end());
        transport.write_frame(&request).await?;

        let mut received = BytesMut::with_capacity(RECV_BUF_SIZE);
        let mut chunk = [0u8; RECV_BUF_SIZE];
        let resp = loop {
            if let Some(payload) = codec.decode(&mut received)? {
                break payload;
            }
            let room = RECV_BUF_SIZE - received.len();
            let n = if room == 0 {
                0
            } else {
                transport.read_chunk(&mut chunk[..room]).await?
            };
            if n == 0 {
                break codec.decode_eof(&mut received)?.ok_or(XapError::NoResponse)?;
            }
            received.extend_from_slice(&chunk[..n]);
        };
        debug!(LOG_TAG, "Rx: {}", resp);
        Ok(resp)
    }
}

pub struct Device {
    id: u8,
    device_type: DeviceType,
    uid: String,
    version: String,
    link: CommandLink,
    channels: HashMap<Group, Vec<Channel>>,
    heartbeat: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Device {
    /// identify the unit behind `transport` and load every channel
    /// nothing is left running when this fails
    pub async fn open(
        id: u8,
        device_type: DeviceType,
        transport: Box<dyn Transport>,
        options: DeviceOptions,
    ) -> Result<Arc<Device>, XapError> {
        if id > MAX_DEVICE_ID {
            return Err(ConfigError::InvalidDeviceId(id as i64).into());
        }

        let link = CommandLink {
            codec: XapCodec::new(device_type, id),
            port: Mutex::new(Some(transport)),
        };
        let version = link.send(Command::Ver, &[]).await?;
        let uid = link.send(Command::Uid, &[]).await?;
        info!(
            LOG_TAG,
            "connected to {} #{}, version: {}, uid: {}", device_type, id, version, uid
        );

        let device = Arc::new_cyclic(|me: &Weak<Device>| {
            let mut channels = HashMap::new();
            for (group, count) in [(Group::Input, options.inputs), (Group::Output, options.outputs)] {
                let slots = (1..=count as u32)
                    .map(|number| Channel::new(number, group, me.clone()))
                    .collect();
                channels.insert(group, slots);
            }
            Device {
                id,
                device_type,
                uid,
                version,
                link,
                channels,
                heartbeat: std::sync::Mutex::new(None),
            }
        });

        device.initialize_channels(options.init_policy).await?;
        Ok(device)
    }

    /// run every channel's first refresh concurrently and wait for all of them
    async fn initialize_channels(&self, policy: InitPolicy) -> Result<(), XapError> {
        let updates = self.all_channels().map(|ch| async move { (ch, ch.update().await) });
        let results = join_all(updates).await;

        let mut failed = 0;
        for (ch, result) in results {
            let Err(e) = result else { continue };
            match policy {
                InitPolicy::Abort => {
                    return Err(XapError::ChannelInit {
                        group: ch.group().code().to_string(),
                        number: ch.number(),
                        source: Box::new(e),
                    })
                }
                InitPolicy::Tolerate => {
                    warn!(
                        LOG_TAG,
                        "channel {}{} keeps default state, initial refresh failed: {}",
                        ch.group(),
                        ch.number(),
                        e
                    );
                    failed += 1;
                }
            }
        }
        info!(
            LOG_TAG,
            "{} channels loaded, {} failed",
            self.all_channels().count() - failed,
            failed
        );
        Ok(())
    }

    /// the one path every exchange with the unit takes
    pub async fn send(&self, command: Command, args: &[&str]) -> Result<String, XapError> {
        self.link.send(command, args).await
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn channels(&self, group: Group) -> &[Channel] {
        self.channels.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// channels of every group, inputs first
    pub fn all_channels(&self) -> impl Iterator<Item = &Channel> {
        Group::ALL.into_iter().flat_map(move |group| self.channels(group).iter())
    }

    /// 1-based channel lookup
    pub fn channel(&self, group: Group, number: usize) -> Result<&Channel, XapError> {
        number
            .checked_sub(1)
            .and_then(|index| self.channels(group).get(index))
            .ok_or_else(|| XapError::ChannelNotFound {
                group: group.code().to_string(),
                number,
            })
    }

    /// cached state of every channel, read with all channel read locks held
    pub async fn state(&self) -> DeviceStateDto {
        let mut guards = Vec::new();
        for ch in self.all_channels() {
            guards.push((ch.group(), ch.read_state().await));
        }

        let mut channels = BTreeMap::new();
        for group in Group::ALL {
            channels.insert(group, Vec::new());
        }
        for (group, state) in guards {
            channels.entry(group).or_insert_with(Vec::new).push(state.clone());
        }
        DeviceStateDto { channels }
    }

    pub fn info(&self) -> DeviceInfoDto {
        DeviceInfoDto {
            id: self.id(),
            device_type: self.device_type().to_string(),
            uid: self.uid().to_string(),
            version: self.version().to_string(),
            inputs: self.device_type().inputs(),
            outputs: self.device_type().outputs(),
        }
    }

    /// keep the heartbeat task so close/drop can stop it, returns false when one is already running
    pub(crate) fn attach_heartbeat(&self, handle: JoinHandle<()>) -> bool {
        let mut slot = self.heartbeat.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            handle.abort();
            return false;
        }
        *slot = Some(handle);
        true
    }

    pub fn heartbeat_running(&self) -> bool {
        let slot = self.heartbeat.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// stop the heartbeat and release the serial port, later sends fail with `Closed`
    pub async fn close(&self) -> Result<(), XapError> {
        self.stop_heartbeat();
        let transport = self.link.port.lock().await.take();
        if let Some(mut transport) = transport {
            transport.shutdown().await?;
            info!(LOG_TAG, "{} #{} closed", self.device_type, self.id);
        }
        Ok(())
    }

    fn stop_heartbeat(&self) {
        let mut slot = self.heartbeat.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::super::dummy_transport::DummyXap;
    use super::super::testing::open_dummy;
    use super::*;

    /// flags any read or write that happens outside a single write..response span
    struct OverlapTransport {
        inner: DummyXap,
        busy: Arc<AtomicBool>,
        violations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for OverlapTransport {
        async fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            tokio::task::yield_now().await;
            self.inner.write_frame(frame).await
        }

        async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.busy.load(Ordering::SeqCst) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            tokio::task::yield_now().await;
            let n = self.inner.read_chunk(buf).await?;
            if n == 0 || buf[..n].contains(&b'\n') {
                self.busy.store(false, Ordering::SeqCst);
            }
            Ok(n)
        }
    }

    fn options(inputs: usize, outputs: usize) -> DeviceOptions {
        DeviceOptions {
            inputs,
            outputs,
            init_policy: InitPolicy::Abort,
        }
    }

    #[tokio::test]
    async fn open_reads_identity_then_channels() {
        let xap = DummyXap::new(DeviceType::XAP800, 2, 12, 12);
        let journal = xap.journal();
        let device = Device::open(2, DeviceType::XAP800, Box::new(xap), options(12, 12))
            .await
            .unwrap();

        assert_eq!(device.version(), "VER 3.0.1");
        assert!(device.uid().starts_with("UID 0x"));
        assert_eq!(device.channels(Group::Input).len(), 12);
        assert_eq!(device.channels(Group::Output).len(), 12);

        let journal = journal.lock().unwrap();
        assert_eq!(&journal[..2], ["#52 VER", "#52 UID"]);
        // mute, gain and label for 24 channels
        assert_eq!(journal.len(), 2 + 24 * 3);
    }

    #[tokio::test]
    async fn failed_uid_yields_no_device_and_nothing_running() {
        let xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12).fail_command("UID", "locked");
        let journal = xap.journal();
        let result = Device::open(0, DeviceType::XAP800, Box::new(xap), options(12, 12)).await;

        match result {
            Err(XapError::Device(msg)) => assert_eq!(msg, "locked"),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("device should not open"),
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*journal.lock().unwrap(), vec!["#50 VER", "#50 UID"]);
    }

    #[tokio::test]
    async fn silent_unit_is_no_response() {
        let xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12).ignore_command("VER");
        let result = Device::open(0, DeviceType::XAP800, Box::new(xap), options(12, 12)).await;
        assert!(matches!(result, Err(XapError::NoResponse)));
    }

    #[tokio::test]
    async fn rejects_unaddressable_id() {
        let xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12);
        let result = Device::open(8, DeviceType::XAP800, Box::new(xap), options(12, 12)).await;
        assert!(matches!(
            result,
            Err(XapError::Config(ConfigError::InvalidDeviceId(8)))
        ));
    }

    #[tokio::test]
    async fn abort_policy_fails_construction_on_channel_error() {
        let xap = DummyXap::new(DeviceType::XAP800, 0, 12, 12).ignore_command("LABEL");
        let result = Device::open(0, DeviceType::XAP800, Box::new(xap), options(12, 12)).await;
        match result {
            Err(XapError::ChannelInit { source, .. }) => {
                assert!(matches!(*source, XapError::NoResponse))
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("device should not open"),
        }
    }

    #[tokio::test]
    async fn tolerate_policy_keeps_partial_state() {
        let xap = DummyXap::new(DeviceType::XAP800, 0, 2, 2)
            .with_muted(Group::Input, 1)
            .fail_command("LABEL", "busy");
        let mut opts = options(2, 2);
        opts.init_policy = InitPolicy::Tolerate;
        let device = Device::open(0, DeviceType::XAP800, Box::new(xap), opts).await.unwrap();

        let state = device.channel(Group::Input, 1).unwrap().snapshot().await;
        assert!(state.muted);
        assert_eq!(state.label, "");
    }

    #[tokio::test]
    async fn provisioned_counts_are_explicit() {
        let xap = DummyXap::new(DeviceType::XAPTH2, 0, 0, 0);
        let device = Device::open(
            0,
            DeviceType::XAPTH2,
            Box::new(xap),
            DeviceOptions {
                inputs: 0,
                outputs: 0,
                init_policy: InitPolicy::Abort,
            },
        )
        .await
        .unwrap();
        assert_eq!(device.all_channels().count(), 0);

        let state = serde_json::to_value(device.state().await).unwrap();
        assert_eq!(state, serde_json::json!({"channels": {"input": [], "output": []}}));
    }

    #[tokio::test]
    async fn channel_lookup_is_one_based() {
        let device = open_dummy(DummyXap::new(DeviceType::XAP800, 0, 12, 12)).await.unwrap();
        assert_eq!(device.channel(Group::Input, 1).unwrap().number(), 1);
        assert_eq!(device.channel(Group::Output, 12).unwrap().number(), 12);
        assert!(device.channel(Group::Input, 0).is_err());
        assert!(device.channel(Group::Input, 13).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_never_interleave() {
        let busy = Arc::new(AtomicBool::new(false));
        let violations = Arc::new(AtomicUsize::new(0));
        let overlap = OverlapTransport {
            inner: DummyXap::new(DeviceType::XAP800, 0, 12, 12),
            busy: busy.clone(),
            violations: violations.clone(),
        };
        let device = Device::open(0, DeviceType::XAP800, Box::new(overlap), options(12, 12))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..32usize {
            let device = device.clone();
            tasks.push(tokio::spawn(async move {
                let group = if i % 2 == 0 { Group::Input } else { Group::Output };
                let ch = device.channel(group, i % 12 + 1).unwrap();
                match i % 3 {
                    0 => ch.mute(i % 4 == 0).await.map(|_| ()),
                    1 => ch.set_gain(-(i as f32)).await.map(|_| ()),
                    _ => ch.heartbeat().await.map(|_| ()),
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(violations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn closed_device_refuses_commands() {
        let device = open_dummy(DummyXap::new(DeviceType::XAP800, 0, 1, 1)).await.unwrap();
        device.close().await.unwrap();
        assert!(matches!(
            device.send(Command::Ver, &[]).await.unwrap_err(),
            XapError::Closed
        ));
        // closing twice is fine
        device.close().await.unwrap();
    }

    #[tokio::test]
    async fn state_serializes_channels_by_group() {
        let device = open_dummy(DummyXap::new(DeviceType::XAP800, 0, 1, 1)).await.unwrap();
        let state = serde_json::to_value(device.state().await).unwrap();
        assert_eq!(
            state,
            serde_json::json!({
                "channels": {
                    "input": [{"label": "I1", "muted": false, "gain": 0.0, "level": 0.0}],
                    "output": [{"label": "O1", "muted": false, "gain": 0.0, "level": 0.0}]
                }
            })
        );
    }
}
