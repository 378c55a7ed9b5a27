//! Assembly of the bridge from configuration.
//!
//! A [`Bridge`] owns one event bus, one command channel, the correlator over
//! them, the session slot and the group API. The host integration feeds it
//! events through [`Bridge::emit`] and lends or withdraws its live session
//! through [`Bridge::attach_session`] / [`Bridge::detach_session`].
//!
//! ```rust,ignore
//! use ntbridge_runtime::Bridge;
//!
//! let bridge = Bridge::builder().config_file("ntbridge.toml").build()?;
//! let mut requests = bridge.take_host_requests().expect("built-in channel");
//!
//! // Host-facing task: answer `requests`, call `bridge.emit(..)` per event.
//!
//! let groups = bridge.group().get_groups().await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use ntbridge_core::{
    CommandChannel, Correlator, EventBus, HostEvent, HostRequest, MpscCommandChannel,
    SessionSlot, TransportPath, TransportResolver,
};
use ntbridge_group::{GroupApi, NtSession};

use crate::config::{BridgeConfig, ConfigLoader, validate_config};
use crate::error::RuntimeResult;
use crate::logging;

/// A wired bridge to one host instance.
pub struct Bridge {
    config: BridgeConfig,
    bus: Arc<EventBus>,
    correlator: Correlator,
    session: Arc<SessionSlot<dyn NtSession>>,
    group: GroupApi,
    /// Receiving half of the built-in channel, until taken.
    host_requests: Mutex<Option<mpsc::Receiver<HostRequest>>>,
}

impl Bridge {
    /// Creates a bridge builder.
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Creates a bridge from configuration with the built-in channel and no
    /// session attached.
    pub fn from_config(config: BridgeConfig) -> RuntimeResult<Self> {
        Self::builder().config(config).build()
    }

    /// The effective configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Delivers a host event to pending correlations.
    ///
    /// Returns how many waiters it resolved. Events nobody armed are dropped.
    pub fn emit(&self, event: &str, payload: Value) -> usize {
        self.bus.emit(event, payload)
    }

    /// [`emit`](Self::emit) for an already-framed event.
    pub fn emit_event(&self, event: HostEvent) -> usize {
        self.bus.emit_event(event)
    }

    /// Lends the bridge a live host session; later calls take the direct
    /// path. Returns the session it replaced, if any.
    pub fn attach_session(&self, session: Arc<dyn NtSession>) -> Option<Arc<dyn NtSession>> {
        info!("Host session attached");
        self.session.attach(session)
    }

    /// Withdraws the live session; later calls take the correlated path.
    pub fn detach_session(&self) -> Option<Arc<dyn NtSession>> {
        let previous = self.session.detach();
        if previous.is_some() {
            info!("Host session detached");
        }
        previous
    }

    /// The path the next dual-path operation will take.
    pub fn path(&self) -> TransportPath {
        self.group.resolver().path()
    }

    /// Group operations.
    pub fn group(&self) -> &GroupApi {
        &self.group
    }

    /// The correlator, for commands not covered by a domain API.
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// The event bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Takes the receiver of the built-in command channel.
    ///
    /// `None` if a custom channel was supplied or the receiver was already
    /// taken.
    pub fn take_host_requests(&self) -> Option<mpsc::Receiver<HostRequest>> {
        self.host_requests.lock().take()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .field("path", &self.path())
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Bridge`].
pub struct BridgeBuilder {
    config: Option<BridgeConfig>,
    loader: ConfigLoader,
    channel: Option<Arc<dyn CommandChannel>>,
    session: Option<Arc<dyn NtSession>>,
    init_logging: bool,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            loader: ConfigLoader::new(),
            channel: None,
            session: None,
            init_logging: false,
        }
    }

    /// Uses this configuration instead of loading one.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Loads the configuration from this file.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    /// Uses a custom command channel instead of the built-in mpsc one.
    pub fn channel(mut self, channel: Arc<dyn CommandChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Attaches a session from the start.
    pub fn session(mut self, session: Arc<dyn NtSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Installs the global subscriber from the logging configuration.
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Validates the configuration and wires the bridge.
    pub fn build(self) -> RuntimeResult<Bridge> {
        let config = match self.config {
            Some(config) => config,
            None => self.loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let (channel, host_requests) = match self.channel {
            Some(channel) => (channel, None),
            None => {
                let (channel, rx) = MpscCommandChannel::new(config.correlation.channel_capacity);
                (Arc::new(channel) as Arc<dyn CommandChannel>, Some(rx))
            }
        };

        let bus = Arc::new(EventBus::new());
        let correlator = Correlator::new(Arc::clone(&bus), channel)
            .with_default_timeout(config.correlation.default_timeout());
        let session = Arc::new(match self.session {
            Some(session) => SessionSlot::with(session),
            None => SessionSlot::empty(),
        });
        let resolver = TransportResolver::new(Arc::clone(&session), correlator.clone());
        let group = GroupApi::new(resolver, config.group.to_options());

        debug!(
            timeout_ms = config.correlation.default_timeout_ms,
            builtin_channel = host_requests.is_some(),
            path = ?group.resolver().path(),
            "Bridge assembled"
        );

        Ok(Bridge {
            config,
            bus,
            correlator,
            session,
            group,
            host_requests: Mutex::new(host_requests),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::error::RuntimeError;
    use async_trait::async_trait;
    use ntbridge_core::{BridgeError, BridgeResult, Command};
    use ntbridge_group::names::{event, method};
    use ntbridge_group::{GroupService, MemberRole, MuteEntry};
    use serde_json::json;
    use std::time::Duration;

    fn bridge() -> Bridge {
        Bridge::from_config(BridgeConfig::default()).unwrap()
    }

    /// Answers every command with success, replying to `getGroupList` with a
    /// pushed list update.
    fn spawn_host(bridge: &Arc<Bridge>) {
        let mut rx = bridge.take_host_requests().unwrap();
        let host = Arc::clone(bridge);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                match request {
                    HostRequest::Command { command, reply } => {
                        let _ = reply.send(Ok(Some(json!({ "result": 0, "errMsg": "" }))));
                        if command.name() == method::GROUP_LIST {
                            host.emit(
                                event::GROUP_LIST_UPDATE,
                                json!({ "groupList": [{ "groupCode": "100" }] }),
                            );
                        }
                    }
                    HostRequest::Subscribe { reply, .. } => {
                        let _ = reply.send(Ok(()));
                    }
                }
            }
        });
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = BridgeConfig::default();
        config.correlation.channel_capacity = 0;

        let err = Bridge::from_config(config).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::ValidationError { .. })
        ));
    }

    #[tokio::test]
    async fn test_builtin_channel_round_trip() {
        let bridge = Arc::new(bridge());
        spawn_host(&bridge);

        let groups = bridge.group().get_groups().await.unwrap();
        assert_eq!(groups[0].group_code, "100");
        assert!(bridge.take_host_requests().is_none());
    }

    #[tokio::test]
    async fn test_dropped_host_is_not_connected() {
        let bridge = bridge();
        drop(bridge.take_host_requests());

        let err = bridge
            .correlator()
            .send(Command::new(method::QUIT_GROUP, json!([])))
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::NotConnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_default_timeout() {
        let mut config = BridgeConfig::default();
        config.correlation.default_timeout_ms = 300;
        let bridge = Arc::new(Bridge::from_config(config).unwrap());
        spawn_host(&bridge);

        let err = bridge
            .correlator()
            .correlate(
                Command::new("nodeIKernelGroupService/getGroupNotifies", json!([])),
                Some(ntbridge_core::Expect::first("onNeverEmitted")),
                ntbridge_core::CorrelateOptions::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BridgeError::Timeout {
                event: "onNeverEmitted".into(),
                after: Duration::from_millis(300),
            }
        );
    }

    struct NullService;

    #[async_trait]
    impl GroupService for NullService {
        fn create_member_list_scene(&self, _: &str, _: &str) -> String {
            String::new()
        }
        async fn get_next_member_list(&self, _: &str, _: u32) -> BridgeResult<Value> {
            Ok(json!({ "errCode": 0, "result": { "infos": {} } }))
        }
        async fn operate_sys_notify(&self, _: bool, _: Value) -> BridgeResult<Value> {
            Ok(json!({ "result": 0 }))
        }
        async fn quit_group(&self, _: &str) -> BridgeResult<Value> {
            Ok(json!({ "result": 0 }))
        }
        async fn kick_member(&self, _: &str, _: &[String], _: bool, _: &str) -> BridgeResult<Value> {
            Ok(json!({ "result": 0 }))
        }
        async fn set_member_shut_up(&self, _: &str, _: &[MuteEntry]) -> BridgeResult<Value> {
            Ok(json!({ "result": 0 }))
        }
        async fn set_group_shut_up(&self, _: &str, _: bool) -> BridgeResult<Value> {
            Ok(json!({ "result": 0 }))
        }
        async fn modify_member_card_name(&self, _: &str, _: &str, _: &str) -> BridgeResult<Value> {
            Ok(json!({ "result": 0 }))
        }
        async fn modify_member_role(&self, _: &str, _: &str, _: MemberRole) -> BridgeResult<Value> {
            Ok(json!({ "result": 0 }))
        }
        async fn modify_group_name(&self, _: &str, _: &str, _: bool) -> BridgeResult<Value> {
            Ok(json!({ "result": 0 }))
        }
    }

    struct NullSession;

    impl NtSession for NullSession {
        fn group_service(&self) -> Arc<dyn GroupService> {
            Arc::new(NullService)
        }
    }

    #[tokio::test]
    async fn test_session_attach_switches_path() {
        let bridge = bridge();
        drop(bridge.take_host_requests());
        assert_eq!(bridge.path(), TransportPath::Correlated);

        // No host behind the channel, so only the direct path can succeed.
        assert_eq!(
            bridge.group().quit_group("100").await.unwrap_err(),
            BridgeError::NotConnected
        );

        assert!(bridge.attach_session(Arc::new(NullSession)).is_none());
        assert_eq!(bridge.path(), TransportPath::Direct);
        bridge.group().quit_group("100").await.unwrap();

        assert!(bridge.detach_session().is_some());
        assert_eq!(bridge.path(), TransportPath::Correlated);
    }

    #[test]
    fn test_custom_channel_has_no_host_requests() {
        let (channel, _rx) = MpscCommandChannel::new(4);
        let bridge = Bridge::builder()
            .config(BridgeConfig::default())
            .channel(Arc::new(channel))
            .session(Arc::new(NullSession))
            .build()
            .unwrap();

        assert!(bridge.take_host_requests().is_none());
        assert_eq!(bridge.path(), TransportPath::Direct);
    }
}
