use super::{ConfigSection, wire};
use crate::dependency::{
    CyclicDependencyError, DependencyEdge, DependencyEngine, Effect, HeadlessControl,
};
use crate::dispatch::UiDispatcher;
use crate::journal::OperationJournal;
use crate::operation::{
    OperationController, OperationError, OperationKind, OperationOutcome, Ticker,
};
use crate::parameter::ParameterSet;
use crate::progress::ProgressSink;
use crate::proxy::{
    ProxyFactory, ProxyHandle, ProxySlot, TestTargetUnavailable, proxy_test_work,
    resolve_test_target,
};
use crate::store::ConfigStore;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

pub const ENABLE_PROXY: &str = "Enable.Proxy";
pub const ENABLE_SOCKS: &str = "Enable.SOCKS";
pub const HOST: &str = "Proxy.Host";
pub const PORT: &str = "Proxy.Port";
pub const USERNAME: &str = "Proxy.Username";
pub const PASSWORD: &str = "Proxy.Password";
pub const TRACKER_DNS_DISABLE: &str = "Proxy.SOCKS.Tracker.DNS.Disable";
pub const PEER_ENABLE: &str = "Proxy.Data.Enable";
pub const PEER_INFORM: &str = "Proxy.Data.SOCKS.inform";
pub const PEER_VERSION: &str = "Proxy.Data.SOCKS.version";
pub const PEER_SAME: &str = "Proxy.Data.Same";
pub const PEER_HOST: &str = "Proxy.Data.Host";
pub const PEER_PORT: &str = "Proxy.Data.Port";
pub const PEER_USERNAME: &str = "Proxy.Data.Username";
pub const PEER_PASSWORD: &str = "Proxy.Data.Password";
pub const SHOW_ICON: &str = "Proxy.SOCKS.ShowIcon";
pub const SHOW_ICON_FLAG_INCOMING: &str = "Proxy.SOCKS.ShowIcon.FlagIncoming";

pub const SOCKS_VERSIONS: [&str; 3] = ["V4", "V4a", "V5"];

pub struct ProxySection {
    params: ParameterSet,
    engine: DependencyEngine,
    test_socks: Rc<HeadlessControl>,
    slot: ProxySlot,
    dispatcher: Arc<dyn UiDispatcher>,
    journal: Option<OperationJournal>,
}

impl ProxySection {
    pub fn build(
        store: Arc<dyn ConfigStore>,
        factory: Arc<dyn ProxyFactory>,
        dispatcher: Arc<dyn UiDispatcher>,
    ) -> Result<Self, CyclicDependencyError> {
        let mut params = ParameterSet::new(store);
        let enable_proxy = params.boolean(ENABLE_PROXY, false);
        let enable_socks = params.boolean(ENABLE_SOCKS, false);
        let host = params.string(HOST, "");
        let port = params.string(PORT, "");
        let user = params.string(USERNAME, "");
        let pass = params.string(PASSWORD, "");
        let dns_kill = params.boolean(TRACKER_DNS_DISABLE, false);

        let peer_enable = params.boolean(PEER_ENABLE, false);
        let peer_inform = params.boolean(PEER_INFORM, true);
        let peer_version = params.choice(PEER_VERSION, "V4", &SOCKS_VERSIONS);
        let peer_same = params.boolean(PEER_SAME, false);
        let peer_host = params.string(PEER_HOST, "");
        let peer_port = params.string(PEER_PORT, "");
        let peer_user = params.string(PEER_USERNAME, "");
        let peer_pass = params.string(PEER_PASSWORD, "");

        let show_icon = params.boolean(SHOW_ICON, false);
        let flag_incoming = params.boolean(SHOW_ICON_FLAG_INCOMING, false);

        let test_socks = HeadlessControl::new("proxy.testsocks");
        let slot = ProxySlot::new();

        let test_edge = {
            let slot = slot.clone();
            DependencyEdge::uniform("socks-test", move |t| {
                let target = if t.selected(0) && t.selected(1) {
                    resolve_test_target(
                        factory.as_ref(),
                        &t.text(2),
                        &t.text(3),
                        &t.text(4),
                        &t.text(5),
                    )
                } else {
                    Err(TestTargetUnavailable::Disabled)
                };
                match target {
                    Ok(proxy) => {
                        slot.set(proxy);
                        Effect::Enable
                    }
                    Err(reason) => {
                        debug!(reason = %reason, "SOCKS test unavailable");
                        slot.clear();
                        Effect::Disable
                    }
                }
            })
            .trigger(&enable_proxy)
            .trigger(&enable_socks)
            .trigger(&host)
            .trigger(&port)
            .trigger(&user)
            .trigger(&pass)
            .control(test_socks.clone())
        };

        let engine = DependencyEngine::new();
        wire(
            &engine,
            [
                DependencyEdge::enable_when_selected("proxy", &enable_proxy)
                    .targets([&enable_socks, &host, &port, &user, &pass]),
                DependencyEdge::uniform("tracker-dns", |t| Effect::enabled(t.all_selected()))
                    .trigger(&enable_proxy)
                    .trigger(&enable_socks)
                    .target(&dns_kill),
                test_edge,
                DependencyEdge::enable_when_selected("peer-details", &peer_enable)
                    .targets([&peer_inform, &peer_version, &peer_same]),
                DependencyEdge::uniform("peer-server", |t| {
                    Effect::enabled(t.selected(0) && !t.checked(1))
                })
                .trigger(&peer_enable)
                .trigger(&peer_same)
                .targets([&peer_host, &peer_port, &peer_user, &peer_pass]),
                DependencyEdge::enable_when_selected("show-icon", &show_icon)
                    .target(&flag_incoming),
            ],
        )?;

        Ok(Self {
            params,
            engine,
            test_socks,
            slot,
            dispatcher,
            journal: None,
        })
    }

    pub fn with_journal(mut self, journal: OperationJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn test_control(&self) -> &Rc<HeadlessControl> {
        &self.test_socks
    }

    pub fn test_target(&self) -> Option<Arc<dyn ProxyHandle>> {
        self.slot.get()
    }

    /// Runs the connectivity test against whatever proxy is current when the
    /// worker starts, with a ticker showing it is still busy.
    pub fn start_proxy_test(
        &self,
        sink: ProgressSink,
        on_complete: impl FnOnce(&OperationOutcome) + Send + 'static,
    ) -> Result<OperationController, OperationError> {
        let target = self
            .slot
            .get()
            .map(|proxy| format!("{}:{}", proxy.host(), proxy.port()))
            .unwrap_or_default();
        let controller = OperationController::new(
            OperationKind::ProxyTest,
            target,
            Arc::clone(&self.dispatcher),
        );
        let controller = match &self.journal {
            Some(journal) => controller.with_journal(journal.clone()),
            None => controller,
        };
        controller.start_with_ticker(
            proxy_test_work(self.slot.clone()),
            sink,
            on_complete,
            Ticker::default(),
        )?;
        Ok(controller)
    }
}

impl ConfigSection for ProxySection {
    fn name(&self) -> &'static str {
        "proxy"
    }

    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn controls(&self) -> Vec<Rc<HeadlessControl>> {
        vec![Rc::clone(&self.test_socks)]
    }
}

impl Drop for ProxySection {
    fn drop(&mut self) {
        self.engine.teardown();
        self.slot.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::TaskQueue;
    use crate::parameter::Parameter;
    use crate::store::SettingsStore;

    struct Handle {
        host: String,
        port: u16,
    }

    impl ProxyHandle for Handle {
        fn host(&self) -> &str {
            &self.host
        }

        fn port(&self) -> u16 {
            self.port
        }

        fn versions_supported(&self) -> anyhow::Result<Vec<String>> {
            Ok(vec!["V5".into()])
        }
    }

    struct Factory;

    impl ProxyFactory for Factory {
        fn create_proxy(
            &self,
            host: &str,
            port: u16,
            _user: &str,
            _password: &str,
        ) -> anyhow::Result<Arc<dyn ProxyHandle>> {
            Ok(Arc::new(Handle {
                host: host.to_string(),
                port,
            }))
        }
    }

    fn build() -> (TaskQueue, ProxySection) {
        let queue = TaskQueue::new();
        let store: Arc<dyn ConfigStore> = Arc::new(SettingsStore::in_memory());
        let section = ProxySection::build(store, Arc::new(Factory), queue.dispatcher()).unwrap();
        (queue, section)
    }

    fn param(section: &ProxySection, key: &str) -> Parameter {
        section.parameters().get(key).unwrap().clone()
    }

    #[test]
    fn everything_starts_disabled() {
        let (_queue, section) = build();
        for key in [ENABLE_SOCKS, HOST, PORT, TRACKER_DNS_DISABLE, PEER_SAME, PEER_HOST] {
            assert!(!param(&section, key).is_enabled(), "{key} should be disabled");
        }
        assert!(!section.test_control().is_enabled());
        assert!(section.test_target().is_none());
    }

    #[test]
    fn disabling_proxy_cascades_to_dns_option() {
        let (_queue, section) = build();
        param(&section, ENABLE_PROXY).set_bool(true).unwrap();
        param(&section, ENABLE_SOCKS).set_bool(true).unwrap();
        assert!(param(&section, TRACKER_DNS_DISABLE).is_enabled());

        param(&section, ENABLE_PROXY).set_bool(false).unwrap();
        assert!(!param(&section, ENABLE_SOCKS).is_enabled());
        assert!(!param(&section, TRACKER_DNS_DISABLE).is_enabled());
    }

    #[test]
    fn test_control_follows_complete_target() {
        let (_queue, section) = build();
        param(&section, ENABLE_PROXY).set_bool(true).unwrap();
        param(&section, ENABLE_SOCKS).set_bool(true).unwrap();
        param(&section, HOST).set_text("localhost").unwrap();
        assert!(!section.test_control().is_enabled());

        param(&section, PORT).set_text("abc").unwrap();
        assert!(!section.test_control().is_enabled());
        assert!(section.test_target().is_none());

        param(&section, PORT).set_text("1080").unwrap();
        assert!(section.test_control().is_enabled());
        let target = section.test_target().unwrap();
        assert_eq!((target.host(), target.port()), ("localhost", 1080));

        param(&section, ENABLE_SOCKS).set_bool(false).unwrap();
        assert!(!section.test_control().is_enabled());
        assert!(section.test_target().is_none());
    }

    #[test]
    fn peer_server_needs_peer_enabled_and_not_same() {
        let (_queue, section) = build();
        let host = param(&section, PEER_HOST);
        param(&section, PEER_ENABLE).set_bool(true).unwrap();
        assert!(param(&section, PEER_VERSION).is_enabled());
        assert!(host.is_enabled());

        param(&section, PEER_SAME).set_bool(true).unwrap();
        assert!(!host.is_enabled());
        assert!(param(&section, PEER_INFORM).is_enabled());

        param(&section, PEER_ENABLE).set_bool(false).unwrap();
        param(&section, PEER_SAME).set_bool(false).unwrap();
        assert!(!host.is_enabled());
    }

    #[test]
    fn show_icon_enables_flag_incoming() {
        let (_queue, section) = build();
        let flag = param(&section, SHOW_ICON_FLAG_INCOMING);
        assert!(!flag.is_enabled());
        param(&section, SHOW_ICON).set_bool(true).unwrap();
        assert!(flag.is_enabled());
    }

    #[test]
    fn proxy_test_runs_against_slot() {
        let (queue, section) = build();
        param(&section, ENABLE_PROXY).set_bool(true).unwrap();
        param(&section, ENABLE_SOCKS).set_bool(true).unwrap();
        param(&section, HOST).set_text("localhost").unwrap();
        param(&section, PORT).set_text("1080").unwrap();
        let transcript = crate::progress::SharedTranscript::new();
        let sink = ProgressSink::new(queue.dispatcher(), transcript.clone());
        let controller = section.start_proxy_test(sink, |_| {}).unwrap();
        assert_eq!(controller.target(), "localhost:1080");
        assert!(queue.run_until(
            || controller.is_finished(),
            std::time::Duration::from_secs(10)
        ));
        let rendered = transcript.snapshot().rendered().to_string();
        assert!(rendered.contains("Connection OK - supported version(s): V5\n"));
        assert!(rendered.ends_with("Proxy test Complete!\n"));
    }

    #[test]
    fn proxy_test_header_comes_before_any_filler() {
        let (queue, section) = build();
        param(&section, ENABLE_PROXY).set_bool(true).unwrap();
        param(&section, ENABLE_SOCKS).set_bool(true).unwrap();
        param(&section, HOST).set_text("localhost").unwrap();
        param(&section, PORT).set_text("1080").unwrap();
        for _ in 0..20 {
            let transcript = crate::progress::SharedTranscript::new();
            let sink = ProgressSink::new(queue.dispatcher(), transcript.clone());
            let controller = section.start_proxy_test(sink, |_| {}).unwrap();
            assert!(queue.run_until(
                || controller.is_finished(),
                std::time::Duration::from_secs(10)
            ));
            let rendered = transcript.snapshot().rendered().to_string();
            assert!(
                rendered.starts_with("Testing SOCKS connection to localhost:1080\n"),
                "unexpected transcript: {rendered:?}"
            );
        }
    }
}
