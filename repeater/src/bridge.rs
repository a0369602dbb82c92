//! Bridging state machine
//!
//! The repeater core: owns the cloning state, dispatches radio and IP
//! events into state transitions, and controls when L2 forwarding is
//! active. MAC-change sequences themselves run on the worker (see
//! `worker`); this module decides when to request them.
//!
//! Hot-path state (`forwarding`, `mac_cloned`, the cloned MAC, the client
//! count) is published through atomics so the ingress callbacks read a
//! consistent snapshot without taking a lock. Writers are the worker
//! (under the worker gate) and the radio event thread.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use netcommon::addr::{is_link_local, IpInfo, MacAddr};
use netcommon::config::RepeaterConfig;
use netcommon::sync::EventGroup;
use parking_lot::Mutex;

use crate::constants::*;
use crate::macnat::MacNatTable;
use crate::netif::NetStack;
use crate::radio::{PowerSave, RadioDriver, RadioEvent, WifiIf};

/// Bridging state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RepeaterState {
    /// STA uses the factory MAC, its DHCP client runs, forwarding is off
    Idle = 0,
    /// Worker is cloning a client MAC onto STA
    MacChanging = 1,
    /// STA carries a cloned client MAC, forwarding is on
    Bridging = 2,
    /// Worker is reverting STA to the factory MAC
    MacRestoring = 3,
}

impl RepeaterState {
    pub fn as_str(self) -> &'static str {
        match self {
            RepeaterState::Idle => "IDLE",
            RepeaterState::MacChanging => "MAC_CHANGING",
            RepeaterState::Bridging => "BRIDGING",
            RepeaterState::MacRestoring => "MAC_RESTORING",
        }
    }

    fn from_u8(v: u8) -> RepeaterState {
        match v {
            1 => RepeaterState::MacChanging,
            2 => RepeaterState::Bridging,
            3 => RepeaterState::MacRestoring,
            _ => RepeaterState::Idle,
        }
    }
}

/// BSSID and channel of the first successful upstream association.
///
/// Locked once per process; reconnections after MAC changes are pinned to
/// the same AP and channel instead of rescanning.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamAnchor {
    pub bssid: MacAddr,
    pub channel: u8,
}

/// Wait and settle durations used by the worker and the event handlers.
///
/// Defaults are the production values; tests shrink them.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub disconnect_wait: Duration,
    pub connect_wait: Duration,
    pub worker_gate_wait: Duration,
    pub mac_settle: Duration,
    pub reconnect_settle: Duration,
    pub auto_reconnect_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            disconnect_wait: DISCONNECT_WAIT,
            connect_wait: CONNECT_WAIT,
            worker_gate_wait: WORKER_GATE_WAIT,
            mac_settle: MAC_SETTLE_DELAY,
            reconnect_settle: RECONNECT_SETTLE_DELAY,
            auto_reconnect_delay: AUTO_RECONNECT_DELAY,
        }
    }
}

pub(crate) struct Inner {
    pub(crate) config: RepeaterConfig,
    pub(crate) driver: Arc<dyn RadioDriver>,
    pub(crate) stack: Arc<dyn NetStack>,
    pub(crate) timings: Timings,

    // Fixed identities
    pub(crate) original_sta_mac: MacAddr,
    pub(crate) ap_mac: MacAddr,

    // Hot-path flags, read lock-free by the ingress callbacks
    pub(crate) state: AtomicU8,
    pub(crate) sta_connected: AtomicBool,
    pub(crate) forwarding: AtomicBool,
    pub(crate) mac_cloned: AtomicBool,
    pub(crate) cloned_mac: AtomicU64,
    pub(crate) client_count: AtomicUsize,
    pub(crate) ap_ip: AtomicU32,
    pub(crate) ap_ip_from_sniff: AtomicBool,

    // Written only from the two ingress threads; short-held
    pub(crate) macnat: Mutex<MacNatTable>,

    // Worker coordination
    pub(crate) events: EventGroup,
    pub(crate) suppress_reconnect: AtomicBool,
    pub(crate) worker_gate: Mutex<()>,

    pub(crate) anchor: Mutex<Option<UpstreamAnchor>>,
    pub(crate) started_at: Instant,
}

/// Handle to the repeater core. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Repeater {
    pub(crate) inner: Arc<Inner>,
}

impl Repeater {
    pub fn new(
        driver: Arc<dyn RadioDriver>,
        stack: Arc<dyn NetStack>,
        config: RepeaterConfig,
    ) -> Self {
        Self::with_timings(driver, stack, config, Timings::default())
    }

    pub fn with_timings(
        driver: Arc<dyn RadioDriver>,
        stack: Arc<dyn NetStack>,
        config: RepeaterConfig,
        timings: Timings,
    ) -> Self {
        let original_sta_mac = driver.sta_mac();
        let ap_mac = driver.ap_mac();
        info!("STA MAC: {}", original_sta_mac);
        info!("AP  MAC: {}", ap_mac);

        Self {
            inner: Arc::new(Inner {
                config,
                driver,
                stack,
                timings,
                original_sta_mac,
                ap_mac,
                state: AtomicU8::new(RepeaterState::Idle as u8),
                sta_connected: AtomicBool::new(false),
                forwarding: AtomicBool::new(false),
                mac_cloned: AtomicBool::new(false),
                cloned_mac: AtomicU64::new(MacAddr::ZERO.to_u64()),
                client_count: AtomicUsize::new(0),
                ap_ip: AtomicU32::new(u32::from(AP_MANAGEMENT_IP)),
                ap_ip_from_sniff: AtomicBool::new(false),
                macnat: Mutex::new(MacNatTable::new()),
                events: EventGroup::new(),
                suppress_reconnect: AtomicBool::new(false),
                worker_gate: Mutex::new(()),
                anchor: Mutex::new(None),
                started_at: Instant::now(),
            }),
        }
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn state(&self) -> RepeaterState {
        RepeaterState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: RepeaterState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    pub fn sta_connected(&self) -> bool {
        self.inner.sta_connected.load(Ordering::Acquire)
    }

    pub fn forwarding_active(&self) -> bool {
        self.inner.forwarding.load(Ordering::Acquire)
    }

    pub fn is_mac_cloned(&self) -> bool {
        self.inner.mac_cloned.load(Ordering::Acquire)
    }

    /// The client MAC currently impersonated on STA (zero when none)
    pub fn cloned_mac(&self) -> MacAddr {
        MacAddr::from_u64(self.inner.cloned_mac.load(Ordering::Acquire))
    }

    pub fn client_count(&self) -> usize {
        self.inner.client_count.load(Ordering::Acquire)
    }

    pub fn original_sta_mac(&self) -> MacAddr {
        self.inner.original_sta_mac
    }

    pub fn ap_mac(&self) -> MacAddr {
        self.inner.ap_mac
    }

    pub fn config(&self) -> &RepeaterConfig {
        &self.inner.config
    }

    pub fn macnat_len(&self) -> usize {
        self.inner.macnat.lock().len()
    }

    pub fn upstream_anchor(&self) -> Option<UpstreamAnchor> {
        *self.inner.anchor.lock()
    }

    // ── Event dispatch ──────────────────────────────────────────

    /// Translate a radio/IP event into state-machine transitions.
    ///
    /// Called from the driver's event thread. Never blocks: it flips
    /// flags, posts event bits, or spawns the worker.
    pub fn handle_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::StaStart => {
                info!("STA started");
                if !self.inner.suppress_reconnect.load(Ordering::Acquire) {
                    info!("  Auto-connecting...");
                    if let Err(err) = self.inner.driver.connect() {
                        warn!("  Connect failed: {}", err);
                    }
                }
            }
            RadioEvent::StaConnected { bssid, channel } => {
                self.on_sta_connected(bssid, channel)
            }
            RadioEvent::StaDisconnected { reason } => self.on_sta_disconnected(reason),
            RadioEvent::ApClientJoin { mac, aid } => self.on_client_join(mac, aid),
            RadioEvent::ApClientLeave { mac, aid } => self.on_client_leave(mac, aid),
            RadioEvent::StaGotIp { info } => self.on_sta_got_ip(info),
            RadioEvent::StaLostIp => {
                warn!("STA lost IP, restoring AP management subnet");
                self.ap_restore_management_ip();
            }
        }
    }

    fn on_sta_connected(&self, bssid: MacAddr, channel: u8) {
        info!(">> Connected to upstream (ch {}, BSSID {})", channel, bssid);
        self.inner.sta_connected.store(true, Ordering::Release);
        self.inner.events.set(STA_CONNECTED_BIT);
        self.inner.events.clear(STA_DISCONNECTED_BIT);

        // Latch the upstream anchor on the first association; reconnects
        // after MAC changes are pinned to it instead of rescanning
        {
            let mut anchor = self.inner.anchor.lock();
            if anchor.is_none() {
                *anchor = Some(UpstreamAnchor { bssid, channel });
                info!("  BSSID locked: {} ch {}", bssid, channel);
            }
        }

        // Forwarding resumes only for an association carrying a cloned MAC.
        // RESTORE clears `mac_cloned` before it reconnects, and the state
        // check keeps a late event from racing the restore worker.
        if self.is_mac_cloned() && self.state() != RepeaterState::MacRestoring {
            if self.state() == RepeaterState::MacChanging {
                self.set_state(RepeaterState::Bridging);
            }
            self.forwarding_start();
        }
    }

    fn on_sta_disconnected(&self, reason: u16) {
        warn!("<< Disconnected from upstream (reason {})", reason);
        self.inner.sta_connected.store(false, Ordering::Release);
        self.inner.events.set(STA_DISCONNECTED_BIT);
        self.inner.events.clear(STA_CONNECTED_BIT);

        self.forwarding_stop();

        // Auto-reconnect unless a worker owns the connection transitions.
        // The delay runs off-thread; the event handler must not block.
        if !self.inner.suppress_reconnect.load(Ordering::Acquire) {
            let rep = self.clone();
            thread::spawn(move || {
                thread::sleep(rep.inner.timings.auto_reconnect_delay);
                if rep.inner.suppress_reconnect.load(Ordering::Acquire)
                    || rep.sta_connected()
                {
                    return;
                }
                info!("Auto-reconnecting...");
                if let Err(err) = rep.inner.driver.connect() {
                    warn!("Auto-reconnect failed: {}", err);
                }
            });
        }
    }

    fn on_client_join(&self, mac: MacAddr, aid: u16) {
        let count = self.inner.driver.ap_client_list().len();
        self.inner.client_count.store(count, Ordering::Release);
        info!("-> Client joined: {} (AID={}, total={})", mac, aid, count);

        if self.state() == RepeaterState::Idle && !self.is_mac_cloned() {
            self.request_mac_clone(mac);
        } else if self.is_mac_cloned() {
            // Bridge already up: the extra client rides the MAC-NAT table,
            // no MAC change needed
            info!(
                "MAC-NAT: additional client {} will share cloned MAC {}",
                mac,
                self.cloned_mac()
            );
        }
    }

    fn on_client_leave(&self, mac: MacAddr, aid: u16) {
        // The driver list is authoritative; filter the leaver out in case
        // its entry is still present (or the leave event is a duplicate)
        let remaining: Vec<_> = self
            .inner
            .driver
            .ap_client_list()
            .into_iter()
            .filter(|c| c.mac != mac)
            .collect();
        self.inner
            .client_count
            .store(remaining.len(), Ordering::Release);
        info!(
            "<- Client left: {} (AID={}, total={})",
            mac,
            aid,
            remaining.len()
        );

        if self.is_mac_cloned() && mac == self.cloned_mac() {
            if remaining.is_empty() {
                info!("Last client left, restoring MAC...");
                self.request_mac_restore();
            } else {
                info!(
                    "Cloned client left, {} other client(s) remain. Re-cloning for {}...",
                    remaining.len(),
                    remaining[0].mac
                );
                self.request_mac_clone(remaining[0].mac);
            }
        }
    }

    fn on_sta_got_ip(&self, info: IpInfo) {
        info!("=== Got IP: {} ===", info);
        self.inner.events.set(STA_CONNECTED_BIT);
        self.ap_mirror_sta_ip(info);
    }

    // ── Forwarding control ──────────────────────────────────────

    pub(crate) fn forwarding_start(&self) {
        if self.inner.forwarding.load(Ordering::Acquire) {
            return;
        }
        info!(">>> Forwarding START");
        // Power save off: minimum latency while bridging
        self.inner.driver.set_power_save(PowerSave::Off);
        self.inner.driver.set_ingress(WifiIf::Sta, true);
        self.inner.driver.set_ingress(WifiIf::Ap, true);
        self.inner.forwarding.store(true, Ordering::Release);
    }

    pub(crate) fn forwarding_stop(&self) {
        if !self.inner.forwarding.load(Ordering::Acquire) {
            return;
        }
        info!("<<< Forwarding STOP");
        self.inner.driver.set_ingress(WifiIf::Sta, false);
        self.inner.driver.set_ingress(WifiIf::Ap, false);
        self.inner.forwarding.store(false, Ordering::Release);
        self.inner.driver.set_power_save(PowerSave::MinModem);
    }

    // ── AP interface addressing ─────────────────────────────────

    /// Mirror the STA address onto the AP interface so bridged clients
    /// reach the configuration endpoint at the same address as STA.
    ///
    /// Link-local addresses are artifacts of the placeholder assigned
    /// while the STA DHCP client is stopped; they never reach the AP.
    pub(crate) fn ap_mirror_sta_ip(&self, sta_info: IpInfo) {
        if is_link_local(sta_info.ip) {
            warn!(
                "Ignoring link-local STA IP {} (waiting for DHCP ACK sniff)",
                sta_info.ip
            );
            return;
        }
        if sta_info.ip.is_unspecified() {
            warn!("Ignoring zero STA IP");
            return;
        }

        // Upstream DHCP serves the bridged clients; ours stays off
        self.inner.stack.stop_dhcp_server(WifiIf::Ap);
        let ap_info = IpInfo::new(sta_info.ip, sta_info.netmask, Ipv4Addr::UNSPECIFIED);
        self.inner.stack.set_ip_info(WifiIf::Ap, ap_info);
        self.inner
            .ap_ip
            .store(u32::from(sta_info.ip), Ordering::Release);
        info!("AP IP mirrored to {} (same subnet as upstream)", sta_info.ip);
    }

    /// Test-only: place the core directly into BRIDGING without running
    /// the worker sequence.
    #[cfg(test)]
    pub(crate) fn force_bridging(&self, cloned: MacAddr, client_count: usize) {
        self.inner
            .cloned_mac
            .store(cloned.to_u64(), Ordering::Release);
        self.inner.mac_cloned.store(true, Ordering::Release);
        self.inner.sta_connected.store(true, Ordering::Release);
        self.inner.forwarding.store(true, Ordering::Release);
        self.inner
            .client_count
            .store(client_count, Ordering::Release);
        self.set_state(RepeaterState::Bridging);
    }

    /// Put the AP back on the management subnet with its DHCP server
    /// running (setup/fallback mode)
    pub(crate) fn ap_restore_management_ip(&self) {
        self.inner.stack.stop_dhcp_server(WifiIf::Ap);
        let info = IpInfo::new(AP_MANAGEMENT_IP, AP_MANAGEMENT_NETMASK, AP_MANAGEMENT_IP);
        self.inner.stack.set_ip_info(WifiIf::Ap, info);
        self.inner.stack.start_dhcp_server(WifiIf::Ap);
        self.inner
            .ap_ip
            .store(u32::from(AP_MANAGEMENT_IP), Ordering::Release);
        info!(
            "AP IP restored to {} (setup mode, DHCP ON)",
            AP_MANAGEMENT_IP
        );
    }
}
