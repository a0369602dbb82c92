//! Simulated radio and host stack
//!
//! In-process implementations of [`RadioDriver`] and [`NetStack`] with
//! scriptable behavior and call journals. The integration suite drives the
//! whole bridging lifecycle through them; they also serve as a host-side
//! harness when no radio hardware is present.
//!
//! Event delivery mimics the real driver: `connect`/`disconnect` report
//! their outcome synchronously through the installed event hook, so worker
//! waits resolve deterministically.

use std::sync::Arc;

use netcommon::addr::{IpInfo, MacAddr};
use netcommon::error::{Error, Result};
use parking_lot::Mutex;

use crate::netif::NetStack;
use crate::radio::{ApClient, PowerSave, RadioDriver, RadioEvent, RxFrame, WifiIf};

type EventHook = Box<dyn Fn(RadioEvent) + Send + Sync>;

/// How `connect()` behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Report STA_CONNECTED immediately (association succeeds)
    Announce,
    /// Swallow the attempt; no event ever arrives (association hangs)
    Silent,
}

/// One recorded driver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Connect,
    Disconnect,
    SetStaMac(MacAddr),
    Pin(MacAddr, u8),
    Unpin,
    PowerSave(PowerSave),
    Ingress(WifiIf, bool),
}

struct RadioState {
    sta_mac: MacAddr,
    ap_mac: MacAddr,
    clients: Vec<ApClient>,
    upstream_bssid: MacAddr,
    upstream_channel: u8,
    connect_behavior: ConnectBehavior,
    fail_set_mac: bool,
    pinned: Option<(MacAddr, u8)>,
    calls: Vec<RadioCall>,
    transmitted: Vec<(WifiIf, Vec<u8>)>,
}

/// Scriptable in-process radio
pub struct SimRadio {
    state: Mutex<RadioState>,
    hook: Mutex<Option<EventHook>>,
}

impl SimRadio {
    pub fn new(sta_mac: MacAddr, ap_mac: MacAddr) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RadioState {
                sta_mac,
                ap_mac,
                clients: Vec::new(),
                upstream_bssid: MacAddr([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]),
                upstream_channel: 6,
                connect_behavior: ConnectBehavior::Announce,
                fail_set_mac: false,
                pinned: None,
                calls: Vec::new(),
                transmitted: Vec::new(),
            }),
            hook: Mutex::new(None),
        })
    }

    /// Install the event sink (usually `Repeater::handle_event`)
    pub fn set_hook<F: Fn(RadioEvent) + Send + Sync + 'static>(&self, hook: F) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        self.state.lock().connect_behavior = behavior;
    }

    pub fn set_fail_set_mac(&self, fail: bool) {
        self.state.lock().fail_set_mac = fail;
    }

    /// Add a client to the authoritative association list (does not emit
    /// the join event; tests drive events explicitly)
    pub fn add_client(&self, mac: MacAddr, aid: u16) {
        self.state.lock().clients.push(ApClient { mac, aid });
    }

    pub fn remove_client(&self, mac: MacAddr) {
        self.state.lock().clients.retain(|c| c.mac != mac);
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.state.lock().calls.clone()
    }

    pub fn transmitted(&self) -> Vec<(WifiIf, Vec<u8>)> {
        self.state.lock().transmitted.clone()
    }

    pub fn take_transmitted(&self) -> Vec<(WifiIf, Vec<u8>)> {
        std::mem::take(&mut self.state.lock().transmitted)
    }

    pub fn pinned(&self) -> Option<(MacAddr, u8)> {
        self.state.lock().pinned
    }

    fn emit(&self, event: RadioEvent) {
        // Never hold the state lock across the hook: the handler calls
        // straight back into the driver
        if let Some(hook) = &*self.hook.lock() {
            hook(event);
        }
    }
}

impl RadioDriver for SimRadio {
    fn sta_mac(&self) -> MacAddr {
        self.state.lock().sta_mac
    }

    fn ap_mac(&self) -> MacAddr {
        self.state.lock().ap_mac
    }

    fn set_sta_mac(&self, mac: MacAddr) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(RadioCall::SetStaMac(mac));
        if state.fail_set_mac {
            return Err(Error::Driver("simulated set_mac failure".to_string()));
        }
        state.sta_mac = mac;
        Ok(())
    }

    fn connect(&self) -> Result<()> {
        let (behavior, bssid, channel) = {
            let mut state = self.state.lock();
            state.calls.push(RadioCall::Connect);
            (
                state.connect_behavior,
                state.upstream_bssid,
                state.upstream_channel,
            )
        };
        if behavior == ConnectBehavior::Announce {
            self.emit(RadioEvent::StaConnected { bssid, channel });
        }
        Ok(())
    }

    fn disconnect(&self) {
        self.state.lock().calls.push(RadioCall::Disconnect);
        self.emit(RadioEvent::StaDisconnected { reason: 8 });
    }

    fn pin_association(&self, bssid: MacAddr, channel: u8) {
        let mut state = self.state.lock();
        state.calls.push(RadioCall::Pin(bssid, channel));
        state.pinned = Some((bssid, channel));
    }

    fn unpin_association(&self) {
        let mut state = self.state.lock();
        state.calls.push(RadioCall::Unpin);
        state.pinned = None;
    }

    fn transmit(&self, iface: WifiIf, frame: &[u8]) {
        self.state.lock().transmitted.push((iface, frame.to_vec()));
    }

    fn ap_client_list(&self) -> Vec<ApClient> {
        self.state.lock().clients.clone()
    }

    fn set_power_save(&self, mode: PowerSave) {
        self.state.lock().calls.push(RadioCall::PowerSave(mode));
    }

    fn set_ingress(&self, iface: WifiIf, enabled: bool) {
        self.state
            .lock()
            .calls
            .push(RadioCall::Ingress(iface, enabled));
    }
}

/// One recorded stack call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCall {
    SetIpInfo(WifiIf, IpInfo),
    StartDhcpClient(WifiIf),
    StopDhcpClient(WifiIf),
    StartDhcpServer(WifiIf),
    StopDhcpServer(WifiIf),
}

struct StackState {
    delivered: Vec<(WifiIf, Vec<u8>)>,
    ip_info: Vec<(WifiIf, IpInfo)>,
    sta_dhcp_client: bool,
    ap_dhcp_server: bool,
    calls: Vec<StackCall>,
}

/// Recording host IP stack
pub struct SimStack {
    state: Mutex<StackState>,
}

impl SimStack {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StackState {
                delivered: Vec::new(),
                ip_info: Vec::new(),
                // Boot defaults: STA runs its DHCP client, AP serves DHCP
                sta_dhcp_client: true,
                ap_dhcp_server: true,
                calls: Vec::new(),
            }),
        })
    }

    pub fn delivered(&self) -> Vec<(WifiIf, Vec<u8>)> {
        self.state.lock().delivered.clone()
    }

    pub fn take_delivered(&self) -> Vec<(WifiIf, Vec<u8>)> {
        std::mem::take(&mut self.state.lock().delivered)
    }

    /// Most recent address configured on the interface
    pub fn last_ip_info(&self, iface: WifiIf) -> Option<IpInfo> {
        self.state
            .lock()
            .ip_info
            .iter()
            .rev()
            .find(|(i, _)| *i == iface)
            .map(|(_, info)| *info)
    }

    pub fn sta_dhcp_client_running(&self) -> bool {
        self.state.lock().sta_dhcp_client
    }

    pub fn ap_dhcp_server_running(&self) -> bool {
        self.state.lock().ap_dhcp_server
    }

    pub fn calls(&self) -> Vec<StackCall> {
        self.state.lock().calls.clone()
    }
}

impl NetStack for SimStack {
    fn deliver(&self, iface: WifiIf, frame: RxFrame) {
        self.state.lock().delivered.push((iface, frame.into_vec()));
    }

    fn set_ip_info(&self, iface: WifiIf, info: IpInfo) {
        let mut state = self.state.lock();
        state.calls.push(StackCall::SetIpInfo(iface, info));
        state.ip_info.push((iface, info));
    }

    fn start_dhcp_client(&self, iface: WifiIf) {
        let mut state = self.state.lock();
        state.calls.push(StackCall::StartDhcpClient(iface));
        if iface == WifiIf::Sta {
            state.sta_dhcp_client = true;
        }
    }

    fn stop_dhcp_client(&self, iface: WifiIf) {
        let mut state = self.state.lock();
        state.calls.push(StackCall::StopDhcpClient(iface));
        if iface == WifiIf::Sta {
            state.sta_dhcp_client = false;
        }
    }

    fn start_dhcp_server(&self, iface: WifiIf) {
        let mut state = self.state.lock();
        state.calls.push(StackCall::StartDhcpServer(iface));
        if iface == WifiIf::Ap {
            state.ap_dhcp_server = true;
        }
    }

    fn stop_dhcp_server(&self, iface: WifiIf) {
        let mut state = self.state.lock();
        state.calls.push(StackCall::StopDhcpServer(iface));
        if iface == WifiIf::Ap {
            state.ap_dhcp_server = false;
        }
    }
}
