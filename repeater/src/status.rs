//! Read-only status view
//!
//! Snapshot of the core consumed by the external HTTP configuration
//! server's `/status` endpoint, plus a low-priority sampler thread that
//! logs the same picture periodically.

use std::thread;
use std::time::Duration;

use log::info;
use netcommon::addr::MacAddr;

use crate::bridge::{Repeater, RepeaterState};
use crate::radio::ApClient;

/// Point-in-time view of the repeater core
#[derive(Debug, Clone)]
pub struct StatusView {
    pub state: RepeaterState,
    pub sta_connected: bool,
    pub mac_cloned: bool,
    /// Current STA hardware address (factory or cloned)
    pub sta_mac: MacAddr,
    pub forwarding: bool,
    pub clients: Vec<ApClient>,
    pub macnat_entries: usize,
    pub uptime: Duration,
}

impl Repeater {
    /// Take a consistent-enough snapshot for display purposes
    pub fn status(&self) -> StatusView {
        StatusView {
            state: self.state(),
            sta_connected: self.sta_connected(),
            mac_cloned: self.is_mac_cloned(),
            sta_mac: self.inner.driver.sta_mac(),
            forwarding: self.forwarding_active(),
            clients: self.inner.driver.ap_client_list(),
            macnat_entries: self.macnat_len(),
            uptime: self.inner.started_at.elapsed(),
        }
    }

    /// Spawn the periodic status sampler. Runs for the life of the
    /// process; the handle is returned for callers that want to park on it.
    pub fn spawn_status_sampler(&self, interval: Duration) -> thread::JoinHandle<()> {
        let rep = self.clone();
        thread::spawn(move || loop {
            thread::sleep(interval);
            let status = rep.status();
            info!("--- Status [{}] ---", status.state.as_str());
            info!(
                "  STA MAC: {} {}",
                status.sta_mac,
                if status.mac_cloned { "(CLONED)" } else { "(original)" }
            );
            info!(
                "  Upstream: {}",
                if status.sta_connected { "connected" } else { "not connected" }
            );
            info!("  Clients: {}", status.clients.len());
            for (i, client) in status.clients.iter().enumerate() {
                info!("    [{}] {} AID:{}", i + 1, client.mac, client.aid);
            }
            info!(
                "  Forwarding: {}",
                if status.forwarding { "ON" } else { "OFF" }
            );
        })
    }
}
