//! MAC-change worker
//!
//! Cloning or restoring the STA hardware address requires a
//! disconnect→set-MAC→reconnect sequence that generates its own radio
//! events, so it runs on a dedicated thread instead of the event handler.
//! The worker gate serializes sequences: at most one MAC change is in
//! flight system-wide, and a request that cannot take the gate within the
//! bounded wait is dropped with a warning (the next join/leave event
//! drives the next transition).

use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::thread;

use log::{error, info, warn};
use netcommon::addr::{IpInfo, MacAddr};

use crate::bridge::{Repeater, RepeaterState};
use crate::constants::*;
use crate::radio::WifiIf;

enum MacChange {
    Clone(MacAddr),
    Restore,
}

impl Repeater {
    pub(crate) fn request_mac_clone(&self, target: MacAddr) {
        self.spawn_worker("mac_clone", MacChange::Clone(target));
    }

    pub(crate) fn request_mac_restore(&self) {
        self.spawn_worker("mac_restore", MacChange::Restore);
    }

    fn spawn_worker(&self, name: &str, change: MacChange) {
        let rep = self.clone();
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || rep.run_mac_change(change));
        if let Err(err) = spawned {
            error!("Failed to spawn {} worker: {}", name, err);
        }
    }

    fn run_mac_change(&self, change: MacChange) {
        let timings = self.inner.timings;
        let Some(_gate) = self.inner.worker_gate.try_lock_for(timings.worker_gate_wait)
        else {
            warn!("MAC change already in progress, dropping request");
            return;
        };

        match change {
            MacChange::Clone(target) => self.run_clone(target),
            MacChange::Restore => self.run_restore(),
        }
    }

    /// Disconnect, clone `target` onto STA, reconnect pinned to the
    /// upstream anchor. Ends in BRIDGING on success, IDLE on any failure.
    fn run_clone(&self, target: MacAddr) {
        let inner = &self.inner;
        let timings = inner.timings;

        self.set_state(RepeaterState::MacChanging);
        info!("=== MAC CLONE: {} ===", target);

        self.forwarding_stop();
        inner.suppress_reconnect.store(true, Ordering::Release);

        info!("  Disconnecting STA...");
        // Drop any stale bit so an earlier disconnect cannot satisfy this wait
        inner.events.clear(STA_DISCONNECTED_BIT);
        inner.driver.disconnect();
        inner
            .events
            .wait(STA_DISCONNECTED_BIT, true, timings.disconnect_wait);
        thread::sleep(timings.mac_settle);

        // The STA DHCP client must not race the client that shares its MAC.
        // The placeholder keeps the host network layer satisfied; it never
        // appears in bridged traffic and the AP-mirror path filters it.
        inner.stack.stop_dhcp_client(WifiIf::Sta);
        inner.stack.set_ip_info(
            WifiIf::Sta,
            IpInfo::new(
                STA_PLACEHOLDER_IP,
                STA_PLACEHOLDER_NETMASK,
                Ipv4Addr::UNSPECIFIED,
            ),
        );
        info!("  DHCP client stopped on STA");

        if let Err(err) = inner.driver.set_sta_mac(target) {
            error!("  set_sta_mac failed: {}", err);
            // The STA must end with a valid address: fall back to the factory
            // MAC and resume as a plain station
            if let Err(err) = inner.driver.set_sta_mac(inner.original_sta_mac) {
                error!("  restoring factory MAC also failed: {}", err);
            }
            inner.stack.start_dhcp_client(WifiIf::Sta);
            inner.suppress_reconnect.store(false, Ordering::Release);
            if let Err(err) = inner.driver.connect() {
                warn!("  reconnect failed: {}", err);
            }
            self.set_state(RepeaterState::Idle);
            return;
        }
        info!("  STA MAC now: {}", inner.driver.sta_mac());

        // Both cloning fields change together, under the worker gate
        inner.cloned_mac.store(target.to_u64(), Ordering::Release);
        inner.mac_cloned.store(true, Ordering::Release);

        if let Some(anchor) = *inner.anchor.lock() {
            inner.driver.pin_association(anchor.bssid, anchor.channel);
            info!("  BSSID pinned: {} ch {}", anchor.bssid, anchor.channel);
        }

        info!("  Reconnecting with cloned MAC...");
        thread::sleep(timings.reconnect_settle);
        inner.suppress_reconnect.store(false, Ordering::Release);
        if let Err(err) = inner.driver.connect() {
            warn!("  connect failed: {}", err);
        }

        let bits = inner
            .events
            .wait(STA_CONNECTED_BIT, false, timings.connect_wait);
        if bits & STA_CONNECTED_BIT != 0 {
            info!("=== BRIDGE ACTIVE ===");
            // Forwarding was started by the CONNECTED handler
            self.set_state(RepeaterState::Bridging);
        } else {
            error!("  Reconnect timeout! Restoring original MAC...");
            inner.suppress_reconnect.store(true, Ordering::Release);
            inner.driver.disconnect();
            thread::sleep(timings.reconnect_settle);
            if let Err(err) = inner.driver.set_sta_mac(inner.original_sta_mac) {
                error!("  restoring factory MAC failed: {}", err);
            }
            inner.mac_cloned.store(false, Ordering::Release);
            inner
                .cloned_mac
                .store(MacAddr::ZERO.to_u64(), Ordering::Release);
            inner.stack.start_dhcp_client(WifiIf::Sta);
            // Allow a full scan on the fallback association
            inner.driver.unpin_association();
            thread::sleep(timings.reconnect_settle);
            inner.suppress_reconnect.store(false, Ordering::Release);
            if let Err(err) = inner.driver.connect() {
                warn!("  reconnect failed: {}", err);
            }
            self.set_state(RepeaterState::Idle);
        }
    }

    /// Disconnect, revert STA to the factory MAC, clear the bridging
    /// session (MAC-NAT, sniffed AP address), reconnect with a full scan.
    /// Ends in IDLE.
    fn run_restore(&self) {
        let inner = &self.inner;
        let timings = inner.timings;

        self.set_state(RepeaterState::MacRestoring);
        info!("=== MAC RESTORE ===");

        self.forwarding_stop();
        inner.suppress_reconnect.store(true, Ordering::Release);

        info!("  Disconnecting STA...");
        inner.events.clear(STA_DISCONNECTED_BIT);
        inner.driver.disconnect();
        inner
            .events
            .wait(STA_DISCONNECTED_BIT, true, timings.disconnect_wait);
        thread::sleep(timings.mac_settle);

        if let Err(err) = inner.driver.set_sta_mac(inner.original_sta_mac) {
            error!("  restoring factory MAC failed: {}", err);
        }
        // Cleared before any reconnect: a CONNECTED event during restore
        // must never observe a cloned state and start forwarding
        inner.mac_cloned.store(false, Ordering::Release);
        inner
            .cloned_mac
            .store(MacAddr::ZERO.to_u64(), Ordering::Release);
        info!("  STA MAC restored: {}", inner.driver.sta_mac());

        inner.stack.start_dhcp_client(WifiIf::Sta);
        info!("  DHCP client re-enabled");

        // New bridging session means new mappings and a fresh AP address
        inner.macnat.lock().clear();
        inner.ap_ip_from_sniff.store(false, Ordering::Release);
        self.ap_restore_management_ip();

        // Unpin for the next association; the anchor stays latched and is
        // re-applied by the next clone
        inner.driver.unpin_association();

        info!("  Reconnecting with original MAC...");
        thread::sleep(timings.reconnect_settle);
        inner.suppress_reconnect.store(false, Ordering::Release);
        if let Err(err) = inner.driver.connect() {
            warn!("  reconnect failed: {}", err);
        }

        let bits = inner
            .events
            .wait(STA_CONNECTED_BIT, false, timings.connect_wait);
        if bits & STA_CONNECTED_BIT != 0 {
            info!("=== IDLE MODE (own IP) ===");
        } else {
            warn!("  Reconnect timeout, will retry automatically");
        }
        self.set_state(RepeaterState::Idle);
    }
}
