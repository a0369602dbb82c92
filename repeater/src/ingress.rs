//! Per-interface ingress callbacks
//!
//! These replace the default protocol-stack ingress for both interfaces
//! while forwarding is active. Each callback owns its frame buffer and
//! closes it out exactly once: deliver to the host stack or free.
//! Forwarding on the peer interface is a driver-level copy and is not
//! terminal.
//!
//! The callbacks never block and never allocate; they read the bridging
//! flags through atomics and take only the short-held MAC-NAT lock.

use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;

use log::info;
use netcommon::addr::{format_ipv4, ipv4_from_slice, IpInfo, MacAddr};

use crate::bridge::Repeater;
use crate::constants::*;
use crate::radio::{RxFrame, WifiIf};
use crate::rewrite::{rewrite_downstream, rewrite_upstream};
use crate::sniff::{parse_server_ack, select_ap_address};

impl Repeater {
    /// Ingress for frames received from the upstream AP on STA.
    pub fn on_sta_rx(&self, mut frame: RxFrame) {
        if frame.len() < ETH_HDR_LEN {
            frame.free();
            return;
        }

        // Inline DHCP ACK pre-check; short-circuits before any call for
        // nearly all traffic
        {
            let data = frame.data();
            if data.len() >= DHCP_MIN_SNIFF_LEN
                && data[ETH_TYPE_OFFSET] == 0x08
                && data[ETH_TYPE_OFFSET + 1] == 0x00
                && data[IPV4_PROTO_OFFSET] == IP_PROTO_UDP
            {
                let ihl = ((data[ETH_HDR_LEN] & 0x0f) as usize) * 4;
                let udp = ETH_HDR_LEN + ihl;
                if udp + 8 <= data.len()
                    && u16::from_be_bytes([data[udp], data[udp + 1]]) == DHCP_SERVER_PORT
                    && u16::from_be_bytes([data[udp + 2], data[udp + 3]]) == DHCP_CLIENT_PORT
                {
                    self.sniff_ack(data);
                }
            }
        }

        // MAC-NAT downstream: only needed once additional clients exist;
        // with a single (primary) client nothing ever needs rewriting
        let dst = MacAddr::from_slice(frame.data());
        if self.client_count() > 1 && !dst.is_multicast() {
            let cloned = self.cloned_mac();
            let table = self.inner.macnat.lock();
            rewrite_downstream(frame.data_mut(), cloned, &table);
        }

        // Forward everything to the client side
        self.inner.driver.transmit(WifiIf::Ap, frame.data());

        // Host stack delivery (re-read: the rewrite may have retargeted it)
        let dst = MacAddr::from_slice(frame.data());
        if dst.is_multicast() {
            // Broadcast/multicast is useful to the local stack too (ARP, mDNS)
            if self.broadcast_deliver_allowed(frame.data()) {
                self.inner.stack.deliver(WifiIf::Sta, frame);
            } else {
                frame.free();
            }
            return;
        }
        // Management traffic addressed to the repeater itself: either the
        // factory STA MAC or the MAC it currently impersonates
        if dst == self.inner.original_sta_mac || dst == self.cloned_mac() {
            self.inner.stack.deliver(WifiIf::Sta, frame);
            return;
        }

        // Unicast for a client: forwarded above, nothing more to do
        frame.free();
    }

    /// Ingress for frames received from downstream clients on AP.
    pub fn on_ap_rx(&self, mut frame: RxFrame) {
        if frame.len() < ETH_HDR_LEN {
            frame.free();
            return;
        }

        // MAC-NAT upstream: non-primary clients get their source masked
        let src = MacAddr::from_slice(&frame.data()[ETH_SRC_OFFSET..]);
        if self.client_count() > 1 && !src.is_multicast() && src != self.cloned_mac() {
            let cloned = self.cloned_mac();
            let mut table = self.inner.macnat.lock();
            rewrite_upstream(frame.data_mut(), cloned, &mut table);
        }

        let dst = MacAddr::from_slice(frame.data());
        if dst.is_multicast() {
            // Forward upstream and show it to the local AP stack as well
            if self.sta_connected() {
                self.inner.driver.transmit(WifiIf::Sta, frame.data());
            }
            if self.broadcast_deliver_allowed(frame.data()) {
                self.inner.stack.deliver(WifiIf::Ap, frame);
            } else {
                frame.free();
            }
            return;
        }

        // Unicast to the repeater's own AP MAC: configuration endpoint
        if dst == self.inner.ap_mac {
            self.inner.stack.deliver(WifiIf::Ap, frame);
            return;
        }

        // Unicast toward upstream
        if self.sta_connected() {
            self.inner.driver.transmit(WifiIf::Sta, frame.data());
        }
        frame.free();
    }

    /// Hot-path broadcast filter: when enabled, only ARP frames whose
    /// target protocol address is the repeater's own are delivered to the
    /// host stack; every other non-unicast frame is forwarded at L2 only.
    fn broadcast_deliver_allowed(&self, data: &[u8]) -> bool {
        if !self.inner.config.broadcast_filter {
            return true;
        }
        if data.len() < ARP_MIN_FRAME_LEN {
            return false;
        }
        if u16::from_be_bytes([data[ETH_TYPE_OFFSET], data[ETH_TYPE_OFFSET + 1]]) != ETH_TYPE_ARP
        {
            return false;
        }
        let target_ip = ipv4_from_slice(&data[ARP_TARGET_IP_OFFSET..]);
        target_ip == self.inner.ap_ip.load(Ordering::Acquire)
    }

    /// Handle a pre-verified server→client DHCP frame: learn the lease and,
    /// once per bridging session, derive the AP management address from the
    /// sniffed subnet.
    fn sniff_ack(&self, data: &[u8]) {
        let Some(ack) = parse_server_ack(data) else {
            return;
        };
        if ack.client_ip == 0 || ack.netmask == 0 {
            return;
        }

        self.inner.macnat.lock().learn(ack.client_ip, ack.chaddr);

        // AP address already derived this session; later ACKs only feed
        // the table
        if self.inner.ap_ip_from_sniff.load(Ordering::Acquire) {
            return;
        }

        info!(
            "DHCP ACK sniffed: client={} mask={} gw={}",
            format_ipv4(ack.client_ip),
            format_ipv4(ack.netmask),
            format_ipv4(ack.gateway)
        );

        let chosen = select_ap_address(ack.client_ip, ack.netmask, ack.gateway);
        self.inner.stack.stop_dhcp_server(WifiIf::Ap);
        self.inner.stack.set_ip_info(
            WifiIf::Ap,
            IpInfo::new(
                Ipv4Addr::from(chosen),
                Ipv4Addr::from(ack.netmask),
                Ipv4Addr::from(ack.gateway),
            ),
        );
        self.inner.ap_ip.store(chosen, Ordering::Release);
        self.inner.ap_ip_from_sniff.store(true, Ordering::Release);
        info!(
            "AP IP set to {} (reachable from bridged clients on the upstream subnet)",
            format_ipv4(chosen)
        );
    }
}
