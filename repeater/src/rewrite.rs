//! MAC-NAT frame rewriters
//!
//! The STA interface carries exactly one MAC upstream: the cloned primary
//! client's. Additional downstream clients would be invisible to the
//! upstream AP (their 802.11 transmitter address would not match), so:
//!
//! - Upstream (AP→STA): rewrite the source MAC of non-primary clients to
//!   the cloned MAC, remembering IP→MAC so replies can be routed back.
//! - Downstream (STA→AP): look the destination IP up in the table and
//!   restore the client's real MAC.
//!
//! Both rewriters mutate the caller-owned buffer in place; they never
//! allocate and never fail. Malformed frames fall through untouched except
//! for the unconditional source rewrite upstream.

use crate::constants::*;
use crate::macnat::MacNatTable;
use log::debug;
use netcommon::addr::{ipv4_from_slice, MacAddr};

fn ethertype(frame: &[u8]) -> u16 {
    u16::from_be_bytes([frame[ETH_TYPE_OFFSET], frame[ETH_TYPE_OFFSET + 1]])
}

/// Locate the UDP header offset of an IPv4/UDP frame, if the frame is one
fn udp_offset(frame: &[u8]) -> Option<usize> {
    if frame[IPV4_PROTO_OFFSET] != IP_PROTO_UDP {
        return None;
    }
    let ihl = ((frame[ETH_HDR_LEN] & 0x0f) as usize) * 4;
    let off = ETH_HDR_LEN + ihl;
    if off + 8 > frame.len() {
        return None;
    }
    Some(off)
}

/// Rewrite a frame received from a non-primary client before it goes
/// upstream. Learns the sender's IP→MAC binding, patches DHCP
/// client→server messages, and masks the source MAC with the cloned one.
pub fn rewrite_upstream(frame: &mut [u8], cloned_mac: MacAddr, table: &mut MacNatTable) {
    debug_assert!(frame.len() >= ETH_HDR_LEN);
    let src_mac = MacAddr::from_slice(&frame[ETH_SRC_OFFSET..]);

    match ethertype(frame) {
        ETH_TYPE_IPV4 if frame.len() >= IPV4_MIN_FRAME_LEN => {
            let src_ip = ipv4_from_slice(&frame[IPV4_SRC_OFFSET..]);
            table.learn(src_ip, src_mac);

            // DHCP fix: the client sends Discover/Request with chaddr = its
            // own MAC. The server would unicast the reply to chaddr, and the
            // radio's hardware filter on STA would drop it (STA MAC is the
            // cloned primary's, not chaddr). Setting the BROADCAST flag
            // forces the server to reply via broadcast instead.
            if let Some(udp) = udp_offset(frame) {
                let src_port = u16::from_be_bytes([frame[udp], frame[udp + 1]]);
                let dst_port = u16::from_be_bytes([frame[udp + 2], frame[udp + 3]]);
                if src_port == DHCP_CLIENT_PORT && dst_port == DHCP_SERVER_PORT {
                    let dhcp = udp + 8;
                    if dhcp + DHCP_FIXUP_MIN_PAYLOAD <= frame.len() {
                        frame[dhcp + DHCP_FLAGS_OFFSET] |= DHCP_FLAG_BROADCAST;
                        // Zero the UDP checksum: the payload changed and
                        // UDP/IPv4 allows checksum 0 = "not computed"
                        // (RFC 768).
                        frame[udp + 6] = 0;
                        frame[udp + 7] = 0;
                        debug!("MAC-NAT: set BROADCAST flag in DHCP from {}", src_mac);
                    }
                }
            }
        }
        ETH_TYPE_ARP if frame.len() >= ARP_MIN_FRAME_LEN => {
            let sender_ip = ipv4_from_slice(&frame[ARP_SENDER_IP_OFFSET..]);
            table.learn(sender_ip, src_mac);
            frame[ARP_SENDER_MAC_OFFSET..ARP_SENDER_MAC_OFFSET + 6]
                .copy_from_slice(&cloned_mac.octets());
        }
        _ => {}
    }

    frame[ETH_SRC_OFFSET..ETH_SRC_OFFSET + 6].copy_from_slice(&cloned_mac.octets());
}

/// Rewrite a frame received from upstream before it goes out on the AP
/// interface. The upstream AP addresses everything to the cloned MAC; when
/// the destination IP maps to a different client, restore that client's
/// real MAC. Frames for the cloned client itself pass through untouched.
pub fn rewrite_downstream(frame: &mut [u8], cloned_mac: MacAddr, table: &MacNatTable) {
    debug_assert!(frame.len() >= ETH_HDR_LEN);
    let mut real_mac = None;

    match ethertype(frame) {
        ETH_TYPE_IPV4 if frame.len() >= IPV4_MIN_FRAME_LEN => {
            let dst_ip = ipv4_from_slice(&frame[IPV4_DST_OFFSET..]);
            real_mac = table.lookup_by_ip(dst_ip);
        }
        ETH_TYPE_ARP if frame.len() >= ARP_MIN_FRAME_LEN => {
            let target_ip = ipv4_from_slice(&frame[ARP_TARGET_IP_OFFSET..]);
            real_mac = table.lookup_by_ip(target_ip);
            if let Some(mac) = real_mac {
                if mac != cloned_mac {
                    frame[ARP_TARGET_MAC_OFFSET..ARP_TARGET_MAC_OFFSET + 6]
                        .copy_from_slice(&mac.octets());
                }
            }
        }
        _ => {}
    }

    if let Some(mac) = real_mac {
        if mac != cloned_mac {
            frame[ETH_DST_OFFSET..ETH_DST_OFFSET + 6].copy_from_slice(&mac.octets());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLONED: MacAddr = MacAddr([0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0x01]);
    const CLIENT_B: MacAddr = MacAddr([0xbb, 0xbb, 0xbb, 0xbb, 0xbb, 0x02]);

    fn ipv4_frame(dst: MacAddr, src: MacAddr, src_ip: [u8; 4], dst_ip: [u8; 4]) -> Vec<u8> {
        let mut f = Vec::new();
        f.extend_from_slice(&dst.octets());
        f.extend_from_slice(&src.octets());
        f.extend_from_slice(&[0x08, 0x00]);
        f.push(0x45);
        f.push(0x00);
        f.extend_from_slice(&40u16.to_be_bytes());
        f.extend_from_slice(&[0, 0, 0, 0]);
        f.push(0x40);
        f.push(6); // TCP
        f.extend_from_slice(&[0, 0]);
        f.extend_from_slice(&src_ip);
        f.extend_from_slice(&dst_ip);
        f.extend_from_slice(&[0u8; 20]); // transport stub
        f
    }

    fn arp_frame(
        dst: MacAddr,
        src: MacAddr,
        sender_mac: MacAddr,
        sender_ip: [u8; 4],
        target_mac: MacAddr,
        target_ip: [u8; 4],
    ) -> Vec<u8> {
        let mut f = Vec::new();
        f.extend_from_slice(&dst.octets());
        f.extend_from_slice(&src.octets());
        f.extend_from_slice(&[0x08, 0x06]);
        f.extend_from_slice(&[0, 1, 0x08, 0x00, 6, 4, 0, 1]); // eth/ipv4 request
        f.extend_from_slice(&sender_mac.octets());
        f.extend_from_slice(&sender_ip);
        f.extend_from_slice(&target_mac.octets());
        f.extend_from_slice(&target_ip);
        f
    }

    fn dhcp_request_frame(src: MacAddr, checksum: [u8; 2]) -> Vec<u8> {
        let mut f = Vec::new();
        f.extend_from_slice(&MacAddr::BROADCAST.octets());
        f.extend_from_slice(&src.octets());
        f.extend_from_slice(&[0x08, 0x00]);
        f.push(0x45);
        f.push(0x00);
        f.extend_from_slice(&328u16.to_be_bytes());
        f.extend_from_slice(&[0, 0, 0, 0]);
        f.push(0x40);
        f.push(17); // UDP
        f.extend_from_slice(&[0, 0]);
        f.extend_from_slice(&[0, 0, 0, 0]); // src 0.0.0.0
        f.extend_from_slice(&[255, 255, 255, 255]);
        f.extend_from_slice(&68u16.to_be_bytes());
        f.extend_from_slice(&67u16.to_be_bytes());
        f.extend_from_slice(&308u16.to_be_bytes());
        f.extend_from_slice(&checksum);
        // DHCP header up through chaddr
        f.push(1); // BOOTREQUEST
        f.push(1);
        f.push(6);
        f.push(0);
        f.extend_from_slice(&[0; 4]); // xid
        f.extend_from_slice(&[0, 0]); // secs
        f.extend_from_slice(&[0, 0]); // flags
        f.extend_from_slice(&[0; 16]); // ciaddr..giaddr
        f.extend_from_slice(&src.octets());
        f.extend_from_slice(&[0; 10]);
        f
    }

    #[test]
    fn test_upstream_ipv4_learns_and_masks_source() {
        let mut table = MacNatTable::new();
        let mut frame = ipv4_frame(
            MacAddr([0x10; 6]),
            CLIENT_B,
            [10, 0, 0, 21],
            [8, 8, 8, 8],
        );
        rewrite_upstream(&mut frame, CLONED, &mut table);

        assert_eq!(MacAddr::from_slice(&frame[6..]), CLONED);
        let learned = table.lookup_by_ip(u32::from_be_bytes([10, 0, 0, 21]));
        assert_eq!(learned, Some(CLIENT_B));
    }

    #[test]
    fn test_upstream_arp_rewrites_sender_hardware_address() {
        let mut table = MacNatTable::new();
        let mut frame = arp_frame(
            MacAddr::BROADCAST,
            CLIENT_B,
            CLIENT_B,
            [10, 0, 0, 21],
            MacAddr::ZERO,
            [10, 0, 0, 1],
        );
        rewrite_upstream(&mut frame, CLONED, &mut table);

        assert_eq!(MacAddr::from_slice(&frame[ARP_SENDER_MAC_OFFSET..]), CLONED);
        assert_eq!(MacAddr::from_slice(&frame[6..]), CLONED);
        assert_eq!(
            table.lookup_by_ip(u32::from_be_bytes([10, 0, 0, 21])),
            Some(CLIENT_B)
        );
    }

    #[test]
    fn test_upstream_dhcp_broadcast_flag_fixup() {
        let mut table = MacNatTable::new();
        let mut frame = dhcp_request_frame(CLIENT_B, [0xbe, 0xef]);
        rewrite_upstream(&mut frame, CLONED, &mut table);

        let udp = ETH_HDR_LEN + 20;
        let dhcp = udp + 8;
        assert_eq!(frame[dhcp + DHCP_FLAGS_OFFSET], 0x80);
        assert_eq!(&frame[udp + 6..udp + 8], &[0, 0]);
        assert_eq!(MacAddr::from_slice(&frame[6..]), CLONED);
    }

    #[test]
    fn test_upstream_short_ipv4_only_masks_source() {
        let mut table = MacNatTable::new();
        let mut frame = ipv4_frame(MacAddr([0x10; 6]), CLIENT_B, [10, 0, 0, 21], [8, 8, 8, 8]);
        frame.truncate(30); // below the IPv4 minimum
        rewrite_upstream(&mut frame, CLONED, &mut table);

        assert_eq!(MacAddr::from_slice(&frame[6..]), CLONED);
        assert!(table.is_empty());
    }

    #[test]
    fn test_downstream_ipv4_restores_real_mac() {
        let mut table = MacNatTable::new();
        table.learn(u32::from_be_bytes([10, 0, 0, 21]), CLIENT_B);

        let mut frame = ipv4_frame(CLONED, MacAddr([0x10; 6]), [8, 8, 8, 8], [10, 0, 0, 21]);
        rewrite_downstream(&mut frame, CLONED, &table);
        assert_eq!(MacAddr::from_slice(&frame[..6]), CLIENT_B);
    }

    #[test]
    fn test_downstream_unmapped_ip_untouched() {
        let table = MacNatTable::new();
        let mut frame = ipv4_frame(CLONED, MacAddr([0x10; 6]), [8, 8, 8, 8], [10, 0, 0, 99]);
        rewrite_downstream(&mut frame, CLONED, &table);
        assert_eq!(MacAddr::from_slice(&frame[..6]), CLONED);
    }

    #[test]
    fn test_downstream_cloned_client_untouched() {
        let mut table = MacNatTable::new();
        table.learn(u32::from_be_bytes([10, 0, 0, 20]), CLONED);

        let mut frame = ipv4_frame(CLONED, MacAddr([0x10; 6]), [8, 8, 8, 8], [10, 0, 0, 20]);
        rewrite_downstream(&mut frame, CLONED, &table);
        assert_eq!(MacAddr::from_slice(&frame[..6]), CLONED);
    }

    #[test]
    fn test_downstream_arp_rewrites_target_hardware_address() {
        let mut table = MacNatTable::new();
        table.learn(u32::from_be_bytes([10, 0, 0, 21]), CLIENT_B);

        let mut frame = arp_frame(
            CLONED,
            MacAddr([0x10; 6]),
            MacAddr([0x10; 6]),
            [10, 0, 0, 1],
            CLONED,
            [10, 0, 0, 21],
        );
        rewrite_downstream(&mut frame, CLONED, &table);
        assert_eq!(MacAddr::from_slice(&frame[..6]), CLIENT_B);
        assert_eq!(
            MacAddr::from_slice(&frame[ARP_TARGET_MAC_OFFSET..]),
            CLIENT_B
        );
    }
}
