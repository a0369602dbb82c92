//! DHCP-ACK sniffer
//!
//! While bridging, the STA DHCP client is stopped so it cannot collide with
//! the downstream client that shares its MAC. The upstream server's DHCP
//! traffic still flows through the bridge, so the repeater learns the
//! upstream subnet by watching server→client ACKs and self-assigns a usable
//! management address to the AP interface from what it sees.
//!
//! The caller pre-verifies the cheap invariants (IPv4, UDP, ports 67→68,
//! length) before the parser runs; the hot path never reaches this module.

use crate::constants::*;
use netcommon::addr::{ipv4_from_slice, MacAddr};

/// Fields extracted from a server→client DHCP ACK.
///
/// All addresses are host-order `u32` (decoded big-endian from the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhcpAck {
    /// yiaddr: the address the server assigned to the client
    pub client_ip: u32,
    /// Option 1
    pub netmask: u32,
    /// Option 3, first router entry (0 when absent)
    pub gateway: u32,
    /// chaddr: the client hardware address the lease is bound to
    pub chaddr: MacAddr,
}

/// Parse a DHCP ACK out of a full Ethernet frame.
///
/// Precondition (verified by the ingress pre-check): EtherType IPv4, IP
/// protocol UDP, source port 67, destination port 68, `frame.len() >= 286`.
/// Returns `None` for anything that is not a well-formed BOOTREPLY ACK;
/// malformed frames are silently skipped.
pub fn parse_server_ack(frame: &[u8]) -> Option<DhcpAck> {
    let ihl = ((frame[ETH_HDR_LEN] & 0x0f) as usize) * 4;
    let dhcp_off = ETH_HDR_LEN + ihl + 8;
    if frame.len() < dhcp_off + DHCP_OPTIONS_OFFSET {
        return None;
    }
    let dhcp = &frame[dhcp_off..];

    if dhcp[0] != DHCP_OP_BOOTREPLY {
        return None;
    }
    if dhcp[DHCP_COOKIE_OFFSET..DHCP_COOKIE_OFFSET + 4] != DHCP_MAGIC_COOKIE {
        return None;
    }

    // Options: need type 53 = ACK; collect subnet mask and router
    let opts = &dhcp[DHCP_OPTIONS_OFFSET..];
    let mut is_ack = false;
    let mut netmask = 0u32;
    let mut gateway = 0u32;

    let mut i = 0;
    while i < opts.len() {
        let opt = opts[i];
        if opt == DHCP_OPT_END {
            break;
        }
        if opt == DHCP_OPT_PAD {
            i += 1;
            continue;
        }
        if i + 1 >= opts.len() {
            break;
        }
        let olen = opts[i + 1] as usize;
        if i + 2 + olen > opts.len() {
            break;
        }
        match opt {
            DHCP_OPT_MSG_TYPE => {
                if olen == 1 && opts[i + 2] == DHCP_MSG_ACK {
                    is_ack = true;
                }
            }
            DHCP_OPT_SUBNET_MASK => {
                if olen == 4 {
                    netmask = ipv4_from_slice(&opts[i + 2..]);
                }
            }
            DHCP_OPT_ROUTER => {
                if olen >= 4 {
                    gateway = ipv4_from_slice(&opts[i + 2..]);
                }
            }
            _ => {}
        }
        i += 2 + olen;
    }

    if !is_ack {
        return None;
    }

    Some(DhcpAck {
        client_ip: ipv4_from_slice(&dhcp[DHCP_YIADDR_OFFSET..]),
        netmask,
        gateway,
        chaddr: MacAddr::from_slice(&dhcp[DHCP_CHADDR_OFFSET..]),
    })
}

/// Pick a management address for the AP interface inside the sniffed
/// subnet, avoiding the client and the gateway.
///
/// Starts from the highest host address (broadcast − 1) and walks down up
/// to ten times; if every candidate collides, falls back to `client − 1`
/// or `client + 1`.
pub fn select_ap_address(client_ip: u32, netmask: u32, gateway: u32) -> u32 {
    let network = client_ip & netmask;
    let broadcast = network | !netmask;

    let mut candidate = broadcast.wrapping_sub(1);
    for _ in 0..10 {
        if candidate > network
            && candidate < broadcast
            && candidate != client_ip
            && candidate != gateway
        {
            break;
        }
        candidate = candidate.wrapping_sub(1);
    }
    if candidate <= network || candidate >= broadcast {
        candidate = client_ip.wrapping_sub(1);
        if candidate <= network {
            candidate = client_ip.wrapping_add(1);
        }
    }
    candidate
}
