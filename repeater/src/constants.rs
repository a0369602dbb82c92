//! Protocol offsets, ports, capacities, and timing constants

use std::net::Ipv4Addr;
use std::time::Duration;

// Ethernet header layout
pub const ETH_HDR_LEN: usize = 14;
pub const ETH_DST_OFFSET: usize = 0;
pub const ETH_SRC_OFFSET: usize = 6;
pub const ETH_TYPE_OFFSET: usize = 12;

// EtherTypes
pub const ETH_TYPE_IPV4: u16 = 0x0800;
pub const ETH_TYPE_ARP: u16 = 0x0806;

// IPv4 header (offsets relative to frame start, assuming no VLAN tag)
pub const IPV4_MIN_FRAME_LEN: usize = 34; // Ethernet(14) + IP(20)
pub const IPV4_PROTO_OFFSET: usize = 23;
pub const IPV4_SRC_OFFSET: usize = 26;
pub const IPV4_DST_OFFSET: usize = 30;
pub const IP_PROTO_UDP: u8 = 17;

// ARP over Ethernet (offsets relative to frame start)
pub const ARP_MIN_FRAME_LEN: usize = 42; // Ethernet(14) + ARP(28)
pub const ARP_SENDER_MAC_OFFSET: usize = 22;
pub const ARP_SENDER_IP_OFFSET: usize = 28;
pub const ARP_TARGET_MAC_OFFSET: usize = 32;
pub const ARP_TARGET_IP_OFFSET: usize = 38;

// DHCP (RFC 2131); offsets relative to the DHCP message start
pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;
pub const DHCP_OP_BOOTREPLY: u8 = 2;
pub const DHCP_FLAGS_OFFSET: usize = 10;
pub const DHCP_FLAG_BROADCAST: u8 = 0x80; // high bit of the flags field
pub const DHCP_YIADDR_OFFSET: usize = 16;
pub const DHCP_CHADDR_OFFSET: usize = 28;
pub const DHCP_COOKIE_OFFSET: usize = 236;
pub const DHCP_MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
pub const DHCP_OPTIONS_OFFSET: usize = 240;

// DHCP options
pub const DHCP_OPT_PAD: u8 = 0;
pub const DHCP_OPT_SUBNET_MASK: u8 = 1;
pub const DHCP_OPT_ROUTER: u8 = 3;
pub const DHCP_OPT_MSG_TYPE: u8 = 53;
pub const DHCP_OPT_END: u8 = 255;
pub const DHCP_MSG_ACK: u8 = 5;

/// Smallest frame the ACK sniffer will look at:
/// Ethernet(14) + IP(20) + UDP(8) + BOOTP(236) + cookie(4) + type option(3) + end(1)
pub const DHCP_MIN_SNIFF_LEN: usize = 286;

/// DHCP client→server fixup needs the flags field present:
/// header through chaddr start = 28 + hlen(16) = 44 octets of DHCP payload
pub const DHCP_FIXUP_MIN_PAYLOAD: usize = 44;

// MAC-NAT
pub const MACNAT_CAPACITY: usize = 8;

// Worker timing
pub const DISCONNECT_WAIT: Duration = Duration::from_secs(5);
pub const CONNECT_WAIT: Duration = Duration::from_secs(15);
pub const WORKER_GATE_WAIT: Duration = Duration::from_secs(5);
pub const MAC_SETTLE_DELAY: Duration = Duration::from_millis(100);
pub const RECONNECT_SETTLE_DELAY: Duration = Duration::from_millis(200);
pub const AUTO_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const STATUS_INTERVAL: Duration = Duration::from_secs(30);

// AP management fallback subnet (setup mode, DHCP server ON)
pub const AP_MANAGEMENT_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
pub const AP_MANAGEMENT_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

// Placeholder address for STA while its DHCP client is stopped during
// bridging; the host network layer refuses an interface with no address
pub const STA_PLACEHOLDER_IP: Ipv4Addr = Ipv4Addr::new(169, 254, 1, 1);
pub const STA_PLACEHOLDER_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 0, 0);

// Event-group bits
pub const STA_CONNECTED_BIT: u32 = 1 << 0;
pub const STA_DISCONNECTED_BIT: u32 = 1 << 1;
