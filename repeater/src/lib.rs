//! Repeater - Single-Radio WiFi Repeater Core
//!
//! Bridges clients on the AP-facing interface to the upstream
//! infrastructure network at layer 2, without NAT: every downstream client
//! gets its address from the upstream DHCP server and lives in the
//! upstream subnet. The radio exposes one MAC per interface, so the core
//! makes multiple downstream clients appear upstream as a single station:
//!
//! - `macnat` - IP→MAC table that multiplexes clients over the cloned MAC
//! - `sniff` - DHCP-ACK sniffer that learns the upstream subnet
//! - `rewrite` - in-place Ethernet/ARP/DHCP field rewriting
//! - `ingress` - per-interface receive callbacks
//! - `bridge` - the IDLE/MAC_CHANGING/BRIDGING/MAC_RESTORING state machine
//! - `worker` - the serialized disconnect→set-MAC→reconnect sequences
//! - `status` - read-only view for the configuration frontend
//! - `sim` - scriptable radio/stack for tests and host-side runs

pub mod bridge;
pub mod constants;
pub mod ingress;
pub mod macnat;
pub mod netif;
pub mod radio;
pub mod rewrite;
pub mod sim;
pub mod sniff;
pub mod status;
pub mod worker;

// Re-export key types
pub use bridge::{Repeater, RepeaterState, Timings, UpstreamAnchor};
pub use macnat::MacNatTable;
pub use netif::NetStack;
pub use radio::{ApClient, PowerSave, RadioDriver, RadioEvent, RxFrame, WifiIf};
pub use sniff::{parse_server_ack, select_ap_address, DhcpAck};
pub use status::StatusView;
