//! Host IP stack boundary
//!
//! The core owns frame routing; the host stack only sees what the ingress
//! callbacks explicitly deliver. It also executes the address and DHCP
//! lifecycle decisions the state machine makes for both interfaces.

use crate::radio::{RxFrame, WifiIf};
use netcommon::addr::IpInfo;

/// Operations the core invokes on the host IP stack
pub trait NetStack: Send + Sync {
    /// Hand a received frame to the stack for the given interface.
    /// Consumes the frame; this is one of the two terminal operations on
    /// an [`RxFrame`].
    fn deliver(&self, iface: WifiIf, frame: RxFrame);

    /// Reconfigure an interface's static address
    fn set_ip_info(&self, iface: WifiIf, info: IpInfo);

    fn start_dhcp_client(&self, iface: WifiIf);
    fn stop_dhcp_client(&self, iface: WifiIf);

    fn start_dhcp_server(&self, iface: WifiIf);
    fn stop_dhcp_server(&self, iface: WifiIf);
}
