//! MAC-NAT table
//!
//! Fixed-capacity IP→MAC map that lets additional downstream clients share
//! the cloned MAC upstream while still receiving their own traffic
//! downstream. Learned from client IPv4 source addresses, ARP sender
//! fields, and DHCP ACK yiaddr/chaddr pairs; consulted when rewriting
//! downstream destinations.
//!
//! A dense array with linear scan: at this capacity the whole table fits
//! in a couple of cache lines, which beats a hash map on the ingress hot
//! path, and LRU eviction falls out of a single pass.

use crate::constants::MACNAT_CAPACITY;
use log::info;
use netcommon::addr::{format_ipv4, MacAddr};

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    used: bool,
    ip: u32,
    mac: MacAddr,
    last_seen: u64,
}

/// IP→MAC associative store with LRU eviction.
///
/// `last_seen` is a table-local monotonic tick, not wall-clock time;
/// eviction only needs relative order.
pub struct MacNatTable {
    entries: [Entry; MACNAT_CAPACITY],
    tick: u64,
}

impl MacNatTable {
    pub fn new() -> Self {
        Self {
            entries: [Entry::default(); MACNAT_CAPACITY],
            tick: 0,
        }
    }

    /// Record an IP→MAC binding. Best-effort; never fails.
    ///
    /// Multicast MACs and the zero IP are ignored. Re-learning an identical
    /// binding is a no-op and deliberately does not refresh the timestamp,
    /// so the hot path writes nothing for steady-state traffic. An entry
    /// keyed by this IP wins over a MAC match elsewhere in the table.
    pub fn learn(&mut self, ip: u32, mac: MacAddr) {
        if mac.is_multicast() || ip == 0 {
            return;
        }

        if let Some(i) = self.entries.iter().position(|e| e.used && e.ip == ip) {
            if self.entries[i].mac == mac {
                return;
            }
            // IP reassigned to a new device
            self.entries[i].mac = mac;
            self.entries[i].last_seen = self.next_tick();
            // The MAC moved to this IP; drop a stale entry still holding it
            for j in 0..MACNAT_CAPACITY {
                if j != i && self.entries[j].used && self.entries[j].mac == mac {
                    self.entries[j] = Entry::default();
                }
            }
            return;
        }

        if let Some(i) = self.entries.iter().position(|e| e.used && e.mac == mac) {
            // Same device, new lease (DHCP renewal)
            self.entries[i].ip = ip;
            self.entries[i].last_seen = self.next_tick();
            return;
        }

        // Insert, evicting the least-recently-seen entry when full
        let idx = match self.entries.iter().position(|e| !e.used) {
            Some(free) => free,
            None => {
                let mut oldest = 0;
                for i in 1..MACNAT_CAPACITY {
                    if self.entries[i].last_seen < self.entries[oldest].last_seen {
                        oldest = i;
                    }
                }
                oldest
            }
        };
        self.entries[idx] = Entry {
            used: true,
            ip,
            mac,
            last_seen: self.next_tick(),
        };
        info!("MAC-NAT learned: {} -> {}", format_ipv4(ip), mac);
    }

    pub fn lookup_by_ip(&self, ip: u32) -> Option<MacAddr> {
        self.entries
            .iter()
            .find(|e| e.used && e.ip == ip)
            .map(|e| e.mac)
    }

    /// Drop every mapping (end of a bridging session)
    pub fn clear(&mut self) {
        self.entries = [Entry::default(); MACNAT_CAPACITY];
        self.tick = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.used).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

impl Default for MacNatTable {
    fn default() -> Self {
        Self::new()
    }
}
