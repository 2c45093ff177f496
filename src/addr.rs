//! LAN address resolution.
//!
//! Finds the IPv4 address other machines on the local network can reach
//! us at, so the host can hand out a usable `ws://` URL. Resolution is
//! best-effort: when no interface qualifies the caller gets `None` and
//! should fall back to listening on the wildcard address.

use std::net::IpAddr;

use once_cell::sync::OnceCell;
use tracing::debug;

/// Cached for the process lifetime once discovered; failures are not
/// cached so a later call can retry.
static LOCAL_IPV4: OnceCell<String> = OnceCell::new();

/// Prefix test for the common private ranges. Deliberately loose: the
/// 172.16.0.0/12 range is matched by its first octet only.
const PRIVATE_PREFIXES: [&str; 3] = ["192.168.", "10.", "172."];

/// Resolve the process's LAN-reachable IPv4 address.
///
/// Prefers addresses in the private ranges, then any non-loopback IPv4.
/// Returns `None` when interface enumeration fails or nothing qualifies.
pub fn resolve() -> Option<String> {
    if let Some(cached) = LOCAL_IPV4.get() {
        return Some(cached.clone());
    }

    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            debug!(error = %e, "interface enumeration failed");
            return None;
        }
    };

    let picked = pick(&interfaces)?;
    Some(LOCAL_IPV4.get_or_init(|| picked).clone())
}

/// Select an address from an interface list: first private-range match,
/// else first non-loopback IPv4, else none.
fn pick(interfaces: &[(String, IpAddr)]) -> Option<String> {
    let candidates: Vec<String> = interfaces
        .iter()
        .filter_map(|(_, ip)| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4.to_string()),
            _ => None,
        })
        .collect();

    candidates
        .iter()
        .find(|ip| PRIVATE_PREFIXES.iter().any(|prefix| ip.starts_with(prefix)))
        .or_else(|| candidates.first())
        .cloned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
