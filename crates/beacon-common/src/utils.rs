//! Utility functions for Beacon
//!
//! Common helper functions used across the codebase.

use std::sync::LazyLock;

use if_addrs::IfAddr;

/// Regex pattern for validating host identifiers (hostnames and addresses)
static HOST_ID_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new("^[a-zA-Z0-9_.:-]+$").expect("Invalid regex pattern"));

/// Validate a host identifier contains only allowed characters
///
/// Allowed characters: alphanumeric, underscore, dot, colon, hyphen.
/// Empty identifiers are rejected; the registry and connection set key on
/// this value.
///
/// # Examples
///
/// ```
/// use beacon_common::is_valid_host_id;
///
/// assert!(is_valid_host_id("storage-node-1.internal"));
/// assert!(is_valid_host_id("10.0.1.17"));
/// assert!(!is_valid_host_id("bad host"));
/// assert!(!is_valid_host_id(""));
/// ```
pub fn is_valid_host_id(host: &str) -> bool {
    HOST_ID_PATTERN.is_match(host)
}

/// Get the local IP address
///
/// Returns the first non-loopback IPv4 address found,
/// or "127.0.0.1" as fallback. Used as the heartbeat origin address.
///
/// # Examples
///
/// ```
/// use beacon_common::local_ip;
///
/// let ip = local_ip();
/// assert!(!ip.is_empty());
/// ```
pub fn local_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .find(|iface| !iface.is_loopback() && matches!(iface.addr, IfAddr::V4(_)))
                .and_then(|iface| match iface.addr {
                    IfAddr::V4(addr) => Some(addr.ip.to_string()),
                    _ => None,
                })
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}
