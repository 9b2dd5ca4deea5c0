//! Address canonicalisation helpers.
//!
//! Membership keys are the canonical text form of an `ip:port` endpoint.
//! A peer that binds all interfaces advertises `0.0.0.0:<port>`; receivers
//! substitute the observed source IP so keys stay globally comparable.

use std::net::{IpAddr, SocketAddr};

/// Canonicalise a possibly incomplete advertised address.
///
/// When the advertised IP is unspecified (`0.0.0.0` / `::`) and the
/// fallback carries a concrete one, the fallback's IP is substituted
/// while the advertised port is kept. A bare IP with no port borrows the
/// fallback's port. Returns `None` when neither input parses.
pub fn normalize_addr(advertised: &str, fallback: &str) -> Option<String> {
    let adv = advertised.trim();
    let fb = fallback.trim();

    if !adv.is_empty() {
        if let Ok(mut ap) = adv.parse::<SocketAddr>() {
            if ap.ip().is_unspecified() && !fb.is_empty() {
                if let Ok(fp) = fb.parse::<SocketAddr>() {
                    if !fp.ip().is_unspecified() {
                        ap = SocketAddr::new(fp.ip(), ap.port());
                    }
                }
            }
            return Some(ap.to_string());
        }
    }

    if !fb.is_empty() {
        if let Ok(fp) = fb.parse::<SocketAddr>() {
            if !adv.is_empty() {
                if let Ok(host) = adv.parse::<IpAddr>() {
                    return Some(SocketAddr::new(host, fp.port()).to_string());
                }
            }
            return Some(fp.to_string());
        }
    }

    None
}

/// Canonicalise a string address without consulting the network.
///
/// Unparseable input is returned trimmed, so callers always get a usable
/// map key.
pub fn canonical_addr(addr: &str) -> String {
    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    normalize_addr(trimmed, trimmed).unwrap_or_else(|| trimmed.to_string())
}

/// Interpret a listen spec, allowing the host part to be omitted
/// (`":4000"` means all interfaces).
pub fn listen_spec(addr: &str) -> String {
    let trimmed = addr.trim();
    if let Some(port) = trimmed.strip_prefix(':') {
        return format!("0.0.0.0:{port}");
    }
    trimmed.to_string()
}
