//! Network utility functions
//!
//! Helpers for socket addresses and `host[:port]` authorities.

use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use super::error::{ProxyError, Result};

/// Parse a socket address
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    match addr.to_socket_addrs() {
        Ok(mut addrs) => addrs
            .next()
            .ok_or_else(|| ProxyError::Config(format!("Failed to parse address: {}", addr))),
        Err(e) => Err(ProxyError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Split an authority into host and an optional port
///
/// Only ports in `1..=65535` are honoured; anything else is dropped and the
/// authority is treated as a bare host. IPv6 literals keep their brackets off.
///
/// ```
/// use mitm_proxy::common::split_authority;
///
/// assert_eq!(split_authority("example.com:8080"), ("example.com", Some(8080)));
/// assert_eq!(split_authority("example.com:0"), ("example.com", None));
/// assert_eq!(split_authority("[::1]:443"), ("::1", Some(443)));
/// ```
pub fn split_authority(authority: &str) -> (&str, Option<u16>) {
    if let Some(rest) = authority.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':').and_then(parse_port)),
            None => (rest, None),
        };
    }

    match authority.rsplit_once(':') {
        // A second colon means an unbracketed IPv6 literal, not a port
        Some((host, _)) if host.contains(':') => (authority, None),
        Some((host, port)) => (host, parse_port(port)),
        None => (authority, None),
    }
}

fn parse_port(port: &str) -> Option<u16> {
    port.trim().parse::<u16>().ok().filter(|p| *p != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_socket_addr() {
        let addr = parse_socket_addr("127.0.0.1:8080");
        assert!(addr.is_ok(), "Should be able to parse a valid address");
        assert_eq!(addr.unwrap().port(), 8080);

        let addr = parse_socket_addr("invalid-address");
        assert!(addr.is_err(), "Should fail to parse an invalid address");
    }

    #[test]
    fn test_split_authority() {
        assert_eq!(split_authority("example.com"), ("example.com", None));
        assert_eq!(split_authority("example.com:443"), ("example.com", Some(443)));
        assert_eq!(split_authority("example.com:70000"), ("example.com", None));
        assert_eq!(split_authority("example.com:abc"), ("example.com", None));
        assert_eq!(split_authority("::1"), ("::1", None));
        assert_eq!(split_authority("[::1]"), ("::1", None));
    }
}
