//! Client identifier extraction.
//!
//! Submissions are keyed by the client's network address. The address is
//! taken from the first request variable that holds a valid IP address.

use std::collections::HashMap;
use std::net::IpAddr;

/// Request variables consulted for the client address, in priority order.
pub const CLIENT_ADDRESS_SOURCES: [&str; 4] = [
    "REMOTE_ADDR",
    "HTTP_X_REAL_IP",
    "HTTP_CLIENT_IP",
    "HTTP_X_FORWARDED_FOR",
];

/// A validated client address used as the counter table key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Parse a single address, normalizing it to canonical form.
    pub fn parse(value: &str) -> Option<Self> {
        value
            .trim()
            .parse::<IpAddr>()
            .ok()
            .map(|ip| Self(ip.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<IpAddr> for ClientId {
    fn from(ip: IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Find the client address through `lookup`.
///
/// Each source may hold a comma separated list (as proxies append to
/// `X-Forwarded-For`); the first valid address across all sources wins.
pub fn extract_client_id<'a, F>(lookup: F) -> Option<ClientId>
where
    F: Fn(&str) -> Option<&'a str>,
{
    CLIENT_ADDRESS_SOURCES
        .into_iter()
        .filter_map(|name| lookup(name))
        .flat_map(|value| value.split(','))
        .find_map(ClientId::parse)
}

/// Find the client address in a map of request variables.
pub fn client_id_from_vars(vars: &HashMap<String, String>) -> Option<ClientId> {
    extract_client_id(|name| vars.get(name).map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_valid_addresses() {
        assert_eq!(ClientId::parse(" 192.168.1.10 ").unwrap().as_str(), "192.168.1.10");
        assert_eq!(ClientId::parse("2001:DB8::0001").unwrap().as_str(), "2001:db8::1");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ClientId::parse("").is_none());
        assert!(ClientId::parse("unknown").is_none());
        assert!(ClientId::parse("256.1.1.1").is_none());
        assert!(ClientId::parse("10.0.0.1:8080").is_none());
    }

    #[test]
    fn test_remote_addr_takes_priority() {
        let vars = vars(&[
            ("HTTP_X_FORWARDED_FOR", "203.0.113.5"),
            ("REMOTE_ADDR", "10.0.0.1"),
        ]);
        assert_eq!(client_id_from_vars(&vars).unwrap().as_str(), "10.0.0.1");
    }

    #[test]
    fn test_falls_through_invalid_sources() {
        let vars = vars(&[
            ("REMOTE_ADDR", "not-an-ip"),
            ("HTTP_X_REAL_IP", ""),
            ("HTTP_X_FORWARDED_FOR", "garbage, 203.0.113.5, 10.0.0.2"),
        ]);
        assert_eq!(client_id_from_vars(&vars).unwrap().as_str(), "203.0.113.5");
    }

    #[test]
    fn test_no_address_found() {
        assert!(client_id_from_vars(&HashMap::new()).is_none());
        assert!(client_id_from_vars(&vars(&[("REMOTE_ADDR", "localhost")])).is_none());
    }
}
