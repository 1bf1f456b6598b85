//! URL validation for SSRF protection.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::error::{SecurityError, SecurityResult};

/// URL validator applied to every outbound fetch (canonical re-fetch, image
/// loading), before the request and again after each redirect hop.
///
/// Rejects:
/// - Non-HTTP(S) schemes (file://, ftp://)
/// - Loopback, private, link-local, CGNAT, and unspecified address ranges
/// - Cloud metadata endpoints and locally-scoped hostnames (.local, .internal)
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: HashSet<String>,
    blocked_hosts: HashSet<String>,
    blocked_suffixes: Vec<String>,
    blocked_ranges: Vec<ipnet::IpNet>,
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    pub fn new() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: [
                "localhost",
                "0.0.0.0",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_suffixes: [".local", ".internal", ".localhost"]
                .into_iter()
                .map(String::from)
                .collect(),
            blocked_ranges: vec![
                "0.0.0.0/8".parse().unwrap(),      // Unspecified
                "10.0.0.0/8".parse().unwrap(),     // RFC1918
                "100.64.0.0/10".parse().unwrap(),  // Carrier-grade NAT
                "127.0.0.0/8".parse().unwrap(),    // Loopback
                "169.254.0.0/16".parse().unwrap(), // Link-local / cloud metadata
                "172.16.0.0/12".parse().unwrap(),  // RFC1918
                "192.168.0.0/16".parse().unwrap(), // RFC1918
                "::/128".parse().unwrap(),         // IPv6 unspecified
                "::1/128".parse().unwrap(),        // IPv6 loopback
                "fc00::/7".parse().unwrap(),       // IPv6 ULA
                "fe80::/10".parse().unwrap(),      // IPv6 link-local
            ],
            allowed_hosts: HashSet::new(),
        }
    }

    /// Add an allowed host (bypasses validation). Test fixtures only.
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into());
        self
    }

    /// Block an additional host.
    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into());
        self
    }

    fn check_ip(&self, ip: &IpAddr) -> SecurityResult<()> {
        for range in &self.blocked_ranges {
            if range.contains(ip) {
                return Err(SecurityError::BlockedAddress(ip.to_string()));
            }
        }
        Ok(())
    }

    /// Validate a URL without touching the network.
    pub fn validate(&self, url: &str) -> SecurityResult<()> {
        let parsed = url::Url::parse(url)?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(SecurityError::DisallowedScheme(parsed.scheme().to_string()));
        }

        let host = parsed.host_str().ok_or(SecurityError::NoHost)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');

        if self.allowed_hosts.contains(host) {
            return Ok(());
        }

        if self.blocked_hosts.contains(host) {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return self.check_ip(&ip);
        }

        let lower = host.to_ascii_lowercase();
        if self
            .blocked_suffixes
            .iter()
            .any(|suffix| lower.ends_with(suffix))
            || !lower.contains('.')
        {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }

        Ok(())
    }

    /// Validate a URL and resolve DNS to check the actual addresses.
    ///
    /// Catches rebinding setups where a public hostname resolves to an
    /// internal IP. Called before the request and after every redirect hop.
    pub async fn validate_with_dns(&self, url: &str) -> SecurityResult<()> {
        self.validate(url)?;

        let parsed = url::Url::parse(url)?;
        let host = parsed.host_str().ok_or(SecurityError::NoHost)?;

        if self.allowed_hosts.contains(host) || host.parse::<IpAddr>().is_ok() {
            return Ok(());
        }

        let port = parsed.port().unwrap_or(match parsed.scheme() {
            "https" => 443,
            _ => 80,
        });

        let addrs = tokio::net::lookup_host(format!("{host}:{port}"))
            .await
            .map_err(|e| SecurityError::DnsResolution(e.to_string()))?;

        for addr in addrs {
            let ip = addr.ip();
            self.check_ip(&ip).map_err(|_| {
                SecurityError::BlockedAddress(format!("DNS for {host} resolved to blocked IP {ip}"))
            })?;
        }

        Ok(())
    }
}
