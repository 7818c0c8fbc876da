// # DNS Resolver
//
// This crate provides the hickory-resolver based `Resolver` for digger.
//
// ## Behaviour
//
// - IPv4 only: lookups use the `Ipv4Only` strategy and any stray non-IPv4
//   answer is filtered out in core
// - No caching: the cache is disabled so every check sees live DNS
// - No retries: one attempt per name server, bounded by the configured timeout
// - IP literals in the catalog resolve to themselves without a query
//
// ## Name Servers
//
// With no `resolver.nameservers` configured, the system configuration
// (`/etc/resolv.conf` or the platform equivalent) is used.

use async_trait::async_trait;
use digger_core::config::ResolverConfig as DiggerResolverConfig;
use digger_core::model::ResolvedAddresses;
use digger_core::traits::Resolver;
use digger_core::{Error, Result};

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{
    LookupIpStrategy, NameServerConfigGroup, ResolverConfig, ResolverOpts,
};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;

use std::net::IpAddr;
use std::time::Duration;

/// hickory-resolver backed DNS resolver
pub struct DnsResolver {
    inner: TokioAsyncResolver,
    timeout: Duration,
}

impl DnsResolver {
    /// Create a resolver from digger's resolver settings
    ///
    /// # Errors
    ///
    /// - `Error::Config` if a name server is malformed or the system
    ///   configuration cannot be read
    pub fn new(config: &DiggerResolverConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let nameservers = config.nameserver_addrs()?;

        let (resolver_config, mut opts) = if nameservers.is_empty() {
            hickory_resolver::system_conf::read_system_conf().map_err(|e| {
                Error::config(format!("Failed to read system resolver configuration: {}", e))
            })?
        } else {
            let mut group = NameServerConfigGroup::new();
            for addr in &nameservers {
                group.merge(NameServerConfigGroup::from_ips_clear(
                    &[addr.ip()],
                    addr.port(),
                    true,
                ));
            }
            (
                ResolverConfig::from_parts(None, vec![], group),
                ResolverOpts::default(),
            )
        };

        opts.ip_strategy = LookupIpStrategy::Ipv4Only;
        opts.cache_size = 0;
        opts.attempts = 1;
        opts.timeout = timeout;

        tracing::debug!(
            nameservers = resolver_config.name_servers().len(),
            timeout_secs = config.timeout_secs,
            "DNS resolver configured"
        );

        Ok(Self {
            inner: TokioAsyncResolver::tokio(resolver_config, opts),
            timeout,
        })
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, hostname: &str) -> Result<ResolvedAddresses> {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return Err(Error::invalid_input("hostname cannot be empty"));
        }

        if let Ok(ip) = hostname.parse::<IpAddr>() {
            return into_resolved(hostname, vec![ip]);
        }

        let lookup = tokio::time::timeout(self.timeout, self.inner.lookup_ip(hostname))
            .await
            .map_err(|_| {
                Error::resolution(
                    hostname,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| map_resolve_error(hostname, e))?;

        let ips: Vec<IpAddr> = lookup.iter().collect();
        tracing::trace!(hostname = %hostname, answers = ips.len(), "Lookup complete");
        into_resolved(hostname, ips)
    }

    fn resolver_name(&self) -> &'static str {
        "hickory"
    }
}

/// Filter raw answers; an empty result is its own condition
fn into_resolved(hostname: &str, ips: Vec<IpAddr>) -> Result<ResolvedAddresses> {
    let resolved = ResolvedAddresses::from_ips(ips);
    if resolved.is_empty() {
        return Err(Error::no_addresses(hostname));
    }
    Ok(resolved)
}

/// Only an empty NOERROR answer means "no addresses"; NXDOMAIN, SERVFAIL
/// and REFUSED are lookup failures
fn map_resolve_error(hostname: &str, err: ResolveError) -> Error {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. }
            if *response_code == ResponseCode::NoError =>
        {
            Error::no_addresses(hostname)
        }
        _ => Error::resolution(hostname, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_resolver::proto::op::Query;
    use hickory_resolver::proto::rr::{Name, RecordType};

    fn config(nameservers: &[&str]) -> DiggerResolverConfig {
        DiggerResolverConfig {
            timeout_secs: 2,
            nameservers: nameservers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_explicit_nameservers() {
        let resolver = DnsResolver::new(&config(&["192.0.2.53:53", "192.0.2.54:5353"]));
        assert!(resolver.is_ok());
    }

    #[test]
    fn test_bad_nameserver_rejected() {
        let err = DnsResolver::new(&config(&["not-an-address"])).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_empty_hostname_rejected() {
        let resolver = DnsResolver::new(&config(&["192.0.2.53:53"])).unwrap();
        let err = resolver.resolve("  ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_ip_literal_resolves_without_query() {
        let resolver = DnsResolver::new(&config(&["192.0.2.53:53"])).unwrap();

        let resolved = resolver.resolve("10.20.30.40").await.unwrap();
        assert_eq!(resolved.to_strings(), vec!["10.20.30.40"]);

        let err = resolver.resolve("2001:db8::1").await.unwrap_err();
        assert!(matches!(err, Error::NoAddressesFound(_)));
    }

    fn no_records(response_code: ResponseCode) -> ResolveError {
        let name = Name::from_ascii("gone.example.com.").unwrap();
        ResolveError::from(ResolveErrorKind::NoRecordsFound {
            query: Box::new(Query::query(name, RecordType::A)),
            soa: None,
            negative_ttl: None,
            response_code,
            trusted: true,
        })
    }

    #[test]
    fn test_nxdomain_is_resolution_failure() {
        for code in [ResponseCode::NXDomain, ResponseCode::ServFail, ResponseCode::Refused] {
            let err = map_resolve_error("gone.example.com", no_records(code));
            assert!(
                matches!(err, Error::Resolution { ref hostname, .. } if hostname == "gone.example.com"),
                "{:?} mapped to {:?}",
                code,
                err
            );
        }
    }

    #[test]
    fn test_empty_noerror_answer_is_no_addresses() {
        let err = map_resolve_error("gone.example.com", no_records(ResponseCode::NoError));
        assert!(matches!(err, Error::NoAddressesFound(ref h) if h == "gone.example.com"));
    }

    #[test]
    fn test_only_ipv6_answers_are_no_addresses() {
        let err = into_resolved("v6only.example.com", vec!["::1".parse().unwrap()]).unwrap_err();
        assert!(matches!(err, Error::NoAddressesFound(ref h) if h == "v6only.example.com"));
    }
}
