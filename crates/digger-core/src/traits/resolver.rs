// # Resolver Trait
//
// Defines the interface for turning a hostname into the set of addresses
// the system tracks.
//
// ## Implementations
//
// - hickory-resolver: `digger-resolver` crate
//
// ## Usage
//
// ```rust,ignore
// use digger_core::Resolver;
//
// match resolver.resolve("sftp.vendor.example").await {
//     Ok(addrs) => println!("{:?}", addrs.to_strings()),
//     Err(digger_core::Error::NoAddressesFound(host)) => println!("{host}: nothing"),
//     Err(e) => println!("lookup failed: {e}"),
// }
// ```

use async_trait::async_trait;

use crate::model::ResolvedAddresses;

/// Trait for resolver implementations
///
/// # Contract
///
/// - `Ok(addrs)`: `addrs` is never empty and holds IPv4 addresses only,
///   in the order the underlying resolver returned them
/// - `Err(Error::NoAddressesFound)`: the lookup succeeded but nothing was
///   left after filtering
/// - `Err(Error::Resolution)`: NXDOMAIN, timeout, network failure
///
/// # Forbidden
///
/// - Caching results between calls
/// - Retrying internally (the caller owns the cadence)
/// - Blocking without a bound: every lookup must be time-limited
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `hostname`
    async fn resolve(&self, hostname: &str) -> Result<ResolvedAddresses, crate::Error>;

    /// Name used in logs
    fn resolver_name(&self) -> &'static str {
        "dns"
    }
}
