//! Domain model: monitored sites, stored site state, change events and
//! resolved address sets.

use crate::config::TieBreak;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Separator used when several addresses share one catalog cell
pub const IP_SEPARATOR: char = ';';

/// Summary of the most recent change applied to a site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastChange {
    /// Addresses that were authoritative before the change
    pub old_ips: Vec<String>,
    /// Address that became authoritative
    pub new_ip: String,
    /// When the change was detected
    pub changed_at: DateTime<Utc>,
}

/// One monitored endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Hostname to resolve; unique within a catalog
    pub hostname: String,
    /// Informational port, only used in notifications
    pub port: u16,
    /// Free-form label such as the vendor name
    pub entity_name: String,
    /// Addresses currently considered authoritative (ordered, no duplicates)
    pub known_ips: Vec<String>,
    /// Last change applied to this site, if any
    #[serde(default)]
    pub last_change: Option<LastChange>,
}

impl Site {
    /// Create a site with no known addresses
    pub fn new(hostname: impl Into<String>, port: u16, entity_name: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            entity_name: entity_name.into(),
            known_ips: Vec::new(),
            last_change: None,
        }
    }

    /// Set the known addresses (trimmed, empties dropped, de-duplicated)
    pub fn with_known_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_ips = normalize_ips(ips);
        self
    }

    /// More than one address is recorded, so a human has to confirm changes
    pub fn is_ambiguous(&self) -> bool {
        self.known_ips.len() > 1
    }

    /// Known addresses joined for display and catalog export
    pub fn known_ips_joined(&self) -> String {
        join_ips(&self.known_ips)
    }

    /// Take address state from a stored record; catalog metadata is kept
    pub fn apply_state(&mut self, state: &SiteState) {
        self.known_ips = state.known_ips.clone();
        if state.last_change.is_some() {
            self.last_change = state.last_change.clone();
        }
    }

    /// Advance the working copy after a change was durably recorded
    pub fn apply_change(&mut self, event: &ChangeEvent) {
        self.known_ips = vec![event.new_ip.clone()];
        self.last_change = Some(LastChange {
            old_ips: event.old_ips.clone(),
            new_ip: event.new_ip.clone(),
            changed_at: event.detected_at,
        });
    }
}

/// Value stored in the `sites` bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteState {
    pub hostname: String,
    pub port: u16,
    pub entity_name: String,
    pub known_ips: Vec<String>,
    #[serde(default)]
    pub last_change: Option<LastChange>,
    pub updated_at: DateTime<Utc>,
}

impl SiteState {
    /// Snapshot of a site as it stands now
    pub fn from_site(site: &Site, updated_at: DateTime<Utc>) -> Self {
        Self {
            hostname: site.hostname.clone(),
            port: site.port,
            entity_name: site.entity_name.clone(),
            known_ips: site.known_ips.clone(),
            last_change: site.last_change.clone(),
            updated_at,
        }
    }

    /// State of `site` once `event` has been applied
    pub fn after_change(site: &Site, event: &ChangeEvent) -> Self {
        let mut next = site.clone();
        next.apply_change(event);
        Self::from_site(&next, event.detected_at)
    }
}

/// Immutable record of one detected address change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub hostname: String,
    pub port: u16,
    pub entity_name: String,
    /// Known addresses at detection time
    pub old_ips: Vec<String>,
    /// Full resolved set at detection time, in resolver order
    pub new_ips: Vec<String>,
    /// Representative address that became authoritative
    pub new_ip: String,
    /// Wall-clock time of detection
    pub detected_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Key of this event in the `changes` bucket
    pub fn key(&self) -> String {
        change_key(&self.hostname, self.detected_at)
    }

    /// Old addresses joined for display
    pub fn old_ips_joined(&self) -> String {
        join_ips(&self.old_ips)
    }
}

/// Compound `changes` key: hostname plus nanosecond RFC 3339 timestamp.
///
/// The timestamp is fixed width, so keys of one host sort chronologically.
pub fn change_key(hostname: &str, detected_at: DateTime<Utc>) -> String {
    format!(
        "{}-{}",
        hostname,
        detected_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
    )
}

/// Addresses returned by one resolution attempt, filtered to IPv4.
///
/// Order is the resolver's order; duplicates are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAddresses {
    addrs: Vec<Ipv4Addr>,
}

impl ResolvedAddresses {
    /// Build from raw resolver output, discarding non-IPv4 results
    pub fn from_ips<I>(ips: I) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let mut addrs: Vec<Ipv4Addr> = Vec::new();
        for ip in ips {
            if let IpAddr::V4(v4) = ip
                && !addrs.contains(&v4)
            {
                addrs.push(v4);
            }
        }
        Self { addrs }
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ipv4Addr> {
        self.addrs.iter()
    }

    /// Pick the address that becomes authoritative on a change
    pub fn representative(&self, tie_break: TieBreak) -> Option<Ipv4Addr> {
        match tie_break {
            TieBreak::First => self.addrs.first().copied(),
            TieBreak::Lowest => self.addrs.iter().min().copied(),
        }
    }

    /// True if any resolved address equals any of `known`
    pub fn contains_any(&self, known: &[String]) -> bool {
        known.iter().any(|k| {
            let k = k.trim();
            match k.parse::<IpAddr>() {
                Ok(IpAddr::V4(v4)) => self.addrs.contains(&v4),
                Ok(IpAddr::V6(_)) => false,
                Err(_) => self.addrs.iter().any(|a| a.to_string() == k),
            }
        })
    }

    /// Addresses rendered as strings, in resolver order
    pub fn to_strings(&self) -> Vec<String> {
        self.addrs.iter().map(|a| a.to_string()).collect()
    }
}

/// Trim, drop empty entries and de-duplicate while keeping order
pub fn normalize_ips<I, S>(ips: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for ip in ips {
        let ip = ip.as_ref().trim();
        if !ip.is_empty() && !out.iter().any(|o| o == ip) {
            out.push(ip.to_string());
        }
    }
    out
}

/// Split a `;`-separated address cell
pub fn parse_ip_list(cell: &str) -> Vec<String> {
    normalize_ips(cell.split(IP_SEPARATOR))
}

/// Join addresses with the catalog separator
pub fn join_ips(ips: &[String]) -> String {
    ips.join(&IP_SEPARATOR.to_string())
}
