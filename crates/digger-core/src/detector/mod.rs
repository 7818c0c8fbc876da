//! Change detection
//!
//! The detector is a pure decision function: given a site's known addresses
//! and a fresh resolution it says whether the site changed. It never touches
//! the store and never notifies; that is the recorder's job.
//!
//! ## Decision Order
//!
//! 1. Empty resolution: `Unchanged` (nothing to compare against)
//! 2. Several known addresses outside update mode: `Ambiguous`
//! 3. Any resolved address already known: `Unchanged`
//! 4. Otherwise: `Changed`, with a single representative address

use crate::config::TieBreak;
use crate::model::{ResolvedAddresses, Site};
use tracing::{debug, warn};

/// Outcome of comparing one site against a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDecision {
    /// Known state still holds
    Unchanged,

    /// Address changed
    Changed {
        /// Known addresses before the change
        old_ips: Vec<String>,
        /// Full resolved set, resolver order
        new_ips: Vec<String>,
        /// Representative address that becomes authoritative
        new_ip: String,
    },

    /// Several addresses are known, so the change needs a human
    Ambiguous {
        known_ips: Vec<String>,
        resolved: Vec<String>,
    },
}

impl ChangeDecision {
    pub fn is_changed(&self) -> bool {
        matches!(self, ChangeDecision::Changed { .. })
    }

    /// Short label for logs and events
    pub fn label(&self) -> &'static str {
        match self {
            ChangeDecision::Unchanged => "unchanged",
            ChangeDecision::Changed { .. } => "changed",
            ChangeDecision::Ambiguous { .. } => "ambiguous",
        }
    }
}

/// Decides whether a site's address changed
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    update_mode: bool,
    tie_break: TieBreak,
}

impl ChangeDetector {
    pub fn new(update_mode: bool, tie_break: TieBreak) -> Self {
        Self {
            update_mode,
            tie_break,
        }
    }

    /// Compare `site.known_ips` against `resolved`
    pub fn detect(&self, site: &Site, resolved: &ResolvedAddresses) -> ChangeDecision {
        let Some(representative) = resolved.representative(self.tie_break) else {
            warn!(hostname = %site.hostname, "No IPv4 addresses resolved, keeping known state");
            return ChangeDecision::Unchanged;
        };

        if site.is_ambiguous() && !self.update_mode {
            warn!(
                hostname = %site.hostname,
                known = %site.known_ips_joined(),
                resolved = %resolved.to_strings().join(";"),
                "Multiple known addresses, manual confirmation required (use --update to overwrite)"
            );
            return ChangeDecision::Ambiguous {
                known_ips: site.known_ips.clone(),
                resolved: resolved.to_strings(),
            };
        }

        if resolved.contains_any(&site.known_ips) {
            debug!(hostname = %site.hostname, "Known address still resolves");
            return ChangeDecision::Unchanged;
        }

        ChangeDecision::Changed {
            old_ips: site.known_ips.clone(),
            new_ips: resolved.to_strings(),
            new_ip: representative.to_string(),
        }
    }
}
