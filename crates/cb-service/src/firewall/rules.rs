//! Derivation of the desired firewall rule set.
//!
//! The rule set is never stored: it is rebuilt from the live whitelist on
//! every sync, so the upstream call always carries the complete desired
//! state.

use crate::firewall::{Direction, FirewallRule, Protocol};
use crate::models::WhitelistEntry;
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::warn;

/// Convert an IP literal to CIDR notation.
///
/// Returns `None` for unparseable addresses; they are skipped rather than
/// failing the whole sync.
#[must_use]
pub fn to_cidr(ip: &str) -> Option<String> {
    let trimmed = ip.trim();
    match trimmed.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Some(format!("{v4}/32")),
        Ok(IpAddr::V6(v6)) => Some(format!("{v6}/128")),
        Err(e) => {
            warn!(
                target: "cb.firewall.rules",
                ip = %trimmed,
                error = %e,
                "Skipping unparseable whitelist IP"
            );
            None
        }
    }
}

/// Build the complete desired rule set from the active whitelist entries.
///
/// IPs are normalized to CIDR, deduplicated in first-seen order and chunked
/// to `max_ips_per_rule`; each chunk yields one inbound TCP rule and one
/// inbound UDP rule.
#[must_use]
pub fn build_rule_set(entries: &[WhitelistEntry], max_ips_per_rule: usize) -> Vec<FirewallRule> {
    let mut seen = HashSet::new();
    let mut cidrs = Vec::new();
    for entry in entries {
        if let Some(cidr) = to_cidr(&entry.allowed_ip) {
            if seen.insert(cidr.clone()) {
                cidrs.push(cidr);
            }
        }
    }

    let mut rules = Vec::new();
    for chunk in cidrs.chunks(max_ips_per_rule.max(1)) {
        // No ports on either rule: the port might be different on each
        // TURN server.
        rules.push(FirewallRule {
            direction: Direction::In,
            protocol: Protocol::Tcp,
            source_ips: chunk.to_vec(),
        });
        rules.push(FirewallRule {
            direction: Direction::In,
            protocol: Protocol::Udp,
            source_ips: chunk.to_vec(),
        });
    }
    rules
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(ip: &str) -> WhitelistEntry {
        WhitelistEntry {
            id: 0,
            session_id: "game/1".to_string(),
            user_id: 1,
            allowed_ip: ip.to_string(),
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn ipv4_and_ipv6_are_normalized() {
        assert_eq!(to_cidr("88.217.205.180"), Some("88.217.205.180/32".into()));
        assert_eq!(to_cidr(" 2001:db8::1 "), Some("2001:db8::1/128".into()));
        assert_eq!(to_cidr("not-an-ip"), None);
    }

    #[test]
    fn four_ips_with_limit_three_produce_two_chunks_of_both_protocols() {
        let entries = vec![
            entry("1.0.0.1"),
            entry("1.0.0.2"),
            entry("1.0.0.3"),
            entry("1.0.0.4"),
        ];

        let rules = build_rule_set(&entries, 3);
        assert_eq!(rules.len(), 4);

        let tcp: Vec<_> = rules
            .iter()
            .filter(|r| r.protocol == Protocol::Tcp)
            .collect();
        let udp: Vec<_> = rules
            .iter()
            .filter(|r| r.protocol == Protocol::Udp)
            .collect();

        assert_eq!(tcp.len(), 2);
        assert_eq!(udp.len(), 2);
        assert_eq!(tcp[0].source_ips.len(), 3);
        assert_eq!(tcp[1].source_ips.len(), 1);
        assert_eq!(udp[0].source_ips.len(), 3);
        assert_eq!(udp[1].source_ips.len(), 1);
        assert!(rules.iter().all(|r| r.direction == Direction::In));
    }

    #[test]
    fn duplicate_ips_collapse_and_keep_first_seen_order() {
        let entries = vec![entry("1.0.0.2"), entry("1.0.0.1"), entry("1.0.0.2")];

        let rules = build_rule_set(&entries, 10);
        assert_eq!(rules.len(), 2);
        assert_eq!(
            rules[0].source_ips,
            vec!["1.0.0.2/32".to_string(), "1.0.0.1/32".to_string()]
        );
    }

    #[test]
    fn unparseable_ips_are_skipped() {
        let entries = vec![entry("garbage"), entry("1.0.0.1")];

        let rules = build_rule_set(&entries, 10);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].source_ips, vec!["1.0.0.1/32".to_string()]);
    }

    #[test]
    fn no_active_entries_yield_no_rules() {
        assert!(build_rule_set(&[], 10).is_empty());
    }
}
