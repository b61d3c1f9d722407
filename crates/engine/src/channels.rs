//! Channel precedence.
//!
//! `final = mandatory ∪ (optional ∩ group_enabled ∩ user_enabled)`
//!
//! Mandatory channels are always delivered. An optional channel is delivered
//! only when the recipient's group policy and the recipient's own preference
//! both allow it.

use std::collections::BTreeSet;

use herald_common::types::Channel;

pub type ChannelSet = BTreeSet<Channel>;

/// Build a channel set from a slice, collapsing duplicates.
pub fn set(channels: &[Channel]) -> ChannelSet {
    channels.iter().copied().collect()
}

/// Resolve the channels a recipient receives a notification on.
pub fn resolve_channels(
    mandatory: &ChannelSet,
    optional: &ChannelSet,
    group_enabled: &ChannelSet,
    user_enabled: &ChannelSet,
) -> ChannelSet {
    let mut resolved = mandatory.clone();
    resolved.extend(
        optional
            .iter()
            .filter(|c| group_enabled.contains(*c) && user_enabled.contains(*c)),
    );
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use Channel::*;

    #[test]
    fn test_reservation_scenario() {
        let resolved = resolve_channels(
            &set(&[Websocket]),
            &set(&[Email, Push, Sms]),
            &set(&[Email, Push, Sms, Websocket]),
            &set(&[Websocket, Email]),
        );
        assert_eq!(resolved, set(&[Websocket, Email]));
    }

    #[test]
    fn test_mandatory_overrides_policy() {
        let resolved = resolve_channels(&set(&[Sms, Slack]), &set(&[]), &set(&[]), &set(&[]));
        assert_eq!(resolved, set(&[Sms, Slack]));
    }

    #[test]
    fn test_optional_needs_group_and_user() {
        let resolved = resolve_channels(
            &set(&[]),
            &set(&[Email, Push, Sms]),
            &set(&[Email, Push]),
            &set(&[Push, Sms]),
        );
        assert_eq!(resolved, set(&[Push]));
    }

    #[test]
    fn test_empty_inputs_resolve_to_nothing() {
        let resolved = resolve_channels(
            &set(&[]),
            &set(&[Email]),
            &set(&[Push]),
            &set(&[Email, Push]),
        );
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_duplicates_collapse() {
        assert_eq!(set(&[Email, Email, Push]).len(), 2);
    }

    /// Exhaustive check over every subset combination of three channels.
    #[test]
    fn test_algebra_holds_for_all_small_sets() {
        let universe = [Email, Push, Sms];
        let subsets: Vec<ChannelSet> = (0u8..8)
            .map(|mask| {
                universe
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, c)| *c)
                    .collect()
            })
            .collect();

        for m in &subsets {
            for o in &subsets {
                for g in &subsets {
                    for u in &subsets {
                        let resolved = resolve_channels(m, o, g, u);
                        assert!(resolved.is_superset(m));
                        for extra in resolved.difference(m) {
                            assert!(o.contains(extra) && g.contains(extra) && u.contains(extra));
                        }
                    }
                }
            }
        }
    }
}
