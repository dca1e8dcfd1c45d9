use std::collections::HashSet;

/// Policy ceiling mirroring venue limits on one subscribe call
pub const MAX_INSTRUMENTS_PER_CALL: usize = 200;

/// What one subscribe call should actually send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePlan {
    pub channel: String,
    /// Empty for a global/unkeyed channel
    pub symbols: Vec<String>,
}

/// Tracked (channel, instrument) subscription state for one session
///
/// Idempotent: planning the same instrument twice without the force flag
/// yields nothing to send and exactly one tracked entry. The force flag is
/// used after a reconnect to re-send everything already tracked.
#[derive(Debug, Default)]
pub struct SubscriptionBook {
    tracked: HashSet<(String, String)>,
}

impl SubscriptionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide which subscriptions a call should send, recording new ones
    ///
    /// Returns `None` when there is nothing to send: every instrument was
    /// already tracked (and force is unset), or the call exceeded the
    /// instrument ceiling.
    pub fn plan(
        &mut self,
        channel: &str,
        symbols: &[String],
        force: bool,
    ) -> Option<SubscribePlan> {
        if symbols.len() > MAX_INSTRUMENTS_PER_CALL {
            tracing::warn!(
                "refusing to subscribe {} instruments to {} (limit {})",
                symbols.len(),
                channel,
                MAX_INSTRUMENTS_PER_CALL
            );
            return None;
        }

        // Global channel: keyed by (channel, "")
        if symbols.is_empty() {
            let newly_tracked = self
                .tracked
                .insert((channel.to_string(), String::new()));
            if newly_tracked || force {
                return Some(SubscribePlan {
                    channel: channel.to_string(),
                    symbols: Vec::new(),
                });
            }
            return None;
        }

        let mut to_send = Vec::new();
        for symbol in symbols {
            let newly_tracked = self
                .tracked
                .insert((channel.to_string(), symbol.clone()));
            if newly_tracked || force {
                to_send.push(symbol.clone());
            }
        }

        if to_send.is_empty() {
            return None;
        }

        Some(SubscribePlan {
            channel: channel.to_string(),
            symbols: to_send,
        })
    }

    /// Every tracked (channel, symbols) group, for resubscribing after a
    /// reconnect
    pub fn tracked_by_channel(&self) -> Vec<SubscribePlan> {
        let mut channels: Vec<String> = self
            .tracked
            .iter()
            .map(|(channel, _)| channel.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        channels.sort();

        channels
            .into_iter()
            .map(|channel| {
                let mut symbols: Vec<String> = self
                    .tracked
                    .iter()
                    .filter(|(c, s)| *c == channel && !s.is_empty())
                    .map(|(_, s)| s.clone())
                    .collect();
                symbols.sort();
                SubscribePlan { channel, symbols }
            })
            .collect()
    }

    pub fn is_tracked(&self, channel: &str, symbol: &str) -> bool {
        self.tracked
            .contains(&(channel.to_string(), symbol.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}
