//! Grouping and resolution of worker results.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::consensus::random::RandomSource;
use crate::error::Error;

/// How the returned value was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Agreement {
    /// Every successful worker returned the same value.
    Unanimous,
    /// The largest group was strictly larger than the runner-up.
    Majority,
    /// The two largest groups tied; one was picked at random.
    CoinFlip,
    /// Reconciliation was skipped.
    Unchecked,
}

impl Agreement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Agreement::Unanimous => "unanimous",
            Agreement::Majority => "majority",
            Agreement::CoinFlip => "coin-flip",
            Agreement::Unchecked => "unchecked",
        }
    }
}

impl std::fmt::Display for Agreement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values that serialize identically.
#[derive(Debug, Clone)]
struct Group {
    value: Value,
    count: usize,
    /// Worker whose result arrived first.
    worker: usize,
}

/// Winning group of a settled tally.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub value: Value,
    pub agreement: Agreement,
    /// Size of the winning group.
    pub agreeing: usize,
    /// Worker index that supplied the value.
    pub worker: usize,
}

/// Settlements recorded in arrival order.
#[derive(Debug, Default)]
pub struct Tally {
    groups: Vec<Group>,
    by_key: HashMap<String, usize>,
    failures: Vec<Error>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, worker: usize, value: Value) {
        // `Value`'s map is ordered, so this is the canonical form.
        let key = value.to_string();
        match self.by_key.get(&key) {
            Some(&group) => self.groups[group].count += 1,
            None => {
                self.by_key.insert(key, self.groups.len());
                self.groups.push(Group {
                    value,
                    count: 1,
                    worker,
                });
            }
        }
    }

    pub fn record_failure(&mut self, error: Error) {
        self.failures.push(error);
    }

    pub fn successes(&self) -> usize {
        self.groups.iter().map(|group| group.count).sum()
    }

    pub fn failures(&self) -> &[Error] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<Error> {
        self.failures
    }

    /// Number of distinct values seen.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Groups by count, largest first; equal counts keep arrival order.
    fn ranked(&self) -> Vec<&Group> {
        let mut ranked: Vec<&Group> = self.groups.iter().collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked
    }

    /// Whether `pending` more settlements could still change the winner.
    pub fn decided(&self, pending: usize) -> bool {
        if pending == 0 {
            return true;
        }
        let ranked = self.ranked();
        match ranked.as_slice() {
            [] => false,
            [top] => top.count > pending,
            [top, second, ..] => top.count > second.count + pending,
        }
    }

    /// Picks the trusted value. `None` when no worker succeeded.
    pub fn resolve(&self, random: &dyn RandomSource) -> Option<Resolution> {
        let ranked = self.ranked();
        match ranked.as_slice() {
            [] => None,
            [only] => Some(Resolution {
                value: only.value.clone(),
                agreement: Agreement::Unanimous,
                agreeing: only.count,
                worker: only.worker,
            }),
            [top, second, ..] if top.count > second.count => Some(Resolution {
                value: top.value.clone(),
                agreement: Agreement::Majority,
                agreeing: top.count,
                worker: top.worker,
            }),
            [first, second, ..] => {
                let winner = if random.coin_flip() { first } else { second };
                warn!(
                    count = first.count,
                    first = %first.value,
                    second = %second.value,
                    chosen = %winner.value,
                    "Backends tied; picked a value at random"
                );
                Some(Resolution {
                    value: winner.value.clone(),
                    agreement: Agreement::CoinFlip,
                    agreeing: winner.count,
                    worker: winner.worker,
                })
            }
        }
    }
}
