use std::collections::HashMap;
use std::fmt;

use log::debug;
use serde::Serialize;

use crate::{
    embedding::{distance, Embedding},
    store::EnrollmentRecord,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn label(&self) -> Option<&str> {
        match self {
            Identity::Known(label) => Some(label),
            Identity::Unknown => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Known(label) => f.write_str(label),
            Identity::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Identification outcome. `score` is the winning best-k cosine distance,
/// reported even when it misses the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub identity: Identity,
    pub score: f32,
}

impl MatchResult {
    pub fn unknown(score: f32) -> Self {
        Self {
            identity: Identity::Unknown,
            score,
        }
    }
}

/// Best-k score of one enrolled identity against a probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityScore {
    pub label: String,
    pub score: f32,
    pub samples: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    threshold: f32,
    top_k: usize,
}

impl Matcher {
    pub fn new(threshold: f32, top_k: usize) -> Self {
        Self {
            threshold,
            top_k: top_k.max(1),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Score every enrolled identity, best first.
    ///
    /// Identities are visited in the order their first record appears, and
    /// the sort is stable, so equal scores keep that order.
    pub fn rank(&self, probe: &Embedding, records: &[EnrollmentRecord]) -> Vec<IdentityScore> {
        let mut scores: Vec<IdentityScore> = group_by_label(records)
            .into_iter()
            .filter_map(|(label, group)| {
                let mut dists: Vec<f32> = group
                    .iter()
                    .map(|e| distance(probe.as_slice(), e.as_slice()))
                    .collect();
                debug!("{} -> {:?}", label, dists);
                best_k_mean(&mut dists, self.top_k).map(|score| IdentityScore {
                    label: label.to_string(),
                    score,
                    samples: group.len(),
                })
            })
            .collect();
        scores.sort_by(|a, b| a.score.total_cmp(&b.score));
        scores
    }

    /// Pick the closest enrolled identity, or `Unknown` when nothing scores
    /// under the threshold. An empty store yields `Unknown` with an infinite
    /// score. Ties go to the identity encountered first.
    pub fn identify(&self, probe: &Embedding, records: &[EnrollmentRecord]) -> MatchResult {
        let mut best: Option<IdentityScore> = None;
        let mut best_score = f32::INFINITY;
        for candidate in self.rank(probe, records) {
            if candidate.score < best_score {
                best_score = candidate.score;
                best = Some(candidate);
            }
        }

        match best {
            Some(winner) if winner.score < self.threshold => MatchResult {
                identity: Identity::Known(winner.label),
                score: winner.score,
            },
            _ => MatchResult::unknown(best_score),
        }
    }
}

/// Records grouped by label, in order of first appearance.
fn group_by_label(records: &[EnrollmentRecord]) -> Vec<(&str, Vec<&Embedding>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&Embedding>)> = Vec::new();
    for record in records {
        match index.get(record.label.as_str()) {
            Some(&i) => groups[i].1.push(&record.embedding),
            None => {
                index.insert(record.label.as_str(), groups.len());
                groups.push((record.label.as_str(), vec![&record.embedding]));
            }
        }
    }
    groups
}

/// Mean of the `k` smallest distances, `k` clamped to the group size.
/// `None` for an empty group.
fn best_k_mean(dists: &mut [f32], k: usize) -> Option<f32> {
    if dists.is_empty() {
        return None;
    }
    dists.sort_by(|a, b| a.total_cmp(b));
    let k = k.clamp(1, dists.len());
    Some(dists[..k].iter().sum::<f32>() / k as f32)
}
