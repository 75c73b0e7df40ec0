//! Frequency ranking for categorical labels
//!
//! Counts are ordered by frequency descending. Labels with equal counts keep
//! the order in which they were first seen in the batch, so the same batch
//! always produces the same ranking.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One label and how many records carried it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

/// A ranked breakdown of a categorical field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedPattern {
    /// Highest-frequency labels, truncated to the configured top-N
    pub counts: Vec<LabelCount>,
    /// The single most frequent label
    pub top_label: String,
    /// Count for `top_label`
    pub top_count: u64,
    /// Distinct labels seen before truncation
    pub distinct: usize,
}

/// Count labels and rank them, keeping first-encounter order for ties
pub fn rank_labels<'a, I>(labels: I) -> Vec<LabelCount>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut index: HashMap<&'a str, usize> = HashMap::new();
    let mut counts: Vec<LabelCount> = Vec::new();

    for label in labels {
        match index.get(label) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(label, counts.len());
                counts.push(LabelCount {
                    label: label.to_string(),
                    count: 1,
                });
            }
        }
    }

    // sort_by is stable, so ties stay in encounter order
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

impl RankedPattern {
    /// Build a pattern from a full ranking, keeping at most `top_n` entries
    ///
    /// Returns `None` for an empty ranking since there is no top label.
    pub fn from_ranking(ranking: &[LabelCount], top_n: usize) -> Option<Self> {
        let top = ranking.first()?;
        Some(Self {
            counts: ranking.iter().take(top_n).cloned().collect(),
            top_label: top.label.clone(),
            top_count: top.count,
            distinct: ranking.len(),
        })
    }
}
