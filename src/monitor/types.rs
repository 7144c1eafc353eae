// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// What a recommendation is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationCategory {
    HitRate,
    Memory,
    Latency,
    Ttl,
    Connection,
}

impl RecommendationCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HitRate => "HIT_RATE",
            Self::Memory => "MEMORY",
            Self::Latency => "LATENCY",
            Self::Ttl => "TTL",
            Self::Connection => "CONNECTION",
        }
    }
}

impl std::fmt::Display for RecommendationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency. Orders `High` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Contribution to a report's impact score.
    #[must_use]
    pub fn weight(&self) -> u32 {
        match self {
            Self::High => 10,
            Self::Medium => 5,
            Self::Low => 2,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub priority: Priority,
    pub message: String,
    pub suggested_action: String,
}

impl Recommendation {
    pub(crate) fn new(
        category: RecommendationCategory,
        priority: Priority,
        message: impl Into<String>,
        suggested_action: impl Into<String>,
    ) -> Self {
        Self {
            category,
            priority,
            message: message.into(),
            suggested_action: suggested_action.into(),
        }
    }
}

/// Recommendations ready for a dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationReport {
    pub generated_at: SystemTime,
    /// Sorted by priority, then category
    pub recommendations: Vec<Recommendation>,
    pub by_priority: BTreeMap<Priority, Vec<Recommendation>>,
    pub by_category: BTreeMap<RecommendationCategory, Vec<Recommendation>>,
    /// Sum of priority weights
    pub impact_score: u32,
}

impl RecommendationReport {
    #[must_use]
    pub fn new(mut recommendations: Vec<Recommendation>) -> Self {
        recommendations.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.category.cmp(&b.category))
        });

        let mut by_priority: BTreeMap<Priority, Vec<Recommendation>> = BTreeMap::new();
        let mut by_category: BTreeMap<RecommendationCategory, Vec<Recommendation>> = BTreeMap::new();
        for recommendation in &recommendations {
            by_priority
                .entry(recommendation.priority)
                .or_default()
                .push(recommendation.clone());
            by_category
                .entry(recommendation.category)
                .or_default()
                .push(recommendation.clone());
        }

        let impact_score = recommendations.iter().map(|r| r.priority.weight()).sum();

        Self {
            generated_at: SystemTime::now(),
            recommendations,
            by_priority,
            by_category,
            impact_score,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recommendations.is_empty()
    }

    #[must_use]
    pub fn count(&self, priority: Priority) -> usize {
        self.by_priority.get(&priority).map_or(0, Vec::len)
    }
}
