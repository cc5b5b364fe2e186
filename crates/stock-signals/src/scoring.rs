//! Weighted aggregation of category scores and the buy/hold/sell mapping

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{Category, Recommendation};

/// Weight for categories missing from the table
pub const DEFAULT_UNKNOWN_WEIGHT: f64 = 0.1;
pub const DEFAULT_BUY_THRESHOLD: f64 = 3.0;
pub const DEFAULT_SELL_THRESHOLD: f64 = -3.0;

/// Named weight tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightPreset {
    #[default]
    Balanced,
    Growth,
    Value,
    Income,
    Momentum,
}

impl WeightPreset {
    pub const ALL: [WeightPreset; 5] = [
        WeightPreset::Balanced,
        WeightPreset::Growth,
        WeightPreset::Value,
        WeightPreset::Income,
        WeightPreset::Momentum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Growth => "growth",
            Self::Value => "value",
            Self::Income => "income",
            Self::Momentum => "momentum",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Balanced => "General-purpose weighting",
            Self::Growth => "Fundamentals, analyst consensus and technical momentum",
            Self::Value => "Fundamentals, risk and insider conviction",
            Self::Income => "Stable fundamentals and low risk for dividend holders",
            Self::Momentum => "Technicals and sentiment for trend following",
        }
    }

    /// Weights in [`Category::ALL`] order
    fn table(&self) -> [f64; 7] {
        match self {
            Self::Balanced => [0.20, 0.15, 0.10, 0.20, 0.10, 0.10, 0.15],
            Self::Growth => [0.25, 0.20, 0.05, 0.25, 0.10, 0.05, 0.10],
            Self::Value => [0.30, 0.10, 0.15, 0.10, 0.05, 0.10, 0.20],
            Self::Income => [0.30, 0.10, 0.10, 0.05, 0.10, 0.15, 0.20],
            Self::Momentum => [0.10, 0.20, 0.05, 0.35, 0.15, 0.05, 0.10],
        }
    }

    pub fn weights(&self) -> BTreeMap<Category, f64> {
        Category::ALL.into_iter().zip(self.table()).collect()
    }
}

impl fmt::Display for WeightPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| ConfigError::invalid("weight preset", format!("unknown preset '{s}'")))
    }
}

/// Default category weights
pub fn default_weights() -> BTreeMap<Category, f64> {
    WeightPreset::Balanced.weights()
}

/// Check a weight table by category name
///
/// Every category must be present, no unknown names, no negative values, and
/// the total must fall within 0.99..=1.01.
pub fn validate_weights(weights: &BTreeMap<String, f64>) -> Result<BTreeMap<Category, f64>, ConfigError> {
    let missing: Vec<&str> = Category::ALL
        .iter()
        .map(Category::as_str)
        .filter(|name| !weights.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::invalid("weights", format!("missing categories: {}", missing.join(", "))));
    }

    let mut typed = BTreeMap::new();
    let mut unknown = Vec::new();
    for (name, &weight) in weights {
        match name.parse::<Category>() {
            Ok(category) => {
                if !weight.is_finite() || weight < 0.0 {
                    return Err(ConfigError::invalid("weights", format!("weight for {name} cannot be negative")));
                }
                typed.insert(category, weight);
            }
            Err(_) => unknown.push(name.as_str()),
        }
    }
    if !unknown.is_empty() {
        return Err(ConfigError::invalid("weights", format!("unknown categories: {}", unknown.join(", "))));
    }

    let total: f64 = typed.values().sum();
    if !(0.99..=1.01).contains(&total) {
        return Err(ConfigError::invalid(
            "weights",
            format!("weights must sum to 100% (currently {:.1}%)", total * 100.0),
        ));
    }
    Ok(typed)
}

/// Rescale weights to sum to 1, rounded to 4 places
///
/// A table summing to zero falls back to the defaults.
pub fn normalize_weights(weights: &BTreeMap<Category, f64>) -> BTreeMap<Category, f64> {
    let total: f64 = weights.values().sum();
    if total == 0.0 {
        return default_weights();
    }
    weights
        .iter()
        .map(|(&category, &weight)| (category, (weight / total * 10_000.0).round() / 10_000.0))
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Weights and thresholds used to score a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: BTreeMap<Category, f64>,
    /// Weight for categories absent from `weights`
    pub default_weight: f64,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::from_preset(WeightPreset::Balanced)
    }
}

impl ScoringConfig {
    pub fn from_preset(preset: WeightPreset) -> Self {
        Self {
            weights: preset.weights(),
            default_weight: DEFAULT_UNKNOWN_WEIGHT,
            buy_threshold: DEFAULT_BUY_THRESHOLD,
            sell_threshold: DEFAULT_SELL_THRESHOLD,
        }
    }

    /// Reject thresholds out of order and weights that are negative or do
    /// not sum to 1
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buy_threshold <= self.sell_threshold {
            return Err(ConfigError::invalid(
                "thresholds",
                format!(
                    "buy threshold {} must be above sell threshold {}",
                    self.buy_threshold, self.sell_threshold
                ),
            ));
        }
        let mut weights = self.weights.values().chain([&self.default_weight]);
        if weights.any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::invalid("weights", "weights cannot be negative"));
        }
        let total: f64 = self.weights.values().sum();
        if !(0.99..=1.01).contains(&total) {
            return Err(ConfigError::invalid(
                "weights",
                format!("weights must sum to 100% (currently {:.1}%)", total * 100.0),
            ));
        }
        Ok(())
    }

    pub fn weight(&self, category: Category) -> f64 {
        self.weights.get(&category).copied().unwrap_or(self.default_weight)
    }

    /// Weighted mean over the categories present, rounded to 2 places
    pub fn weighted_score(&self, scores: &BTreeMap<Category, f64>) -> f64 {
        let (sum, total) = scores.iter().fold((0.0, 0.0), |(sum, total), (&category, &score)| {
            let weight = self.weight(category);
            (sum + score * weight, total + weight)
        });
        if total == 0.0 { 0.0 } else { round2(sum / total) }
    }

    /// Same as [`Self::weighted_score`] for name-keyed scores
    ///
    /// Names that are not categories use the default weight.
    pub fn weighted_score_by_name(&self, scores: &BTreeMap<String, f64>) -> f64 {
        let (sum, total) = scores.iter().fold((0.0, 0.0), |(sum, total), (name, &score)| {
            let weight = name.parse().map_or(self.default_weight, |c| self.weight(c));
            (sum + score * weight, total + weight)
        });
        if total == 0.0 { 0.0 } else { round2(sum / total) }
    }

    /// Map a score to a recommendation; thresholds are inclusive
    pub fn recommend(&self, score: f64) -> Recommendation {
        if score >= self.buy_threshold {
            Recommendation::Buy
        } else if score <= self.sell_threshold {
            Recommendation::Sell
        } else {
            Recommendation::Hold
        }
    }
}

/// Weighted score with the default weights
pub fn weighted_score(scores: &BTreeMap<Category, f64>) -> f64 {
    ScoringConfig::default().weighted_score(scores)
}

/// Recommendation with the default thresholds
pub fn score_to_recommendation(score: f64) -> Recommendation {
    ScoringConfig::default().recommend(score)
}
