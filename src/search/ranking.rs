//! Multi-factor relevance scoring.
//!
//! A score is the weighted sum of six independently bounded [0,1] sub-scores,
//! clamped to 1.0. Weights come from the user's `scoring_weights` map with
//! built-in defaults per key. Scoring has no failure modes: absent fields
//! contribute 0 to their sub-score.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::model::types::{Lead, SearchFilters, UserPreferences};

use super::query::ParsedQuery;

/// Effective weights for the six ranking factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub text_relevance: f64,
    pub industry_match: f64,
    pub location_proximity: f64,
    pub company_size: f64,
    pub data_quality: f64,
    pub freshness: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            text_relevance: 0.40,
            industry_match: 0.25,
            location_proximity: 0.15,
            company_size: 0.10,
            data_quality: 0.05,
            freshness: 0.05,
        }
    }
}

impl ScoringWeights {
    /// Resolve weights from a user map; missing keys keep their defaults.
    pub fn from_map(map: &BTreeMap<String, f64>) -> Self {
        let d = ScoringWeights::default();
        let get = |key: &str, default: f64| map.get(key).copied().unwrap_or(default);
        ScoringWeights {
            text_relevance: get("text_relevance", d.text_relevance),
            industry_match: get("industry_match", d.industry_match),
            location_proximity: get("location_proximity", d.location_proximity),
            company_size: get("company_size", d.company_size),
            data_quality: get("data_quality", d.data_quality),
            freshness: get("freshness", d.freshness),
        }
    }
}

/// Per-field weights for the text sub-score.
const TEXT_FIELDS: &[(&str, f64)] = &[
    ("company", 0.4),
    ("description", 0.3),
    ("industry", 0.2),
    ("contact", 0.1),
];

const STARTS_WITH_BONUS: f64 = 0.8;
const CONTAINS_BONUS: f64 = 0.5;

pub struct RankingAlgorithm {
    preferences: UserPreferences,
    weights: ScoringWeights,
}

impl RankingAlgorithm {
    pub fn new(preferences: Option<&UserPreferences>) -> Self {
        let preferences = preferences.cloned().unwrap_or_default();
        let weights = ScoringWeights::from_map(&preferences.scoring_weights);
        RankingAlgorithm {
            preferences,
            weights,
        }
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// Relevance score in [0,1] plus human-readable match reasons.
    pub fn score(
        &self,
        lead: &Lead,
        parsed: &ParsedQuery,
        filters: &SearchFilters,
    ) -> (f64, Vec<String>) {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        let (text, mut r) = self.text_score(lead, parsed);
        score += text * self.weights.text_relevance;
        reasons.append(&mut r);

        let (industry, mut r) = self.industry_score(lead, filters);
        score += industry * self.weights.industry_match;
        reasons.append(&mut r);

        let (location, mut r) = self.location_score(lead, filters);
        score += location * self.weights.location_proximity;
        reasons.append(&mut r);

        let (size, mut r) = self.size_score(lead, filters);
        score += size * self.weights.company_size;
        reasons.append(&mut r);

        let (quality, mut r) = self.quality_score(lead);
        score += quality * self.weights.data_quality;
        reasons.append(&mut r);

        let (freshness, mut r) = self.freshness_score(lead);
        score += freshness * self.weights.freshness;
        reasons.append(&mut r);

        (score.min(1.0), reasons)
    }

    fn text_score(&self, lead: &Lead, parsed: &ParsedQuery) -> (f64, Vec<String>) {
        if parsed.is_empty() {
            return (0.0, Vec::new());
        }

        let mut score = 0.0;
        let mut reasons = Vec::new();

        for &(field, weight) in TEXT_FIELDS {
            let value = match field {
                "company" => Some(lead.company.as_str()),
                "description" => lead.description.as_deref(),
                "industry" => lead.industry.as_deref(),
                _ => lead.contact.as_deref(),
            };
            let Some(value) = value.filter(|v| !v.is_empty()) else {
                continue;
            };
            let lowered = value.to_lowercase();

            for term in &parsed.terms {
                if lowered.contains(term.as_str()) {
                    let bonus = if lowered.starts_with(term.as_str()) {
                        STARTS_WITH_BONUS
                    } else {
                        CONTAINS_BONUS
                    };
                    score += weight * bonus;
                    reasons.push(format!("Term '{term}' found in {field}"));
                }
            }

            for phrase in &parsed.phrases {
                if lowered.contains(phrase.as_str()) {
                    score += weight;
                    reasons.push(format!("Phrase '{phrase}' found in {field}"));
                }
            }
        }

        (score.min(1.0), reasons)
    }

    fn industry_score(&self, lead: &Lead, filters: &SearchFilters) -> (f64, Vec<String>) {
        let Some(industry) = lead.industry.as_deref().filter(|v| !v.is_empty()) else {
            return (0.0, Vec::new());
        };

        if let Some(wanted) = &filters.industry {
            let lead_lower = industry.to_lowercase();
            let wanted_lower = wanted.to_lowercase();
            if lead_lower == wanted_lower {
                return (1.0, vec![format!("Exact industry match: {industry}")]);
            }
            if lead_lower.contains(&wanted_lower) {
                return (0.7, vec![format!("Partial industry match: {industry}")]);
            }
        }

        if self
            .preferences
            .preferred_industries
            .iter()
            .any(|p| p == industry)
        {
            return (0.6, vec![format!("User preferred industry: {industry}")]);
        }

        (0.0, Vec::new())
    }

    fn location_score(&self, lead: &Lead, filters: &SearchFilters) -> (f64, Vec<String>) {
        let Some(location) = lead.location.as_deref().filter(|v| !v.is_empty()) else {
            return (0.0, Vec::new());
        };

        if let Some(wanted) = &filters.location {
            let lead_lower = location.to_lowercase();
            let wanted_lower = wanted.to_lowercase();
            if lead_lower == wanted_lower {
                return (1.0, vec![format!("Exact location match: {location}")]);
            }
            if wanted_lower
                .split_whitespace()
                .any(|part| lead_lower.contains(part))
            {
                return (0.8, vec![format!("Location proximity: {location}")]);
            }
        }

        if self
            .preferences
            .preferred_locations
            .iter()
            .any(|p| p == location)
        {
            return (0.6, vec![format!("User preferred location: {location}")]);
        }

        (0.0, Vec::new())
    }

    fn size_score(&self, lead: &Lead, filters: &SearchFilters) -> (f64, Vec<String>) {
        let (Some(wanted), Some(employees)) = (
            filters.company_size.as_deref(),
            lead.employees.as_deref().filter(|v| !v.is_empty()),
        ) else {
            return (0.0, Vec::new());
        };

        if employees == wanted {
            return (1.0, vec![format!("Exact size match: {employees}")]);
        }
        if employees.contains(wanted) || wanted.contains(employees) {
            return (0.7, vec![format!("Size range match: {employees}")]);
        }

        (0.0, Vec::new())
    }

    fn quality_score(&self, lead: &Lead) -> (f64, Vec<String>) {
        let fields = [
            Some(lead.company.as_str()),
            lead.contact.as_deref(),
            lead.email.as_deref(),
            lead.phone.as_deref(),
            lead.industry.as_deref(),
            lead.location.as_deref(),
            lead.description.as_deref(),
        ];
        let filled = fields
            .iter()
            .filter(|f| f.is_some_and(|v| !v.trim().is_empty()))
            .count();
        let score = filled as f64 / fields.len() as f64;

        let mut reasons = Vec::new();
        if score > 0.8 {
            reasons.push("High data completeness".to_string());
        } else if score > 0.5 {
            reasons.push("Good data completeness".to_string());
        }
        (score, reasons)
    }

    fn freshness_score(&self, lead: &Lead) -> (f64, Vec<String>) {
        let Some(created_at) = lead.created_at else {
            return (0.0, Vec::new());
        };
        let days_old = (Utc::now() - created_at).num_days();
        match days_old {
            ..=7 => (1.0, vec!["Very recent lead".to_string()]),
            8..=30 => (0.8, vec!["Recent lead".to_string()]),
            31..=90 => (0.5, vec!["Moderately recent lead".to_string()]),
            _ => (0.2, Vec::new()),
        }
    }
}
