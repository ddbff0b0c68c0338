//! Core data models used throughout the dive log assistant.
//!
//! These types represent the dive log entries, preferences, search requests,
//! and search results that flow between the record store, the tool layer,
//! and the agent.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{DiveLogError, DiveResult};

/// Deepest depth accepted for a dive, in meters.
pub const MAX_DEPTH_METERS: f64 = 350.0;

/// Longest dive accepted, in minutes (one day).
pub const MAX_LENGTH_MINUTES: i64 = 24 * 60;

/// A stored dive log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiveLogEntry {
    pub id: String,
    pub narrative: String,
    pub site: String,
    pub area: Option<String>,
    pub country: Option<String>,
    /// Maximum depth in meters.
    pub depth_max: f64,
    /// Average depth in meters. Never exceeds `depth_max`.
    pub depth_avg: Option<f64>,
    pub length_minutes: i64,
    /// Open set: `recreational`, `wreck`, `cave`, `decompression`, or a
    /// comma-separated combination such as `wreck,recreational`.
    pub dive_type: String,
    pub highlights: Option<String>,
    /// `YYYY-MM-DD`.
    pub date: Option<String>,
    /// `HH:MM`, 24-hour local time.
    pub time: Option<String>,
    pub equipment: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl DiveLogEntry {
    /// Individual dive types, lowercased and trimmed.
    pub fn dive_types(&self) -> Vec<String> {
        split_types(&self.dive_type)
    }

    /// Text representation used for embedding generation.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![self.site.clone()];
        if let Some(area) = &self.area {
            parts.push(area.clone());
        }
        if let Some(country) = &self.country {
            parts.push(country.clone());
        }
        parts.push(format!("{} dive", self.dive_type));
        if let Some(highlights) = &self.highlights {
            parts.push(highlights.clone());
        }
        parts.push(self.narrative.clone());
        parts.join("\n")
    }
}

/// Input for creating a dive log entry.
///
/// Field aliases accept the column names used by older sample files
/// (`location_site`, `max_depth`, `dive_length`, `content`, ...).
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct NewDiveLog {
    #[serde(alias = "location_site")]
    pub site: String,
    #[serde(alias = "content")]
    pub narrative: String,
    #[serde(alias = "max_depth")]
    pub depth_max: f64,
    #[serde(alias = "dive_length")]
    pub length_minutes: i64,
    pub dive_type: String,
    #[serde(default, alias = "location_area")]
    pub area: Option<String>,
    #[serde(default, alias = "location_country")]
    pub country: Option<String>,
    #[serde(default)]
    pub depth_avg: Option<f64>,
    #[serde(default)]
    pub highlights: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default, alias = "equipment_used")]
    pub equipment: Vec<String>,
}

impl NewDiveLog {
    /// Validate required fields and canonicalize optional ones.
    ///
    /// Strings are trimmed, blank optionals become `None`, dates are
    /// rewritten as `YYYY-MM-DD` and times as `HH:MM`.
    pub fn normalize(self) -> DiveResult<NewDiveLog> {
        let site = required_text("site", &self.site)?;
        let narrative = required_text("narrative", &self.narrative)?;
        let dive_type = required_text("dive_type", &self.dive_type)?;

        if !self.depth_max.is_finite() || self.depth_max < 0.0 {
            return Err(DiveLogError::validation(
                "depth_max must be a non-negative number of meters",
            ));
        }
        if self.depth_max > MAX_DEPTH_METERS {
            return Err(DiveLogError::validation(format!(
                "depth_max ({}) must be at most {} meters",
                self.depth_max, MAX_DEPTH_METERS
            )));
        }
        if let Some(avg) = self.depth_avg {
            if !avg.is_finite() || avg < 0.0 {
                return Err(DiveLogError::validation(
                    "depth_avg must be a non-negative number of meters",
                ));
            }
            if avg > self.depth_max {
                return Err(DiveLogError::validation(format!(
                    "depth_avg ({}) must not exceed depth_max ({})",
                    avg, self.depth_max
                )));
            }
        }
        if self.length_minutes <= 0 {
            return Err(DiveLogError::validation(
                "length_minutes must be a positive number of minutes",
            ));
        }
        if self.length_minutes > MAX_LENGTH_MINUTES {
            return Err(DiveLogError::validation(format!(
                "length_minutes ({}) must be at most {}",
                self.length_minutes, MAX_LENGTH_MINUTES
            )));
        }

        let date = match optional_text(self.date) {
            Some(d) => Some(
                NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .map_err(|_| {
                        DiveLogError::validation(format!("date '{}' must be YYYY-MM-DD", d))
                    })?
                    .format("%Y-%m-%d")
                    .to_string(),
            ),
            None => None,
        };

        let time = match optional_text(self.time) {
            Some(t) => Some(
                NaiveTime::parse_from_str(&t, "%H:%M")
                    .or_else(|_| NaiveTime::parse_from_str(&t, "%H:%M:%S"))
                    .map_err(|_| {
                        DiveLogError::validation(format!("time '{}' must be HH:MM (24-hour)", t))
                    })?
                    .format("%H:%M")
                    .to_string(),
            ),
            None => None,
        };

        let equipment = self
            .equipment
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(NewDiveLog {
            site,
            narrative,
            depth_max: self.depth_max,
            length_minutes: self.length_minutes,
            dive_type,
            area: optional_text(self.area),
            country: optional_text(self.country),
            depth_avg: self.depth_avg,
            highlights: optional_text(self.highlights),
            date,
            time,
            equipment,
        })
    }
}

impl NewDiveLog {
    /// The stored form of an already normalized input.
    pub fn into_entry(self, id: String, created_at: DateTime<Utc>) -> DiveLogEntry {
        DiveLogEntry {
            id,
            narrative: self.narrative,
            site: self.site,
            area: self.area,
            country: self.country,
            depth_max: self.depth_max,
            depth_avg: self.depth_avg,
            length_minutes: self.length_minutes,
            dive_type: self.dive_type,
            highlights: self.highlights,
            date: self.date,
            time: self.time,
            equipment: self.equipment,
            created_at,
        }
    }
}

fn required_text(field: &str, value: &str) -> DiveResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DiveLogError::validation(format!(
            "{} is required and must not be empty",
            field
        )));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Split a comma-separated dive type list into lowercase components.
pub fn split_types(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Case-folded form of a location name, stored next to the original so
/// filters compare full Unicode lowercase rather than SQLite's ASCII-only
/// `lower()`.
pub fn fold_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Stored dive type key: `",wreck,recreational,"`, lowercase with spaces
/// removed, so a single type is found with `instr(key, ",wreck,")`.
pub fn dive_type_key(value: &str) -> String {
    let types: Vec<String> = split_types(value)
        .into_iter()
        .map(|t| t.replace(' ', ""))
        .collect();
    format!(",{},", types.join(","))
}

/// Metadata predicates applied conjunctively to every search.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchFilters {
    /// Matches country, area, or site (case-insensitive equality).
    pub location: Option<String>,
    /// One type or a comma-separated any-of list.
    pub dive_type: Option<String>,
    /// Upper bound on `depth_max`, inclusive.
    pub max_depth: Option<f64>,
    /// Lower bound on `depth_max`, inclusive.
    pub min_depth: Option<f64>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.dive_type.is_none()
            && self.max_depth.is_none()
            && self.min_depth.is_none()
    }
}

/// A single search invocation against the record store.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub filters: SearchFilters,
    /// Maximum results; `None` means the configured `retrieval.top_k`.
    pub limit: Option<i64>,
}

/// A search hit: the entry plus its relevance score (higher is better).
#[derive(Debug, Clone, Serialize)]
pub struct ScoredDive {
    #[serde(flatten)]
    pub dive: DiveLogEntry,
    pub score: f64,
}

/// A stored user preference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPreference {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate view over a set of entries, returned alongside `get_all_dives`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiveSummary {
    pub total_dives: usize,
    pub total_minutes: i64,
    pub deepest_dive: Option<DeepestDive>,
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeepestDive {
    pub id: String,
    pub site: String,
    pub depth_max: f64,
}

impl DiveSummary {
    pub fn from_entries(entries: &[DiveLogEntry]) -> Self {
        let total_minutes = entries
            .iter()
            .fold(0i64, |acc, e| acc.saturating_add(e.length_minutes));

        let deepest_dive = entries
            .iter()
            .fold(None::<&DiveLogEntry>, |best, e| match best {
                Some(b) if b.depth_max >= e.depth_max => Some(b),
                _ => Some(e),
            })
            .map(|e| DeepestDive {
                id: e.id.clone(),
                site: e.site.clone(),
                depth_max: e.depth_max,
            });

        let countries: BTreeSet<String> = entries
            .iter()
            .filter_map(|e| e.country.clone())
            .collect();

        Self {
            total_dives: entries.len(),
            total_minutes,
            deepest_dive,
            countries: countries.into_iter().collect(),
        }
    }
}
