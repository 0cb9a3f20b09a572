use serde::{Deserialize, Serialize};

use crate::store::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationLevel {
    pub name: String,
    pub min_weekly_gross: f64,
    pub commission_pct: f64,
}

impl ClassificationLevel {
    fn new(name: &str, min_weekly_gross: f64, commission_pct: f64) -> Self {
        Self {
            name: name.to_string(),
            min_weekly_gross,
            commission_pct,
        }
    }
}

/// Unvalidated policy as received from the API or a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationPolicyDraft {
    pub levels: Vec<ClassificationLevel>,
    pub lookback_weeks: usize,
}

impl ClassificationPolicyDraft {
    pub fn validate(self) -> Result<ClassificationPolicy, ClassificationError> {
        let Some(first) = self.levels.first() else {
            return Err(ClassificationError::Empty);
        };
        if first.min_weekly_gross != 0.0 {
            return Err(ClassificationError::FirstLevelNotZero(first.name.clone()));
        }
        if self.lookback_weeks == 0 {
            return Err(ClassificationError::ZeroLookback);
        }
        for level in &self.levels {
            if level.name.trim().is_empty() {
                return Err(ClassificationError::UnnamedLevel);
            }
            if !(0.0..=100.0).contains(&level.commission_pct) {
                return Err(ClassificationError::InvalidPercentage(level.name.clone()));
            }
        }
        for pair in self.levels.windows(2) {
            if pair[1].min_weekly_gross <= pair[0].min_weekly_gross {
                return Err(ClassificationError::Unsorted(pair[1].name.clone()));
            }
        }
        Ok(ClassificationPolicy {
            levels: self.levels,
            lookback_weeks: self.lookback_weeks,
        })
    }
}

/// Weekly-gross tiers deciding a driver's commission percentage.
///
/// Always holds at least one level and the first threshold is zero, so every
/// driver falls into some level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ClassificationPolicyDraft")]
pub struct ClassificationPolicy {
    levels: Vec<ClassificationLevel>,
    lookback_weeks: usize,
}

impl TryFrom<ClassificationPolicyDraft> for ClassificationPolicy {
    type Error = ClassificationError;

    fn try_from(draft: ClassificationPolicyDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            levels: vec![
                ClassificationLevel::new("Bronze", 0.0, 25.0),
                ClassificationLevel::new("Prata", 600.0, 22.0),
                ClassificationLevel::new("Ouro", 900.0, 20.0),
                ClassificationLevel::new("Platina", 1200.0, 18.0),
            ],
            lookback_weeks: 4,
        }
    }
}

impl ClassificationPolicy {
    pub fn levels(&self) -> &[ClassificationLevel] {
        &self.levels
    }

    pub fn lookback_weeks(&self) -> usize {
        self.lookback_weeks
    }

    pub fn level(&self, name: &str) -> Option<&ClassificationLevel> {
        self.levels
            .iter()
            .find(|level| level.name.eq_ignore_ascii_case(name))
    }

    /// Picks the level for a history of weekly grosses ordered oldest first.
    ///
    /// Only the last `lookback_weeks` entries count; missing weeks are zero.
    pub fn classify(&self, weekly_grosses: &[f64]) -> &ClassificationLevel {
        let window = weekly_grosses.len().min(self.lookback_weeks);
        let recent = &weekly_grosses[weekly_grosses.len() - window..];
        let average = recent.iter().sum::<f64>() / self.lookback_weeks as f64;

        let mut chosen = &self.levels[0];
        for level in &self.levels[1..] {
            if average >= level.min_weekly_gross {
                chosen = level;
            }
        }
        chosen
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    #[error("at least one classification level is required")]
    Empty,
    #[error("the first level ({0}) must start at 0")]
    FirstLevelNotZero(String),
    #[error("levels must have increasing thresholds (offending level: {0})")]
    Unsorted(String),
    #[error("commission for level {0} must be between 0 and 100")]
    InvalidPercentage(String),
    #[error("classification levels need a name")]
    UnnamedLevel,
    #[error("lookback must cover at least one week")]
    ZeroLookback,
}

/// Policy configured by one partner; keyed by the partner id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerPolicy {
    pub partner_id: String,
    pub policy: ClassificationPolicy,
}

impl Record for PartnerPolicy {
    fn id(&self) -> &str {
        &self.partner_id
    }

    fn partner_id(&self) -> &str {
        &self.partner_id
    }
}
