// THEORY:
// The `feature_formatter` module turns raw model output into the human-facing
// report. The model says "age 34, dominant_emotion happy, emotion {...}"; the
// report says "34 years old (Adult)", "Happy 😊", with rounded confidences and a
// life-stage label.
//
// The module is mostly lookup tables. The only arithmetic is the age bucketing,
// the age-dependent uncertainty margin, and one-decimal rounding of scores.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The external model provides no per-age confidence.
pub const AGE_CONFIDENCE: f64 = 90.0;
pub const MAX_AGE: u32 = 120;

/// Attributes the analysis model can estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Age,
    Gender,
    Emotion,
    Race,
}

impl Feature {
    pub const ALL: [Feature; 4] = [Feature::Age, Feature::Gender, Feature::Emotion, Feature::Race];

    /// The action name understood by the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Age => "age",
            Feature::Gender => "gender",
            Feature::Emotion => "emotion",
            Feature::Race => "race",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| format!("unsupported feature '{s}'"))
    }
}

/// Keeps the supported names from a caller's request, in request order and
/// without duplicates.
pub fn supported_features<S: AsRef<str>>(requested: &[S]) -> Vec<Feature> {
    let mut features = Vec::new();
    for name in requested {
        if let Ok(feature) = name.as_ref().parse::<Feature>() {
            if !features.contains(&feature) {
                features.push(feature);
            }
        }
    }
    features
}

/// One of the nine fixed age buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AgeCategory {
    Baby,
    Toddler,
    Child,
    Teenager,
    YoungAdult,
    Adult,
    MiddleAged,
    Senior,
    Elderly,
}

impl AgeCategory {
    pub fn label(&self) -> &'static str {
        match self {
            AgeCategory::Baby => "Baby",
            AgeCategory::Toddler => "Toddler",
            AgeCategory::Child => "Child",
            AgeCategory::Teenager => "Teenager",
            AgeCategory::YoungAdult => "Young Adult",
            AgeCategory::Adult => "Adult",
            AgeCategory::MiddleAged => "Middle-aged",
            AgeCategory::Senior => "Senior",
            AgeCategory::Elderly => "Elderly",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AgeCategory::Baby => "👶",
            AgeCategory::Toddler => "🧒",
            AgeCategory::Child => "👧👦",
            AgeCategory::Teenager => "🧑‍🎓",
            AgeCategory::YoungAdult => "🧑‍💼",
            AgeCategory::Adult => "👨👩",
            AgeCategory::MiddleAged => "🧑‍🦳",
            AgeCategory::Senior => "👴👵",
            AgeCategory::Elderly => "🧓",
        }
    }

    pub fn life_stage(&self) -> &'static str {
        match self {
            AgeCategory::Baby => "Infancy",
            AgeCategory::Toddler => "Early Childhood",
            AgeCategory::Child => "Childhood",
            AgeCategory::Teenager => "Adolescence",
            AgeCategory::YoungAdult => "Early Adulthood",
            AgeCategory::Adult => "Adulthood",
            AgeCategory::MiddleAged => "Middle Age",
            AgeCategory::Senior => "Senior Years",
            AgeCategory::Elderly => "Advanced Age",
        }
    }
}

// Inclusive upper bound of each bucket; anything above the last is Elderly.
const AGE_BUCKETS: [(u32, AgeCategory); 8] = [
    (2, AgeCategory::Baby),
    (5, AgeCategory::Toddler),
    (12, AgeCategory::Child),
    (17, AgeCategory::Teenager),
    (25, AgeCategory::YoungAdult),
    (40, AgeCategory::Adult),
    (60, AgeCategory::MiddleAged),
    (75, AgeCategory::Senior),
];

pub fn age_category(age: u32) -> AgeCategory {
    AGE_BUCKETS
        .iter()
        .find(|(upper, _)| age <= *upper)
        .map(|(_, category)| *category)
        .unwrap_or(AgeCategory::Elderly)
}

/// Estimated age interval, clamped to `0..=MAX_AGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeRange {
    pub min: u32,
    pub max: u32,
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} years", self.min, self.max)
    }
}

pub fn age_range(age: u32) -> AgeRange {
    let margin = match age {
        0..=18 => 2,
        19..=30 => 3,
        31..=50 => 4,
        _ => 5,
    };
    AgeRange {
        min: age.saturating_sub(margin),
        max: age.saturating_add(margin).min(MAX_AGE),
    }
}

pub fn format_emotion_display(emotion: &str) -> String {
    let mapped = match emotion.to_lowercase().as_str() {
        "angry" => "Angry 😠",
        "disgust" => "Disgusted 🤢",
        "fear" => "Fearful 😨",
        "happy" => "Happy 😊",
        "sad" => "Sad 😢",
        "surprise" => "Surprised 😲",
        "neutral" => "Neutral 😐",
        _ => return capitalize(emotion),
    };
    mapped.to_string()
}

pub fn format_race_display(race: &str) -> String {
    let mapped = match race.to_lowercase().as_str() {
        "asian" => "Asian",
        "indian" => "Indian",
        "black" => "Black",
        "white" => "White",
        "middle eastern" => "Middle Eastern",
        "latino hispanic" => "Latino/Hispanic",
        _ => return title_case(&race.replace('_', " ")),
    };
    mapped.to_string()
}

/// Upper-cases the first character and lower-cases the rest.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Capitalizes every alphabetic run, the way `"latino_hispanic"` becomes
/// `"Latino Hispanic"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// One decimal, exact halves to even (`77.25 -> 77.2`, `77.75 -> 77.8`).
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round_ties_even() / 10.0
}

/// Two decimals, exact halves to even.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeDetails {
    pub exact_age: u32,
    pub age_group: &'static str,
    pub life_stage: &'static str,
    pub estimated_range: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgeResult {
    pub value: u32,
    pub category: &'static str,
    pub category_emoji: &'static str,
    pub display: String,
    pub range: String,
    pub confidence: f64,
    pub detailed_info: AgeDetails,
}

impl AgeResult {
    /// Builds the age report from a raw estimate. Fractions are truncated and
    /// negative estimates clamp to zero.
    pub fn from_estimate(estimate: f64) -> Self {
        let value = if estimate.is_finite() { estimate.trunc().max(0.0) as u32 } else { 0 };
        let category = age_category(value);
        let range = age_range(value).to_string();
        Self {
            value,
            category: category.label(),
            category_emoji: category.emoji(),
            display: format!("{} years old ({})", value, category.label()),
            range: range.clone(),
            confidence: AGE_CONFIDENCE,
            detailed_info: AgeDetails {
                exact_age: value,
                age_group: category.label(),
                life_stage: category.life_stage(),
                estimated_range: range,
            },
        }
    }
}

/// Report for a multi-class feature (gender, emotion, race).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    pub value: String,
    pub display: String,
    pub confidence: f64,
    pub all_scores: IndexMap<String, f64>,
}

impl ScoredResult {
    /// Returns `None` when the dominant label has no score.
    pub fn build(
        dominant: &str,
        scores: &IndexMap<String, f64>,
        display: impl Fn(&str) -> String,
    ) -> Option<Self> {
        let confidence = scores.get(dominant)?;
        Some(Self {
            value: dominant.to_string(),
            display: display(dominant),
            confidence: round1(*confidence),
            all_scores: scores.iter().map(|(k, v)| (k.clone(), round1(*v))).collect(),
        })
    }
}

/// Per-feature results keyed by feature name. Only requested features appear.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<AgeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<ScoredResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<ScoredResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub race: Option<ScoredResult>,
}
