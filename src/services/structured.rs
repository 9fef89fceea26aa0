//! Parsing of the JSON replies Gemini is prompted to produce.
//!
//! Model output is often wrapped in a markdown code fence and is sometimes not
//! valid JSON at all, so every structured call site parses through here and
//! falls back to a fixed value rather than failing the request.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StructuredError {
    #[error("Reply is empty")]
    Empty,

    #[error("Reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Reply is missing required keys: {0:?}")]
    MissingKeys(Vec<&'static str>),
}

/// Keys every generated medical report must carry.
pub const REQUIRED_REPORT_KEYS: [&str; 6] = [
    "diagnosis",
    "treatment",
    "medications",
    "recommendations",
    "followUp",
    "precautions",
];

/// Removes a surrounding ```` ``` ```` / ```` ```json ```` fence if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the language tag on the opening fence line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };

    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, StructuredError> {
    let body = strip_code_fences(text);
    if body.is_empty() {
        return Err(StructuredError::Empty);
    }
    Ok(serde_json::from_str(body)?)
}

/// Parses `text`, or logs the failure and returns `fallback`.
pub fn parse_or_fallback<T: DeserializeOwned>(text: &str, fallback: T) -> T {
    match parse_structured(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("⚠️ Falling back after unparseable AI reply: {}", e);
            fallback
        }
    }
}

/// Checks that a parsed JSON object carries every key in `keys`.
pub fn require_keys(value: &Value, keys: &[&'static str]) -> Result<(), StructuredError> {
    let missing: Vec<&'static str> = keys
        .iter()
        .copied()
        .filter(|key| value.get(key).is_none())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(StructuredError::MissingKeys(missing))
    }
}

// ── Generated questions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum QuestionsReply {
    Wrapped { questions: Vec<String> },
    Bare(Vec<String>),
}

/// Parses a question list, accepting `{"questions": [...]}` or a bare array.
pub fn parse_questions(text: &str, count: usize) -> Vec<String> {
    let parsed = parse_structured::<QuestionsReply>(text).map(|reply| match reply {
        QuestionsReply::Wrapped { questions } | QuestionsReply::Bare(questions) => questions,
    });

    match parsed {
        Ok(questions) => {
            let questions: Vec<String> = questions
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .take(count)
                .collect();
            if questions.is_empty() {
                tracing::warn!("⚠️ AI returned no usable questions, using fallback list");
                fallback_questions(count)
            } else {
                questions
            }
        }
        Err(e) => {
            tracing::warn!("⚠️ Falling back to default questions: {}", e);
            fallback_questions(count)
        }
    }
}

const FALLBACK_QUESTIONS: [&str; 10] = [
    "When did your symptoms first start?",
    "How severe are your symptoms on a scale of 1 to 10?",
    "Are your symptoms constant, or do they come and go?",
    "Have you noticed anything that makes the symptoms better or worse?",
    "Do you have a fever, chills or night sweats?",
    "Have you taken any medication for these symptoms? If so, what?",
    "Have you experienced these symptoms before?",
    "Has your appetite, sleep or energy level changed recently?",
    "Has anyone around you had similar symptoms?",
    "Is there anything else about your health you think is important?",
];

pub fn fallback_questions(count: usize) -> Vec<String> {
    FALLBACK_QUESTIONS
        .iter()
        .cycle()
        .take(count)
        .map(|q| q.to_string())
        .collect()
}

// ── Medical report ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    #[serde(default)]
    pub timeframe: String,
    #[serde(default)]
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalReport {
    pub diagnosis: Diagnosis,
    pub treatment: Treatment,
    pub medications: Vec<Medication>,
    pub recommendations: Vec<String>,
    pub follow_up: FollowUp,
    pub precautions: Vec<String>,
}

impl MedicalReport {
    /// Report shown when generation or parsing fails.
    pub fn fallback() -> Self {
        Self {
            diagnosis: Diagnosis {
                condition: "Unable to determine".to_string(),
                description: "We could not generate a detailed assessment from your answers. \
                    Please consult a healthcare professional for an accurate diagnosis."
                    .to_string(),
                severity: None,
            },
            treatment: Treatment {
                steps: vec![
                    "Rest and stay hydrated".to_string(),
                    "Monitor your symptoms and note any changes".to_string(),
                ],
                duration: None,
            },
            medications: Vec::new(),
            recommendations: vec![
                "Schedule an appointment with your doctor".to_string(),
                "Keep a record of your symptoms".to_string(),
            ],
            follow_up: FollowUp {
                timeframe: "Within 1 week".to_string(),
                instructions: "See a doctor sooner if your symptoms worsen".to_string(),
            },
            precautions: vec![
                "Seek emergency care for severe pain, difficulty breathing or confusion".to_string(),
            ],
        }
    }

    /// Parses a generated report; requires all six top-level keys.
    pub fn parse(text: &str) -> Result<Self, StructuredError> {
        let value: Value = parse_structured(text)?;
        require_keys(&value, &REQUIRED_REPORT_KEYS)?;
        Self::from_value(value)
    }

    pub fn parse_or_fallback(text: &str) -> Self {
        Self::parse(text).unwrap_or_else(|e| {
            tracing::warn!("⚠️ Using fallback report: {}", e);
            Self::fallback()
        })
    }

    pub fn from_value(value: Value) -> Result<Self, StructuredError> {
        Ok(serde_json::from_value(value)?)
    }
}

// ── Assessment analysis ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Moderate,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

impl AssessmentAnalysis {
    pub fn fallback() -> Self {
        Self {
            summary: "Your answers have been recorded. We were unable to generate a detailed \
                analysis at this time."
                .to_string(),
            recommendations: vec![
                "Discuss these results with a healthcare professional".to_string(),
            ],
            risk_level: RiskLevel::Moderate,
        }
    }
}

// ── Diet plan ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meals {
    #[serde(default)]
    pub breakfast: Vec<String>,
    #[serde(default)]
    pub lunch: Vec<String>,
    #[serde(default)]
    pub dinner: Vec<String>,
    #[serde(default)]
    pub snacks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DietPlan {
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub meals: Meals,
    #[serde(default)]
    pub foods_to_avoid: Vec<String>,
    #[serde(default)]
    pub hydration: String,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl DietPlan {
    pub fn fallback() -> Self {
        Self {
            overview: "A balanced diet to support your recovery.".to_string(),
            meals: Meals {
                breakfast: vec!["Oatmeal with fruit".to_string()],
                lunch: vec!["Grilled vegetables with lean protein".to_string()],
                dinner: vec!["Light soup with whole grains".to_string()],
                snacks: vec!["Nuts or yogurt".to_string()],
            },
            foods_to_avoid: vec![
                "Highly processed foods".to_string(),
                "Excess sugar and salt".to_string(),
            ],
            hydration: "Drink 8 glasses of water a day".to_string(),
            notes: vec!["Adjust portions to your doctor's advice".to_string()],
        }
    }
}
