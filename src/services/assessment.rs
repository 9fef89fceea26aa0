use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::services::gemini::TextGenerator;
use crate::services::prompts;
use crate::services::structured::{parse_or_fallback, AssessmentAnalysis, RiskLevel};

/// Questionnaire kinds the dashboard knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentType {
    GeneralHealth,
    MentalHealth,
    Cardiovascular,
    Diabetes,
    Nutrition,
    Sleep,
    Fitness,
    #[serde(other)]
    Other,
}

impl AssessmentType {
    /// Maps a stored discriminator; anything unknown renders as `Other`.
    pub fn from_discriminator(value: &str) -> Self {
        serde_json::from_value(Value::String(value.to_string())).unwrap_or(AssessmentType::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentType::GeneralHealth => "general_health",
            AssessmentType::MentalHealth => "mental_health",
            AssessmentType::Cardiovascular => "cardiovascular",
            AssessmentType::Diabetes => "diabetes",
            AssessmentType::Nutrition => "nutrition",
            AssessmentType::Sleep => "sleep",
            AssessmentType::Fitness => "fitness",
            AssessmentType::Other => "other",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            AssessmentType::GeneralHealth => "stethoscope",
            AssessmentType::MentalHealth => "brain",
            AssessmentType::Cardiovascular => "heart",
            AssessmentType::Diabetes => "droplet",
            AssessmentType::Nutrition => "apple",
            AssessmentType::Sleep => "moon",
            AssessmentType::Fitness => "dumbbell",
            AssessmentType::Other => "activity",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            AssessmentType::GeneralHealth => "blue",
            AssessmentType::MentalHealth => "purple",
            AssessmentType::Cardiovascular => "red",
            AssessmentType::Diabetes => "orange",
            AssessmentType::Nutrition => "green",
            AssessmentType::Sleep => "indigo",
            AssessmentType::Fitness => "teal",
            AssessmentType::Other => "gray",
        }
    }
}

impl fmt::Display for AssessmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The JSON stored in `assessments.results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResults {
    pub assessment_type: AssessmentType,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub risk_level: RiskLevel,
    pub answers: Value,
}

/// Analyses questionnaire answers, falling back to a generic result.
pub async fn analyse_assessment<G: TextGenerator>(
    generator: &G,
    assessment_type: AssessmentType,
    answers: Value,
) -> AssessmentResults {
    let prompt = prompts::assessment_prompt(assessment_type.as_str(), &answers);

    let analysis = match generator.generate(&prompt).await {
        Ok(text) => parse_or_fallback(&text, AssessmentAnalysis::fallback()),
        Err(e) => {
            tracing::error!("❌ Assessment analysis failed: {}", e);
            AssessmentAnalysis::fallback()
        }
    };

    AssessmentResults {
        assessment_type,
        summary: analysis.summary,
        recommendations: analysis.recommendations,
        risk_level: analysis.risk_level,
        answers,
    }
}
