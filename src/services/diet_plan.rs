use crate::services::gemini::TextGenerator;
use crate::services::prompts;
use crate::services::structured::{parse_or_fallback, DietPlan, MedicalReport};

/// Generates a diet plan suited to a report's diagnosis.
pub async fn generate_diet_plan<G: TextGenerator>(generator: &G, report: &MedicalReport) -> DietPlan {
    let prompt = prompts::diet_plan_prompt(report);

    match generator.generate(&prompt).await {
        Ok(text) => parse_or_fallback(&text, DietPlan::fallback()),
        Err(e) => {
            tracing::error!("❌ Diet plan generation failed: {}", e);
            DietPlan::fallback()
        }
    }
}
