use crate::services::consultation::{PatientProfile, QuestionAnswer};
use crate::services::structured::MedicalReport;

fn describe_profile(profile: &PatientProfile) -> String {
    fn or_unknown(value: &Option<String>) -> &str {
        value.as_deref().unwrap_or("not provided")
    }

    format!(
        "Name: {}\nLocation: {}\nWeight: {}\nHeight: {}\nAllergies: {}\nExisting conditions: {}\nChief complaint: {}",
        or_unknown(&profile.name),
        profile.location.as_ref().map(|l| l.to_string()).unwrap_or_else(|| "not provided".to_string()),
        or_unknown(&profile.weight),
        or_unknown(&profile.height),
        or_unknown(&profile.allergies),
        or_unknown(&profile.conditions),
        or_unknown(&profile.chief_complaint),
    )
}

pub fn questions_prompt(profile: &PatientProfile, count: usize) -> String {
    format!(
        "You are a medical assistant conducting a preliminary consultation.\n\n\
        Patient details:\n{}\n\n\
        Generate exactly {} short follow-up questions that would help a doctor understand the chief complaint. \
        Ask one thing per question.\n\n\
        Respond ONLY with valid JSON in this format: {{\"questions\": [\"question 1\", \"question 2\"]}}",
        describe_profile(profile),
        count
    )
}

pub fn report_prompt(profile: &PatientProfile, answers: &[QuestionAnswer]) -> String {
    let transcript = answers
        .iter()
        .enumerate()
        .map(|(i, qa)| format!("Q{}: {}\nA{}: {}", i + 1, qa.question, i + 1, qa.answer))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a medical assistant writing a preliminary consultation report.\n\n\
        Patient details:\n{}\n\n\
        Question and answer transcript:\n{}\n\n\
        Respond ONLY with valid JSON containing exactly these keys:\n\
        {{\n\
          \"diagnosis\": {{\"condition\": string, \"description\": string, \"severity\": string}},\n\
          \"treatment\": {{\"steps\": [string], \"duration\": string}},\n\
          \"medications\": [{{\"name\": string, \"dosage\": string, \"frequency\": string, \"notes\": string}}],\n\
          \"recommendations\": [string],\n\
          \"followUp\": {{\"timeframe\": string, \"instructions\": string}},\n\
          \"precautions\": [string]\n\
        }}",
        describe_profile(profile),
        transcript
    )
}

pub fn assessment_prompt(assessment_type: &str, answers: &serde_json::Value) -> String {
    format!(
        "You are a health assistant analysing a completed {} questionnaire.\n\n\
        Answers:\n{}\n\n\
        Respond ONLY with valid JSON in this format:\n\
        {{\"summary\": string, \"recommendations\": [string], \"risk_level\": \"low\" | \"moderate\" | \"high\"}}",
        assessment_type.replace('_', " "),
        answers
    )
}

pub fn diet_plan_prompt(report: &MedicalReport) -> String {
    format!(
        "You are a nutritionist. Create a one-day diet plan for a patient with this condition:\n\
        {} - {}\n\
        Current medications: {}\n\n\
        Respond ONLY with valid JSON in this format:\n\
        {{\"overview\": string, \"meals\": {{\"breakfast\": [string], \"lunch\": [string], \"dinner\": [string], \"snacks\": [string]}}, \
        \"foodsToAvoid\": [string], \"hydration\": string, \"notes\": [string]}}",
        report.diagnosis.condition,
        report.diagnosis.description,
        if report.medications.is_empty() {
            "none".to_string()
        } else {
            report
                .medications
                .iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        }
    )
}

pub fn chat_prompt(history: &str, message: &str) -> String {
    format!(
        "You are a helpful virtual doctor. Give clear, cautious health information and recommend \
        seeing a professional when symptoms sound serious. Do not claim to be a doctor.\n\n\
        Previous conversation:\n{}\n\nPatient: {}\n\nAnswer:",
        if history.is_empty() { "(none)" } else { history },
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_questions_prompt_mentions_count_and_complaint() {
        let profile = PatientProfile {
            chief_complaint: Some("persistent headache".to_string()),
            ..Default::default()
        };
        let prompt = questions_prompt(&profile, 10);
        assert!(prompt.contains("exactly 10"));
        assert!(prompt.contains("persistent headache"));
        assert!(prompt.contains("Weight: not provided"));
    }

    #[test]
    fn test_report_prompt_numbers_answers() {
        let answers = vec![
            QuestionAnswer { question: "Since when?".into(), answer: "Two days".into() },
            QuestionAnswer { question: "Fever?".into(), answer: "No".into() },
        ];
        let prompt = report_prompt(&PatientProfile::default(), &answers);
        assert!(prompt.contains("Q2: Fever?\nA2: No"));
        assert!(prompt.contains("\"followUp\""));
    }
}
