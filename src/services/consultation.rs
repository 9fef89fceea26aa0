//! Consultation flow: location, basic details, chief complaint, generated
//! follow-up questions, then a generated report.
//!
//! `ConsultationFlow` is the pure state machine. `ConsultationService` feeds it
//! generated questions and the final report from a `TextGenerator`, and
//! persists each round through a `ConsultationStore`.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use uuid::Uuid;

use crate::db::models::MessageRole;
use crate::db::queries::save_consultation_round;
use crate::errors::{AppError, AppResult};
use crate::services::gemini::TextGenerator;
use crate::services::prompts;
use crate::services::structured::{fallback_questions, parse_questions, MedicalReport};

pub const GREETING: &str = "Hello! I'm your virtual doctor. To get started, please share your location \
    or type the city you are in.";
pub const LOCATION_DENIED_PROMPT: &str =
    "I couldn't access your location. Please type your city or region instead.";
pub const CHIEF_COMPLAINT_PROMPT: &str =
    "Thank you. What is the main health concern that brings you here today?";
pub const REPORT_READY: &str = "Thank you for answering all the questions. Your consultation report is ready.";
pub const REPORT_FAILED: &str = "I'm sorry, I couldn't generate a detailed report right now. \
    Here is a general report; please consult a healthcare professional.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    Coordinates { latitude: f64, longitude: f64 },
    Manual { description: String },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Coordinates { latitude, longitude } => {
                write!(f, "{:.4}, {:.4}", latitude, longitude)
            }
            Location::Manual { description } => f.write_str(description),
        }
    }
}

/// Everything the patient has told us so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub location: Option<Location>,
    pub name: Option<String>,
    pub weight: Option<String>,
    pub height: Option<String>,
    pub allergies: Option<String>,
    pub conditions: Option<String>,
    pub chief_complaint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasicField {
    Name,
    Weight,
    Height,
    Allergies,
    Conditions,
}

impl BasicField {
    pub const ORDER: [BasicField; 5] = [
        BasicField::Name,
        BasicField::Weight,
        BasicField::Height,
        BasicField::Allergies,
        BasicField::Conditions,
    ];

    pub fn prompt(self) -> &'static str {
        match self {
            BasicField::Name => "What is your name?",
            BasicField::Weight => "What is your weight (e.g. 70 kg)? You can leave this blank.",
            BasicField::Height => "What is your height (e.g. 175 cm)? You can leave this blank.",
            BasicField::Allergies => "Do you have any allergies? Leave blank if none.",
            BasicField::Conditions => "Do you have any existing medical conditions? Leave blank if none.",
        }
    }

    pub fn next(self) -> Option<BasicField> {
        let position = Self::ORDER.iter().position(|f| *f == self)?;
        Self::ORDER.get(position + 1).copied()
    }

    /// Blank answers are accepted for every field except the name.
    pub fn required(self) -> bool {
        matches!(self, BasicField::Name)
    }

    fn slot(self, profile: &mut PatientProfile) -> &mut Option<String> {
        match self {
            BasicField::Name => &mut profile.name,
            BasicField::Weight => &mut profile.weight,
            BasicField::Height => &mut profile.height,
            BasicField::Allergies => &mut profile.allergies,
            BasicField::Conditions => &mut profile.conditions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Location,
    BasicDetails { field: BasicField },
    ChiefComplaint,
    DynamicQuestions { index: usize },
    ReportShown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserInput {
    Text { text: String },
    Coordinates { latitude: f64, longitude: f64 },
    LocationDenied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

/// What the flow needs next after accepting an input.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStep {
    Prompt(String),
    NeedQuestions,
    NeedReport,
}

#[derive(Error, Debug, PartialEq)]
pub enum FlowError {
    #[error("The consultation is already finished")]
    Finished,

    #[error("Input not accepted at this stage: {0}")]
    UnexpectedInput(&'static str),

    #[error("Follow-up questions have not been generated yet")]
    AwaitingQuestions,

    #[error("The report is still being generated")]
    AwaitingReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationFlow {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub stage: Stage,
    pub profile: PatientProfile,
    pub questions: Vec<String>,
    pub answers: Vec<QuestionAnswer>,
    pub transcript: Vec<ChatMessage>,
    pub report: Option<MedicalReport>,
}

impl ConsultationFlow {
    pub fn new(session_id: Uuid, user_id: Uuid) -> Self {
        let mut flow = Self {
            session_id,
            user_id,
            stage: Stage::Location,
            profile: PatientProfile::default(),
            questions: Vec::new(),
            answers: Vec::new(),
            transcript: Vec::new(),
            report: None,
        };
        flow.say(GREETING);
        flow
    }

    /// Prompt for the current stage, if the flow is waiting on the patient.
    pub fn next_prompt(&self) -> Option<String> {
        match self.stage {
            Stage::Location => Some(GREETING.to_string()),
            Stage::BasicDetails { field } => Some(field.prompt().to_string()),
            Stage::ChiefComplaint => Some(CHIEF_COMPLAINT_PROMPT.to_string()),
            Stage::DynamicQuestions { index } => self.questions.get(index).cloned(),
            Stage::ReportShown => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::ReportShown
    }

    pub fn submit(&mut self, input: UserInput) -> Result<FlowStep, FlowError> {
        match self.stage {
            Stage::Location => self.submit_location(input),
            Stage::BasicDetails { field } => {
                let text = expect_text(input)?;
                self.record_user(&text);
                self.submit_basic_detail(field, text)
            }
            Stage::ChiefComplaint => {
                let text = expect_text(input)?;
                self.record_user(&text);
                let complaint = text.trim();
                if complaint.is_empty() {
                    return Ok(self.prompt(CHIEF_COMPLAINT_PROMPT));
                }
                self.profile.chief_complaint = Some(complaint.to_string());
                self.stage = Stage::DynamicQuestions { index: 0 };
                Ok(FlowStep::NeedQuestions)
            }
            Stage::DynamicQuestions { index } => {
                if self.questions.is_empty() {
                    return Err(FlowError::AwaitingQuestions);
                }
                if index >= self.questions.len() {
                    return Err(FlowError::AwaitingReport);
                }
                let text = expect_text(input)?;
                self.record_user(&text);
                self.answers.push(QuestionAnswer {
                    question: self.questions[index].clone(),
                    answer: text.trim().to_string(),
                });

                let next = index + 1;
                self.stage = Stage::DynamicQuestions { index: next };
                match self.questions.get(next) {
                    Some(question) => {
                        let question = question.clone();
                        Ok(self.prompt(&question))
                    }
                    None => Ok(FlowStep::NeedReport),
                }
            }
            Stage::ReportShown => Err(FlowError::Finished),
        }
    }

    /// Installs generated questions and returns the first one.
    pub fn set_questions(&mut self, questions: Vec<String>) -> FlowStep {
        let questions = if questions.is_empty() {
            fallback_questions(1)
        } else {
            questions
        };
        self.questions = questions;
        self.answers.clear();
        self.stage = Stage::DynamicQuestions { index: 0 };
        let first = self.questions[0].clone();
        self.prompt(&first)
    }

    pub fn complete(&mut self, report: MedicalReport) {
        self.report = Some(report);
        self.stage = Stage::ReportShown;
    }

    /// Appends an assistant message to the transcript.
    pub fn say(&mut self, content: &str) {
        self.transcript.push(ChatMessage {
            role: MessageRole::Assistant,
            content: content.to_string(),
        });
    }

    fn prompt(&mut self, content: &str) -> FlowStep {
        self.say(content);
        FlowStep::Prompt(content.to_string())
    }

    fn record_user(&mut self, content: &str) {
        self.transcript.push(ChatMessage {
            role: MessageRole::User,
            content: content.to_string(),
        });
    }

    fn submit_location(&mut self, input: UserInput) -> Result<FlowStep, FlowError> {
        let location = match input {
            UserInput::Coordinates { latitude, longitude } => {
                if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                    return Err(FlowError::UnexpectedInput("coordinates out of range"));
                }
                let location = Location::Coordinates { latitude, longitude };
                self.record_user(&format!("Shared location: {}", location));
                location
            }
            UserInput::Text { text } => {
                self.record_user(&text);
                let description = text.trim();
                if description.is_empty() {
                    return Ok(self.prompt(LOCATION_DENIED_PROMPT));
                }
                Location::Manual { description: description.to_string() }
            }
            UserInput::LocationDenied => return Ok(self.prompt(LOCATION_DENIED_PROMPT)),
        };

        self.profile.location = Some(location);
        let first = BasicField::ORDER[0];
        self.stage = Stage::BasicDetails { field: first };
        Ok(self.prompt(first.prompt()))
    }

    fn submit_basic_detail(&mut self, field: BasicField, text: String) -> Result<FlowStep, FlowError> {
        let value = text.trim();
        if value.is_empty() && field.required() {
            return Ok(self.prompt(field.prompt()));
        }
        *field.slot(&mut self.profile) = (!value.is_empty()).then(|| value.to_string());

        match field.next() {
            Some(next) => {
                self.stage = Stage::BasicDetails { field: next };
                Ok(self.prompt(next.prompt()))
            }
            None => {
                self.stage = Stage::ChiefComplaint;
                Ok(self.prompt(CHIEF_COMPLAINT_PROMPT))
            }
        }
    }
}

fn expect_text(input: UserInput) -> Result<String, FlowError> {
    match input {
        UserInput::Text { text } => Ok(text),
        _ => Err(FlowError::UnexpectedInput("a text answer is expected")),
    }
}

/// Result of one round trip through the consultation.
#[derive(Debug, Clone, Default)]
pub struct Advance {
    /// Assistant messages produced by this input, in order.
    pub replies: Vec<String>,
    /// Set once, when the flow reaches the report.
    pub report: Option<MedicalReport>,
}

/// What one accepted input has to persist.
#[derive(Debug)]
pub struct Round<'a> {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub messages: &'a [ChatMessage],
    pub report: Option<&'a MedicalReport>,
}

/// Persists consultation rounds. A round is stored entirely or not at all.
pub trait ConsultationStore: Send + Sync {
    /// Returns the id of the stored report, if the round carried one.
    fn save_round(&self, round: Round<'_>) -> impl Future<Output = AppResult<Option<Uuid>>> + Send;
}

impl ConsultationStore for PgPool {
    async fn save_round(&self, round: Round<'_>) -> AppResult<Option<Uuid>> {
        let messages: Vec<(MessageRole, &str)> = round
            .messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        let report = round.report.map(serde_json::to_value).transpose()?;

        let stored =
            save_consultation_round(self, round.session_id, round.user_id, &messages, report).await?;
        Ok(stored.map(|r| r.id))
    }
}

#[derive(Error, Debug)]
pub enum RoundError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Store(#[from] AppError),
}

pub struct ConsultationService<'a, G: TextGenerator> {
    generator: &'a G,
    question_count: usize,
}

impl<'a, G: TextGenerator> ConsultationService<'a, G> {
    pub fn new(generator: &'a G, question_count: usize) -> Self {
        Self {
            generator,
            question_count: question_count.max(1),
        }
    }

    pub async fn advance(
        &self,
        flow: &mut ConsultationFlow,
        input: UserInput,
    ) -> Result<Advance, FlowError> {
        let mut advance = Advance::default();

        match flow.submit(input)? {
            FlowStep::Prompt(text) => advance.replies.push(text),
            FlowStep::NeedQuestions => {
                let questions = self.generate_questions(&flow.profile).await;
                if let FlowStep::Prompt(first) = flow.set_questions(questions) {
                    advance.replies.push(first);
                }
            }
            FlowStep::NeedReport => {
                let (report, failed) = self.generate_report(flow).await;
                if failed {
                    flow.say(REPORT_FAILED);
                    advance.replies.push(REPORT_FAILED.to_string());
                } else {
                    flow.say(REPORT_READY);
                    advance.replies.push(REPORT_READY.to_string());
                }
                flow.complete(report.clone());
                advance.report = Some(report);
            }
        }

        Ok(advance)
    }

    /// Advances a copy of `flow` and stores the round. `flow` only moves on
    /// once the store succeeds, so a failed write can be retried with the
    /// same input.
    pub async fn advance_and_store<S: ConsultationStore>(
        &self,
        store: &S,
        flow: &mut ConsultationFlow,
        input: UserInput,
    ) -> Result<(Advance, Option<Uuid>), RoundError> {
        let mut next = flow.clone();
        let advance = self.advance(&mut next, input).await?;

        let report_id = store
            .save_round(Round {
                session_id: next.session_id,
                user_id: next.user_id,
                messages: &next.transcript[flow.transcript.len()..],
                report: advance.report.as_ref(),
            })
            .await?;

        *flow = next;
        Ok((advance, report_id))
    }

    async fn generate_questions(&self, profile: &PatientProfile) -> Vec<String> {
        let prompt = prompts::questions_prompt(profile, self.question_count);
        match self.generator.generate(&prompt).await {
            Ok(text) => parse_questions(&text, self.question_count),
            Err(e) => {
                tracing::error!("❌ Question generation failed: {}", e);
                fallback_questions(self.question_count)
            }
        }
    }

    /// Returns the report and whether generation itself failed.
    async fn generate_report(&self, flow: &ConsultationFlow) -> (MedicalReport, bool) {
        tracing::info!(
            "Generating report for session {} from {} answers",
            flow.session_id,
            flow.answers.len()
        );
        let prompt = prompts::report_prompt(&flow.profile, &flow.answers);
        match self.generator.generate(&prompt).await {
            Ok(text) => (MedicalReport::parse_or_fallback(&text), false),
            Err(e) => {
                tracing::error!("❌ Report generation failed: {}", e);
                (MedicalReport::fallback(), true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::structured::REQUIRED_REPORT_KEYS;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedGenerator {
        replies: Mutex<VecDeque<AppResult<String>>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<AppResult<String>>) -> Self {
            Self { replies: Mutex::new(replies.into()) }
        }
    }

    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> AppResult<String> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Generation("script exhausted".into())))
        }
    }

    fn text(s: &str) -> UserInput {
        UserInput::Text { text: s.to_string() }
    }

    fn flow() -> ConsultationFlow {
        ConsultationFlow::new(Uuid::new_v4(), Uuid::new_v4())
    }

    fn through_basic_details(flow: &mut ConsultationFlow) {
        flow.submit(text("Lisbon")).unwrap();
        for answer in ["Ana", "60 kg", "165 cm", "", ""] {
            flow.submit(text(answer)).unwrap();
        }
        assert_eq!(flow.stage, Stage::ChiefComplaint);
    }

    #[test]
    fn test_height_prompted_after_name_and_weight() {
        let mut flow = flow();
        flow.submit(text("Porto")).unwrap();
        flow.submit(text("Ana")).unwrap();
        let step = flow.submit(text("60 kg")).unwrap();

        assert_eq!(step, FlowStep::Prompt(BasicField::Height.prompt().to_string()));
        assert_eq!(flow.stage, Stage::BasicDetails { field: BasicField::Height });
        assert_eq!(flow.next_prompt().as_deref(), Some(BasicField::Height.prompt()));
    }

    #[test]
    fn test_blank_weight_is_kept_and_advances() {
        let mut flow = flow();
        flow.submit(text("Porto")).unwrap();
        flow.submit(text("Ana")).unwrap();
        flow.submit(text("   ")).unwrap();

        assert_eq!(flow.profile.weight, None);
        assert_eq!(flow.stage, Stage::BasicDetails { field: BasicField::Height });
    }

    #[test]
    fn test_blank_name_reprompts() {
        let mut flow = flow();
        flow.submit(text("Porto")).unwrap();
        let step = flow.submit(text("")).unwrap();

        assert_eq!(step, FlowStep::Prompt(BasicField::Name.prompt().to_string()));
        assert_eq!(flow.stage, Stage::BasicDetails { field: BasicField::Name });
    }

    #[test]
    fn test_location_denied_then_manual_entry() {
        let mut flow = flow();
        let step = flow.submit(UserInput::LocationDenied).unwrap();
        assert_eq!(step, FlowStep::Prompt(LOCATION_DENIED_PROMPT.to_string()));
        assert_eq!(flow.stage, Stage::Location);

        flow.submit(text("Nairobi")).unwrap();
        assert_eq!(
            flow.profile.location,
            Some(Location::Manual { description: "Nairobi".to_string() })
        );
        assert_eq!(flow.stage, Stage::BasicDetails { field: BasicField::Name });
    }

    #[test]
    fn test_coordinates_validated() {
        let mut flow = flow();
        let err = flow
            .submit(UserInput::Coordinates { latitude: 120.0, longitude: 0.0 })
            .unwrap_err();
        assert!(matches!(err, FlowError::UnexpectedInput(_)));

        flow.submit(UserInput::Coordinates { latitude: 38.72, longitude: -9.14 }).unwrap();
        assert!(matches!(flow.profile.location, Some(Location::Coordinates { .. })));
    }

    #[test]
    fn test_coordinates_rejected_outside_location_stage() {
        let mut flow = flow();
        flow.submit(text("Porto")).unwrap();
        let err = flow
            .submit(UserInput::Coordinates { latitude: 1.0, longitude: 1.0 })
            .unwrap_err();
        assert!(matches!(err, FlowError::UnexpectedInput(_)));
    }

    #[test]
    fn test_answers_before_questions_generated() {
        let mut flow = flow();
        through_basic_details(&mut flow);
        assert_eq!(flow.submit(text("Chest pain")).unwrap(), FlowStep::NeedQuestions);
        assert_eq!(flow.submit(text("too early")), Err(FlowError::AwaitingQuestions));
    }

    #[test]
    fn test_final_question_requests_report_then_report_shown() {
        let mut flow = flow();
        through_basic_details(&mut flow);
        flow.submit(text("Cough")).unwrap();
        flow.set_questions(vec!["Q1?".into(), "Q2?".into()]);

        assert_eq!(flow.submit(text("a1")).unwrap(), FlowStep::Prompt("Q2?".into()));
        assert_eq!(flow.submit(text("a2")).unwrap(), FlowStep::NeedReport);
        assert_eq!(flow.submit(text("again")), Err(FlowError::AwaitingReport));

        flow.complete(MedicalReport::fallback());
        assert!(flow.is_finished());
        assert_eq!(flow.submit(text("more")), Err(FlowError::Finished));
        assert_eq!(flow.answers.len(), 2);
    }

    #[test]
    fn test_transcript_records_both_sides() {
        let mut flow = flow();
        flow.submit(text("Porto")).unwrap();

        let roles: Vec<MessageRole> = flow.transcript.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::Assistant, MessageRole::User, MessageRole::Assistant]
        );
    }

    #[tokio::test]
    async fn test_full_consultation_with_ten_questions() {
        let questions: Vec<String> = (1..=10).map(|i| format!("Question {}?", i)).collect();
        let report = json!({
            "diagnosis": {"condition": "Tension headache", "description": "Stress related"},
            "treatment": {"steps": ["Rest"]},
            "medications": [],
            "recommendations": ["Hydrate"],
            "followUp": {"timeframe": "1 week", "instructions": "Return if worse"},
            "precautions": ["Avoid screens"]
        });
        let generator = ScriptedGenerator::new(vec![
            Ok(format!("```json\n{}\n```", json!({ "questions": questions }))),
            Ok(report.to_string()),
        ]);
        let service = ConsultationService::new(&generator, 10);

        let mut flow = flow();
        through_basic_details(&mut flow);

        let advance = service.advance(&mut flow, text("Headache")).await.unwrap();
        assert_eq!(advance.replies, vec!["Question 1?".to_string()]);

        let mut last = Advance::default();
        for i in 0..10 {
            last = service.advance(&mut flow, text(&format!("answer {}", i))).await.unwrap();
        }

        let produced = last.report.expect("report after the last answer");
        assert_eq!(produced.diagnosis.condition, "Tension headache");
        assert_eq!(last.replies, vec![REPORT_READY.to_string()]);
        assert!(flow.is_finished());

        let value = serde_json::to_value(&produced).unwrap();
        for key in REQUIRED_REPORT_KEYS {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn test_generation_failures_fall_back() {
        let generator = ScriptedGenerator::new(vec![
            Err(AppError::Generation("offline".into())),
            Err(AppError::Generation("offline".into())),
        ]);
        let service = ConsultationService::new(&generator, 2);

        let mut flow = flow();
        through_basic_details(&mut flow);
        service.advance(&mut flow, text("Fever")).await.unwrap();
        assert_eq!(flow.questions, fallback_questions(2));

        service.advance(&mut flow, text("yesterday")).await.unwrap();
        let last = service.advance(&mut flow, text("8")).await.unwrap();

        assert_eq!(last.report, Some(MedicalReport::fallback()));
        assert_eq!(last.replies, vec![REPORT_FAILED.to_string()]);
        assert_eq!(flow.transcript.last().map(|m| m.content.as_str()), Some(REPORT_FAILED));
    }

    /// Records saved rounds; fails while `failing` is set.
    #[derive(Default)]
    struct MemoryStore {
        failing: Mutex<bool>,
        messages: Mutex<Vec<ChatMessage>>,
        reports: Mutex<Vec<MedicalReport>>,
    }

    impl ConsultationStore for MemoryStore {
        async fn save_round(&self, round: Round<'_>) -> AppResult<Option<Uuid>> {
            if *self.failing.lock().unwrap() {
                return Err(AppError::Other("payload string too long".into()));
            }
            self.messages.lock().unwrap().extend(round.messages.iter().cloned());
            Ok(round.report.map(|report| {
                self.reports.lock().unwrap().push(report.clone());
                Uuid::new_v4()
            }))
        }
    }

    #[tokio::test]
    async fn test_failed_store_leaves_flow_retryable() {
        let generator = ScriptedGenerator::new(vec![
            Ok(r#"{"questions": ["Since when?"]}"#.to_string()),
            Err(AppError::Generation("offline".into())),
            Err(AppError::Generation("offline".into())),
        ]);
        let service = ConsultationService::new(&generator, 1);
        let store = MemoryStore::default();

        let mut flow = flow();
        through_basic_details(&mut flow);
        service.advance_and_store(&store, &mut flow, text("Rash")).await.unwrap();
        let stored_before = store.messages.lock().unwrap().len();
        let before = flow.clone();

        *store.failing.lock().unwrap() = true;
        let err = service
            .advance_and_store(&store, &mut flow, text("two days"))
            .await
            .unwrap_err();
        assert!(matches!(err, RoundError::Store(_)));
        assert_eq!(flow.stage, before.stage);
        assert_eq!(flow.transcript, before.transcript);
        assert!(flow.report.is_none());

        *store.failing.lock().unwrap() = false;
        let (advance, report_id) = service
            .advance_and_store(&store, &mut flow, text("two days"))
            .await
            .unwrap();

        assert!(report_id.is_some());
        assert!(advance.report.is_some());
        assert!(flow.is_finished());
        assert_eq!(store.reports.lock().unwrap().len(), 1);

        let saved = store.messages.lock().unwrap();
        let round: Vec<&str> = saved[stored_before..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(round, vec!["two days", REPORT_FAILED]);
    }

    #[tokio::test]
    async fn test_rejected_input_stores_nothing() {
        let generator = ScriptedGenerator::new(vec![]);
        let service = ConsultationService::new(&generator, 1);
        let store = MemoryStore::default();

        let mut flow = flow();
        let out_of_range = UserInput::Coordinates { latitude: 95.0, longitude: 0.0 };
        let err = service
            .advance_and_store(&store, &mut flow, out_of_range)
            .await
            .unwrap_err();

        assert!(matches!(err, RoundError::Flow(FlowError::UnexpectedInput(_))));
        assert!(store.messages.lock().unwrap().is_empty());
        assert_eq!(flow.stage, Stage::Location);
    }
}
