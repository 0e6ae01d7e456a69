use crate::domain::models::{AiAnalysisResult, ContentType, DifficultyLevel, Task};
use crate::infrastructure::config::DEFAULT_AI_MODEL;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";
const API_KEY_ENV_KEYS: [&str; 2] = ["STUDYBUDDY_GEMINI_API_KEY", "GEMINI_API_KEY"];

#[async_trait]
pub trait AiAdvisoryGateway: Send + Sync {
    async fn analyze_difficulty(&self, task: &Task) -> Result<AiAnalysisResult, InfraError>;

    async fn generate_study_tips(&self, task: &Task) -> Result<String, InfraError>;

    async fn generate_content(
        &self,
        task: &Task,
        content_type: &ContentType,
    ) -> Result<String, InfraError>;
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
}

impl GeminiConfig {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            api_key: api_key
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            model: if model.trim().is_empty() {
                DEFAULT_AI_MODEL.to_string()
            } else {
                model.trim().to_string()
            },
            api_base: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Self {
        Self::from_lookup(model, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(model: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = API_KEY_ENV_KEYS.iter().find_map(|key| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        });
        Self::new(api_key, model)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiAiGateway {
    client: Client,
    config: GeminiConfig,
}

#[derive(Debug, serde::Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, serde::Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, serde::Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, serde::Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, serde::Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, serde::Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiAiGateway {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn generate_endpoint(&self) -> Result<Url, InfraError> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|error| InfraError::AiGateway(format!("invalid gemini api base url: {error}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::AiGateway("gemini api base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("models");
            segments.push(&format!("{}:generateContent", self.config.model));
        }
        Ok(url)
    }

    async fn generate_text(&self, prompt: &str, expect_json: bool) -> Result<String, InfraError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| InfraError::AiGateway("gemini api key is not configured".to_string()))?;

        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: expect_json.then_some(GenerationConfig {
                response_mime_type: "application/json",
            }),
        };

        let response = self
            .client
            .post(self.generate_endpoint()?)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|error| InfraError::AiGateway(format!("network error while calling gemini: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::AiGateway(format!("failed reading gemini response: {error}")))?;

        if !status.is_success() {
            return Err(InfraError::AiGateway(if body.trim().is_empty() {
                format!("gemini api error: http {}", status.as_u16())
            } else {
                format!("gemini api error: http {}; body={body}", status.as_u16())
            }));
        }

        extract_text(&body)
    }
}

#[async_trait]
impl AiAdvisoryGateway for GeminiAiGateway {
    async fn analyze_difficulty(&self, task: &Task) -> Result<AiAnalysisResult, InfraError> {
        let text = self.generate_text(&difficulty_prompt(task), true).await?;
        Ok(parse_difficulty_analysis(&text))
    }

    async fn generate_study_tips(&self, task: &Task) -> Result<String, InfraError> {
        self.generate_text(&study_tips_prompt(task), false).await
    }

    async fn generate_content(
        &self,
        task: &Task,
        content_type: &ContentType,
    ) -> Result<String, InfraError> {
        self.generate_text(&content_prompt(task, content_type), false)
            .await
    }
}

fn extract_text(body: &str) -> Result<String, InfraError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body).map_err(|error| {
        InfraError::AiGateway(format!("invalid gemini payload: {error}; body={body}"))
    })?;

    let text = parsed
        .candidates
        .unwrap_or_default()
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts.unwrap_or_default())
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(InfraError::AiGateway("gemini returned no text".to_string()));
    }
    Ok(text.trim().to_string())
}

pub fn difficulty_prompt(task: &Task) -> String {
    let details = if task.details.trim().is_empty() {
        "none".to_string()
    } else {
        task.details.trim().to_string()
    };
    format!(
        "Assess how difficult it is to study the topic \"{}\" (subject: {}). \
         Extra details: {}. The student rated it {}. \
         Answer only with a JSON object of the form \
         {{\"difficulty\": \"EASY\" | \"MEDIUM\" | \"HARD\", \
         \"recommendedTimeMin\": <total study minutes as an integer>, \
         \"reasoning\": \"<one short sentence>\"}}.",
        task.name,
        task.subject,
        details,
        task.user_difficulty.as_str().to_ascii_uppercase(),
    )
}

pub fn study_tips_prompt(task: &Task) -> String {
    let difficulty = task.ai_difficulty.unwrap_or(DifficultyLevel::Easy);
    format!(
        "Give 5 concise study tips for the topic: {}. Difficulty level: {}. \
         The whole answer must not exceed 250 characters.",
        task.name,
        difficulty.as_str().to_ascii_uppercase(),
    )
}

pub fn content_prompt(task: &Task, content_type: &ContentType) -> String {
    match content_type {
        ContentType::Summary => format!(
            "Write a concise summary and 5 key points for the study topic: {}.",
            task.name
        ),
        ContentType::Flashcards => format!(
            "Write 10 question and answer pairs (flashcards) for the topic: {}. \
             Focus on key definitions and concepts.",
            task.name
        ),
        ContentType::General(_) => {
            format!("Write general educational content about: {}.", task.name)
        }
    }
}

/// Reads the model's difficulty verdict, substituting defaults for anything
/// unreadable: the easiest level and zero minutes.
pub fn parse_difficulty_analysis(text: &str) -> AiAnalysisResult {
    let cleaned = strip_code_fence(text);
    let Ok(value) = serde_json::from_str::<serde_json::Value>(cleaned) else {
        return AiAnalysisResult {
            difficulty: DifficultyLevel::Easy,
            recommended_time_min: 0,
            reasoning: cleaned.to_string(),
        };
    };

    let difficulty = value
        .get("difficulty")
        .and_then(serde_json::Value::as_str)
        .map(DifficultyLevel::parse_or_easiest)
        .unwrap_or(DifficultyLevel::Easy);
    let recommended_time_min = value
        .get("recommendedTimeMin")
        .or_else(|| value.get("recommended_time_min"))
        .map(parse_minutes)
        .unwrap_or(0);
    let reasoning = value
        .get("reasoning")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    AiAnalysisResult {
        difficulty,
        recommended_time_min,
        reasoning,
    }
}

fn parse_minutes(value: &serde_json::Value) -> u32 {
    if let Some(number) = value.as_u64() {
        return u32::try_from(number).unwrap_or(0);
    }
    if let Some(number) = value.as_f64() {
        return if number.is_finite() && number >= 0.0 && number <= f64::from(u32::MAX) {
            number.round() as u32
        } else {
            0
        };
    }
    value
        .as_str()
        .map(|raw| {
            raw.trim()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
        })
        .and_then(|digits| digits.parse::<u32>().ok())
        .unwrap_or(0)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
