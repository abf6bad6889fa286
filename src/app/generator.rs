// Task description suggestions.
// A remote text model is tried first when it is configured; whatever goes
// wrong there ends in a local keyword-based template, so `DescriptionGenerator::generate`
// always returns text.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::error::GenerationError;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            temperature: 0.7,
            max_output_tokens: 100,
        }
    }
}

// A remote prompt-in, text-out service.
pub trait TextCompletion: Send + Sync {
    fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
}

// Gemini generateContent over REST
pub struct GeminiClient {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<GeminiClient, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        Ok(GeminiClient {
            client,
            url: format!(
                "{}/v1beta/models/{}:generateContent",
                config.endpoint.trim_end_matches('/'),
                config.model
            ),
            api_key: config.api_key.clone(),
        })
    }
}

// Text of the first candidate, parts joined
fn extract_text(body: &str) -> Result<String, GenerationError> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .ok_or_else(|| GenerationError::Malformed("no candidate content".into()))?;

    let text: String = content.parts.into_iter().map(|part| part.text).collect();
    let text = text.trim();
    if text.is_empty() {
        return Err(GenerationError::Empty);
    }
    Ok(text.to_string())
}

impl TextCompletion for GeminiClient {
    fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, GenerationError> {
        let request = GenerateContentRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        extract_text(&body)
    }
}

pub fn build_prompt(title: &str) -> String {
    format!(
        "タイトル「{title}」にちなんだ説明文を40文字程度で返却してください。\n\
         説明文のみを出力し、余計な前置きや説明は不要です。"
    )
}

// Keyword categories, checked top to bottom; the first hit decides the suffix
const RULES: &[(&[&str], &str)] = &[
    (&["作成", "書く", "書き", "執筆"], "を完了する"),
    (&["確認", "チェック", "検証", "テスト"], "を実施"),
    (&["修正", "直す", "fix", "バグ"], "対応"),
    (&["会議", "ミーティング", "mtg", "打ち合わせ"], "に参加"),
    (&["実装", "開発", "develop", "実装する"], "を進める"),
    (&["調査", "調べる", "研究", "リサーチ"], "を行う"),
];

const DEFAULT_SUFFIX: &str = "を実施";

// Deterministic description derived from keywords in the title.
pub fn rule_based_description(title: &str) -> String {
    let lowered = title.to_lowercase();
    let suffix = RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|(_, suffix)| *suffix)
        .unwrap_or(DEFAULT_SUFFIX);
    format!("{title}{suffix}")
}

pub struct DescriptionGenerator {
    remote: Option<Box<dyn TextCompletion>>,
    params: GenerationParams,
}

impl DescriptionGenerator {
    pub fn new(remote: Option<Box<dyn TextCompletion>>) -> DescriptionGenerator {
        DescriptionGenerator {
            remote,
            params: GenerationParams::default(),
        }
    }

    // No remote configured, keyword templates only
    pub fn rule_based() -> DescriptionGenerator {
        DescriptionGenerator::new(None)
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn generate(&self, title: &str) -> String {
        match self.try_remote(title) {
            Some(Ok(description)) => description,
            Some(Err(err)) => {
                warn!(error = %err, "remote description failed, using keyword rules");
                rule_based_description(title)
            }
            None => rule_based_description(title),
        }
    }

    fn try_remote(&self, title: &str) -> Option<Result<String, GenerationError>> {
        let remote = self.remote.as_ref()?;
        debug!(title, "requesting remote description");
        let result = remote
            .complete(&build_prompt(title), &self.params)
            .and_then(|text| {
                let text = text.trim();
                if text.is_empty() {
                    Err(GenerationError::Empty)
                } else {
                    Ok(text.to_string())
                }
            });
        Some(result)
    }
}
