use crate::core::config::Config;
use crate::core::error::ProviderError;
use crate::core::state::{ChapterStub, SceneScript, Voice};
use crate::services::provider::{GenerationProvider, SpeechOutput};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

/// `generateContent` client for text, image and speech models.
#[derive(Debug)]
pub struct GeminiProvider {
    api_key: String,
    base_url: Url,
    text_model: String,
    image_model: String,
    language: String,
    chapter_count: usize,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.gemini.base_url)
            .with_context(|| format!("Invalid gemini.base_url: {}", config.gemini.base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("gemini.base_url cannot be used as a base: {}", base_url));
        }
        Ok(Self {
            api_key: config.api_key()?,
            base_url,
            text_model: config.gemini.text_model.clone(),
            image_model: config.gemini.image_model.clone(),
            language: config.language.clone(),
            chapter_count: config.chapter_count,
            client: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, model: &str) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::new(format!("Invalid base URL: {}", self.base_url)))?
            .pop_if_empty()
            .push("models")
            .push(&format!("{}:generateContent", model));
        Ok(url)
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, ProviderError> {
        let url = self.endpoint(model)?;
        debug!("POST {}", url);

        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(ProviderError::from_display)?;

        let status = resp.status();
        let body = resp.text().await.map_err(ProviderError::from_display)?;
        if !status.is_success() {
            return Err(normalize_error(Some(status.as_u16()), &body));
        }
        parse_response(&body)
    }

    async fn generate_json<T: DeserializeOwned>(&self, prompt: String) -> Result<T, ProviderError> {
        let request = GenerateRequest::text(prompt).with_config(GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            ..Default::default()
        });
        let resp = self.generate(&self.text_model, &request).await?;
        parse_json(&resp.text()?)
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    async fn generate_outline(&self, topic: &str) -> Result<Vec<ChapterStub>, ProviderError> {
        self.generate_json(outline_prompt(topic, self.chapter_count, &self.language))
            .await
    }

    async fn generate_scene_scripts(
        &self,
        topic: &str,
        chapter_title: &str,
    ) -> Result<Vec<SceneScript>, ProviderError> {
        self.generate_json(scenes_prompt(topic, chapter_title, &self.language))
            .await
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = GenerateRequest::text(prompt.to_string()).with_config(GenerationConfig {
            response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
            ..Default::default()
        });
        let resp = self.generate(&self.image_model, &request).await?;
        let image = resp
            .inline_data()?
            .ok_or_else(|| ProviderError::new("Gemini response contained no image"))?;
        Ok(format!("data:{};base64,{}", image.mime_type, image.data))
    }

    async fn generate_audio(
        &self,
        model: &str,
        script: &str,
        voice: Voice,
    ) -> Result<SpeechOutput, ProviderError> {
        let request = GenerateRequest::text(script.to_string()).with_config(GenerationConfig {
            response_modalities: Some(vec!["AUDIO".to_string()]),
            speech_config: Some(SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice.name().to_string(),
                    },
                },
            }),
            ..Default::default()
        });
        let resp = self.generate(model, &request).await?;
        speech_output(&resp)
    }
}

// --- Wire types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl GenerateRequest {
    fn text(text: String) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![RequestPart { text }],
            }],
            generation_config: None,
        }
    }

    fn with_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    #[serde(default)]
    message: String,
    status: Option<String>,
}

impl ErrorBody {
    fn into_provider_error(self, status_code: Option<u16>) -> ProviderError {
        let message = match self.status {
            Some(status) => format!("{}: {}", status, self.message),
            None => self.message,
        };
        ProviderError {
            status_code,
            nested_code: self.code,
            message,
        }
    }
}

impl GenerateResponse {
    fn parts(&self) -> Result<&[ResponsePart], ProviderError> {
        let first = self
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .ok_or_else(|| ProviderError::new("Gemini response contained no candidates"))?;
        match &first.content {
            Some(content) if !content.parts.is_empty() => Ok(&content.parts),
            _ => {
                let reason = first.finish_reason.as_deref().unwrap_or("UNKNOWN");
                Err(ProviderError::new(format!("Gemini response empty. Finish reason: {}", reason)))
            }
        }
    }

    fn text(&self) -> Result<String, ProviderError> {
        let text: String = self.parts()?.iter().filter_map(|p| p.text.as_deref()).collect();
        if text.trim().is_empty() {
            return Err(ProviderError::new("Gemini response contained no text"));
        }
        Ok(text)
    }

    fn inline_data(&self) -> Result<Option<&InlineData>, ProviderError> {
        Ok(self.parts()?.iter().find_map(|p| p.inline_data.as_ref()))
    }
}

/// Turns a non-success HTTP body into the normalized error record.
pub fn normalize_error(status_code: Option<u16>, body: &str) -> ProviderError {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.error.into_provider_error(status_code);
    }
    let body = body.trim();
    let message = if body.is_empty() {
        match status_code {
            Some(code) => format!("HTTP {}", code),
            None => "Empty error response".to_string(),
        }
    } else {
        body.chars().take(500).collect()
    };
    ProviderError {
        status_code,
        nested_code: None,
        message,
    }
}

fn parse_response(body: &str) -> Result<GenerateResponse, ProviderError> {
    let resp: GenerateResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::new(format!("Failed to parse Gemini response: {}. Body: {}", e, body))
    })?;
    match resp.error {
        Some(err) => Err(err.into_provider_error(None)),
        None => Ok(resp),
    }
}

fn speech_output(resp: &GenerateResponse) -> Result<SpeechOutput, ProviderError> {
    if let Some(audio) = resp.inline_data()? {
        let pcm = STANDARD
            .decode(audio.data.as_bytes())
            .map_err(|e| ProviderError::new(format!("Invalid audio payload: {}", e)))?;
        return Ok(SpeechOutput::Pcm(pcm));
    }
    Ok(SpeechOutput::Text(resp.text()?))
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, ProviderError> {
    let clean = strip_code_blocks(text);
    serde_json::from_str(&clean)
        .map_err(|e| ProviderError::new(format!("Malformed JSON from model: {}", e)))
}

pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```json") {
        s.trim_start_matches("```json").trim_end_matches("```").trim().to_string()
    } else if s.starts_with("```") {
        s.trim_start_matches("```").trim_end_matches("```").trim().to_string()
    } else {
        s.to_string()
    }
}

fn output_language(lang: &str) -> &'static str {
    if lang.starts_with("zh") {
        "Traditional Chinese"
    } else {
        "English"
    }
}

fn outline_prompt(topic: &str, chapters: usize, lang: &str) -> String {
    format!(
        "You are a documentary producer. Plan a documentary about \"{topic}\" in exactly {chapters} chapters, \
         in chronological or logical order. Write in {lang}.\n\
         Return a JSON array of objects with the keys \"title\" and \"description\" \
         (one sentence each). Return only JSON.",
        topic = topic,
        chapters = chapters,
        lang = output_language(lang),
    )
}

fn scenes_prompt(topic: &str, chapter_title: &str, lang: &str) -> String {
    format!(
        "You are writing narration for the documentary \"{topic}\", chapter \"{chapter}\".\n\
         Split the chapter into exactly 3 scenes. For each scene write \"script\": about 40 words of \
         spoken narration in {lang}, and \"imagePrompt\": a detailed English description of a \
         cinematic, photorealistic still that illustrates it.\n\
         Return a JSON array of exactly 3 objects with the keys \"script\" and \"imagePrompt\". Return only JSON.",
        topic = topic,
        chapter = chapter_title,
        lang = output_language(lang),
    )
}
