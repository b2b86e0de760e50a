use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::db::models::Material;
use crate::services::files::{FilePayload, MaterialFiles};
use crate::services::review::ports::{ExtractedRecord, RecordExtractor};

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You review supporting documents submitted for a graduate
recommendation bonus. Read the material metadata, the reviewer comment, the attached files and
the ruleset, then classify the achievement and score it strictly by the ruleset.

Answer with a single JSON object and nothing else:
{
  "type": "academic" | "comprehensive",
  "category": "<award level or ruleset category>",
  "id": "<ruleset item number>",
  "project": "<competition, paper or activity name>",
  "awardDate": "<YYYY-MM or YYYY-MM-DD>",
  "awardType": "<individual | team>",
  "teamRank": "<rank inside the team, empty for individual awards>",
  "selfScore": <number claimed by the student, 0 if absent>,
  "scoreBasis": "<ruleset clause used for the score>",
  "collegeScore": <number granted by the ruleset>
}
"#;

const RULESET_PREAMBLE: &str =
    "Ruleset. Fill every field strictly according to it; anything it does not cover scores 0.\n";

#[derive(Clone)]
pub(crate) struct LlmRecordExtractor {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    ruleset: String,
    files: MaterialFiles,
}

impl LlmRecordExtractor {
    pub(crate) fn from_settings(settings: &Settings, files: MaterialFiles) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai().ai_request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().openai_api_key.clone(),
            base_url: settings.ai().openai_base_url.trim_end_matches('/').to_string(),
            model: settings.ai().ai_model.clone(),
            max_tokens: settings.ai().ai_max_tokens,
            temperature: settings.ai().ai_temperature,
            ruleset: load_ruleset(&settings.ai().ruleset_path)?,
            files,
        })
    }

    async fn request(&self, material: &Material) -> Result<ExtractedRecord> {
        let timer = Instant::now();

        let mut content = vec![json!({"type": "text", "text": material_prompt(material)})];
        content.push(json!({"type": "text", "text": format!("{RULESET_PREAMBLE}{}", self.ruleset)}));
        for file in material.files.iter() {
            let payload = self
                .files
                .resolve(file)
                .await
                .with_context(|| format!("Failed to load file {}", file.file_name))?;
            content.push(file_part(&file.file_name, &payload));
        }

        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": EXTRACTION_SYSTEM_PROMPT},
                {"role": "user", "content": content}
            ],
            "max_completion_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        });

        tracing::info!(material_id = %material.id, files = material.files.len(), "Sending record extraction request");

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to call extraction model")?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            anyhow::bail!("Extraction model error ({status}): {body}");
        }

        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|value| value.as_str())
            .context("Missing extraction response content")?;

        let record = parse_extracted_record(content)?;

        let tokens_used = body
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(|value| value.as_u64());
        tracing::info!(
            material_id = %material.id,
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used = tokens_used,
            "Record extraction completed"
        );

        Ok(record)
    }
}

#[async_trait]
impl RecordExtractor for LlmRecordExtractor {
    async fn extract(&self, material: &Material) -> Result<ExtractedRecord> {
        self.request(material).await
    }
}

fn material_prompt(material: &Material) -> String {
    format!(
        "Title: {}\nCategory: {}\nTags: {}\nDescription: {}\nReviewer comment: {}\n",
        material.title,
        material.category,
        material.tags.join(", "),
        material.description,
        material.review_comment.as_deref().unwrap_or_default(),
    )
}

fn file_part(file_name: &str, payload: &FilePayload) -> Value {
    match payload {
        FilePayload::Url(url) => json!({"type": "image_url", "image_url": {"url": url}}),
        FilePayload::Inline { mime, .. } if mime.starts_with("image/") => {
            json!({"type": "image_url", "image_url": {"url": payload.as_data_url()}})
        }
        FilePayload::Inline { .. } => json!({
            "type": "file",
            "file": {"filename": file_name, "file_data": payload.as_data_url()}
        }),
    }
}

pub(crate) fn parse_extracted_record(raw: &str) -> Result<ExtractedRecord> {
    serde_json::from_str(strip_code_fences(raw)).context("Failed to parse extraction JSON")
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn load_ruleset(path: &str) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ruleset document {path}"))?;
    if text.trim().is_empty() {
        anyhow::bail!("Ruleset document {path} is empty");
    }
    Ok(text)
}
