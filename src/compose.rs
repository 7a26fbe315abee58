//! Email body generation.
//!
//! A [`ContentGenerator`] turns a participant name and the organization
//! profile into a plain-text invitation. [`CompletionGenerator`] asks a
//! chat-completion endpoint to write it; [`TemplateGenerator`] fills a fixed
//! template and is used whenever no API key is configured.

use std::time::Duration;

use async_trait::async_trait;
use clap::Args;
use reqwest::StatusCode;
use serde_json::json;

pub const DEFAULT_SUBJECT: &str = "Your Survey Invitation";
pub const DEFAULT_COMPLETION_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o";
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

/// The organization profile that every invitation is written on behalf of.
#[derive(Debug, Clone, Default, Args)]
pub struct OrgProfile {
    /// Organization name
    #[arg(long = "org-name", env = "ORG_NAME", default_value = "")]
    pub org_name: String,
    /// Contact person signing the invitation
    #[arg(long = "contact", env = "ORG_CONTACT", default_value = "")]
    pub contact_person: String,
    /// Survey name or type
    #[arg(long = "survey-name", env = "SURVEY_NAME", default_value = "")]
    pub survey_name: String,
    /// Link participants follow to take the survey
    #[arg(long = "survey-link", env = "SURVEY_LINK", default_value = "")]
    pub survey_link: String,
    /// Email subject line
    #[arg(long, env = "EMAIL_SUBJECT", default_value = DEFAULT_SUBJECT)]
    pub subject: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("completion response is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("completion response missing choices[0].message.content")]
    MissingContent,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, name: &str, org: &OrgProfile) -> Result<String, ComposeError>;
}

pub struct TemplateGenerator;

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(&self, name: &str, org: &OrgProfile) -> Result<String, ComposeError> {
        Ok(render_template(name, org))
    }
}

pub fn render_template(name: &str, org: &OrgProfile) -> String {
    format!(
        "Dear {name},\n\n\
         We would appreciate your feedback on our recent {survey}.\n\
         Please complete the survey: {link}\n\n\
         Thank you,\n\
         {contact}\n\
         {org}\n",
        survey = org.survey_name,
        link = org.survey_link,
        contact = org.contact_person,
        org = org.org_name,
    )
}

pub fn invitation_prompt(name: &str, org: &OrgProfile) -> String {
    format!(
        "Create a professional survey invitation email for {name} regarding {survey}.\n\
         Organization: {org}\n\
         Contact Person: {contact}\n\
         Survey Link: {link}\n\n\
         Requirements:\n\
         - Personalized greeting\n\
         - Clear purpose statement\n\
         - Time commitment estimate\n\
         - Deadline if applicable\n\
         - Professional closing\n\
         - Mobile-friendly formatting\n",
        survey = org.survey_name,
        org = org.org_name,
        contact = org.contact_person,
        link = org.survey_link,
    )
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_key: String,
    pub url: String,
    pub model: String,
}

impl CompletionConfig {
    /// Reads `COMPLETION_API_KEY`, `COMPLETION_API_URL` and `COMPLETION_MODEL`.
    /// Returns `None` when no key is set, which selects the template.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("COMPLETION_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())?;
        Some(Self {
            api_key,
            url: std::env::var("COMPLETION_API_URL")
                .unwrap_or_else(|_| DEFAULT_COMPLETION_URL.to_string()),
            model: std::env::var("COMPLETION_MODEL")
                .unwrap_or_else(|_| DEFAULT_COMPLETION_MODEL.to_string()),
        })
    }
}

pub struct CompletionGenerator {
    client: reqwest::Client,
    config: CompletionConfig,
}

impl CompletionGenerator {
    pub fn new(config: CompletionConfig) -> Result<Self, ComposeError> {
        let client = reqwest::Client::builder()
            .timeout(COMPLETION_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ContentGenerator for CompletionGenerator {
    async fn generate(&self, name: &str, org: &OrgProfile) -> Result<String, ComposeError> {
        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": invitation_prompt(name, org) }],
            "temperature": 0.7,
            "max_tokens": 500,
        });

        tracing::debug!(url = %self.config.url, model = %self.config.model, "completion request");

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        read_completion(status, &text)
    }
}

fn read_completion(status: StatusCode, body: &str) -> Result<String, ComposeError> {
    if !status.is_success() {
        return Err(ComposeError::Api {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }
    let payload: serde_json::Value = serde_json::from_str(body)?;
    extract_content(&payload)
}

fn extract_content(payload: &serde_json::Value) -> Result<String, ComposeError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or(ComposeError::MissingContent)
}

/// Picks the completion client when configured, the template otherwise.
pub fn generator_from_env() -> Result<Box<dyn ContentGenerator>, ComposeError> {
    match CompletionConfig::from_env() {
        Some(config) => {
            tracing::info!(model = %config.model, "email bodies generated by completion API");
            Ok(Box::new(CompletionGenerator::new(config)?))
        }
        None => Ok(Box::new(TemplateGenerator)),
    }
}
