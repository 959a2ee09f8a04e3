//! diet — personalised diet plans from a generative text model
//!
//! [`DietRequest`] turns the user's profile into a prompt; a
//! [`TextGenerator`] answers it.  [`GeminiClient`] talks to the Gemini
//! `generateContent` REST endpoint.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::nutrition::{BmrInput, Gender};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DietConfig {
    pub model: String,
    /// Base URL of the generative language API.
    pub endpoint: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for DietConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityLevel {
    Sedentary,
    LightlyActive,
    ModeratelyActive,
    VeryActive,
}

impl ActivityLevel {
    pub const ALL: [ActivityLevel; 4] = [
        ActivityLevel::Sedentary,
        ActivityLevel::LightlyActive,
        ActivityLevel::ModeratelyActive,
        ActivityLevel::VeryActive,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ActivityLevel::Sedentary => "Sedentary",
            ActivityLevel::LightlyActive => "Lightly Active",
            ActivityLevel::ModeratelyActive => "Moderately Active",
            ActivityLevel::VeryActive => "Very Active",
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ActivityLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = normalize(s);
        ActivityLevel::ALL
            .into_iter()
            .find(|a| normalize(a.label()) == key)
            .ok_or_else(|| anyhow!("unknown activity level '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DietPreference {
    Vegetarian,
    Vegan,
    NonVegetarian,
    Keto,
    HighProtein,
    DiabeticFriendly,
}

impl DietPreference {
    pub const ALL: [DietPreference; 6] = [
        DietPreference::Vegetarian,
        DietPreference::Vegan,
        DietPreference::NonVegetarian,
        DietPreference::Keto,
        DietPreference::HighProtein,
        DietPreference::DiabeticFriendly,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DietPreference::Vegetarian => "Vegetarian",
            DietPreference::Vegan => "Vegan",
            DietPreference::NonVegetarian => "Non-Vegetarian",
            DietPreference::Keto => "Keto",
            DietPreference::HighProtein => "High-Protein",
            DietPreference::DiabeticFriendly => "Diabetic Friendly",
        }
    }
}

impl fmt::Display for DietPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DietPreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = normalize(s);
        DietPreference::ALL
            .into_iter()
            .find(|d| normalize(d.label()) == key)
            .ok_or_else(|| anyhow!("unknown diet preference '{s}'"))
    }
}

/// Lowercase and drop separators so "Lightly Active", "lightly-active" and
/// "lightly_active" compare equal.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DietRequest {
    pub gender: Gender,
    pub age: u32,
    pub weight_kg: f32,
    pub height_cm: f32,
    pub activity: ActivityLevel,
    pub preference: DietPreference,
}

impl DietRequest {
    /// Same ranges as the BMR calculator.
    pub fn validate(&self) -> Result<()> {
        BmrInput {
            gender: self.gender,
            age: self.age,
            weight_kg: self.weight_kg,
            height_cm: self.height_cm,
        }
        .validate()
    }

    pub fn prompt(&self) -> String {
        format!(
            "Generate a personalized {} diet plan for a {}-year-old {} who weighs {} kg \
             and is {} cm tall. Activity level: {}. Include breakfast, lunch, dinner, \
             and 2 snacks with approximate calories. Make it practical and easy to follow.",
            self.preference.label().to_lowercase(),
            self.age,
            self.gender.label().to_lowercase(),
            self.weight_kg,
            self.height_cm,
            self.activity,
        )
    }
}

/// Anything that can answer a prompt with text.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Validate `request`, then ask `generator` for a plan.
pub fn generate_plan<G: TextGenerator + ?Sized>(
    generator: &G,
    request: &DietRequest,
) -> Result<String> {
    request.validate()?;
    let prompt = request.prompt();
    debug!(%prompt, "requesting diet plan");
    let plan = generator
        .generate(&prompt)
        .context("failed to generate diet plan")?;
    info!(chars = plan.len(), "diet plan received");
    Ok(plan)
}

pub struct GeminiClient {
    agent: ureq::Agent,
    url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &DietConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            bail!("Gemini API key is empty");
        }
        Ok(Self {
            agent: ureq::AgentBuilder::new().build(),
            url: generate_url(&config.endpoint, &config.model),
            api_key,
        })
    }

    /// Build a client with the key taken from `config.api_key_env`.
    pub fn from_env(config: &DietConfig) -> Result<Self> {
        let key = std::env::var(&config.api_key_env).with_context(|| {
            format!(
                "API key not found; set the {} environment variable",
                config.api_key_env
            )
        })?;
        Self::new(config, key)
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let body = request_body(prompt).to_string();
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .set("x-goog-api-key", &self.api_key)
            .send_string(&body);

        let text = match response {
            Ok(resp) => resp
                .into_string()
                .context("failed to read Gemini response")?,
            Err(ureq::Error::Status(code, resp)) => {
                let detail = resp.into_string().unwrap_or_default();
                bail!("Gemini request failed with HTTP {code}: {}", detail.trim());
            }
            Err(e) => return Err(e).context("Gemini request failed"),
        };

        let value: Value =
            serde_json::from_str(&text).context("Gemini response is not valid JSON")?;
        extract_text(&value)
    }
}

fn generate_url(endpoint: &str, model: &str) -> String {
    format!(
        "{}/models/{}:generateContent",
        endpoint.trim_end_matches('/'),
        model
    )
}

fn request_body(prompt: &str) -> Value {
    json!({ "contents": [{ "parts": [{ "text": prompt }] }] })
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: &Value) -> Result<String> {
    let candidate = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .context("Gemini response has no candidates")?;
    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .context("Gemini candidate has no content parts")?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        bail!("Gemini returned an empty answer");
    }
    Ok(text)
}
