//! Tools the chat model may call.
//!
//! The set is fixed at compile time: [`Tool`] lists every tool, and
//! [`ToolRegistry::specs`] describes them to the model.

use crate::error::{BotError, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{json, Value};

const WEATHER_BASE_URL: &str = "https://weatherapi-com.p.rapidapi.com";
const WEATHER_HOST: &str = "weatherapi-com.p.rapidapi.com";

/// JSON-schema description of a tool, as sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    TodaysDate,
    CurrentWeather,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::TodaysDate, Tool::CurrentWeather];

    pub fn name(&self) -> &'static str {
        match self {
            Self::TodaysDate => "get_todays_date",
            Self::CurrentWeather => "get_current_weather",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn spec(&self) -> ToolSpec {
        match self {
            Self::TodaysDate => ToolSpec {
                name: self.name(),
                description: "Get the current date and time for a specific timezone",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "timezone": {
                            "type": "string",
                            "description": concat!(
                                "Timezone identifier ",
                                "(e.g., 'US/Eastern', 'UTC', 'Europe/London')"
                            )
                        }
                    },
                    "required": ["timezone"]
                }),
            },
            Self::CurrentWeather => ToolSpec {
                name: self.name(),
                description: "Get current weather conditions for a specific location",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "location": {
                            "type": "string",
                            "description": concat!(
                                "City and state/country ",
                                "(e.g., 'San Francisco, CA', 'London, UK')"
                            )
                        },
                        "unit": {
                            "type": "string",
                            "enum": ["celsius", "fahrenheit"],
                            "description": "Temperature unit preference"
                        }
                    },
                    "required": ["location"]
                }),
            },
        }
    }
}

#[derive(Deserialize)]
struct DateArgs {
    #[serde(default = "default_timezone")]
    timezone: String,
}

fn default_timezone() -> String {
    "US/Eastern".to_string()
}

#[derive(Deserialize)]
struct WeatherArgs {
    location: String,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Deserialize)]
struct WeatherResponse {
    location: Option<Value>,
    current: WeatherCurrent,
}

#[derive(Deserialize)]
struct WeatherCurrent {
    temp_f: f64,
    temp_c: f64,
    condition: WeatherCondition,
    uv: Option<f64>,
    humidity: Option<f64>,
    precip_in: Option<f64>,
}

#[derive(Deserialize)]
struct WeatherCondition {
    text: String,
}

/// Executes tool calls requested by the model.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    http_client: reqwest::Client,
    weather_api_key: Option<String>,
    weather_base_url: String,
}

impl ToolRegistry {
    pub fn new(http_client: reqwest::Client, weather_api_key: Option<String>) -> Self {
        Self::with_weather_base_url(http_client, weather_api_key, WEATHER_BASE_URL)
    }

    pub fn with_weather_base_url(
        http_client: reqwest::Client,
        weather_api_key: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            weather_api_key,
            weather_base_url: base_url.into(),
        }
    }

    /// Tools offered to the model. Weather is only offered with an API key.
    pub fn specs(&self) -> Vec<ToolSpec> {
        Tool::ALL
            .into_iter()
            .filter(|tool| *tool != Tool::CurrentWeather || self.weather_api_key.is_some())
            .map(|tool| tool.spec())
            .collect()
    }

    /// Run a tool and return its JSON output.
    ///
    /// Failures are reported to the model as `{"error": ...}` rather than
    /// aborting the conversation.
    pub async fn execute(&self, name: &str, arguments: &str) -> String {
        let result = match Tool::from_name(name) {
            Some(Tool::TodaysDate) => serde_json::from_str::<DateArgs>(arguments)
                .map_err(BotError::from)
                .and_then(|args| todays_date(&args.timezone, Utc::now())),
            Some(Tool::CurrentWeather) => match serde_json::from_str::<WeatherArgs>(arguments) {
                Ok(args) => self.current_weather(&args.location, args.unit.as_deref()).await,
                Err(e) => Err(e.into()),
            },
            None => Err(BotError::InvalidArguments(format!("Unknown function: {}", name))),
        };

        match result {
            Ok(value) => value.to_string(),
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool call failed");
                json!({ "error": e.to_string() }).to_string()
            }
        }
    }

    async fn current_weather(&self, location: &str, unit: Option<&str>) -> Result<Value> {
        let api_key = self
            .weather_api_key
            .as_deref()
            .ok_or_else(|| BotError::Config("WEATHER_API_KEY is not set".to_string()))?;

        let resp = self
            .http_client
            .get(format!("{}/current.json", self.weather_base_url))
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", WEATHER_HOST)
            .query(&[("q", location)])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BotError::Upstream(format!(
                "Weather API returned error: {}",
                resp.status()
            )));
        }

        let weather: WeatherResponse = resp.json().await?;
        let unit = unit.unwrap_or("fahrenheit");
        let temperature = if unit == "celsius" {
            weather.current.temp_c
        } else {
            weather.current.temp_f
        };

        Ok(json!({
            "location": weather.location,
            "unit": unit,
            "temperature": temperature,
            "conditions": weather.current.condition.text,
            "uv_level": weather.current.uv,
            "humidity": weather.current.humidity,
            "precip_inches": weather.current.precip_in,
        }))
    }
}

/// Current date and time in `timezone`.
pub fn todays_date(timezone: &str, now: DateTime<Utc>) -> Result<Value> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| BotError::InvalidArguments(format!("Unknown timezone: {}", timezone)))?;

    Ok(json!({
        "timezone": timezone,
        "today": now.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
    }))
}
