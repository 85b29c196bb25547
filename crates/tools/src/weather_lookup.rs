//! Weather lookup tool backed by wttr.in's JSON format (`?format=j1`).

use async_trait::async_trait;
use serde::Deserialize;
use slothtop_core::error::ToolError;
use slothtop_core::tool::{ParamType, Tool, ToolParam, ToolResult};
use tracing::debug;

pub struct WeatherLookupTool {
    client: reqwest::Client,
    base_url: String,
}

impl WeatherLookupTool {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, location: &str) -> Result<reqwest::Url, ToolError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ToolError::failed("weather_lookup", format!("bad weather_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ToolError::failed("weather_lookup", "weather_url cannot take a path"))?
            .pop_if_empty()
            .push(location);
        url.query_pairs_mut().append_pair("format", "j1");
        Ok(url)
    }
}

#[async_trait]
impl Tool for WeatherLookupTool {
    fn name(&self) -> &str {
        "weather_lookup"
    }

    fn description(&self) -> &str {
        "Look up current weather conditions for a location. Returns temperature, conditions, humidity, and wind speed."
    }

    fn params(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::required("location", ParamType::String, "The city name or location to look up weather for"),
            ToolParam::optional("units", ParamType::String, "Temperature units: metric (default) or imperial"),
        ]
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let location = arguments["location"].as_str().unwrap_or_default().trim();
        if location.is_empty() {
            return Err(ToolError::InvalidArguments("location must not be empty".into()));
        }
        let imperial = arguments["units"].as_str() == Some("imperial");

        let url = self.url_for(location)?;
        debug!(%url, "Fetching weather");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::failed("weather_lookup", e))?;

        if !response.status().is_success() {
            return Err(ToolError::failed(
                "weather_lookup",
                format!("weather provider returned {} for '{location}'", response.status()),
            ));
        }

        let report: Report = response
            .json()
            .await
            .map_err(|e| ToolError::failed("weather_lookup", format!("unreadable response: {e}")))?;

        let weather = summarize(report, location, imperial)
            .ok_or_else(|| ToolError::failed("weather_lookup", format!("no current conditions for '{location}'")))?;

        let output = serde_json::to_string_pretty(&weather).unwrap_or_default();
        Ok(ToolResult::ok(output).with_data(serde_json::to_value(&weather).unwrap_or_default()))
    }
}

#[derive(Debug, PartialEq, serde::Serialize)]
pub struct WeatherData {
    pub location: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub units: String,
    pub conditions: String,
    pub humidity: u32,
    pub wind_speed: f64,
    pub wind_direction: String,
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    current_condition: Vec<CurrentCondition>,
    #[serde(default)]
    nearest_area: Vec<NearestArea>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentCondition {
    #[serde(rename = "temp_C")]
    temp_c: String,
    #[serde(rename = "temp_F")]
    temp_f: String,
    #[serde(rename = "FeelsLikeC", default)]
    feels_like_c: String,
    #[serde(rename = "FeelsLikeF", default)]
    feels_like_f: String,
    #[serde(default)]
    humidity: String,
    #[serde(default)]
    weather_desc: Vec<TextValue>,
    #[serde(default)]
    windspeed_kmph: String,
    #[serde(default)]
    windspeed_miles: String,
    #[serde(rename = "winddir16Point", default)]
    winddir_16_point: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NearestArea {
    #[serde(default)]
    area_name: Vec<TextValue>,
    #[serde(default)]
    country: Vec<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

/// wttr.in reports every number as a string.
fn num(s: &str) -> f64 {
    s.trim().parse().unwrap_or(0.0)
}

fn summarize(report: Report, requested: &str, imperial: bool) -> Option<WeatherData> {
    let current = report.current_condition.into_iter().next()?;

    let location = report
        .nearest_area
        .first()
        .and_then(|a| {
            let area = a.area_name.first()?.value.clone();
            Some(match a.country.first() {
                Some(c) => format!("{area}, {}", c.value),
                None => area,
            })
        })
        .unwrap_or_else(|| requested.to_string());

    let (temperature, feels_like, units, wind_speed) = if imperial {
        (num(&current.temp_f), num(&current.feels_like_f), "°F", num(&current.windspeed_miles))
    } else {
        (num(&current.temp_c), num(&current.feels_like_c), "°C", num(&current.windspeed_kmph))
    };

    Some(WeatherData {
        location,
        temperature,
        feels_like,
        units: units.to_string(),
        conditions: current
            .weather_desc
            .first()
            .map(|d| d.value.trim().to_string())
            .unwrap_or_default(),
        humidity: current.humidity.trim().parse().unwrap_or(0),
        wind_speed,
        wind_direction: current.winddir_16_point,
    })
}
