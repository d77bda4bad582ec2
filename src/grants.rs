use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_INSTITUTION: &str = "an unaffiliated, independent scholar";
pub const DEFAULT_PARTICIPANTS: &str = "unlisted";
pub const DEFAULT_PROJECT_TITLE: &str = "unlisted";

/// One grant-award point as it appears in the dataset. The three optional
/// attributes stay optional here; everything else is taken as-is from the
/// properties object.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantProperties {
    #[serde(rename = "YearAwarded")]
    pub year_awarded: i32,
    #[serde(rename = "Institution")]
    pub institution: Option<String>,
    #[serde(rename = "InstCity")]
    pub inst_city: String,
    #[serde(rename = "InstState")]
    pub inst_state: String,
    #[serde(rename = "AwardOutright")]
    pub award_outright: f64,
    #[serde(rename = "AppNumber", deserialize_with = "string_or_number")]
    pub app_number: String,
    #[serde(rename = "ProjectTitle")]
    pub project_title: Option<String>,
    #[serde(rename = "Participants")]
    pub participants: Option<String>,
    #[serde(rename = "Program")]
    pub program: String,
    #[serde(rename = "Division")]
    pub division: String,
}

#[derive(Debug, Clone)]
pub struct Grant {
    pub lon: f64,
    pub lat: f64,
    pub properties: GrantProperties,
}

/// A grant with the optional attributes resolved to display text. Produced by
/// [`Grant::normalize`]; owns its data so the raw record never aliases the
/// defaulted one.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedGrant {
    #[serde(rename = "YearAwarded")]
    pub year_awarded: i32,
    #[serde(rename = "Institution")]
    pub institution: String,
    #[serde(rename = "InstCity")]
    pub inst_city: String,
    #[serde(rename = "InstState")]
    pub inst_state: String,
    #[serde(rename = "AwardOutright")]
    pub award_outright: f64,
    #[serde(rename = "AppNumber")]
    pub app_number: String,
    #[serde(rename = "ProjectTitle")]
    pub project_title: String,
    #[serde(rename = "Participants")]
    pub participants: String,
    #[serde(rename = "Program")]
    pub program: String,
    #[serde(rename = "Division")]
    pub division: String,
    #[serde(rename = "Lat")]
    pub lat: f64,
    #[serde(rename = "Lon")]
    pub lon: f64,
}

impl Grant {
    /// Fills the documented defaults for the three optional attributes and
    /// passes every other attribute through unchanged.
    #[must_use]
    pub fn normalize(self) -> NormalizedGrant {
        let Self {
            lon,
            lat,
            properties,
        } = self;
        NormalizedGrant {
            year_awarded: properties.year_awarded,
            institution: properties
                .institution
                .unwrap_or_else(|| DEFAULT_INSTITUTION.to_string()),
            inst_city: properties.inst_city,
            inst_state: properties.inst_state,
            award_outright: properties.award_outright,
            app_number: properties.app_number,
            project_title: properties
                .project_title
                .unwrap_or_else(|| DEFAULT_PROJECT_TITLE.to_string()),
            participants: properties
                .participants
                .unwrap_or_else(|| DEFAULT_PARTICIPANTS.to_string()),
            program: properties.program,
            division: properties.division,
            lat,
            lon,
        }
    }
}

// Some exports carry AppNumber as a bare number, others as a string.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(text) => Ok(text),
        serde_json::Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for AppNumber, got {other}"
        ))),
    }
}
