use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Represents a chat model identifier.
///
/// This can be a predefined model name or a custom string value for models
/// served by compatible endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model names
    Known(KnownModel),

    /// Custom model identifier (fine-tunes, local servers, future models)
    Custom(String),
}

/// Known chat completion models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// GPT-3.5 Turbo
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,

    /// GPT-4
    #[serde(rename = "gpt-4")]
    Gpt4,

    /// GPT-4 Turbo
    #[serde(rename = "gpt-4-turbo")]
    Gpt4Turbo,

    /// GPT-4o
    #[serde(rename = "gpt-4o")]
    Gpt4o,

    /// GPT-4o mini
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
}

impl KnownModel {
    const ALL: [KnownModel; 5] = [
        KnownModel::Gpt35Turbo,
        KnownModel::Gpt4,
        KnownModel::Gpt4Turbo,
        KnownModel::Gpt4o,
        KnownModel::Gpt4oMini,
    ];

    /// The identifier sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::Gpt35Turbo => "gpt-3.5-turbo",
            KnownModel::Gpt4 => "gpt-4",
            KnownModel::Gpt4Turbo => "gpt-4-turbo",
            KnownModel::Gpt4o => "gpt-4o",
            KnownModel::Gpt4oMini => "gpt-4o-mini",
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Known(KnownModel::Gpt35Turbo)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Known(known_model) => write!(f, "{}", known_model),
            Model::Custom(custom) => write!(f, "{}", custom),
        }
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::validation(
                "model name must not be empty",
                Some("model".to_string()),
            ));
        }
        Ok(KnownModel::ALL
            .iter()
            .find(|known| known.as_str() == s)
            .map(|known| Model::Known(*known))
            .unwrap_or_else(|| Model::Custom(s.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<String> for Model {
    fn from(model: String) -> Self {
        Model::Custom(model)
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        Model::Custom(model.to_string())
    }
}
