use crate::error::{ConfigError, Result as AppResult};
use config::{Config, Environment, File, Value, ValueKind};
use serde::{Deserialize, Deserializer};

const DEFAULT_ALLOWED_LENGTHS: [usize; 3] = [5, 10, 15];

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ContentSourceType {
    File,
    Supabase,
    Firestore,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    pub source_type: ContentSourceType,
    pub file_path: String,
    pub leaderboard_path: String,
    /// Last good question bank from a remote backend, served when the backend
    /// cannot be reached.
    pub cache_path: Option<String>,
    pub supabase: Option<SupabaseConfig>,
    pub firestore: Option<FirestoreConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizConfig {
    pub default_length: usize,
    #[serde(deserialize_with = "deserialize_lengths")]
    pub allowed_lengths: Vec<usize>,
    pub min_name_length: usize,
    pub max_name_length: usize,
    pub seen_questions_dir: Option<String>,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            default_length: 15,
            allowed_lengths: DEFAULT_ALLOWED_LENGTHS.to_vec(),
            min_name_length: 2,
            max_name_length: 50,
            seen_questions_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeaderboardConfig {
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    pub inactivity_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    pub server: ServerConfig,
    pub content: ContentConfig,
    pub quiz: QuizConfig,
    pub leaderboard: LeaderboardConfig,
    pub sessions: SessionsConfig,
}

impl AppSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.content.source_type {
            ContentSourceType::File => {}
            ContentSourceType::Supabase => {
                if self.content.supabase.is_none() {
                    return Err(ConfigError::Missing(
                        "content.supabase.url and content.supabase.anon_key".to_string(),
                    ));
                }
            }
            ContentSourceType::Firestore => {
                if self.content.firestore.is_none() {
                    return Err(ConfigError::Missing(
                        "content.firestore.project_id and content.firestore.api_key".to_string(),
                    ));
                }
            }
        }

        if self.quiz.allowed_lengths.is_empty() {
            return Err(ConfigError::InvalidValue(
                "quiz.allowed_lengths must not be empty".to_string(),
            ));
        }

        if !self.quiz.allowed_lengths.contains(&self.quiz.default_length) {
            return Err(ConfigError::InvalidValue(format!(
                "quiz.default_length {} is not one of quiz.allowed_lengths {:?}",
                self.quiz.default_length, self.quiz.allowed_lengths
            )));
        }

        if self.quiz.min_name_length > self.quiz.max_name_length {
            return Err(ConfigError::InvalidValue(
                "quiz.min_name_length exceeds quiz.max_name_length".to_string(),
            ));
        }

        Ok(())
    }
}

pub fn load_settings() -> AppResult<AppSettings> {
    let defaults = QuizConfig::default();
    let default_lengths: Vec<Value> = defaults
        .allowed_lengths
        .iter()
        .map(|length| Value::new(None, ValueKind::I64(*length as i64)))
        .collect();

    let builder = Config::builder()
        .add_source(
            Environment::with_prefix("TRIVIA")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.cors_origins")
                .with_list_parse_key("quiz.allowed_lengths")
                .try_parsing(true),
        )
        .add_source(File::with_name("config").required(false))
        .set_default("server.port", 3000i64)
        .and_then(|b| b.set_default("server.cors_origins", Vec::<String>::new()))
        .and_then(|b| b.set_default("content.source_type", "file"))
        .and_then(|b| b.set_default("content.file_path", "questions.json"))
        .and_then(|b| b.set_default("content.leaderboard_path", "leaderboard.json"))
        .and_then(|b| b.set_default("quiz.default_length", defaults.default_length as i64))
        .and_then(|b| {
            b.set_default(
                "quiz.allowed_lengths",
                Value::new(None, ValueKind::Array(default_lengths)),
            )
        })
        .and_then(|b| b.set_default("quiz.min_name_length", defaults.min_name_length as i64))
        .and_then(|b| b.set_default("quiz.max_name_length", defaults.max_name_length as i64))
        .and_then(|b| b.set_default("leaderboard.max_entries", 50i64))
        .and_then(|b| b.set_default("sessions.inactivity_timeout_secs", 3600i64))
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let settings: AppSettings = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    settings.validate()?;
    Ok(settings)
}

/// Accepts `"5,10,15"`, `[5, 10, 15]` or `["5", "10"]`.
fn deserialize_lengths<'de, D>(deserializer: D) -> Result<Vec<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    let parse = |text: &str| {
        text.trim()
            .parse::<usize>()
            .map_err(|_| D::Error::custom(format!("Invalid quiz length '{}'", text.trim())))
    };

    let value = Value::deserialize(deserializer)?;
    let mut lengths = match value {
        Value::String(s) => s
            .split(',')
            .filter(|item| !item.trim().is_empty())
            .map(parse)
            .collect::<Result<Vec<_>, _>>()?,
        Value::Number(n) => vec![n
            .as_u64()
            .ok_or_else(|| D::Error::custom("Quiz length must be a positive integer"))?
            as usize],
        Value::Array(arr) => arr
            .into_iter()
            .map(|item| match item {
                Value::Number(n) => n
                    .as_u64()
                    .map(|n| n as usize)
                    .ok_or_else(|| D::Error::custom("Quiz length must be a positive integer")),
                Value::String(s) => parse(&s),
                _ => Err(D::Error::custom("Array must contain only numbers")),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(D::Error::custom("Expected string or array of lengths")),
    };

    lengths.sort_unstable();
    lengths.dedup();
    Ok(lengths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::IntoDeserializer;
    use serde::de::value::{Error as ValueError, StrDeserializer};

    fn settings_with(source_type: ContentSourceType) -> AppSettings {
        AppSettings {
            server: ServerConfig {
                port: 3000,
                cors_origins: Vec::new(),
            },
            content: ContentConfig {
                source_type,
                file_path: "questions.json".to_string(),
                leaderboard_path: "leaderboard.json".to_string(),
                cache_path: None,
                supabase: None,
                firestore: None,
            },
            quiz: QuizConfig::default(),
            leaderboard: LeaderboardConfig { max_entries: 50 },
            sessions: SessionsConfig {
                inactivity_timeout_secs: 3600,
            },
        }
    }

    #[test]
    fn test_lengths_from_comma_string() {
        let deserializer: StrDeserializer<ValueError> = "15, 5,10,5".into_deserializer();
        assert_eq!(deserialize_lengths(deserializer).unwrap(), vec![5, 10, 15]);
    }

    #[test]
    fn test_lengths_from_json_array() {
        let value = serde_json::json!([10, "20"]);
        assert_eq!(deserialize_lengths(value).unwrap(), vec![10, 20]);

        let bad = serde_json::json!([true]);
        assert!(deserialize_lengths(bad).is_err());
    }

    #[test]
    fn test_validate_requires_backend_settings() {
        assert!(settings_with(ContentSourceType::File).validate().is_ok());

        let err = settings_with(ContentSourceType::Supabase)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));

        let mut firestore = settings_with(ContentSourceType::Firestore);
        firestore.content.firestore = Some(FirestoreConfig {
            project_id: "quiz".to_string(),
            api_key: "key".to_string(),
        });
        assert!(firestore.validate().is_ok());
    }

    #[test]
    fn test_validate_default_length_is_allowed() {
        let mut settings = settings_with(ContentSourceType::File);
        settings.quiz.default_length = 12;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
