use std::env;
use std::fmt;
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub scoring: ScoringConfig,
    pub reference: ReferenceConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let criteria_path = PathBuf::from(required_or_default(
            "APP_CRITERIA_PATH",
            "data/critere.json",
        )?);
        let date_criterion = required_or_default("APP_DATE_CRITERION", "Date du dernier RI")?;
        let product_field = required_or_default("APP_PRODUCT_FIELD", "Produit")?;
        let reference_path = PathBuf::from(required_or_default(
            "APP_REFERENCE_PATH",
            "data/Planning_Inventaire_Integral_clean.json",
        )?);

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = LogFormat::parse(&required_or_default("APP_LOG_FORMAT", "compact")?)?;

        Ok(Self {
            environment,
            scoring: ScoringConfig {
                criteria_path,
                date_criterion,
            },
            reference: ReferenceConfig {
                path: reference_path,
                product_field,
            },
            telemetry: TelemetryConfig { log_level, format },
        })
    }
}

fn required_or_default(key: &'static str, default: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Err(ConfigError::Empty { key }),
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => Ok(default.to_string()),
    }
}

/// Location of the criteria catalog and the criterion scored as a date.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub criteria_path: PathBuf,
    pub date_criterion: String,
}

/// Location and key column of the persisted reference dataset.
#[derive(Debug, Clone)]
pub struct ReferenceConfig {
    pub path: PathBuf,
    pub product_field: String,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            _ => Err(ConfigError::Invalid {
                key: "APP_LOG_FORMAT",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Empty { key: &'static str },
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Empty { key } => write!(f, "{key} must not be empty when set"),
            ConfigError::Invalid { key, value } => {
                write!(f, "{key} has unsupported value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
