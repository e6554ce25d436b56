use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

pub const TESTNET_HOST: &str = "https://test.deribit.com/api/v2";
pub const MAINNET_HOST: &str = "https://www.deribit.com/api/v2";

/// Placeholder for credentials that were never set
pub const NOT_CONFIGURED: &str = "not configured";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field is absent, NaN, empty or still the placeholder
    #[error("{0} is not configured")]
    MissingField(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("configuration file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Strategy and connection parameters.
///
/// Immutable once a session starts. The client secret is stored (and saved)
/// in clear text; only `Debug` output redacts it.
#[derive(Clone, PartialEq)]
pub struct StrategyConfig {
    gap: f64,
    gap_ignore: f64,
    host: String,
    client_id: String,
    client_secret: String,
}

impl Default for StrategyConfig {
    /// An unconfigured instance pointing at the testnet
    fn default() -> Self {
        Self {
            gap: f64::NAN,
            gap_ignore: f64::NAN,
            host: TESTNET_HOST.to_string(),
            client_id: NOT_CONFIGURED.to_string(),
            client_secret: NOT_CONFIGURED.to_string(),
        }
    }
}

impl fmt::Debug for StrategyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyConfig")
            .field("gap", &self.gap)
            .field("gap_ignore", &self.gap_ignore)
            .field("host", &self.host)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

// ============== File layout ==============

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    robot: Option<RobotSection>,
    exchange: Option<ExchangeSection>,
}

#[derive(Debug, Default, Deserialize)]
struct RobotSection {
    gap: Option<f64>,
    gap_ignore: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ExchangeSection {
    host: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Serialize)]
struct ConfigFileRef<'a> {
    robot: RobotSectionRef,
    exchange: ExchangeSectionRef<'a>,
}

#[derive(Serialize)]
struct RobotSectionRef {
    gap: f64,
    gap_ignore: f64,
}

#[derive(Serialize)]
struct ExchangeSectionRef<'a> {
    host: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

// ============== Implementation ==============

impl StrategyConfig {
    /// Build a configuration from explicit values. Call [`validate`](Self::validate)
    /// before trading with it.
    pub fn new(
        gap: f64,
        gap_ignore: f64,
        host: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            gap,
            gap_ignore,
            host: host.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Point at the testnet (`true`) or mainnet (`false`) host
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.host = if test_mode { TESTNET_HOST } else { MAINNET_HOST }.to_string();
        self
    }

    pub fn gap(&self) -> f64 {
        self.gap
    }

    pub fn gap_ignore(&self) -> f64 {
        self.gap_ignore
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Check every field is present and in range.
    ///
    /// NaN numbers and empty or placeholder strings report `MissingField`;
    /// out-of-range values report `Invalid`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gap.is_nan() {
            return Err(ConfigError::MissingField("gap"));
        }
        if self.gap_ignore.is_nan() {
            return Err(ConfigError::MissingField("gap_ignore"));
        }
        if !self.gap.is_finite() || self.gap <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "gap must be a positive number, got {}",
                self.gap
            )));
        }
        if !self.gap_ignore.is_finite() || self.gap_ignore < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "gap_ignore must be a non-negative number, got {}",
                self.gap_ignore
            )));
        }

        check_text("client_id", &self.client_id)?;
        check_text("client_secret", &self.client_secret)?;
        check_text("host", &self.host)?;

        if !(self.host.starts_with("https://") || self.host.starts_with("http://")) {
            return Err(ConfigError::Invalid(format!(
                "host must be an http(s) URL, got {}",
                self.host
            )));
        }

        Ok(())
    }

    /// Load and validate a configuration file.
    ///
    /// Unknown fields are ignored. A field missing from the file reports
    /// `MissingField` with the field's name.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .build()
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;

        let file: ConfigFile = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;

        let robot = file.robot.unwrap_or_default();
        let exchange = file.exchange.unwrap_or_default();

        let loaded = Self {
            gap: robot.gap.ok_or(ConfigError::MissingField("gap"))?,
            gap_ignore: robot
                .gap_ignore
                .ok_or(ConfigError::MissingField("gap_ignore"))?,
            host: exchange.host.ok_or(ConfigError::MissingField("host"))?,
            client_id: exchange
                .client_id
                .ok_or(ConfigError::MissingField("client_id"))?,
            client_secret: exchange
                .client_secret
                .ok_or(ConfigError::MissingField("client_secret"))?,
        };

        loaded.validate()?;

        tracing::info!(
            "Loaded configuration from {} (host: {})",
            path.display(),
            loaded.host
        );

        Ok(loaded)
    }

    /// Write the five persisted fields as JSON. Refuses unconfigured instances.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        self.validate()?;

        let file = ConfigFileRef {
            robot: RobotSectionRef {
                gap: self.gap,
                gap_ignore: self.gap_ignore,
            },
            exchange: ExchangeSectionRef {
                host: &self.host,
                client_id: &self.client_id,
                client_secret: &self.client_secret,
            },
        };

        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(path.as_ref(), json)?;

        tracing::info!("Saved configuration to {}", path.as_ref().display());

        Ok(())
    }
}

fn check_text(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() || value == NOT_CONFIGURED {
        return Err(ConfigError::MissingField(field));
    }
    Ok(())
}
