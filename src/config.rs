use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub inbox: InboxConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port", deserialize_with = "deserialize_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    5
}

/// Custom deserializer that handles port as both number and string
///
/// Accepts:
/// - `port: 5432` (number)
/// - `port: "5432"` (string that parses to number)
/// - `port: ${DB_PORT}` (env var substituted to either)
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        String(String),
    }

    match PortValue::deserialize(deserializer)? {
        PortValue::Number(n) => Ok(n),
        PortValue::String(s) => s
            .parse::<u16>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid port number: '{}'", s))),
    }
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub interval_minutes: u64,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_seconds: u64,
}

fn default_initial_delay() -> u64 {
    10
}

/// Where uploaded reports land. Files are named `{job_id}__{description}.csv`
/// and classified as KPI stage reports or quality checklists by glob
/// patterns matched against the lowercased file name.
#[derive(Debug, Deserialize, Clone)]
pub struct InboxConfig {
    pub dir: String,
    #[serde(default = "default_kpi_patterns")]
    pub kpi_patterns: Vec<String>,
    #[serde(default = "default_quality_patterns")]
    pub quality_patterns: Vec<String>,
}

fn default_kpi_patterns() -> Vec<String> {
    vec!["*kpi*.csv".to_string()]
}

fn default_quality_patterns() -> Vec<String> {
    vec!["*quality*.csv".to_string(), "*qc*.csv".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            export_dir: default_export_dir(),
        }
    }
}

fn default_export_dir() -> String {
    "completed_jobs".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        // Substitute environment variables
        let expanded = expand_env_vars(&content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Unexpanded environment variables
    /// - Valid port ranges
    /// - Non-empty required fields
    /// - Positive time intervals
    /// - Well-formed inbox glob patterns
    fn validate(&self) -> Result<()> {
        // Check if any database field contains unexpanded environment variables
        let fields_to_check = [
            ("DB_HOST", &self.database.host),
            ("DB_NAME", &self.database.name),
            ("DB_USER", &self.database.user),
            ("DB_PASSWORD", &self.database.password),
        ];

        for (field_name, value) in &fields_to_check {
            if value.contains("${") {
                return Err(AppError::Config(format!(
                    "{} environment variable is not set. \
                     Please set it or create a .env file. \
                     See .env.example for required variables.",
                    field_name
                )));
            }
        }

        if self.database.host.is_empty() {
            return Err(AppError::Config(
                "Database host cannot be empty".to_string(),
            ));
        }

        if self.database.name.is_empty() {
            return Err(AppError::Config(
                "Database name cannot be empty".to_string(),
            ));
        }

        if self.database.user.is_empty() {
            return Err(AppError::Config(
                "Database user cannot be empty".to_string(),
            ));
        }

        if self.database.port == 0 {
            return Err(AppError::Config("Database port cannot be 0".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(AppError::Config(
                "Database max_connections must be at least 1".to_string(),
            ));
        }

        if self.database.max_connections > 100 {
            return Err(AppError::Config(format!(
                "Database max_connections {} seems too high, maximum recommended is 100",
                self.database.max_connections
            )));
        }

        if self.scheduler.interval_minutes == 0 {
            return Err(AppError::Config(
                "Scheduler interval_minutes must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.interval_minutes < 5 {
            tracing::warn!(
                "Scheduler interval of {} minutes is very short, consider using at least 5 minutes",
                self.scheduler.interval_minutes
            );
        }

        if self.inbox.dir.is_empty() {
            return Err(AppError::Config(
                "Inbox directory cannot be empty".to_string(),
            ));
        }

        for pattern in self
            .inbox
            .kpi_patterns
            .iter()
            .chain(self.inbox.quality_patterns.iter())
        {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(AppError::Config(format!(
                    "Invalid inbox pattern '{}': {}",
                    pattern, e
                )));
            }
        }

        if self.archive.enabled && self.archive.export_dir.is_empty() {
            return Err(AppError::Config(
                "Archive export_dir cannot be empty when archiving is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}").unwrap();

    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root (copy .env.example)\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or set {} in your environment before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}
