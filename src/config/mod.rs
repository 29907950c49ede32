use error_stack::{Report, Result, ResultExt};
use serde::Deserialize;
use thiserror::Error;

use crate::util::figment::FigmentErrorAttachable;

mod database;
mod follows;
mod logging;

pub use self::database::Database;
pub use self::follows::Follows;
pub use self::logging::{InvalidLoggingStyle, Logging, LoggingStyle};

#[derive(Debug, Error)]
#[error("Failed to load configuration")]
pub struct ParseError;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Postgres database holding follow records. Leave it out to keep
    /// follow records in memory.
    #[serde(default)]
    pub db: Option<Database>,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub follows: Follows,
}

impl Config {
    const DEFAULT_CONFIG_FILE: &'static str = "follow.toml";

    pub fn load() -> Result<Self, ParseError> {
        dotenvy::dotenv().ok();

        let config = Self::figment()
            .extract::<Self>()
            .map_err(|e| Report::new(ParseError).attach_figment_error(e))?;

        config.validate().change_context(ParseError)?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), InvalidConfig> {
        if let Some(db) = self.db.as_ref() {
            if db.url.trim().is_empty() {
                return Err(Report::new(InvalidConfig).attach_printable("db.url: must not be empty"));
            }
        }
        Ok(())
    }

    /// Creates a default [`Figment`](figment::Figment) object to load
    /// the configuration from. Separated from [`Config::load`] for testing.
    pub(crate) fn figment() -> figment::Figment {
        use figment::{
            providers::{Env, Format, Toml},
            Figment,
        };

        Figment::new()
            .merge(Toml::file(Self::DEFAULT_CONFIG_FILE))
            // Env provider splits on every underscore so fields with
            // underscores in them are mapped by hand.
            .merge(Env::prefixed("FOLLOW_").map(|v| match v.as_str() {
                "DB_URL" => "db.url".into(),
                "DB_POOL_SIZE" => "db.pool_size".into(),
                "DB_MIN_IDLE" => "db.min_idle".into(),
                "DB_ENFORCE_TLS" => "db.enforce_tls".into(),
                "DB_TIMEOUT_SECS" => "db.timeout_secs".into(),

                "SERIALIZE_GET_OR_CREATE" => "follows.serialize_get_or_create".into(),
                "LOCK_STRIPES" => "follows.lock_stripes".into(),

                _ => v.as_str().replace('_', ".").into(),
            }))
            // Environment variable aliases
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|v| match v.as_str() {
                "DATABASE_URL" => "db.url".into(),
                _ => v.into(),
            }))
    }
}

#[derive(Debug, Error)]
#[error("Invalid configuration")]
struct InvalidConfig;
