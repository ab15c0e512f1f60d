use std::{env, fmt, fmt::Display, str::FromStr};

use anyhow::{anyhow, Context};
use serde::Serialize;

/// Represents a validated `DEPLOY_ENVIRONMENT` configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeployEnv {
    /// "dev"
    Dev,
    /// "prod"
    Prod,
}

impl DeployEnv {
    /// Read a [`DeployEnv`] from env, defaulting to dev when unset.
    pub fn from_env() -> anyhow::Result<Self> {
        match env::var("DEPLOY_ENVIRONMENT") {
            Ok(s) => Self::from_str(&s),
            Err(env::VarError::NotPresent) => Ok(Self::Dev),
            Err(e) => Err(e).context("DEPLOY_ENVIRONMENT was not unicode"),
        }
    }

    /// Shorthand to check whether this [`DeployEnv`] is dev.
    #[inline]
    pub fn is_dev(self) -> bool {
        matches!(self, Self::Dev)
    }

    /// Shorthand to check whether this [`DeployEnv`] is prod.
    #[inline]
    pub fn is_prod(self) -> bool {
        matches!(self, Self::Prod)
    }

    /// Get a [`str`] containing "dev" or "prod".
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

impl FromStr for DeployEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            _ => Err(anyhow!(
                "Unrecognized DEPLOY_ENVIRONMENT '{s}': \
                 must be 'dev' or 'prod'"
            )),
        }
    }
}

impl Display for DeployEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DeployEnv {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.as_str().serialize(serializer)
    }
}

/// Read a required env var, with the var name included in the error chain.
pub fn req_var(key: &str) -> anyhow::Result<String> {
    env::var(key).with_context(|| format!("{key} was not set"))
}

/// Read an optional env var. Unset and empty are both [`None`].
pub fn opt_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read an optional env var and parse it, erroring only on a parse failure.
pub fn opt_parsed_var<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match opt_var(key) {
        Some(v) => v
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Failed to parse {key}")),
        None => Ok(None),
    }
}
