//! Server configuration: CLI flags with env var fallbacks.
//!
//! Env keys: `MASTER_ENCRYPTION_KEY`, `JWT_SECRET`, `DATABASE_URL`, `PORT`,
//! `BASE_URL`, `CORS_ORIGIN`, `UPLOAD_DIR`, `DEPLOY_ENVIRONMENT`,
//! `GATEWAY_BASE_URL`, plus SMTP credentials for deployments with a real
//! mailer wired in.

use std::path::PathBuf;

use anyhow::Context;
use argh::FromArgs;
use aspree_common::env::{self, DeployEnv};

/// aspreed - the aspree invoicing backend.
#[derive(Debug, FromArgs)]
pub struct Args {
    /// port to bind (default: $PORT or 3000)
    #[argh(option)]
    pub port: Option<u16>,

    /// sqlite database path or DSN (default: $DATABASE_URL or
    /// sqlite://aspree.db)
    #[argh(option)]
    pub database_url: Option<String>,

    /// directory for uploaded files (default: $UPLOAD_DIR or ./uploads)
    #[argh(option)]
    pub upload_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub base_url: String,
    pub jwt_secret: String,
    pub master_key: String,
    pub cors_origin: Option<String>,
    pub deploy_env: DeployEnv,
    pub gateway_base_url: Option<String>,
}

impl Config {
    /// Merge CLI args over env vars over defaults. The two secrets are
    /// required; everything else has a dev-friendly default.
    pub fn load(args: Args) -> anyhow::Result<Self> {
        let port = match args.port {
            Some(port) => port,
            None => env::opt_parsed_var::<u16>("PORT")?.unwrap_or(3000),
        };
        let database_url = args
            .database_url
            .or_else(|| env::opt_var("DATABASE_URL"))
            .unwrap_or_else(|| "sqlite://aspree.db".to_owned());
        let upload_dir = args
            .upload_dir
            .or_else(|| env::opt_var("UPLOAD_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("uploads"));
        let base_url = env::opt_var("BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"));

        let jwt_secret =
            env::req_var("JWT_SECRET").context("JWT_SECRET is required")?;
        let master_key = env::req_var("MASTER_ENCRYPTION_KEY")
            .context("MASTER_ENCRYPTION_KEY is required")?;

        Ok(Self {
            port,
            database_url,
            upload_dir,
            base_url,
            jwt_secret,
            master_key,
            cors_origin: env::opt_var("CORS_ORIGIN"),
            deploy_env: DeployEnv::from_env()?,
            gateway_base_url: env::opt_var("GATEWAY_BASE_URL"),
        })
    }
}
