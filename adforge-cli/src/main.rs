//! adforge CLI
//!
//! Command-line interface for logging in to the ad platform and working
//! with ad accounts and campaigns.
//!
//! # Usage
//!
//! ```bash
//! # Log in through the browser
//! adforge login
//!
//! # Show the stored credential
//! adforge status
//!
//! # List campaigns of an ad account
//! adforge campaigns act_1234567890
//!
//! # Seven-day insights for a campaign
//! adforge insights campaign 120200000000000 --preset last_7d
//! ```

mod callback;
mod config;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use adforge_core::{
    AdforgeError, AuthError, CampaignStatus, ErrorClassification, GraphClient, InsightsKind,
    InsightsParams, NewCampaign, Session, create_store,
};
use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::callback::CallbackParams;
use crate::config::CliConfig;

/// How long `login` waits for the browser redirect.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Parser)]
#[command(name = "adforge")]
#[command(about = "Ad platform login and campaign management")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in through the platform's login dialog
    Login {
        /// Paste the redirect URL instead of listening for it
        #[arg(long)]
        paste: bool,
    },

    /// Show the stored credential
    Status,

    /// Refresh the stored credential now
    Refresh,

    /// Finish a login whose long-lived token upgrade failed
    RetryUpgrade,

    /// Forget the stored credential
    Logout,

    /// Show the logged-in user
    Me,

    /// List ad accounts
    Accounts,

    /// List campaigns of an ad account
    Campaigns {
        /// Ad account id (e.g., act_1234567890)
        account: String,
    },

    /// Show insights for an account, campaign, ad set or ad
    Insights {
        /// Object kind (account, campaign, adset, ad)
        kind: InsightsKind,

        /// Object id
        id: String,

        /// Named date range (e.g., last_7d, last_30d)
        #[arg(long, conflicts_with_all = ["since", "until"])]
        preset: Option<String>,

        /// Start of an explicit range (YYYY-MM-DD)
        #[arg(long, requires = "until")]
        since: Option<String>,

        /// End of an explicit range (YYYY-MM-DD)
        #[arg(long, requires = "since")]
        until: Option<String>,

        /// Metrics to return (comma-separated)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },

    /// Create a campaign
    CreateCampaign {
        /// Ad account id
        account: String,

        /// Campaign name
        #[arg(long)]
        name: String,

        /// Campaign objective (e.g., OUTCOME_TRAFFIC)
        #[arg(long)]
        objective: String,

        /// Daily budget in the account's minor currency unit
        #[arg(long)]
        daily_budget: Option<u64>,

        /// Start delivering immediately instead of creating it paused
        #[arg(long)]
        active: bool,
    },

    /// Pause a campaign
    PauseCampaign {
        /// Campaign id
        id: String,
    },

    /// Delete a campaign
    DeleteCampaign {
        /// Campaign id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    init_logging(&config.log_level, cli.verbose);

    let session = build_session(&config)?;
    let output = Output { json: cli.json };

    match cli.command {
        Commands::Login { paste } => login(&session, &config, paste, output).await,
        Commands::Status => status(&session, output).await,
        Commands::Refresh => refresh(&session, output).await,
        Commands::RetryUpgrade => retry_upgrade(&session, output).await,
        Commands::Logout => logout(&session).await,
        command => {
            ensure_fresh(&session, &config).await;
            run_data_command(&session, command, output).await
        }
    }
}

fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_session(config: &CliConfig) -> Result<Session> {
    let platform = config.platform_config()?;
    let api = GraphClient::with_timeout(platform.clone(), config.request_timeout())
        .context("Failed to create platform client")?;
    let store = create_store(config.storage, &config.data_dir)
        .with_context(|| format!("Failed to open credential storage in {:?}", config.data_dir))?;

    Ok(Session::new(&platform, Arc::new(api), store)?)
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text(value));
        }
        Ok(())
    }
}

/// Turn a classified failure into a CLI error with a next step.
fn classified(error: ErrorClassification) -> anyhow::Error {
    if error.requires_reauth() {
        return anyhow!("{} Run `adforge login`.", error.user_message);
    }
    match error.suggested_delay() {
        Some(delay) => anyhow!(
            "{} Retry in about {} seconds.",
            error.user_message,
            delay.as_secs()
        ),
        None => anyhow!(error.user_message),
    }
}

/// Refresh ahead of the call when the credential is inside the buffer.
///
/// The CLI exits after one command, so it cannot rely on the background
/// timer.
async fn ensure_fresh(session: &Session, config: &CliConfig) {
    let due = match session.credential().await {
        Ok(Some(credential)) => {
            credential.is_long_lived()
                && credential.expires_within(chrono::Duration::seconds(config.refresh_buffer_secs))
        }
        _ => false,
    };

    if due {
        match session.refresh_now().await {
            Ok(_) => info!("Refreshed access token before running command"),
            Err(e) => warn!("Token refresh failed: {}", e),
        }
    }
}

async fn login(session: &Session, config: &CliConfig, paste: bool, output: Output) -> Result<()> {
    let login_url = session.get_login_url().await?;
    eprintln!("Open this URL in your browser to log in:\n\n  {}\n", login_url);

    let params = if paste {
        eprintln!("Then paste the URL you were redirected to:");
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read redirect URL")?;
        CallbackParams::parse(&line)?
    } else {
        eprintln!("Waiting for the redirect to {} ...", config.redirect_uri);
        tokio::time::timeout(LOGIN_TIMEOUT, callback::listen_for_callback(&config.redirect_uri))
            .await
            .context("Timed out waiting for the login redirect")??
    };

    if let Some(error) = params.error.as_deref() {
        session
            .reject_login(error, params.error_description.as_deref())
            .await?;
        bail!("Login was not approved: {}", error);
    }

    let code = params.code.context("Redirect carried no authorization code")?;
    let state = params.state.unwrap_or_default();

    match session.exchange_code(&code, &state).await {
        Ok(_) => {}
        Err(AdforgeError::Auth(AuthError::Upgrade(e))) => {
            bail!(
                "Logged in, but the long-lived token upgrade failed ({}). Run `adforge retry-upgrade` to finish.",
                e
            );
        }
        Err(e) => return Err(e.into()),
    }

    let user = session.current_user().await.map_err(classified)?;
    output.print(&user, |user| {
        format!("Logged in as {} ({})", user.name.as_deref().unwrap_or("unknown"), user.id)
    })
}

#[derive(Serialize)]
struct StatusReport {
    authenticated: bool,
    valid: bool,
    lifetime: Option<adforge_core::TokenLifetime>,
    issued_at: Option<chrono::DateTime<Utc>>,
    expires_at: Option<chrono::DateTime<Utc>>,
}

async fn status(session: &Session, output: Output) -> Result<()> {
    let credential = session.credential().await?;
    let report = StatusReport {
        authenticated: session.is_authenticated().await?,
        valid: session.is_token_valid().await?,
        lifetime: credential.as_ref().map(|c| c.lifetime),
        issued_at: credential.as_ref().map(|c| c.issued_at),
        expires_at: credential.as_ref().and_then(|c| c.expires_at),
    };

    output.print(&report, |report| {
        if !report.authenticated {
            return match report.lifetime {
                Some(_) => {
                    "Login incomplete: the token was never upgraded. Run `adforge retry-upgrade`.".to_string()
                }
                None => "Not logged in.".to_string(),
            };
        }
        match report.expires_at {
            Some(expires_at) if report.valid => {
                let remaining = expires_at - Utc::now();
                format!(
                    "Logged in. Token expires {} ({} days left).",
                    expires_at.to_rfc3339(),
                    remaining.num_days()
                )
            }
            Some(expires_at) => format!(
                "Token expired at {}. Run `adforge refresh` or `adforge login`.",
                expires_at.to_rfc3339()
            ),
            None => "Logged in. Token does not expire.".to_string(),
        }
    })
}

async fn refresh(session: &Session, output: Output) -> Result<()> {
    let credential = session.refresh_now().await?;
    output.print(&credential.expires_at, |expires_at| match expires_at {
        Some(expires_at) => format!("Token refreshed; expires {}.", expires_at.to_rfc3339()),
        None => "Token refreshed; it does not expire.".to_string(),
    })
}

async fn retry_upgrade(session: &Session, output: Output) -> Result<()> {
    let credential = match session.retry_upgrade().await {
        Ok(credential) => credential,
        Err(AdforgeError::Auth(AuthError::NoPendingUpgrade)) => {
            bail!("No login is waiting for an upgrade. Run `adforge login`.");
        }
        Err(e) => return Err(e.into()),
    };
    output.print(&credential.expires_at, |expires_at| match expires_at {
        Some(expires_at) => format!("Login complete; token expires {}.", expires_at.to_rfc3339()),
        None => "Login complete; token does not expire.".to_string(),
    })
}

async fn logout(session: &Session) -> Result<()> {
    session.logout().await?;
    println!("Logged out.");
    Ok(())
}

async fn run_data_command(session: &Session, command: Commands, output: Output) -> Result<()> {
    let queries = session.queries();
    let mutations = session.mutations();

    match command {
        Commands::Me => {
            let user = queries.current_user().await.map_err(classified)?;
            output.print(&user, |user| {
                format!("{}\t{}", user.id, user.name.as_deref().unwrap_or(""))
            })
        }
        Commands::Accounts => {
            let accounts = queries.ad_accounts().await.map_err(classified)?;
            output.print(&accounts, |accounts| {
                accounts
                    .iter()
                    .map(|a| {
                        format!(
                            "{}\t{}\t{}",
                            a.id,
                            a.name.as_deref().unwrap_or(""),
                            a.currency.as_deref().unwrap_or("")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Campaigns { account } => {
            let campaigns = queries.campaigns(&account).await.map_err(classified)?;
            output.print(&campaigns, |campaigns| {
                campaigns
                    .iter()
                    .map(|c| {
                        format!(
                            "{}\t{}\t{}",
                            c.id,
                            c.status.as_ref().map(CampaignStatus::as_str).unwrap_or("-"),
                            c.name
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Insights {
            kind,
            id,
            preset,
            since,
            until,
            fields,
        } => {
            let params = InsightsParams {
                date_preset: preset,
                time_range: since.zip(until),
                fields,
            };
            let record = queries.insights(kind, &id, params).await.map_err(classified)?;
            output.print(&record, |record| {
                record
                    .data
                    .iter()
                    .map(|row| serde_json::Value::Object(row.clone()).to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::CreateCampaign {
            account,
            name,
            objective,
            daily_budget,
            active,
        } => {
            let campaign = NewCampaign {
                name,
                objective,
                status: if active {
                    CampaignStatus::Active
                } else {
                    CampaignStatus::Paused
                },
                special_ad_categories: Vec::new(),
                daily_budget,
            };
            let id = mutations
                .create_campaign(&account, campaign)
                .await
                .map_err(classified)?;
            output.print(&id, |id| format!("Created campaign {}", id))
        }
        Commands::PauseCampaign { id } => {
            mutations.pause_campaign(&id).await.map_err(classified)?;
            output.print(&id, |id| format!("Paused campaign {}", id))
        }
        Commands::DeleteCampaign { id } => {
            mutations.delete_campaign(&id).await.map_err(classified)?;
            output.print(&id, |id| format!("Deleted campaign {}", id))
        }
        Commands::Login { .. }
        | Commands::Status
        | Commands::Refresh
        | Commands::RetryUpgrade
        | Commands::Logout => {
            bail!("not a data command")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classified_messages_name_the_next_step() {
        let expired = classified(ErrorClassification::expired_auth()).to_string();
        assert!(expired.contains("adforge login"));

        let limited = classified(ErrorClassification::rate_limited()).to_string();
        assert!(limited.starts_with("Rate limit reached."));
        assert!(limited.contains("60 seconds"));

        let denied = classified(ErrorClassification::permission_denied()).to_string();
        assert_eq!(denied, "Permission denied. Please check your access.");
    }

    #[test]
    fn test_parse_retry_upgrade() {
        let cli = Cli::try_parse_from(["adforge", "retry-upgrade"]).unwrap();
        assert!(matches!(cli.command, Commands::RetryUpgrade));
    }

    #[test]
    fn test_parse_insights_range() {
        let cli = Cli::try_parse_from([
            "adforge", "--json", "insights", "campaign", "c1", "--since", "2024-01-01", "--until",
            "2024-01-31", "--fields", "spend,clicks",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Insights {
                kind, since, fields, ..
            } => {
                assert_eq!(kind, InsightsKind::Campaign);
                assert_eq!(since.as_deref(), Some("2024-01-01"));
                assert_eq!(fields, vec!["spend", "clicks"]);
            }
            _ => panic!("expected insights"),
        }
    }
}
