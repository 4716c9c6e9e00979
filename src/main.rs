//! hallpass - session authentication server

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hallpass::{
    api::{self, views::Views, AppState},
    config::Config,
    db::{
        self,
        repositories::{SqlxSessionRepository, SqlxUserRepository, UserRepository},
        DatabasePool, DynDatabasePool,
    },
    models::UserFilter,
    services::{admin, ActiveUserValidator, SessionAuthenticator},
};

/// What the command line asked for
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Serve,
    Migrate,
    CreateUser {
        login: String,
        password: String,
        active: bool,
    },
    ListUsers {
        limit: Option<i64>,
        offset: i64,
    },
    DeleteSessions {
        login: Option<String>,
        expired_only: bool,
    },
}

fn cli() -> Command {
    Command::new("hallpass")
        .about("Server-side session authentication")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the YAML configuration file")
                .default_value("config.yml")
                .env("HALLPASS_CONFIG")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .subcommand(Command::new("serve").about("Run the HTTP server (default)"))
        .subcommand(Command::new("migrate").about("Apply pending database migrations"))
        .subcommand(
            Command::new("user")
                .about("Manage users")
                .subcommand_required(true)
                .subcommand(
                    Command::new("create")
                        .about("Create a user or reset an existing one")
                        .arg(Arg::new("login").long("login").required(true))
                        .arg(Arg::new("password").long("password").required(true))
                        .arg(
                            Arg::new("inactive")
                                .long("inactive")
                                .help("Create the user disabled")
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(
                    Command::new("list")
                        .about("List users")
                        .arg(
                            Arg::new("limit")
                                .long("limit")
                                .value_parser(clap::value_parser!(i64).range(0..)),
                        )
                        .arg(
                            Arg::new("offset")
                                .long("offset")
                                .default_value("0")
                                .value_parser(clap::value_parser!(i64).range(0..)),
                        ),
                ),
        )
        .subcommand(
            Command::new("session")
                .about("Manage sessions")
                .subcommand_required(true)
                .subcommand(
                    Command::new("delete")
                        .about("Delete sessions")
                        .arg(
                            Arg::new("login")
                                .long("login")
                                .help("Only sessions of this user"),
                        )
                        .arg(
                            Arg::new("expired")
                                .long("expired")
                                .help("Only sessions that have already expired")
                                .default_value("true")
                                .value_parser(clap::value_parser!(bool)),
                        ),
                ),
        )
}

fn dispatch(matches: &ArgMatches) -> Result<Action> {
    let action = match matches.subcommand() {
        None | Some(("serve", _)) => Action::Serve,
        Some(("migrate", _)) => Action::Migrate,
        Some(("user", sub)) => match sub.subcommand() {
            Some(("create", args)) => Action::CreateUser {
                login: required(args, "login")?,
                password: required(args, "password")?,
                active: !args.get_flag("inactive"),
            },
            Some(("list", args)) => Action::ListUsers {
                limit: args.get_one::<i64>("limit").copied(),
                offset: args.get_one::<i64>("offset").copied().unwrap_or(0),
            },
            _ => anyhow::bail!("unknown user command"),
        },
        Some(("session", sub)) => match sub.subcommand() {
            Some(("delete", args)) => Action::DeleteSessions {
                login: args.get_one::<String>("login").cloned(),
                expired_only: args.get_one::<bool>("expired").copied().unwrap_or(true),
            },
            _ => anyhow::bail!("unknown session command"),
        },
        Some((name, _)) => anyhow::bail!("unknown command: {}", name),
    };
    Ok(action)
}

fn required(args: &ArgMatches, name: &str) -> Result<String> {
    args.get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing required argument: --{}", name))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("config.yml"));
    let action = dispatch(&matches)?;

    let config = Config::load_with_env(&config_path)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.default_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!(path = %config_path.display(), "configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let result = run(action, &config, &config_path, &pool).await;
    pool.close().await;
    result
}

async fn run(action: Action, config: &Config, config_path: &Path, pool: &DynDatabasePool) -> Result<()> {
    match action {
        Action::Serve => {
            db::migrations::run_migrations(pool).await?;
            serve(config, config_path, pool.clone()).await
        }
        Action::Migrate => {
            if db::migrations::pending_count(pool).await? == 0 {
                println!("database is up to date");
                return Ok(());
            }
            let applied = db::migrations::run_migrations(pool).await?;
            println!("applied {} migration(s)", applied);
            Ok(())
        }
        Action::CreateUser {
            login,
            password,
            active,
        } => {
            db::migrations::run_migrations(pool).await?;
            let users = SqlxUserRepository::new(pool.clone());
            let user = admin::create_user(&users, &login, &password, active).await?;
            println!("user {} saved (id {}, active: {})", user.login, user.id, user.is_active);
            Ok(())
        }
        Action::ListUsers { limit, offset } => {
            let users = SqlxUserRepository::new(pool.clone());
            for user in users.list(UserFilter { limit, offset }).await? {
                println!("{}\t{}\t{}", user.id, user.login, if user.is_active { "active" } else { "inactive" });
            }
            Ok(())
        }
        Action::DeleteSessions {
            login,
            expired_only,
        } => {
            let users = SqlxUserRepository::new(pool.clone());
            let sessions = SqlxSessionRepository::new(pool.clone());
            let deleted = admin::purge_sessions(&users, &sessions, login.as_deref(), expired_only).await?;
            println!("deleted {} session(s)", deleted);
            Ok(())
        }
    }
}

async fn serve(config: &Config, config_path: &Path, pool: DynDatabasePool) -> Result<()> {
    let auth_config = config.auth.to_authenticator_config();
    let views = Views::new(auth_config.login_redirect_url.clone())?;
    let authenticator = SessionAuthenticator::new(
        auth_config,
        SqlxUserRepository::boxed(pool.clone()),
        SqlxSessionRepository::boxed(pool),
        Arc::new(ActiveUserValidator),
    );

    let app = api::build_router(AppState {
        authenticator: Arc::new(authenticator),
        views: Arc::new(views),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind {}", addr))?;
    tracing::info!(config = %config_path.display(), "Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Action {
        let matches = cli().try_get_matches_from(args).unwrap();
        dispatch(&matches).unwrap()
    }

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_serve_is_default() {
        assert_eq!(parse(&["hallpass"]), Action::Serve);
        assert_eq!(parse(&["hallpass", "serve"]), Action::Serve);
    }

    #[test]
    fn test_user_create() {
        assert_eq!(
            parse(&["hallpass", "user", "create", "--login", "alice", "--password", "pw"]),
            Action::CreateUser {
                login: "alice".to_string(),
                password: "pw".to_string(),
                active: true,
            }
        );
        assert_eq!(
            parse(&["hallpass", "user", "create", "--login", "bob", "--password", "pw", "--inactive"]),
            Action::CreateUser {
                login: "bob".to_string(),
                password: "pw".to_string(),
                active: false,
            }
        );
    }

    #[test]
    fn test_user_create_requires_login() {
        assert!(cli()
            .try_get_matches_from(["hallpass", "user", "create", "--password", "pw"])
            .is_err());
    }

    #[test]
    fn test_user_list() {
        assert_eq!(
            parse(&["hallpass", "user", "list"]),
            Action::ListUsers { limit: None, offset: 0 }
        );
        assert_eq!(
            parse(&["hallpass", "user", "list", "--limit", "5", "--offset", "10"]),
            Action::ListUsers { limit: Some(5), offset: 10 }
        );
    }

    #[test]
    fn test_session_delete_defaults_to_expired() {
        assert_eq!(
            parse(&["hallpass", "session", "delete"]),
            Action::DeleteSessions {
                login: None,
                expired_only: true,
            }
        );
        assert_eq!(
            parse(&["hallpass", "session", "delete", "--login", "alice", "--expired", "false"]),
            Action::DeleteSessions {
                login: Some("alice".to_string()),
                expired_only: false,
            }
        );
    }
}
