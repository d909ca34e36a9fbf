use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use cms_session::api::{self, NewPost, PostsApi, UsersApi};
use cms_session::{ClientConfig, ClientError, ErrorCode, Registration, Role, SessionManager, SessionPhase};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("not logged in; run `cms-session login` first")]
    NotLoggedIn,
    #[error("admin role required")]
    AdminOnly,
    #[error("editor or admin role required")]
    EditorOnly,
    #[error("no post with id {0}")]
    UnknownPost(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "cms-session", about = "CMS session and content CLI")]
struct Cli {
    #[arg(long, env = "CMS_API_URL")]
    api_url: String,

    #[arg(long, env = "CMS_SESSION_FILE", default_value = ".cms-session.json")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show who the stored session belongs to.
    Me,
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CMS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CMS_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "viewer")]
        role: Role,
    },
    Logout,
    Posts(PostsCommand),
    Users(UsersCommand),
    /// Post and user totals (admin only).
    Stats,
}

#[derive(Args, Debug)]
struct PostsCommand {
    #[command(subcommand)]
    command: PostsSubcommand,
}

#[derive(Subcommand, Debug)]
enum PostsSubcommand {
    List,
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
    },
    /// Toggle a post between draft and published.
    Publish {
        post_id: String,
    },
    Delete {
        post_id: String,
    },
}

#[derive(Args, Debug)]
struct UsersCommand {
    #[command(subcommand)]
    command: UsersSubcommand,
}

#[derive(Subcommand, Debug)]
enum UsersSubcommand {
    List,
    Role { user_id: String, role: Role },
    Delete { user_id: String },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        let code = match &e {
            CliError::Client(inner) => inner.error_code(),
            _ => "E_CLI",
        };
        eprintln!("error [{code}]: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ClientConfig::new(&cli.api_url)
        .apply_env()
        .map_err(ClientError::from)?
        .with_session_file(Some(cli.session_file));
    let manager = SessionManager::from_config(config)?;

    match cli.command {
        Command::Me => {
            let state = manager.check_auth().await;
            match state.identity {
                Some(identity) => print_json(&identity),
                None => Err(CliError::NotLoggedIn),
            }
        }
        Command::Login { email, password } => {
            let identity = manager.sign_in(&email, &password).await?;
            print_json(&identity)
        }
        Command::Register { email, password, name, role } => {
            manager.register(&Registration { email, password, name, role }).await?;
            println!("registered; run `cms-session login` to sign in");
            Ok(())
        }
        Command::Logout => {
            match manager.logout().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "backend was not told about the logout"),
                Err(e) => tracing::warn!(error = %e, "logout notification task failed"),
            }
            println!("logged out");
            Ok(())
        }
        Command::Posts(posts) => {
            let identity = require_session(&manager).await?;
            if !matches!(posts.command, PostsSubcommand::List) && !identity.can_edit() {
                return Err(CliError::EditorOnly);
            }
            run_posts(&manager, posts).await
        }
        Command::Users(users) => {
            require_session(&manager).await?;
            run_users(&manager, users).await
        }
        Command::Stats => {
            let identity = require_session(&manager).await?;
            if !identity.is_admin() {
                return Err(CliError::AdminOnly);
            }
            print_json(&api::analytics(manager.client()).await?)
        }
    }
}

async fn require_session(manager: &SessionManager) -> Result<cms_session::Identity, CliError> {
    let state = manager.check_auth().await;
    match (state.phase(), state.identity) {
        (SessionPhase::Authenticated, Some(identity)) => Ok(identity),
        _ => Err(CliError::NotLoggedIn),
    }
}

async fn run_posts(manager: &SessionManager, posts: PostsCommand) -> Result<(), CliError> {
    let api = PostsApi::new(manager.client());
    match posts.command {
        PostsSubcommand::List => print_json(&api.list().await?),
        PostsSubcommand::Create { title, content } => {
            api.create(&NewPost::draft(title, content)).await?;
            println!("created draft");
            Ok(())
        }
        PostsSubcommand::Publish { post_id } => {
            let post = api
                .list()
                .await?
                .into_iter()
                .find(|p| p.id == post_id)
                .ok_or(CliError::UnknownPost(post_id))?;
            let status = api.toggle_publish(&post).await?;
            print_json(&serde_json::json!({ "id": post.id, "status": status }))
        }
        PostsSubcommand::Delete { post_id } => {
            api.delete(&post_id).await?;
            println!("deleted {post_id}");
            Ok(())
        }
    }
}

async fn run_users(manager: &SessionManager, users: UsersCommand) -> Result<(), CliError> {
    let api = UsersApi::new(manager.client());
    match users.command {
        UsersSubcommand::List => print_json(&api.list().await?),
        UsersSubcommand::Role { user_id, role } => {
            api.change_role(&user_id, role).await?;
            println!("{user_id} is now {role}");
            Ok(())
        }
        UsersSubcommand::Delete { user_id } => {
            api.delete(&user_id).await?;
            println!("deleted {user_id}");
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
