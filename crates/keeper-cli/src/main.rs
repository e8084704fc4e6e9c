use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use keeper_core::{Credentials, DataType, RecordRequest};
use keeper_sdk::{
    HttpClient, LocalCache, ReconcileOutcome, Session, SessionStore, repository_for, sync_all,
};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "keeper", version, about = "Keeper vault CLI")]
struct Cli {
    /// Base URL of the keeper server.
    #[arg(
        long,
        env = "KEEPER_API_URL",
        default_value = "http://localhost:8080",
        global = true
    )]
    api: String,
    /// Directory holding the session file and the local cache.
    #[arg(long, env = "KEEPER_STATE_DIR", default_value = ".keeper", global = true)]
    state_dir: PathBuf,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and log in.
    Register(CredentialArgs),
    Login(CredentialArgs),
    /// Forget the stored session.
    Logout,
    /// Store a record, keeping a local draft when the server is unreachable.
    Put(PutArgs),
    Get { name: String },
    List,
    /// Pull every server record into the local cache.
    Sync,
}

#[derive(Args)]
struct CredentialArgs {
    #[arg(long)]
    login: String,
    /// Read from stdin when omitted.
    #[arg(long)]
    password: Option<String>,
}

#[derive(Args)]
struct PutArgs {
    /// `pass` or `text`.
    data_type: DataType,
    /// Payload, sub-fields separated by `:`.
    data: String,
    name: String,
    /// Update the record with this id instead of matching by name.
    #[arg(long)]
    id: Option<u64>,
}

#[derive(Clone, Copy)]
enum AuthMode {
    Register,
    Login,
}

struct Workspace {
    api: String,
    sessions: SessionStore,
    cache: LocalCache,
}

impl Workspace {
    fn new(api: String, state_dir: PathBuf) -> Self {
        Self {
            api,
            sessions: SessionStore::new(&state_dir),
            cache: LocalCache::new(state_dir.join("cache")),
        }
    }

    fn session(&self) -> Result<Session> {
        match self.sessions.load()? {
            Some(session) if !session.is_expired(Utc::now()) => Ok(session),
            Some(_) => bail!("not logged in: session expired, run `keeper login`"),
            None => bail!("not logged in: run `keeper login` first"),
        }
    }

    fn client(&self, session: &Session) -> Result<HttpClient> {
        Ok(HttpClient::new(&session.api_url)?.with_token(session.token.clone()))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let workspace = Workspace::new(cli.api, cli.state_dir);
    match cli.command {
        Command::Register(args) => handle_auth(&workspace, args, AuthMode::Register).await,
        Command::Login(args) => handle_auth(&workspace, args, AuthMode::Login).await,
        Command::Logout => handle_logout(&workspace),
        Command::Put(args) => handle_put(&workspace, args).await,
        Command::Get { name } => handle_get(&workspace, &name).await,
        Command::List => handle_list(&workspace).await,
        Command::Sync => handle_sync(&workspace).await,
    }
}

async fn handle_auth(workspace: &Workspace, args: CredentialArgs, mode: AuthMode) -> Result<()> {
    let password = match args.password {
        Some(password) => password,
        None => read_password()?,
    };
    let credentials = Credentials::new(args.login, password);
    credentials.validate()?;

    let client = HttpClient::new(&workspace.api)?;
    let issued = match mode {
        AuthMode::Register => client
            .register(&credentials)
            .await
            .context("registration failed")?,
        AuthMode::Login => client.login(&credentials).await.context("login failed")?,
    };

    let session = Session::new(&workspace.api, &credentials.login, issued);
    workspace
        .sessions
        .save(&session)
        .context("failed to store session")?;
    workspace.cache.create_user_dir(&session.login).await?;
    debug!(login = %session.login, expires_at = %session.expires_at, "session stored");
    println!("Logged in as {}", session.login);
    Ok(())
}

fn handle_logout(workspace: &Workspace) -> Result<()> {
    if workspace.sessions.clear()? {
        println!("Logged out");
    } else {
        println!("No active session");
    }
    Ok(())
}

async fn handle_put(workspace: &Workspace, args: PutArgs) -> Result<()> {
    let session = workspace.session()?;
    let client = workspace.client(&session)?;
    let mut request = RecordRequest::new(args.data_type, args.name, args.data);
    if let Some(id) = args.id {
        request = request.with_id(id);
    }
    let repository = repository_for(request.data_type, workspace.cache.clone(), &session.login);

    match client.put_record(&request).await {
        Ok(record) => {
            let outcome = repository.add(&record).await?;
            debug!(name = %record.name, ?outcome, "record cached");
            print_json(&record)
        }
        Err(err) if err.is_unreachable() => {
            warn!(%err, "server unreachable, keeping a local draft");
            let draft = request.to_draft();
            repository.add(&draft).await?;
            println!("Server unreachable; saved `{}` as a local draft", draft.name);
            Ok(())
        }
        Err(err) => Err(err).context("failed to store record"),
    }
}

async fn handle_get(workspace: &Workspace, name: &str) -> Result<()> {
    let session = workspace.session()?;
    let client = workspace.client(&session)?;
    let Some(record) = client
        .get_record(name)
        .await
        .context("failed to fetch record")?
    else {
        bail!("record `{name}` not found");
    };
    let outcome = repository_for(record.data_type, workspace.cache.clone(), &session.login)
        .add(&record)
        .await?;
    if outcome == ReconcileOutcome::Unchanged {
        debug!(name, "cache entry kept");
    }
    print_json(&record)
}

async fn handle_list(workspace: &Workspace) -> Result<()> {
    let session = workspace.session()?;
    let records = workspace
        .client(&session)?
        .list_records()
        .await
        .context("failed to list records")?;
    print_json(&records)
}

async fn handle_sync(workspace: &Workspace) -> Result<()> {
    let session = workspace.session()?;
    let client = workspace.client(&session)?;

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let result = sync_all(&client, &workspace.cache, &session.login, &cancel).await;
    watcher.abort();

    let report = result.context("sync failed")?;
    println!(
        "Synced {} records ({} new, {} replaced, {} unchanged)",
        report.total(),
        report.created,
        report.replaced,
        report.unchanged
    );
    Ok(())
}

fn read_password() -> Result<String> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("password: ");
        io::stderr().flush().ok();
    }
    let mut input = String::new();
    stdin
        .read_line(&mut input)
        .context("failed to read password from stdin")?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render json")?;
    println!("{rendered}");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("KEEPER_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
