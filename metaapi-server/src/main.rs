//! metaapi - user registration and file metadata API
//!
//! - `serve`: run the HTTP API against MySQL and S3
//! - `create-bucket`: provision the user data bucket
//! - `render`: print a query template rendered with a JSON context

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use metaapi_db::config::DEFAULT_QUERY_FILE;
use metaapi_db::{Context, Database, DbConfig, QueryStore};
use metaapi_server::storage::{ObjectStore, S3Store};
use metaapi_server::{run_server, AppState, ServerConfig, StorageConfig};

mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "metaapi",
    author,
    version,
    about = "User registration and per-user file metadata API"
)]
struct Cli {
    /// Enable debug logging (unless RUST_LOG is set)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(ServeArgs),
    /// Create an S3 bucket
    CreateBucket(CreateBucketArgs),
    /// Render a query template without touching the database
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Interface to bind to
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,

    /// Port to listen on
    #[arg(long, short = 'p', env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Restrict CORS to localhost origins
    #[arg(long)]
    cors_localhost: bool,
}

#[derive(Parser, Debug)]
struct CreateBucketArgs {
    /// Bucket name
    name: String,

    /// Region to create the bucket in (default: SDK region)
    #[arg(long)]
    region: Option<String>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Query name from the query file, or a literal template
    query: String,

    /// Template context as a JSON object
    #[arg(long, default_value = "{}")]
    context: String,

    /// Query definition file
    #[arg(long, env = "QUERY_FILE", default_value = DEFAULT_QUERY_FILE)]
    query_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the process environment still applies
    let dotenv = dotenvy::dotenv().ok();

    let cli = Cli::parse();
    tracing_setup::init_tracing(cli.debug).ok();
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::CreateBucket(args) => run_create_bucket(args).await,
        Commands::Render(args) => run_render(args),
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let db_config = DbConfig::from_env().context("Invalid database configuration")?;
    let storage_config = StorageConfig::from_env().context("Invalid storage configuration")?;
    tracing::info!(
        db_host = %db_config.host,
        bucket = %storage_config.bucket,
        iam = db_config.uses_iam(),
        "Configuration loaded"
    );

    let db = Database::from_config(db_config)
        .await
        .context("Failed to initialise database")?;
    let storage = S3Store::from_env(storage_config.region.as_deref()).await;

    let state = AppState::new(Arc::new(db), Arc::new(storage), storage_config);
    let config = ServerConfig {
        bind_addr: SocketAddr::new(args.bind, args.port),
        cors_permissive: !args.cors_localhost,
        timeout: Duration::from_secs(args.timeout),
    };

    run_server(Arc::new(state), config)
        .await
        .context("Server error")?;
    Ok(())
}

async fn run_create_bucket(args: CreateBucketArgs) -> Result<()> {
    let store = S3Store::from_env(args.region.as_deref()).await;
    if !store.create_bucket(&args.name, args.region.as_deref()).await {
        bail!("could not create bucket {}", args.name);
    }
    println!("created bucket {}", args.name);
    Ok(())
}

fn run_render(args: RenderArgs) -> Result<()> {
    let store = QueryStore::load(&args.query_file)?;
    let ctx: Context =
        serde_json::from_str(&args.context).context("--context must be a JSON object")?;

    println!("{}", store.render(&args.query, &ctx)?);

    let statement = store.statement(&args.query, &ctx)?;
    if !statement.binds.is_empty() {
        println!("-- prepared: {}", statement.sql);
        println!("-- binds: {}", serde_json::Value::from(statement.binds));
    }
    Ok(())
}
