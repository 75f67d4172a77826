//! Command-line interface parsing and handling
//!
//! Each subcommand maps onto one client operation; results go to stdout and
//! failures to stderr with a non-zero exit status.

use std::error::Error;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use crate::core::config::data::{path_display, ExternalServer};
use crate::core::config::Config;
use crate::core::credentials::{
    CredentialChain, CredentialProvider, EnvCredentials, KeyringCredentials,
};
use crate::mcp::client::{ContentValue, FileSessionStore, SessionStore, ToolClient};
use crate::mcp::types::ToolCallRequest;
use crate::utils::logging::{self, DEFAULT_LOG_LEVEL};

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(name = "toolwire", version)]
#[command(about = "Call tools on a co-located server or on external MCP servers")]
#[command(
    long_about = "Toolwire sends JSON-RPC tools/call requests to the co-located server \
(`{base_url}/{route_prefix}/{method}`) or to external MCP servers over streamable HTTP, \
negotiating and reusing sessions.\n\n\
Authentication:\n\
  Use 'toolwire auth' to store a bearer token in your system keyring.\n\n\
Environment Variables:\n\
  TOOLWIRE_TOKEN      Bearer token (takes precedence over the keyring)\n\
  TOOLWIRE_BASE_URL   Co-located server origin\n\
  RUST_LOG            Log filter (overrides --log-level)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Origin of the co-located server
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, value_name = "LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Call a tool on the co-located server
    Call {
        /// Tool method name
        method: String,
        /// Arguments as a JSON object
        #[arg(short, long, value_name = "JSON")]
        args: Option<String>,
    },
    /// Call a tool on an external server
    External {
        /// Server id from the config file, or a server URL
        server: String,
        /// Tool method name
        method: String,
        /// Arguments as a JSON object
        #[arg(short, long, value_name = "JSON")]
        args: Option<String>,
    },
    /// List the tools an external server offers
    Tools {
        /// Server id from the config file, or a server URL
        server: String,
    },
    /// Run a JSON array of {method, arguments} calls concurrently
    Batch {
        /// File holding the calls, or `-` for stdin
        file: String,
    },
    /// Store a bearer token (read from stdin) in the system keyring
    Auth,
    /// Remove the stored bearer token
    Deauth,
    /// Manage persisted external sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsCommand,
    },
    /// Manage named external servers in the config file
    Servers {
        #[command(subcommand)]
        action: ServersCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServersCommand {
    /// Show every configured server
    List,
    /// Add a server, replacing any with the same id
    Add {
        /// Short name used in place of the URL
        id: String,
        /// Streamable HTTP endpoint of the server
        url: String,
    },
    /// Remove a server by id
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
pub enum SessionsCommand {
    /// Forget every persisted session
    Clear,
}

pub fn main() {
    let args = Args::parse();
    logging::init(&args.log_level);

    let result = tokio::runtime::Runtime::new()
        .map_err(|e| -> Box<dyn Error> { Box::new(e) })
        .and_then(|runtime| runtime.block_on(run(args)));

    if let Err(e) = result {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> CliResult<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(base_url) = args.base_url {
        config.base_url = Some(base_url);
    }

    match args.command {
        Commands::Call { method, args } => {
            let client = build_client(&config)?;
            let value = client.call(&method, parse_arguments(args.as_deref())?).await?;
            print_value(&value)
        }
        Commands::External {
            server,
            method,
            args,
        } => {
            let client = build_client(&config)?;
            let url = config.resolve_server_url(&server);
            let value = client
                .call_external(&url, &method, parse_arguments(args.as_deref())?)
                .await?;
            print_value(&value)
        }
        Commands::Tools { server } => {
            let client = build_client(&config)?;
            let url = config.resolve_server_url(&server);
            for tool in client.list_tools_external(&url).await? {
                match tool.description.as_deref().map(str::trim) {
                    Some(description) if !description.is_empty() => {
                        println!("{}\t{}", tool.name, description)
                    }
                    _ => println!("{}", tool.name),
                }
            }
            Ok(())
        }
        Commands::Batch { file } => {
            let client = build_client(&config)?;
            let calls = parse_batch(&read_input(&file)?)?;
            let values: Vec<Value> = client
                .batch(calls)
                .await?
                .into_iter()
                .map(ContentValue::into_value)
                .collect();
            println!("{}", serde_json::to_string_pretty(&values)?);
            Ok(())
        }
        Commands::Auth => {
            let mut token = String::new();
            std::io::stdin().read_line(&mut token)?;
            let token = token.trim();
            if token.is_empty() {
                return Err("No token provided".into());
            }
            KeyringCredentials::default().set_token(token)?;
            println!("✅ Token stored in keyring");
            Ok(())
        }
        Commands::Deauth => {
            if KeyringCredentials::default().remove_token()? {
                println!("✅ Token removed from keyring");
            } else {
                println!("No stored token");
            }
            Ok(())
        }
        Commands::Sessions {
            action: SessionsCommand::Clear,
        } => {
            let store = FileSessionStore::open(FileSessionStore::default_path()?);
            store.clear();
            println!("✅ Cleared sessions in {}", store.path().display());
            Ok(())
        }
        Commands::Servers { action } => {
            let path = match args.config {
                Some(path) => path,
                None => Config::get_config_path()?,
            };
            edit_servers(&path, action)
        }
    }
}

/// Edits the file as written, without env or flag overrides, so those never
/// end up persisted.
fn edit_servers(path: &Path, action: ServersCommand) -> CliResult<()> {
    let mut config = Config::load_from_path(path)?;
    match action {
        ServersCommand::List => {
            if config.servers.is_empty() {
                println!("No servers configured");
            }
            for server in &config.servers {
                println!("{}\t{}", server.id, server.url);
            }
            return Ok(());
        }
        ServersCommand::Add { id, url } => {
            let (id, url) = (id.trim().to_string(), url.trim().to_string());
            if id.is_empty() || url.is_empty() {
                return Err("Server id and URL must not be empty".into());
            }
            println!("✅ Server '{id}' set to {url}");
            config.add_server(ExternalServer { id, url });
        }
        ServersCommand::Remove { id } => {
            if !config.remove_server(&id) {
                return Err(format!("No server named '{id}' in {}", path_display(path)).into());
            }
            println!("✅ Server '{id}' removed");
        }
    }
    config.save_to_path(path)
}

fn build_client(config: &Config) -> CliResult<ToolClient> {
    let env: Arc<dyn CredentialProvider> = Arc::new(EnvCredentials::default());
    let keyring: Arc<dyn CredentialProvider> = Arc::new(KeyringCredentials::default());
    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(CredentialChain::new(vec![env, keyring]));

    let mut builder = ToolClient::builder(credentials).config(config);
    if config.persists_sessions() {
        let store: Arc<dyn SessionStore> =
            Arc::new(FileSessionStore::open(FileSessionStore::default_path()?));
        builder = builder.session_store(store);
    }
    Ok(builder.build()?)
}

fn parse_arguments(raw: Option<&str>) -> CliResult<Map<String, Value>> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(arguments) => Ok(arguments),
        _ => Err("Arguments must be a JSON object".into()),
    }
}

fn parse_batch(raw: &str) -> CliResult<Vec<ToolCallRequest>> {
    Ok(serde_json::from_str(raw)?)
}

fn read_input(file: &str) -> CliResult<String> {
    if file == "-" {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        Ok(input)
    } else {
        Ok(std::fs::read_to_string(file)?)
    }
}

fn print_value(value: &ContentValue) -> CliResult<()> {
    match value {
        ContentValue::Json(json) => println!("{}", serde_json::to_string_pretty(json)?),
        ContentValue::Text(text) => println!("{text}"),
    }
    Ok(())
}
