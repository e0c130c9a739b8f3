use std::io::{self, Write};

use clap::Parser;
use rocket_db_pools::deadpool_redis::{Config, Runtime};

use linkdock_api::import::{ImportConfig, ImportMessage, ProviderKind, QueueClient};
use linkdock_api::kv::{self, KvStore};

#[derive(Parser, Debug)]
#[command(
    name = "enqueue_import",
    about = "Store provider credentials and enqueue the first message of a link import"
)]
struct Args {
    /// Workspace id the links will be imported into.
    #[arg(long)]
    workspace_id: i32,

    /// Source platform: `bitly` or `rebrandly`.
    #[arg(long)]
    provider: String,

    /// Provider-side account identifier (e.g. a Bitly group guid).
    #[arg(long)]
    account_id: String,

    /// Provider API token, stored in the KV store for the job's lifetime.
    #[arg(long)]
    token: String,

    /// Comma-separated short-link domains the workspace owns.
    #[arg(long)]
    domains: String,

    /// Also import the provider's tag taxonomy.
    #[arg(long, default_value_t = false)]
    import_tags: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();

    let provider = match args.provider.trim().to_lowercase().as_str() {
        "bitly" => ProviderKind::Bitly,
        "rebrandly" => ProviderKind::Rebrandly,
        other => {
            writeln!(
                io::stderr(),
                "error: unsupported provider '{other}'. Use 'bitly' or 'rebrandly'."
            )?;
            std::process::exit(1);
        }
    };

    let eligible_domains: Vec<String> = args
        .domains
        .split(',')
        .map(|domain| domain.trim().to_string())
        .filter(|domain| !domain.is_empty())
        .collect();

    if eligible_domains.is_empty() {
        writeln!(io::stderr(), "error: at least one domain is required")?;
        std::process::exit(1);
    }

    let kv_url = std::env::var("KV_URL")?;
    let kv_pool = Config::from_url(kv_url).create_pool(Some(Runtime::Tokio1))?;
    let kv = KvStore::new(kv_pool);

    kv.set(
        &kv::credentials_key(provider, args.workspace_id),
        &args.token,
    )
    .await?;

    let config = ImportConfig::from_env();
    let queue = QueueClient::new(&config)?;

    let message = ImportMessage {
        workspace_id: args.workspace_id,
        provider,
        provider_account_id: args.account_id,
        eligible_domains,
        import_tags: args.import_tags,
        cursor: None,
        count: 0,
    };

    queue.enqueue(&message, None).await?;

    println!(
        "Enqueued {} import for workspace {} ({} domains)",
        provider.as_str(),
        args.workspace_id,
        message.eligible_domains.len()
    );
    Ok(())
}
