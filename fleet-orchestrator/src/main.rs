use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use fleet_common::{duration, CreateOpts};
use fleet_orchestrator::settings::parse_list;
use fleet_orchestrator::{logger, ops, Inventory, ProviderManager, ProviderRegistry, Settings};

#[derive(Parser)]
#[command(author, version, about = "Ephemeral test-cluster inventory and lifecycle", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Comma-separated provider ids to enable (default: every available provider)
    #[arg(long, env = "FLEET_PROVIDERS", global = true)]
    providers: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List clusters and instances that could not be grouped
    List {
        /// Show per-node details
        #[arg(short, long)]
        details: bool,
        /// Print the inventory snapshot as JSON
        #[arg(long)]
        json: bool,
        /// Only show clusters whose name contains this string
        #[arg(short, long)]
        pattern: Option<String>,
    },
    /// Create a cluster of <nodes> instances spread over the providers
    Create {
        /// Cluster name, <user>-<clusterid>
        name: String,
        #[arg(short, long, default_value_t = 4)]
        nodes: usize,
        /// Lifetime, e.g. 12h or 1h30m (default: FLEET_LIFETIME or 12h)
        #[arg(short, long, value_parser = parse_duration)]
        lifetime: Option<Duration>,
        /// Spread nodes across every configured zone
        #[arg(long)]
        geo: bool,
        /// Attach a local SSD to each node
        #[arg(long)]
        local_ssd: bool,
    },
    /// Destroy every instance of a cluster
    Destroy { name: String },
    /// Extend a cluster's lifetime
    Extend {
        name: String,
        #[arg(short, long, value_parser = parse_duration, default_value = "12h")]
        lifetime: Duration,
    },
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    duration::parse(raw).map_err(|e| e.to_string())
}

async fn list(registry: &ProviderRegistry, details: bool, json: bool, pattern: Option<String>) -> Result<()> {
    let inventory = Inventory::build(registry).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&inventory)?);
        return Ok(());
    }

    let now = Utc::now();
    let pattern = pattern.unwrap_or_default();
    for cluster in inventory.matching(&pattern) {
        if details {
            println!("{}", cluster.details(now));
        } else {
            println!("{}", cluster.summary(now));
        }
    }

    let bad = inventory.bad_instance_errors();
    if !bad.is_empty() {
        println!();
        println!("Bad instances:");
        for (kind, instances) in bad {
            let names: Vec<String> = instances
                .iter()
                .map(|i| format!("{} ({})", i.name, i.provider))
                .collect();
            println!("  {}: {}", kind, names.join(", "));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env().context("failed to load settings")?;
    if let Some(raw) = cli.providers.as_deref() {
        settings.providers = parse_list(raw);
    }

    let registry = ProviderManager::from_settings(&settings);
    tracing::debug!(?registry, "providers ready");

    match cli.command {
        Commands::List {
            details,
            json,
            pattern,
        } => list(&registry, details, json, pattern).await?,
        Commands::Create {
            name,
            nodes,
            lifetime,
            geo,
            local_ssd,
        } => {
            // Creation order follows the configured list; fall back to every registered provider.
            let providers = if settings.providers.is_empty() {
                registry.names()
            } else {
                settings.providers.clone()
            };
            let opts = CreateOpts {
                lifetime: lifetime.unwrap_or(settings.default_lifetime),
                geo_distributed: geo,
                use_local_ssd: local_ssd,
                providers,
            };
            ops::create_cluster(&registry, &name, nodes, &opts).await?;
            println!("✅ Created {} ({} nodes)", name, nodes);
        }
        Commands::Destroy { name } => {
            let inventory = Inventory::build(&registry).await?;
            let cluster = inventory.find(&name)?;
            ops::destroy_cluster(&registry, cluster).await?;
            println!("✅ Destroyed {} ({} nodes)", name, cluster.members.len());
        }
        Commands::Extend { name, lifetime } => {
            let inventory = Inventory::build(&registry).await?;
            let cluster = inventory.find(&name)?;
            let new_lifetime = ops::extend_cluster(&registry, cluster, lifetime).await?;
            println!(
                "✅ Extended {} to a lifetime of {}",
                name,
                duration::format(new_lifetime)
            );
        }
    }
    Ok(())
}
