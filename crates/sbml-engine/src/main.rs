use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sbmlgraph_core::config::ConnectionConfig;
use sbmlgraph_core::export::ReverseMapper;
use sbmlgraph_core::ingest::{map_files, IngestionEngine};
use sbmlgraph_core::persistence::GraphSnapshot;
use sbmlgraph_core::schema::SchemaGraph;
use sbmlgraph_core::store::{GraphStore, MemoryStore, Neo4jStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Load SBML models into Neo4j through a drawn schema, and back")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import an SBML file into Neo4j
    SbmlToNeo4j {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// SBML model
        #[arg(long)]
        input_model_sbml: PathBuf,
        /// Schema drawn with Arrows
        #[arg(long)]
        input_arrows_json: PathBuf,
        /// Map everything, write nothing to the database
        #[arg(long)]
        parameter_dry_run: bool,
        /// Add a "tag" property to every entity
        #[arg(long)]
        parameter_tag_property_str: Option<String>,
        /// Also save the mapped records to a JSON file
        #[arg(long)]
        output_snapshot_json: Option<PathBuf>,
    },
    /// Create an SBML file from Neo4j
    SbmlFromNeo4j {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Schema drawn with Arrows
        #[arg(long)]
        input_arrows_json: PathBuf,
        /// Output SBML model
        #[arg(long)]
        output_model_sbml: PathBuf,
        #[arg(long, default_value_t = 3)]
        parameter_sbml_level_int: u32,
        #[arg(long, default_value_t = 2)]
        parameter_sbml_version_int: u32,
        /// Read from a saved snapshot instead of the database
        #[arg(long)]
        input_snapshot_json: Option<PathBuf>,
    },
    /// Count nodes per label and relationships per type
    Statistics {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[arg(long)]
        output_statistics_json: PathBuf,
    },
    /// Remove every node and relationship
    Clean {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    #[arg(long = "input-protocol-str", default_value = "neo4j")]
    protocol: String,
    #[arg(long = "input-url-str", default_value = "localhost")]
    url: String,
    #[arg(long = "input-port-int")]
    port: Option<u16>,
    #[arg(long = "input-user-str", default_value = "neo4j")]
    user: String,
    /// File whose first line is the password
    #[arg(long = "input-password-txt")]
    password: Option<PathBuf>,
    #[arg(long = "input-database-str", default_value = "neo4j")]
    database: String,
    /// `.ini` file, takes precedence over the other connection flags
    #[arg(long = "input-config-ini")]
    config_ini: Option<PathBuf>,
    /// Credentials file downloaded from AuraDB
    #[arg(long = "input-auradb-txt")]
    auradb: Option<PathBuf>,
}

impl ConnectionArgs {
    fn resolve(&self) -> Result<ConnectionConfig> {
        if let Some(path) = &self.config_ini {
            require_file(path, "File provided")?;
            warn!("Configuration file is provided, ignore individual arguments");
            return Ok(ConnectionConfig::from_ini(path)?);
        }
        if let Some(path) = &self.auradb {
            require_file(path, "File provided")?;
            warn!("Configuration file AuraDB is provided, ignore individual arguments");
            return Ok(ConnectionConfig::from_auradb(path)?);
        }
        let password = match &self.password {
            Some(path) => ConnectionConfig::read_password(path)
                .with_context(|| format!("Failed to read password file: {:?}", path))?,
            None => String::new(),
        };
        Ok(ConnectionConfig::new(
            &self.protocol,
            &self.url,
            self.port,
            &self.user,
            &password,
            &self.database,
        )?)
    }

    async fn connect(&self) -> Result<Neo4jStore> {
        let config = self.resolve()?;
        info!("Connection to database: {}", config);
        let store = Neo4jStore::connect(&config).await?;
        if !store.is_connected().await {
            bail!("Unable to connect to the database");
        }
        Ok(store)
    }
}

fn require_file(path: &Path, what: &str) -> Result<()> {
    if !path.is_file() {
        bail!("{} does not exist: {:?}", what, path);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match cli.command {
        Command::SbmlToNeo4j {
            connection,
            input_model_sbml,
            input_arrows_json,
            parameter_dry_run,
            parameter_tag_property_str,
            output_snapshot_json,
        } => {
            info!("Start - sbml-to-neo4j");
            require_file(&input_model_sbml, "Model SBML file")?;
            require_file(&input_arrows_json, "Modelisation JSON file")?;

            let store: Arc<dyn GraphStore> = if parameter_dry_run {
                info!("Dry run mode, no data will be loaded into the database");
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(connection.connect().await?)
            };

            let snapshot = map_files(&input_model_sbml, &input_arrows_json, parameter_tag_property_str)?;
            if let Some(path) = &output_snapshot_json {
                snapshot
                    .save_to_file(path)
                    .with_context(|| format!("Failed to write snapshot: {:?}", path))?;
            }

            let engine = IngestionEngine::new(store.clone());
            let (nodes, relationships) = engine.load(&snapshot).await?;
            if parameter_dry_run {
                let stats = store.statistics().await?;
                info!(
                    "Dry run: {} nodes and {} relationships would be written ({:?})",
                    nodes, relationships, stats.nodes
                );
            }
            info!("End - sbml-to-neo4j");
        }
        Command::SbmlFromNeo4j {
            connection,
            input_arrows_json,
            output_model_sbml,
            parameter_sbml_level_int,
            parameter_sbml_version_int,
            input_snapshot_json,
        } => {
            info!("Start - sbml-from-neo4j");
            require_file(&input_arrows_json, "Modelisation JSON file")?;

            let store: Box<dyn GraphStore> = match &input_snapshot_json {
                Some(path) => {
                    require_file(path, "Snapshot JSON file")?;
                    let snapshot = GraphSnapshot::load_from_file(path)
                        .with_context(|| format!("Failed to read snapshot: {:?}", path))?;
                    Box::new(MemoryStore::from_snapshot(&snapshot))
                }
                None => Box::new(connection.connect().await?),
            };

            info!("Initialize data");
            let mut mapper = ReverseMapper::from_specifications(
                parameter_sbml_level_int,
                parameter_sbml_version_int,
                store.as_ref(),
            )?;

            info!("Load modelisation file");
            let schema = SchemaGraph::from_json(&input_arrows_json, false)
                .with_context(|| format!("Failed to read modelisation: {:?}", input_arrows_json))?;

            info!("Filter modelisation based on the SBML specifications");
            mapper.annotate(&schema);

            info!("Extract entities");
            mapper.conciliate_labels().await?;
            mapper.extract_entities().await?;

            info!("Write model");
            mapper.write(&output_model_sbml)?;
            info!("End - sbml-from-neo4j");
        }
        Command::Statistics {
            connection,
            output_statistics_json,
        } => {
            info!("Start - statistics");
            let store = connection.connect().await?;
            let stats = store.statistics().await?;
            let data = serde_json::to_string_pretty(&stats)?;
            std::fs::write(&output_statistics_json, data)
                .with_context(|| format!("Failed to write statistics: {:?}", output_statistics_json))?;
            info!("End - statistics");
        }
        Command::Clean { connection } => {
            info!("Start - clean");
            let store = connection.connect().await?;
            store.clean().await?;
            info!("End - clean");
        }
    }
    Ok(())
}
