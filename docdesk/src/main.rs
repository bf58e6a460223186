use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docdesk::config::DeskConfig;
use docdesk::sync::local_scan::scan_directory;
use docdesk::sync::paths::relative_segments;
use docdesk::sync::{
    Location, Navigator, Selection, SyncEngine, TreeNode, TreeViewModel, UploadPipeline,
};
use docdesk_core::FolderId;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Browse folders and bulk-upload documents to a document workspace.
#[derive(Debug, Parser)]
#[command(name = "docdesk", version, about, long_about = None)]
struct Cli {
    /// API base URL, overrides DOCDESK_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the folder tree
    Tree {
        /// Only show folders whose name contains this text, plus their ancestors
        #[arg(long)]
        search: Option<String>,
        /// Number of levels to load
        #[arg(long, default_value_t = 2)]
        depth: usize,
    },
    /// List the subfolders and documents of a folder ("root" or a folder id)
    Ls {
        #[arg(value_parser = parse_location, default_value = "root")]
        folder: Location,
    },
    /// Create a folder path such as "Reports/2024/Q1", reusing existing folders
    Mkdir {
        path: String,
        #[arg(long, value_parser = parse_location, default_value = "root")]
        into: Location,
    },
    /// Upload every supported file of a local directory, recreating its folders
    Upload {
        dir: PathBuf,
        #[arg(long, value_parser = parse_location, default_value = "root")]
        into: Location,
    },
    /// Resolve every document and folder below a folder
    Select {
        #[arg(value_parser = parse_folder_id)]
        folder: FolderId,
    },
    /// Print the effective configuration as JSON
    Config,
}

#[derive(Debug, Serialize)]
struct ConfigView<'a> {
    api_url: &'a str,
    token_configured: bool,
    page_size: u32,
    upload_concurrency: usize,
    conflict_retry_attempts: u32,
    conflict_retry_delay_ms: u64,
    history_limit: usize,
}

impl<'a> From<&'a DeskConfig> for ConfigView<'a> {
    fn from(config: &'a DeskConfig) -> Self {
        Self {
            api_url: &config.api_url,
            token_configured: config.token.is_some(),
            page_size: config.page_size,
            upload_concurrency: config.upload_concurrency,
            conflict_retry_attempts: config.conflict_retry_attempts,
            conflict_retry_delay_ms: config.conflict_retry_delay.as_millis() as u64,
            history_limit: config.history_limit,
        }
    }
}

fn parse_location(value: &str) -> Result<Location, String> {
    if value.eq_ignore_ascii_case("root") {
        return Ok(Location::Root);
    }
    parse_folder_id(value).map(Location::Folder)
}

fn parse_folder_id(value: &str) -> Result<FolderId, String> {
    value
        .trim()
        .parse::<FolderId>()
        .map_err(|_| format!("expected \"root\" or a numeric folder id, got {value:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docdesk=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = DeskConfig::from_env();
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }

    if let Command::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&ConfigView::from(&config))?);
        return Ok(());
    }

    let client = config.client().context("invalid API url")?;
    let engine = SyncEngine::new(client, config.engine_settings());

    match cli.command {
        Command::Tree { search, depth } => print_tree(&engine, search.as_deref(), depth).await,
        Command::Ls { folder } => list_folder(&engine, &config, folder).await,
        Command::Mkdir { path, into } => {
            let segments = relative_segments(&path)?;
            let target = engine.ensure_path(into, &segments).await?;
            println!("{path} -> {target}");
            Ok(())
        }
        Command::Upload { dir, into } => {
            let files = tokio::task::spawn_blocking(move || scan_directory(&dir)).await??;
            let pipeline = UploadPipeline::new(engine, config.upload_settings());
            let summary = pipeline.upload_batch(into, files).await?;
            println!("{summary}");
            for failure in &summary.failures {
                println!("  failed: {}: {}", failure.file, failure.message);
            }
            if summary.failed > 0 {
                anyhow::bail!("{} of {} files failed", summary.failed, summary.processed());
            }
            Ok(())
        }
        Command::Select { folder } => {
            let mut selection = Selection::new();
            selection.select_folder(&engine, folder).await?;
            let documents = selection.document_ids().count();
            println!(
                "{} items selected ({documents} documents)",
                selection.keys().len()
            );
            for key in selection.keys() {
                println!("  {key}");
            }
            Ok(())
        }
        Command::Config => Ok(()),
    }
}

async fn print_tree(engine: &SyncEngine, search: Option<&str>, depth: usize) -> anyhow::Result<()> {
    let mut tree = TreeViewModel::new();
    tree.load_root(engine).await?;
    let mut frontier: Vec<FolderId> = engine
        .cache()
        .get_children(Location::Root)
        .map(|children| children.iter().map(|folder| folder.id).collect())
        .unwrap_or_default();
    for _ in 1..depth {
        let mut next = Vec::new();
        for id in frontier {
            let node = tree.load_children_of(engine, id).await?;
            next.extend(
                node.child_nodes()
                    .iter()
                    .filter_map(|child| child.folder.as_ref().map(|folder| folder.id)),
            );
        }
        frontier = next;
    }

    let cache = engine.cache();
    match search {
        Some(query) => {
            let filtered = TreeViewModel::filter(&cache, query);
            print_nodes(filtered.root.child_nodes(), &filtered.expanded, 0);
        }
        None => {
            let label = |node: &TreeNode| match &node.folder {
                Some(folder) => format!("{} ({})", folder.name, folder.id),
                None => "/".to_string(),
            };
            for row in tree.visible_rows(&cache, &label) {
                println!("{}{}", "  ".repeat(row.depth), row.label);
            }
        }
    }
    Ok(())
}

fn print_nodes(nodes: &[TreeNode], expanded: &BTreeSet<Location>, depth: usize) {
    for node in nodes {
        println!("{}{} ({})", "  ".repeat(depth), node.name(), node.key);
        if expanded.contains(&node.key) {
            print_nodes(node.child_nodes(), expanded, depth + 1);
        }
    }
}

async fn list_folder(engine: &SyncEngine, config: &DeskConfig, folder: Location) -> anyhow::Result<()> {
    let mut navigator = Navigator::new(config.history_limit);
    navigator.navigate(folder);
    let trail = navigator.breadcrumb(&engine.cache());
    if !trail.is_empty() {
        let names: Vec<_> = trail.iter().map(|f| f.name.as_str()).collect();
        println!("/{}", names.join("/"));
    }

    for child in engine.children(folder).await? {
        println!("[dir]  {} ({})", child.name, child.id);
    }
    let mut page = 0;
    loop {
        let batch = engine.documents(folder, page).await?;
        for document in &batch.documents {
            println!("[file] {} ({}, {} bytes)", document.filename, document.id, document.size);
        }
        if batch.is_last_page() {
            break;
        }
        page += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_root_and_numeric_locations() {
        assert_eq!(parse_location("root"), Ok(Location::Root));
        assert_eq!(parse_location("ROOT"), Ok(Location::Root));
        assert_eq!(parse_location("42"), Ok(Location::Folder(42)));
        assert!(parse_location("docs").is_err());
    }

    #[test]
    fn upload_defaults_to_root_target() {
        let cli = Cli::try_parse_from(["docdesk", "upload", "./scans"]).unwrap();
        match cli.command {
            Command::Upload { dir, into } => {
                assert_eq!(dir, PathBuf::from("./scans"));
                assert_eq!(into, Location::Root);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
