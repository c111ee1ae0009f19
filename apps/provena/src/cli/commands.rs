//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use crate::config::Config;
use provena_core::{
    ArtifactDescriptor, ArtifactFormat, ArtifactId, CancelFlag, ContentHandle, DispatchLimits,
    Engine, Lineage, NodeKey, SourceLocation, TraceDepth, TraceError, TraceOptions,
    primitives::DEFAULT_TRACE_DEPTH,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for ingestion (256 MB).
///
/// Container layers can be large; anything beyond this should go
/// through an out-of-band connector rather than the CLI.
const MAX_INGEST_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TraceError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TraceError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TraceError::InvalidDescriptor(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate file path: canonical, existing, a regular file.
///
/// Canonicalization resolves symlinks and ".." so a hostile path cannot
/// escape into unexpected locations.
fn validate_file_path(path: &Path) -> Result<PathBuf, TraceError> {
    let canonical = path
        .canonicalize()
        .map_err(|e| TraceError::Io(format!("Invalid file path '{}': {}", path.display(), e)))?;

    if !canonical.is_file() {
        return Err(TraceError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    db_path: &PathBuf,
    backend: &str,
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), TraceError> {
    let mut config = Config::load(config_path)?;
    // CLI flags win over file and environment.
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if db_path != &PathBuf::from("provena.db") {
        config.database = db_path.clone();
    }

    let engine = load_or_create_engine(&config.database, backend)?;

    println!("Provena Composition Tracing Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.host);
    println!("  Port:     {}", config.port);
    println!("  Backend:  {}", backend);
    println!("  Database: {:?}", config.database);
    println!();
    println!("Endpoints:");
    println!("  POST /ingest             - Ingest an artifact");
    println!("  GET  /trace/composition  - Trace artifact composition");
    println!("  GET  /trace/usage        - Trace source usage");
    println!("  GET  /report/{{artifact}}  - Ingestion report");
    println!("  GET  /status             - Graph status");
    println!("  GET  /health             - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = config.bind_addr();
    api::run_server(&addr, engine, &config).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show graph status.
pub fn cmd_status(db_path: &PathBuf, backend: &str, json_mode: bool) -> Result<(), TraceError> {
    let engine = load_or_create_engine(db_path, backend)?;
    let node_count = engine.node_count()?;
    let edge_count = engine.edge_count()?;

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "backend": backend,
            "node_count": node_count,
            "edge_count": edge_count,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Provena Graph Status");
    println!("====================");
    println!("Database: {:?}", db_path);
    println!("Backend:  {}", backend);
    println!();
    println!("Nodes: {}", node_count);
    println!("Edges: {}", edge_count);

    Ok(())
}

// =============================================================================
// INGEST COMMAND
// =============================================================================

/// Ingest an artifact from a file.
pub fn cmd_ingest(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    id: &str,
    file: &PathBuf,
    format: &str,
) -> Result<(), TraceError> {
    tracing::info!("Ingesting {} from {:?} (format: {})", id, file, format);

    let mut engine = load_or_create_engine(db_path, backend)?;

    let validated_path = validate_file_path(file)?;
    validate_file_size(&validated_path, MAX_INGEST_FILE_SIZE)?;

    let contents =
        std::fs::read(&validated_path).map_err(|e| TraceError::Io(format!("Read file: {}", e)))?;

    let descriptor = ArtifactDescriptor::new(ArtifactId::new(id), ArtifactFormat::parse(format));
    let content = ContentHandle::from_bytes(contents);

    let report = engine.ingest(
        &descriptor,
        &content,
        &DispatchLimits::default(),
        &CancelFlag::new(),
    )?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Ingested {} ({:?})", id, report.status);
    println!(
        "Extractor runs: {} succeeded, {} failed",
        report.succeeded_count(),
        report.failed_count()
    );
    for outcome in &report.outcomes {
        println!("  [{}] {:?}", outcome.analyzer, outcome.outcome);
    }
    println!(
        "Graph now has {} nodes, {} edges",
        engine.node_count()?,
        engine.edge_count()?
    );

    Ok(())
}

// =============================================================================
// TRACE COMMANDS
// =============================================================================

/// Trace what an artifact is composed of.
pub fn cmd_trace_composition(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    artifact: &str,
    depth: Option<usize>,
    unbounded: bool,
) -> Result<(), TraceError> {
    let engine = load_or_create_engine(db_path, backend)?;
    let options = trace_options(depth, unbounded);

    let lineage = engine.trace_composition(&ArtifactId::new(artifact), &options)?;
    print_lineage(&format!("Composition of {}", artifact), &lineage, json_mode);

    Ok(())
}

/// Trace which artifacts carry code from a source location.
pub fn cmd_trace_usage(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    repository: &str,
    revision: &str,
    depth: Option<usize>,
    unbounded: bool,
) -> Result<(), TraceError> {
    let engine = load_or_create_engine(db_path, backend)?;
    let options = trace_options(depth, unbounded);

    let source = SourceLocation::normalized(repository, revision);
    let lineage = engine.trace_usage(&source, &options)?;
    print_lineage(
        &format!("Usage of {}@{}", source.repository, source.revision),
        &lineage,
        json_mode,
    );

    Ok(())
}

/// Resolve trace options from CLI flags.
fn trace_options(depth: Option<usize>, unbounded: bool) -> TraceOptions {
    let depth = if unbounded {
        TraceDepth::Unbounded
    } else {
        TraceDepth::Bounded(depth.unwrap_or(DEFAULT_TRACE_DEPTH))
    };
    TraceOptions::with_depth(depth)
}

/// Print a traced lineage in text or JSON form.
fn print_lineage(heading: &str, lineage: &Lineage, json_mode: bool) {
    if json_mode {
        let response = api::LineageResponse::from_lineage(lineage);
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_default()
        );
        return;
    }

    println!("{}:", heading);
    println!(
        "  {} nodes, {} edges{}",
        lineage.nodes.len(),
        lineage.edges.len(),
        if lineage.truncated {
            " (truncated by deadline)"
        } else {
            ""
        }
    );
    for node in &lineage.nodes {
        println!(
            "  #{} [{}] {} (depth {})",
            node.id.0,
            node.key.kind(),
            describe_key(&node.key),
            node.depth
        );
    }
    for edge in &lineage.edges {
        println!("  #{} -{:?}-> #{}", edge.from.0, edge.kind, edge.to.0);
    }
}

/// One-line human description of a node key.
fn describe_key(key: &NodeKey) -> String {
    match key {
        NodeKey::Artifact(id) => id.as_str().to_string(),
        NodeKey::Component(component) => format!(
            "{}:{}@{}",
            component.ecosystem.as_str(),
            component.name,
            component.version.as_str()
        ),
        NodeKey::Source(source) => format!("{}@{}", source.repository, source.revision),
    }
}

// =============================================================================
// REPORT COMMAND
// =============================================================================

/// Show the stored ingestion report for an artifact.
pub fn cmd_report(
    db_path: &PathBuf,
    backend: &str,
    json_mode: bool,
    artifact: &str,
) -> Result<(), TraceError> {
    let engine = load_or_create_engine(db_path, backend)?;

    let Some(report) = engine.report(&ArtifactId::new(artifact))? else {
        println!("No ingestion report for {}", artifact);
        return Ok(());
    };

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Ingestion report for {}", artifact);
    println!("  Status: {:?}", report.status);
    for outcome in &report.outcomes {
        println!(
            "  [{} on {}] {:?}",
            outcome.analyzer,
            outcome.artifact.as_str(),
            outcome.outcome
        );
    }

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize new database.
pub fn cmd_init(db_path: &PathBuf, backend: &str, force: bool) -> Result<(), TraceError> {
    if db_path.exists() && !force {
        return Err(TraceError::InvalidDescriptor(
            "Database already exists. Use --force to overwrite.".to_string(),
        ));
    }

    match backend {
        "redb" => {
            if force && db_path.exists() {
                std::fs::remove_file(db_path)
                    .map_err(|e| TraceError::Io(format!("Remove old database: {}", e)))?;
            }
            let _engine = Engine::with_redb(db_path)?;
            println!("Initialized new redb database at {:?}", db_path);
        }
        _ => {
            println!("Memory backend needs no initialization");
        }
    }

    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Load or create an engine from a database path with specified backend.
pub fn load_or_create_engine(db_path: &PathBuf, backend: &str) -> Result<Engine, TraceError> {
    match backend {
        "redb" => Engine::with_redb(db_path),
        "memory" => Ok(Engine::new()),
        other => Err(TraceError::InvalidDescriptor(format!(
            "Unknown backend: {}. Use: redb, memory",
            other
        ))),
    }
}
