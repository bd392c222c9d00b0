use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::{Extension, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

use distributed_dfs::client::{ClientConfig, DfsClient, TransferMode};
use distributed_dfs::config::DfsConfig;
use distributed_dfs::coordinator::handlers::*;
use distributed_dfs::coordinator::proxy::{handle_proxy_get, handle_proxy_put, ProxyState};
use distributed_dfs::coordinator::store::MetadataStore;
use distributed_dfs::coordinator::{gc, repair, sweep};
use distributed_dfs::shared::protocol::{
    API_PREFIX, ENDPOINT_CHUNKS, ENDPOINT_COMMIT, ENDPOINT_FILES, ENDPOINT_HEALTH,
    ENDPOINT_HEARTBEAT, ENDPOINT_LEASES, ENDPOINT_NODES, ENDPOINT_PROXY_CHUNKS, ENDPOINT_STATS,
    ENDPOINT_UPLOAD_INIT, ENDPOINT_WORKER_HEALTH,
};
use distributed_dfs::worker::chunkstore::ChunkStore;
use distributed_dfs::worker::handlers::*;
use distributed_dfs::worker::heartbeat::{run_scrub_loop, HeartbeatEmitter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let config = DfsConfig::from_env();
    match args[1].as_str() {
        "coordinator" => run_coordinator(&args[2..], config).await,
        "worker" => run_worker(&args[2..], config).await,
        "upload" | "download" | "list" | "delete" => run_client_command(&args[1..], config).await,
        other => {
            eprintln!("Unknown role: {}", other);
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn print_usage(bin: &str) {
    eprintln!("Usage: {} coordinator --listen <addr:port>", bin);
    eprintln!("       {} worker --listen <addr:port> [--node-id <id>] [--rack <rack>]", bin);
    eprintln!("       {} upload <local> <remote-path> [--overwrite]", bin);
    eprintln!("       {} download <remote-path> <local>", bin);
    eprintln!("       {} list [prefix]", bin);
    eprintln!("       {} delete <remote-path> [--permanent]", bin);
    eprintln!();
    eprintln!("Configuration comes from DFS_* environment variables.");
}

fn parse_listen(args: &[String]) -> SocketAddr {
    let mut listen: Option<SocketAddr> = None;
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--listen" && i + 1 < args.len() {
            listen = args[i + 1].parse().ok();
            i += 2;
        } else {
            i += 1;
        }
    }
    listen.unwrap_or_else(|| {
        eprintln!("--listen <addr:port> is required");
        std::process::exit(1);
    })
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

async fn run_coordinator(args: &[String], config: DfsConfig) -> anyhow::Result<()> {
    let listen = parse_listen(args);
    tracing::info!("starting coordinator on {}", listen);

    // 1. Metadata store: replay journal, rebuild indexes:
    let store = Arc::new(MetadataStore::open(&config.metadata_path, config.clone())?);
    let http_client = reqwest::Client::new();
    let proxy_state = Arc::new(ProxyState::new());

    // 2. HTTP router:
    let api = Router::new()
        .route(ENDPOINT_UPLOAD_INIT, post(handle_upload_init))
        .route(ENDPOINT_COMMIT, post(handle_commit))
        .route(ENDPOINT_FILES, get(handle_list_files))
        .route(
            &format!("{}/:path", ENDPOINT_FILES),
            get(handle_get_file).delete(handle_delete_file),
        )
        .route(ENDPOINT_HEARTBEAT, post(handle_heartbeat))
        .route(ENDPOINT_NODES, get(handle_list_nodes))
        .route(
            &format!("{}/:node_id", ENDPOINT_NODES),
            get(handle_get_node).delete(handle_decommission_node),
        )
        .route(ENDPOINT_HEALTH, get(handle_health))
        .route(ENDPOINT_STATS, get(handle_stats))
        .route(ENDPOINT_LEASES, post(handle_acquire_lease))
        .route(
            &format!("{}/:lease_id", ENDPOINT_LEASES),
            delete(handle_release_lease),
        )
        .route(
            &format!("{}/:chunk_id", ENDPOINT_PROXY_CHUNKS),
            put(handle_proxy_put).get(handle_proxy_get),
        );

    let app = Router::new()
        .nest(API_PREFIX, api)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(Extension(store.clone()))
        .layer(Extension(http_client))
        .layer(Extension(proxy_state));

    // 3. Background loops: liveness sweep, repair, GC:
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(sweep::run_sweep_loop(store.clone(), shutdown_rx.clone()));
    tokio::spawn(repair::run_repair_loop(store.clone(), shutdown_rx.clone()));
    tokio::spawn(gc::run_gc_loop(store.clone(), shutdown_rx.clone()));

    // 4. Serve until ctrl-c:
    tracing::info!("coordinator listening on {}", listen);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    Ok(())
}

async fn run_worker(args: &[String], config: DfsConfig) -> anyhow::Result<()> {
    let listen = parse_listen(args);

    // The address workers advertise must be reachable by peers and the
    // coordinator; a wildcard bind falls back to loopback.
    let advertised_host = match listen.ip().to_string().as_str() {
        "0.0.0.0" | "::" => "127.0.0.1".to_string(),
        other => other.to_string(),
    };
    let node_id = flag_value(args, "--node-id")
        .unwrap_or_else(|| format!("node-{}-{}", advertised_host, listen.port()));
    let rack = flag_value(args, "--rack");

    tracing::info!("starting worker {} on {}", node_id, listen);

    // 1. Chunk store: scan the directory, verify digests:
    let storage_root = config.storage_path.join(&node_id);
    let store = ChunkStore::open(&storage_root, &node_id)?;
    let http_client = reqwest::Client::new();

    // 2. HTTP router:
    let app = Router::new()
        .route(
            &format!("{}/:chunk_id", ENDPOINT_CHUNKS),
            put(handle_put_chunk)
                .get(handle_get_chunk)
                .delete(handle_delete_chunk),
        )
        .route(
            &format!("{}/:chunk_id/replicate", ENDPOINT_CHUNKS),
            post(handle_replicate_chunk),
        )
        .route(ENDPOINT_WORKER_HEALTH, get(handle_worker_health))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(Extension(store.clone()))
        .layer(Extension(http_client.clone()));

    // 3. Heartbeat emitter and hourly scrub:
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let emitter = HeartbeatEmitter {
        node_id: node_id.clone(),
        host: advertised_host,
        port: listen.port(),
        rack,
        metadata_url: config.metadata_url.clone(),
        interval: config.heartbeat_interval,
    };
    tokio::spawn(emitter.run(store.clone(), http_client, shutdown_rx.clone()));
    tokio::spawn(run_scrub_loop(store.clone(), shutdown_rx.clone()));

    // 4. Serve until ctrl-c:
    tracing::info!("worker {} listening on {}", node_id, listen);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    Ok(())
}

async fn run_client_command(args: &[String], config: DfsConfig) -> anyhow::Result<()> {
    let client_config = ClientConfig {
        mode: if std::env::var("DFS_DIRECT").is_ok() {
            TransferMode::Direct
        } else {
            TransferMode::Proxy
        },
        ..ClientConfig::new(&config.metadata_url)
    };
    let client = DfsClient::new(client_config);

    match args[0].as_str() {
        "upload" => {
            let local = args.get(1).expect("upload needs <local> <remote-path>");
            let remote = args.get(2).expect("upload needs <local> <remote-path>");
            let overwrite = args.iter().any(|a| a == "--overwrite");
            let file_id = client
                .upload(std::path::Path::new(local), remote, overwrite)
                .await?;
            println!("uploaded {} (file id {})", remote, file_id);
        }
        "download" => {
            let remote = args.get(1).expect("download needs <remote-path> <local>");
            let local = args.get(2).expect("download needs <remote-path> <local>");
            let bytes = client
                .download(remote, std::path::Path::new(local))
                .await?;
            println!("downloaded {} bytes to {}", bytes, local);
        }
        "list" => {
            let files = client.list(args.get(1).map(|s| s.as_str())).await?;
            for file in files {
                println!("{}\t{} bytes\t{} chunks", file.path, file.size, file.chunks.len());
            }
        }
        "delete" => {
            let remote = args.get(1).expect("delete needs <remote-path>");
            let permanent = args.iter().any(|a| a == "--permanent");
            client.delete(remote, permanent).await?;
            println!("deleted {}", remote);
        }
        _ => unreachable!(),
    }
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        return;
    }
    tracing::info!("shutdown requested, stopping background loops");
    let _ = shutdown_tx.send(true);
}
