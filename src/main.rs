use blockdex::api::{
    address_balance, address_txos, address_txos_since, block, block_transactions, blocks,
    blocks_by_date, get_transaction, get_transaction_proof, mempool, metrics_handler,
    outpoint_spend, outpoint_spends, send_raw_transaction, sync, ApiContext,
};
use blockdex::block_reader::FileBlockReader;
use blockdex::config::{
    get_address_prefixes, get_blk_dir, get_db_path, get_global_config, get_network_magic,
    init_global_config,
};
use blockdex::indexer::BlockIndexer;
use blockdex::mempool::{run_mempool_monitor, MempoolState};
use blockdex::rpc::NodeRpc;
use blockdex::script_solver::StandardScriptSolver;
use blockdex::sync::run_sync_service;
use blockdex::telemetry::{init_tracing, TelemetryConfig};
use blockdex::{metrics, mempool::MempoolMonitor, script_solver::ScriptSolver};

use axum::{
    routing::{get, post},
    Extension, Router,
};
use clap::Parser;
use rocksdb::{Options, DB};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "blockdex", about = "Secondary indexes over a node's block files")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Override server.port from the configuration
    #[arg(long)]
    port: Option<u16>,
}

async fn start_web_server(ctx: ApiContext, port: u16) {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/addressBalance/{address}", get(address_balance))
        .route("/addressTxos/{address}", get(address_txos))
        .route("/addressTxosSince/{sinceBlock}/{address}", get(address_txos_since))
        .route("/getTransaction/{id}", get(get_transaction))
        .route("/getTransactionProof/{id}", get(get_transaction_proof))
        .route("/outpointSpend/{txid}/{vout}", get(outpoint_spend))
        .route("/outpointSpends", post(outpoint_spends))
        .route("/sendRawTransaction", post(send_raw_transaction))
        .route("/blocks", get(blocks))
        .route("/block/{hash}", get(block))
        .route("/blocktxs/{hash}/{page}", get(block_transactions))
        .route("/blocksbydate", get(blocks_by_date))
        .route("/mempool", get(mempool))
        .route("/sync", get(sync))
        .route("/metrics", get(metrics_handler))
        .layer(cors)
        .layer(Extension(ctx));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");
    info!(%addr, "HTTP API listening");
    axum::serve(listener, app).await.expect("server failed");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_tracing(TelemetryConfig::default())?;
    init_global_config(&args.config)?;
    let config = get_global_config();
    metrics::register_all();

    let db_path = get_db_path(config)?;
    let blk_dir = get_blk_dir(config)?;
    let magic = get_network_magic(config)?;
    let (pubkey_prefix, script_prefix) = get_address_prefixes(config);
    let port = args
        .port
        .unwrap_or_else(|| config.get_int("server.port").unwrap_or(8888) as u16);

    let mut db_options = Options::default();
    db_options.create_if_missing(true);
    db_options.set_write_buffer_size(256 * 1024 * 1024);
    db_options.set_max_write_buffer_number(4);
    db_options.set_compression_type(rocksdb::DBCompressionType::Lz4);
    db_options.increase_parallelism(8);

    let db = Arc::new(DB::open(&db_options, &db_path)?);

    let solver: Arc<dyn ScriptSolver> =
        Arc::new(StandardScriptSolver::new(pubkey_prefix, script_prefix));
    let reader = Arc::new(FileBlockReader::new(PathBuf::from(&blk_dir)));
    let mempool_state = Arc::new(MempoolState::new());
    let mempool_monitor: Arc<dyn MempoolMonitor> = Arc::clone(&mempool_state);

    let node = match NodeRpc::from_env() {
        Ok(node) => Some(Arc::new(node)),
        Err(e) => {
            warn!(error = %e, "RPC node unavailable, passthrough endpoints disabled");
            None
        }
    };

    let ctx = ApiContext {
        db: Arc::clone(&db),
        mempool: Arc::clone(&mempool_monitor),
        reader: reader.clone(),
        solver: Arc::clone(&solver),
        node: node.clone(),
    };
    tokio::spawn(start_web_server(ctx, port));

    if let Some(node) = node {
        let poll = config.get_int("mempool.poll_interval_secs").unwrap_or(10) as u64;
        tokio::spawn(run_mempool_monitor(
            Arc::clone(&mempool_state),
            node,
            poll,
        ));
    }

    let indexer = BlockIndexer::new(
        Arc::clone(&db),
        Arc::clone(&mempool_monitor),
        Arc::clone(&solver),
    );
    let poll = config.get_int("sync.poll_interval_secs").unwrap_or(5) as u64;
    if let Err(e) = run_sync_service(db, indexer, reader, PathBuf::from(blk_dir), magic, poll).await
    {
        error!(error = %e, "sync service failed");
        std::process::exit(1);
    }

    Ok(())
}
