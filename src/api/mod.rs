// HTTP API
//
// One submodule per domain. Handlers are thin: parse the
// request, call the query engine, map errors onto status codes.

pub mod types;
pub mod helpers;
pub mod addresses;
pub mod blocks;
pub mod transactions;
pub mod network;

pub use addresses::*;
pub use blocks::*;
pub use transactions::*;
pub use network::*;

use std::sync::Arc;

use rocksdb::DB;

use crate::block_reader::BlockReader;
use crate::mempool::MempoolMonitor;
use crate::rpc::NodeRpc;
use crate::script_solver::ScriptSolver;

/// Shared handler state, injected as an axum Extension.
#[derive(Clone)]
pub struct ApiContext {
    pub db: Arc<DB>,
    pub mempool: Arc<dyn MempoolMonitor>,
    pub reader: Arc<dyn BlockReader>,
    pub solver: Arc<dyn ScriptSolver>,
    /// Absent when the RPC environment variables are not set; passthrough
    /// endpoints then answer 400.
    pub node: Option<Arc<NodeRpc>>,
}
