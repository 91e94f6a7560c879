//! HTTP fixtures shared by the integration tests
#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use bls_wallet_relay::ledger::{LedgerValue, Submittable};
use bls_wallet_relay::Network;
use blst::min_pk::{AggregatePublicKey, PublicKey, SecretKey};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// What a signer node saw
#[derive(Debug, Default)]
pub struct NodeLog {
    pub sign_requests: Vec<Value>,
    pub acks: Vec<Value>,
    pub releases: usize,
    pub networks: Vec<String>,
}

pub struct NodeState {
    pub key: SecretKey,
    pub base: String,
    pub fail_sign: bool,
    pub fail_keygen: bool,
    pub log: Mutex<NodeLog>,
}

/// A signer node holding one key share
#[derive(Clone)]
pub struct MockNode {
    pub url: String,
    pub state: Arc<NodeState>,
}

impl MockNode {
    pub async fn start(seed: u8) -> Self {
        Self::start_with(seed, false, false).await
    }

    pub async fn start_with(seed: u8, fail_sign: bool, fail_keygen: bool) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base = format!("http://{}", addr);
        let state = Arc::new(NodeState {
            key: SecretKey::key_gen(&[seed; 32], &[]).unwrap(),
            base: base.clone(),
            fail_sign,
            fail_keygen,
            log: Mutex::new(NodeLog::default()),
        });

        let app = Router::new()
            .route("/generate-bls-keypair/:network", post(keygen))
            .route("/sign/payload/:network", post(sign))
            .route("/ack", post(ack))
            .route("/release", delete(release))
            .with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url: base, state }
    }

    pub fn public_key(&self) -> PublicKey {
        self.state.key.sk_to_pk()
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, NodeLog> {
        self.state.log.lock().unwrap()
    }
}

async fn keygen(
    State(state): State<Arc<NodeState>>,
    Path(network): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    state.log.lock().unwrap().networks.push(network);
    if state.fail_keygen {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(json!({
        "publicKey": hex::encode(state.key.sk_to_pk().compress()),
        "successCallback": format!("{}/ack", state.base),
        "failureCallback": format!("{}/release", state.base),
    })))
}

async fn sign(
    State(state): State<Arc<NodeState>>,
    Path(network): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    {
        let mut log = state.log.lock().unwrap();
        log.networks.push(network);
        log.sign_requests.push(body.clone());
    }
    if state.fail_sign {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    let payload = body["payload"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
    let message = hex::decode(payload).map_err(|_| StatusCode::BAD_REQUEST)?;
    let signature = state.key.sign(&message, DST, &[]).serialize();
    Ok(Json(json!({ "signature": hex::encode(signature) })))
}

async fn ack(State(state): State<Arc<NodeState>>, Json(body): Json<Value>) -> StatusCode {
    state.log.lock().unwrap().acks.push(body);
    StatusCode::OK
}

async fn release(State(state): State<Arc<NodeState>>) -> StatusCode {
    state.log.lock().unwrap().releases += 1;
    StatusCode::OK
}

pub fn group_key(nodes: &[MockNode]) -> PublicKey {
    let keys: Vec<PublicKey> = nodes.iter().map(MockNode::public_key).collect();
    let refs: Vec<&PublicKey> = keys.iter().collect();
    AggregatePublicKey::aggregate(&refs, false)
        .unwrap()
        .to_public_key()
}

/// Ledger JSON-RPC endpoint
pub struct RpcState {
    pub network: Network,
    pub sequence: i64,
    /// Answer every request with HTTP 503
    pub unavailable: bool,
    /// `sendTransaction` answers `ERROR` with this result code
    pub reject_with: Option<&'static str>,
    /// Every request gets a JSON-RPC error object with this code
    pub error_code: Option<i64>,
    /// Accepted transactions stay `PENDING`
    pub never_confirm: bool,
    pub return_value: Option<LedgerValue>,
    pub calls: AtomicUsize,
    pub methods: Mutex<Vec<String>>,
    pub accepted: Mutex<HashSet<String>>,
}

impl RpcState {
    pub fn new(network: Network, sequence: i64) -> Self {
        Self {
            network,
            sequence,
            unavailable: false,
            reject_with: None,
            error_code: None,
            never_confirm: false,
            return_value: None,
            calls: AtomicUsize::new(0),
            methods: Mutex::new(Vec::new()),
            accepted: Mutex::new(HashSet::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }
}

pub async fn start_rpc(state: RpcState) -> (String, Arc<RpcState>) {
    let state = Arc::new(state);
    let app = Router::new()
        .route("/", post(rpc))
        .with_state(state.clone());
    let addr = serve(app).await;
    (format!("http://{}/", addr), state)
}

async fn rpc(State(state): State<Arc<RpcState>>, Json(request): Json<Value>) -> Result<Json<Value>, StatusCode> {
    state.calls.fetch_add(1, Ordering::SeqCst);
    if state.unavailable {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    let method = request["method"].as_str().unwrap_or_default().to_string();
    state.methods.lock().unwrap().push(method.clone());
    if let Some(code) = state.error_code {
        return Ok(Json(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": { "code": code, "message": "endpoint error" },
        })));
    }
    let params = &request["params"];

    let result = match method.as_str() {
        "getAccount" => json!({
            "id": params["account"],
            "sequence": state.sequence.to_string(),
        }),
        "simulateTransaction" => json!({
            "minResourceFee": "120",
            "results": [{ "returnValue": state.return_value }],
        }),
        "sendTransaction" => {
            let wire = params["transaction"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
            let submission = Submittable::from_wire(wire).map_err(|_| StatusCode::BAD_REQUEST)?;
            let hash = submission
                .hash(state.network)
                .map_err(|_| StatusCode::BAD_REQUEST)?;
            match state.reject_with {
                Some(code) => json!({
                    "status": "ERROR",
                    "hash": hash,
                    "errorResultCode": code,
                }),
                None => {
                    let inner = submission
                        .inner_hash(state.network)
                        .map_err(|_| StatusCode::BAD_REQUEST)?;
                    state.accepted.lock().unwrap().insert(inner);
                    json!({ "status": "PENDING", "hash": hash })
                }
            }
        }
        "getTransaction" => {
            let hash = params["hash"].as_str().unwrap_or_default();
            if state.accepted.lock().unwrap().contains(hash) {
                if state.never_confirm {
                    json!({ "status": "PENDING" })
                } else {
                    json!({ "status": "SUCCESS", "returnValue": state.return_value })
                }
            } else {
                json!({ "status": "NOT_FOUND" })
            }
        }
        _ => {
            return Ok(Json(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": { "code": -32601, "message": "method not found" },
            })))
        }
    };

    Ok(Json(json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "result": result,
    })))
}
