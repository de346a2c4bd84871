//! HTTP front end of the CephFS service broker.
//!
//! Serves the service broker routes on top of a [`Broker`]:
//!
//! - `GET    /v2/catalog`
//! - `PUT    /v2/service_instances/{instance_id}`
//! - `DELETE /v2/service_instances/{instance_id}`
//! - `PUT    /v2/service_instances/{instance_id}/service_bindings/{binding_id}`
//! - `DELETE /v2/service_instances/{instance_id}/service_bindings/{binding_id}`
//! - `GET    /health`
//!
//! Requests are handled by a pool of worker threads sharing one listener.
//! The [`TestServer`] helper starts a broker on a random port, backed by a
//! [`MockInvoker`] instead of `ceph-fuse`, for integration testing.

pub mod config;

pub use config::{BrokerConfig, ConfigError};

use cephbroker_backend::{CephClient, CephClientConfig, MockInvoker};
use cephbroker_core::{BindDetails, Broker, BrokerError, CatalogConfig, CephController};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, error, info};

/// Serializes as `{}`.
#[derive(Serialize)]
struct Empty {}

/// A parsed broker API path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    Catalog,
    Health,
    Instance(&'a str),
    Binding {
        instance_id: &'a str,
        binding_id: &'a str,
    },
}

/// Parse a request URL into a [`Route`]. The query string is ignored.
pub fn parse_route(url: &str) -> Option<Route<'_>> {
    let path = url.split('?').next().unwrap_or(url);
    let segments: Vec<&str> = path.trim_end_matches('/').split('/').skip(1).collect();
    match segments.as_slice() {
        ["v2", "catalog"] => Some(Route::Catalog),
        ["health"] => Some(Route::Health),
        ["v2", "service_instances", id] if !id.is_empty() => Some(Route::Instance(*id)),
        ["v2", "service_instances", instance_id, "service_bindings", binding_id]
            if !instance_id.is_empty() && !binding_id.is_empty() =>
        {
            Some(Route::Binding {
                instance_id: *instance_id,
                binding_id: *binding_id,
            })
        }
        _ => None,
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    description: &'a str,
}

fn respond_json<T: Serialize>(req: tiny_http::Request, code: u16, body: &T) {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let header = Header::from_bytes("Content-Type", "application/json").expect("valid header");
    let _ = req.respond(
        Response::from_data(json)
            .with_status_code(StatusCode(code))
            .with_header(header),
    );
}

fn respond_err(req: tiny_http::Request, code: u16, msg: &str) {
    respond_json(req, code, &ErrorBody { description: msg });
}

fn read_json<T: DeserializeOwned>(req: &mut tiny_http::Request) -> Result<T, String> {
    let mut body = Vec::new();
    req.as_reader()
        .read_to_end(&mut body)
        .map_err(|e| format!("read error: {e}"))?;
    serde_json::from_slice(&body).map_err(|e| format!("invalid request body: {e}"))
}

/// HTTP status for a failed lifecycle call. `gone_if_missing` selects 410
/// over 404 for unknown ids, as delete routes report them.
pub fn error_status(err: &BrokerError, gone_if_missing: bool) -> u16 {
    match err {
        BrokerError::AlreadyExists(_) => 409,
        BrokerError::InstanceNotFound(_) | BrokerError::BindingNotFound(_) => {
            if gone_if_missing {
                410
            } else {
                404
            }
        }
        BrokerError::InvalidRequest(_) | BrokerError::InvalidParameters(_) => 422,
        BrokerError::Backend(_) => 500,
    }
}

fn handle_instance(broker: &Broker, mut req: tiny_http::Request, method: &Method, id: &str) {
    match *method {
        Method::Put => {
            let details = match read_json(&mut req) {
                Ok(d) => d,
                Err(msg) => return respond_err(req, 400, &msg),
            };
            match broker.provision(id, details) {
                Ok(p) if p.already_existed => respond_json(req, 200, &Empty {}),
                Ok(_) => respond_json(req, 201, &Empty {}),
                Err(e) => {
                    error!("PUT instance {id}: {e}");
                    respond_err(req, error_status(&e, false), &e.to_string());
                }
            }
        }
        Method::Delete => match broker.deprovision(id) {
            Ok(()) => respond_json(req, 200, &Empty {}),
            Err(e) => {
                error!("DELETE instance {id}: {e}");
                respond_err(req, error_status(&e, true), &e.to_string());
            }
        },
        _ => respond_err(req, 405, "method not allowed"),
    }
}

fn handle_binding(
    broker: &Broker,
    mut req: tiny_http::Request,
    method: &Method,
    instance_id: &str,
    binding_id: &str,
) {
    match *method {
        Method::Put => {
            let details: BindDetails = match read_json(&mut req) {
                Ok(d) => d,
                Err(msg) => return respond_err(req, 400, &msg),
            };
            match broker.bind(instance_id, binding_id, details) {
                Ok(bound) => {
                    let code = if bound.already_existed { 200 } else { 201 };
                    respond_json(req, code, &bound.binding);
                }
                Err(e) => {
                    error!("PUT binding {binding_id} of {instance_id}: {e}");
                    respond_err(req, error_status(&e, false), &e.to_string());
                }
            }
        }
        Method::Delete => match broker.unbind(instance_id, binding_id) {
            Ok(()) => respond_json(req, 200, &Empty {}),
            Err(e) => {
                error!("DELETE binding {binding_id} of {instance_id}: {e}");
                respond_err(req, error_status(&e, true), &e.to_string());
            }
        },
        _ => respond_err(req, 405, "method not allowed"),
    }
}

/// Handle a single HTTP request, dispatching to the appropriate route handler.
pub fn handle_request(broker: &Broker, req: tiny_http::Request) {
    let method = req.method().clone();
    let url = req.url().to_owned();
    debug!("{method} {url}");

    match parse_route(&url) {
        Some(Route::Catalog) if method == Method::Get => {
            respond_json(req, 200, broker.services());
        }
        Some(Route::Health) if method == Method::Get => {
            respond_json(req, 200, &serde_json::json!({"status": "ok"}));
        }
        Some(Route::Catalog | Route::Health) => respond_err(req, 405, "method not allowed"),
        Some(Route::Instance(id)) => handle_instance(broker, req, &method, id),
        Some(Route::Binding {
            instance_id,
            binding_id,
        }) => handle_binding(broker, req, &method, instance_id, binding_id),
        None => respond_err(req, 404, "not found"),
    }
}

/// Start `workers` threads pulling requests from `server`.
///
/// Each thread exits once the server is unblocked, so call
/// [`Server::unblock`] once per worker to shut the pool down.
pub fn spawn_workers(
    server: &Arc<Server>,
    broker: &Arc<Broker>,
    workers: usize,
) -> Vec<JoinHandle<()>> {
    (0..workers.max(1))
        .map(|_| {
            let server = Arc::clone(server);
            let broker = Arc::clone(broker);
            std::thread::spawn(move || {
                for request in server.incoming_requests() {
                    handle_request(&broker, request);
                }
            })
        })
        .collect()
}

/// Serve requests until the server is unblocked, blocking the current thread.
pub fn run_server(server: &Arc<Server>, broker: &Arc<Broker>, workers: usize) {
    info!("serving with {workers} worker(s)");
    for handle in spawn_workers(server, broker, workers) {
        if handle.join().is_err() {
            error!("HTTP worker panicked");
        }
    }
}

/// A test helper that starts a broker on a random port in background threads.
///
/// The broker keeps its state file in `data_dir`, mounts shares below
/// `data_dir/share`, and records mount commands in `invoker` instead of running
/// `ceph-fuse`. Dropping the `TestServer` stops the workers.
pub struct TestServer {
    pub url: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub invoker: Arc<MockInvoker>,
    pub broker: Arc<Broker>,
    server: Arc<Server>,
    handles: Vec<JoinHandle<()>>,
}

impl TestServer {
    pub const WORKERS: usize = 4;

    /// Start a test server storing its data under `data_dir`.
    /// Binds to `127.0.0.1:0` (random port).
    pub fn start(data_dir: PathBuf) -> Self {
        fs::create_dir_all(&data_dir).expect("failed to create test data dir");
        let keyring = data_dir.join("ceph.client.admin.keyring");
        if !keyring.exists() {
            fs::write(&keyring, "[client.admin]\n\tkey = dGVzdA==\n")
                .expect("failed to write test keyring");
        }

        let invoker = Arc::new(MockInvoker::new());
        let client = CephClient::with_invoker(
            CephClientConfig {
                mds: "127.0.0.1:6789".to_owned(),
                keyring_file: keyring,
                local_mount_dir: data_dir.join("share"),
                remote_mount_path: "/".to_owned(),
            },
            invoker.clone(),
        );
        let catalog = CatalogConfig {
            service_name: "cephfs".to_owned(),
            service_id: "cephfs-service-guid".to_owned(),
            plan_name: "free".to_owned(),
            plan_id: "free-plan-guid".to_owned(),
            plan_desc: "free ceph filesystem".to_owned(),
        };
        let controller = Arc::new(CephController::new(Arc::new(client)));
        let broker = Arc::new(Broker::new(controller, &catalog, &data_dir));

        let server =
            Arc::new(Server::http("127.0.0.1:0").expect("failed to bind test HTTP server"));
        let port = server.server_addr().to_ip().expect("not an IP addr").port();
        let url = format!("http://127.0.0.1:{port}");
        let handles = spawn_workers(&server, &broker, Self::WORKERS);

        Self {
            url,
            port,
            data_dir,
            invoker,
            broker,
            server,
            handles,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        for _ in 0..self.handles.len() {
            self.server.unblock();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
