//! HTTP client to server integration tests.
//!
//! Each test starts a real broker in-process on a random port and talks to it
//! over HTTP. Only the `ceph-fuse` invocation is replaced, by a `MockInvoker`.

use cephbroker_server::TestServer;
use serde_json::{json, Value};
use std::io::Read;

fn start_server() -> (TestServer, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::start(dir.path().to_path_buf());
    (server, dir)
}

/// Status code and parsed JSON body (`Value::Null` for error statuses).
fn request(method: &str, url: &str, body: Option<&Value>) -> (u16, Value) {
    let agent = ureq::Agent::new_with_defaults();
    let result = match (method, body) {
        ("GET", _) => agent.get(url).call(),
        ("DELETE", _) => agent.delete(url).call(),
        ("PUT", Some(body)) => agent
            .put(url)
            .header("Content-Type", "application/json")
            .send(body.to_string().as_bytes()),
        _ => panic!("unsupported method {method}"),
    };
    let resp = match result {
        Ok(r) => r,
        Err(ureq::Error::StatusCode(code)) => return (code, Value::Null),
        Err(e) => panic!("{method} {url} failed: {e}"),
    };

    let code = resp.status().as_u16();
    let mut reader = resp.into_body().into_reader();
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw).unwrap();
    (code, serde_json::from_slice(&raw).unwrap())
}

fn put_raw(url: &str, body: &str) -> u16 {
    let agent = ureq::Agent::new_with_defaults();
    match agent
        .put(url)
        .header("Content-Type", "application/json")
        .send(body.as_bytes())
    {
        Ok(resp) => resp.status().as_u16(),
        Err(ureq::Error::StatusCode(code)) => code,
        Err(e) => panic!("PUT {url} failed: {e}"),
    }
}

fn instance_url(server: &TestServer, id: &str) -> String {
    format!("{}/v2/service_instances/{id}", server.url)
}

fn binding_url(server: &TestServer, instance_id: &str, binding_id: &str) -> String {
    format!(
        "{}/v2/service_instances/{instance_id}/service_bindings/{binding_id}",
        server.url
    )
}

fn provision_body() -> Value {
    json!({
        "service_id": "cephfs-service-guid",
        "plan_id": "free-plan-guid",
        "organization_guid": "org-guid",
        "space_guid": "space-guid"
    })
}

fn bind_body(app: &str) -> Value {
    json!({
        "app_guid": app,
        "service_id": "cephfs-service-guid",
        "plan_id": "free-plan-guid"
    })
}

// --- Tests ---

#[test]
fn http_e2e_catalog() {
    let (server, _dir) = start_server();

    let (code, body) = request("GET", &format!("{}/v2/catalog", server.url), None);
    assert_eq!(code, 200);
    let service = &body["services"][0];
    assert_eq!(service["name"], "cephfs");
    assert_eq!(service["id"], "cephfs-service-guid");
    assert_eq!(service["bindable"], true);
    assert_eq!(service["requires"], json!(["volume_mount"]));
    assert_eq!(service["plans"][0]["id"], "free-plan-guid");
    assert_eq!(service["plans"][0]["name"], "free");
}

#[test]
fn http_e2e_health() {
    let (server, _dir) = start_server();
    let (code, body) = request("GET", &format!("{}/health", server.url), None);
    assert_eq!(code, 200);
    assert_eq!(body["status"], "ok");
}

#[test]
fn http_e2e_provision_is_idempotent() {
    let (server, dir) = start_server();
    let url = instance_url(&server, "inst1");

    let (code, body) = request("PUT", &url, Some(&provision_body()));
    assert_eq!(code, 201);
    assert_eq!(body, json!({}));
    assert!(dir.path().join("share").join("inst1").is_dir());

    let (code, _) = request("PUT", &url, Some(&provision_body()));
    assert_eq!(code, 200, "identical re-provision must succeed");

    let mut conflicting = provision_body();
    conflicting["space_guid"] = json!("other-space");
    let (code, _) = request("PUT", &url, Some(&conflicting));
    assert_eq!(code, 409);

    assert_eq!(server.invoker.call_count(), 1, "filesystem mounted once");
}

#[test]
fn http_e2e_bind_returns_volume_mount() {
    let (server, _dir) = start_server();
    request("PUT", &instance_url(&server, "inst1"), Some(&provision_body()));

    let url = binding_url(&server, "inst1", "bind1");
    let (code, body) = request("PUT", &url, Some(&bind_body("app-guid")));
    assert_eq!(code, 201);
    assert_eq!(body["credentials"], json!({}));

    let mount = &body["volume_mounts"][0];
    assert_eq!(mount["driver"], "cephdriver");
    assert_eq!(mount["container_dir"], "/var/vcap/data/inst1");
    assert_eq!(mount["mode"], "rw");
    assert_eq!(mount["device_type"], "shared");
    assert_eq!(mount["device"]["volume_id"], "inst1");

    let config = &mount["device"]["mount_config"];
    assert_eq!(config["ip"], "127.0.0.1");
    assert_eq!(config["remote_mount_point"], "/inst1");
    assert!(config["keyring"].as_str().unwrap().contains("key = dGVzdA=="));

    let (code, again) = request("PUT", &url, Some(&bind_body("app-guid")));
    assert_eq!(code, 200, "identical re-bind must succeed");
    assert_eq!(again, body);

    let (code, _) = request("PUT", &url, Some(&bind_body("other-app")));
    assert_eq!(code, 409);
}

#[test]
fn http_e2e_bind_parameters() {
    let (server, _dir) = start_server();
    request("PUT", &instance_url(&server, "inst1"), Some(&provision_body()));

    let mut body = bind_body("app-guid");
    body["parameters"] = json!({"readonly": true, "mount": "/data"});
    let (code, resp) = request("PUT", &binding_url(&server, "inst1", "ro"), Some(&body));
    assert_eq!(code, 201);
    assert_eq!(resp["volume_mounts"][0]["mode"], "r");
    assert_eq!(resp["volume_mounts"][0]["container_dir"], "/data");

    body["parameters"] = json!({"readonly": "not-a-bool"});
    let (code, _) = request("PUT", &binding_url(&server, "inst1", "bad"), Some(&body));
    assert_eq!(code, 422);
    assert!(!server.broker.binding_exists("inst1", "bad"));
}

#[test]
fn http_e2e_null_parameters_are_absent() {
    let (server, _dir) = start_server();
    let mut provision = provision_body();
    provision["parameters"] = Value::Null;
    let (code, _) = request("PUT", &instance_url(&server, "inst1"), Some(&provision));
    assert_eq!(code, 201);

    let (code, resp) = request(
        "PUT",
        &binding_url(&server, "inst1", "bind1"),
        Some(&json!({"app_guid": "a", "parameters": null})),
    );
    assert_eq!(code, 201);
    assert_eq!(resp["volume_mounts"][0]["mode"], "rw");
    assert_eq!(resp["volume_mounts"][0]["container_dir"], "/var/vcap/data/inst1");
}

#[test]
fn http_e2e_bind_unknown_instance() {
    let (server, _dir) = start_server();
    let (code, _) = request(
        "PUT",
        &binding_url(&server, "missing", "bind1"),
        Some(&bind_body("app-guid")),
    );
    assert_eq!(code, 404);
}

#[test]
fn http_e2e_unbind_and_deprovision() {
    let (server, dir) = start_server();
    let inst = instance_url(&server, "inst1");
    let bind = binding_url(&server, "inst1", "bind1");
    request("PUT", &inst, Some(&provision_body()));
    request("PUT", &bind, Some(&bind_body("app-guid")));

    let (code, body) = request("DELETE", &bind, None);
    assert_eq!(code, 200);
    assert_eq!(body, json!({}));
    let (code, _) = request("DELETE", &bind, None);
    assert_eq!(code, 410);

    let (code, _) = request("DELETE", &inst, None);
    assert_eq!(code, 200);
    assert!(!dir.path().join("share").join("inst1").exists());
    let (code, _) = request("DELETE", &inst, None);
    assert_eq!(code, 410);
}

#[test]
fn http_e2e_deprovision_drops_bindings() {
    let (server, _dir) = start_server();
    request("PUT", &instance_url(&server, "inst1"), Some(&provision_body()));
    request(
        "PUT",
        &binding_url(&server, "inst1", "bind1"),
        Some(&bind_body("app-guid")),
    );

    let (code, _) = request("DELETE", &instance_url(&server, "inst1"), None);
    assert_eq!(code, 200);
    assert!(!server.broker.binding_exists("inst1", "bind1"));
    assert!(server.broker.snapshot().is_empty());
}

#[test]
fn http_e2e_bad_requests() {
    let (server, _dir) = start_server();

    assert_eq!(put_raw(&instance_url(&server, "inst1"), "{not json"), 400);
    assert!(!server.broker.instance_exists("inst1"));

    let (code, _) = request("GET", &format!("{}/v2/unknown", server.url), None);
    assert_eq!(code, 404);

    let (code, _) = request("DELETE", &format!("{}/v2/catalog", server.url), None);
    assert_eq!(code, 405);
}

#[test]
fn http_e2e_concurrent_4_clients() {
    let (server, _dir) = start_server();
    let url = server.url.clone();

    let handles: Vec<_> = (0..4)
        .map(|thread_idx| {
            let u = url.clone();
            std::thread::spawn(move || {
                for i in 0..5 {
                    let inst = format!("{u}/v2/service_instances/t{thread_idx}-{i}");
                    let bind = format!("{inst}/service_bindings/b{thread_idx}-{i}");
                    assert_eq!(request("PUT", &inst, Some(&provision_body())).0, 201);
                    assert_eq!(request("PUT", &bind, Some(&bind_body("app"))).0, 201);
                    assert_eq!(request("DELETE", &bind, None).0, 200);
                    if i % 2 == 0 {
                        assert_eq!(request("DELETE", &inst, None).0, 200);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let snapshot = server.broker.snapshot();
    assert_eq!(snapshot.instances.len(), 8, "odd rounds keep their instance");
    assert!(snapshot.bindings.is_empty());
    assert_eq!(server.invoker.call_count(), 1);
}

#[test]
fn http_e2e_server_restart_persistence() {
    let data_dir = tempfile::tempdir().unwrap();
    let binding;

    {
        let server = TestServer::start(data_dir.path().to_path_buf());
        request("PUT", &instance_url(&server, "inst1"), Some(&provision_body()));
        let (code, body) = request(
            "PUT",
            &binding_url(&server, "inst1", "bind1"),
            Some(&bind_body("app-guid")),
        );
        assert_eq!(code, 201);
        binding = body;
        // server drops here and stops listening
    }

    let server = TestServer::start(data_dir.path().to_path_buf());
    assert!(server.broker.instance_exists("inst1"));
    assert!(server.broker.binding_exists("inst1", "bind1"));

    let (code, _) = request(
        "PUT",
        &instance_url(&server, "inst1"),
        Some(&provision_body()),
    );
    assert_eq!(code, 200);

    let (code, body) = request(
        "PUT",
        &binding_url(&server, "inst1", "bind1"),
        Some(&bind_body("app-guid")),
    );
    assert_eq!(code, 200);
    assert_eq!(body, binding);
    assert_eq!(server.invoker.call_count(), 0, "re-requests need no mount");
}
