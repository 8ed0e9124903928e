//! In-process fake source/target backends for migrator integration
//! tests.
//!
//! Each backend is a tiny single-threaded HTTP server on an ephemeral
//! port serving canned JSON:API documents and recording every write so
//! tests can assert on exactly what crossed the wire.

use std::collections::{BTreeMap, HashSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Minimal HTTP plumbing
// ---------------------------------------------------------------------------

pub struct Request {
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub body: Value,
}

pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn ok(body: &Value) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn created(body: &Value) -> Self {
        Self {
            status: 201,
            body: body.to_string(),
        }
    }

    pub fn raw(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn error(status: u16, detail: &str) -> Self {
        Self {
            status,
            body: json!({ "errors": [{ "detail": detail }] }).to_string(),
        }
    }
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
            ) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn handle_connection(
    stream: TcpStream,
    handler: &(dyn Fn(&Request) -> Response + Send + Sync),
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some(value) = header
            .to_ascii_lowercase()
            .strip_prefix("content-length:")
            .map(str::trim)
        {
            content_length = value.parse().unwrap_or(0);
        }
    }

    let mut body_bytes = vec![0u8; content_length];
    reader.read_exact(&mut body_bytes)?;
    let body = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    let (raw_path, raw_query) = target.split_once('?').unwrap_or((target.as_str(), ""));
    let mut query = BTreeMap::new();
    for pair in raw_query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        query.insert(percent_decode(key), percent_decode(value));
    }

    let request = Request {
        method,
        path: percent_decode(raw_path),
        query,
        body,
    };
    let response = handler(&request);

    let reason = match response.status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        _ => "Error",
    };
    let mut out = stream;
    write!(
        out,
        "HTTP/1.1 {} {reason}\r\nContent-Type: application/vnd.api+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.body.len(),
    )?;
    out.write_all(response.body.as_bytes())?;
    out.flush()
}

fn serve(handler: impl Fn(&Request) -> Response + Send + Sync + 'static) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture server");
    let addr = listener.local_addr().expect("fixture server addr");
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            let _ = handle_connection(stream, &handler);
        }
    });
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Scenario fixtures
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StateFixture {
    pub serial: u64,
    pub payload: String,
}

/// Everything the fake backend pair needs to model one migration run.
#[derive(Default, Clone)]
pub struct Scenario {
    pub organization: String,
    /// Environment name (account label) → environment id. Served one
    /// entry per page to exercise `links.next` pagination.
    pub environments: Vec<(String, String)>,
    /// Full source workspace resources. Served two per page to exercise
    /// `meta.pagination` paging.
    pub workspaces: Vec<Value>,
    pub states: BTreeMap<String, StateFixture>,
    pub variables: BTreeMap<String, Vec<Value>>,
    /// (name, environment id) pairs already present on the target.
    pub preexisting_target: Vec<(String, String)>,
    /// Reject variable creation for this key with a 422.
    pub fail_var_key: Option<String>,
    /// Reject lock actions with a 500.
    pub fail_lock: bool,
}

/// Everything the target backend recorded.
#[derive(Default)]
pub struct Recorded {
    pub created_workspaces: Vec<Value>,
    pub created_state_versions: Vec<Value>,
    pub created_vars: Vec<Value>,
    pub locked_workspace_ids: Vec<String>,
}

pub struct FakeBackends {
    pub source_host: String,
    pub target_host: String,
    pub recorded: Arc<Mutex<Recorded>>,
}

/// Build a source workspace resource with the given eligibility inputs.
pub fn source_workspace(
    id: &str,
    name: &str,
    terraform_version: &str,
    locked: bool,
    resource_count: u64,
) -> Value {
    json!({
        "id": id,
        "type": "workspaces",
        "attributes": {
            "name": name,
            "terraform-version": terraform_version,
            "locked": locked,
            "resource-count": resource_count,
            "auto-apply": true,
            "operations": true,
            "working-directory": "stacks",
            "vcs-repo": null,
        }
    })
}

pub fn plain_variable(key: &str, value: &str) -> Value {
    json!({
        "id": format!("var-{key}"),
        "type": "vars",
        "attributes": {
            "key": key,
            "value": value,
            "category": "terraform",
            "sensitive": false,
            "description": null,
        }
    })
}

pub fn sensitive_variable(key: &str) -> Value {
    json!({
        "id": format!("var-{key}"),
        "type": "vars",
        "attributes": {
            "key": key,
            "value": null,
            "category": "env",
            "sensitive": true,
            "description": null,
        }
    })
}

/// Start the fake source and target backends for one scenario.
pub fn start(scenario: &Scenario) -> FakeBackends {
    let recorded = Arc::new(Mutex::new(Recorded::default()));

    // ── source backend ─────────────────────────────────────────────────
    let source = scenario.clone();
    let source_recorded = Arc::clone(&recorded);
    let workspaces_path = format!("/api/v2/organizations/{}/workspaces", scenario.organization);
    let source_host_cell: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let source_base = Arc::clone(&source_host_cell);
    let source_host = serve(move |req| {
        match (req.method.as_str(), req.path.as_str()) {
            ("GET", path) if path == workspaces_path => {
                let page: usize = req
                    .query
                    .get("page[number]")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(1);
                let pages: Vec<&[Value]> = source.workspaces.chunks(2).collect();
                let data = pages.get(page - 1).copied().unwrap_or(&[]);
                let next_page = if page < pages.len() {
                    json!(page + 1)
                } else {
                    Value::Null
                };
                Response::ok(&json!({
                    "data": data,
                    "meta": { "pagination": { "next-page": next_page } },
                }))
            }
            ("GET", "/api/v2/state-versions") => {
                let name = req
                    .query
                    .get("filter[workspace][name]")
                    .cloned()
                    .unwrap_or_default();
                let base = source_base.lock().expect("source host cell").clone();
                let data = source.states.get(&name).map_or_else(Vec::new, |state| {
                    vec![json!({
                        "id": format!("sv-src-{name}"),
                        "type": "state-versions",
                        "attributes": {
                            "serial": state.serial,
                            "hosted-state-download-url": format!("{base}/download/{name}"),
                        }
                    })]
                });
                Response::ok(&json!({ "data": data }))
            }
            ("GET", "/api/v2/vars") => {
                let name = req
                    .query
                    .get("filter[workspace][name]")
                    .cloned()
                    .unwrap_or_default();
                let data = source.variables.get(&name).cloned().unwrap_or_default();
                Response::ok(&json!({ "data": data }))
            }
            ("GET", path) if path.starts_with("/download/") => {
                let name = path.trim_start_matches("/download/");
                source.states.get(name).map_or_else(
                    || Response::error(404, "no such state"),
                    |state| Response::raw(&state.payload),
                )
            }
            ("POST", path)
                if path.starts_with("/api/v2/workspaces/") && path.ends_with("/actions/lock") =>
            {
                if source.fail_lock {
                    return Response::error(500, "lock service unavailable");
                }
                let id = path
                    .trim_start_matches("/api/v2/workspaces/")
                    .trim_end_matches("/actions/lock")
                    .to_string();
                source_recorded
                    .lock()
                    .expect("recorded lock")
                    .locked_workspace_ids
                    .push(id.clone());
                Response::ok(&json!({
                    "data": { "id": id, "type": "workspaces", "attributes": { "locked": true } }
                }))
            }
            _ => Response::error(404, "not found"),
        }
    });
    *source_host_cell.lock().expect("source host cell") = source_host.clone();

    // ── target backend ─────────────────────────────────────────────────
    let target = scenario.clone();
    let target_recorded = Arc::clone(&recorded);
    let existing: Arc<Mutex<HashSet<(String, String)>>> = Arc::new(Mutex::new(
        scenario.preexisting_target.iter().cloned().collect(),
    ));
    let target_host_cell: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let host_for_links = Arc::clone(&target_host_cell);
    let target_host = serve(move |req| {
        match (req.method.as_str(), req.path.as_str()) {
            ("GET", "/api/iacp/v3/environments") => {
                let page: usize = req
                    .query
                    .get("page[number]")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(1);
                let data: Vec<Value> = target
                    .environments
                    .get(page - 1)
                    .map(|(name, id)| {
                        vec![json!({
                            "id": id,
                            "type": "environments",
                            "attributes": { "name": name },
                        })]
                    })
                    .unwrap_or_default();
                let next = if page < target.environments.len() {
                    let host = host_for_links.lock().expect("host cell").clone();
                    json!(format!(
                        "{host}/api/iacp/v3/environments?page%5Bnumber%5D={}",
                        page + 1
                    ))
                } else {
                    Value::Null
                };
                Response::ok(&json!({ "data": data, "links": { "next": next } }))
            }
            ("GET", "/api/iacp/v3/workspaces") => {
                let name = req.query.get("filter[name]").cloned().unwrap_or_default();
                let env = req
                    .query
                    .get("filter[environment]")
                    .cloned()
                    .unwrap_or_default();
                let exists = existing
                    .lock()
                    .expect("existing set")
                    .contains(&(name.clone(), env));
                let data = if exists {
                    vec![json!({
                        "id": "ws-tgt-existing",
                        "type": "workspaces",
                        "attributes": { "name": name },
                    })]
                } else {
                    Vec::new()
                };
                Response::ok(&json!({ "data": data }))
            }
            ("POST", "/api/iacp/v3/workspaces") => {
                let mut recorded = target_recorded.lock().expect("recorded workspaces");
                let name = req.body["data"]["attributes"]["name"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let env = req.body["data"]["relationships"]["environment"]["data"]["id"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let id = format!("ws-tgt-{}", recorded.created_workspaces.len() + 1);
                recorded.created_workspaces.push(req.body.clone());
                existing.lock().expect("existing set").insert((name.clone(), env));
                Response::created(&json!({
                    "data": { "id": id, "type": "workspaces", "attributes": { "name": name } }
                }))
            }
            ("POST", "/api/iacp/v3/state-versions") => {
                target_recorded
                    .lock()
                    .expect("recorded states")
                    .created_state_versions
                    .push(req.body.clone());
                Response::created(&json!({
                    "data": { "id": "sv-tgt-1", "type": "state-versions", "attributes": {} }
                }))
            }
            ("POST", "/api/iacp/v3/vars") => {
                let key = req.body["data"]["attributes"]["key"]
                    .as_str()
                    .unwrap_or_default();
                if target.fail_var_key.as_deref() == Some(key) {
                    return Response::error(422, "variable creation rejected");
                }
                target_recorded
                    .lock()
                    .expect("recorded vars")
                    .created_vars
                    .push(req.body.clone());
                Response::created(&json!({
                    "data": { "id": format!("var-tgt-{key}"), "type": "vars", "attributes": {} }
                }))
            }
            _ => Response::error(404, "not found"),
        }
    });
    *target_host_cell.lock().expect("host cell") = target_host.clone();

    FakeBackends {
        source_host,
        target_host,
        recorded,
    }
}
