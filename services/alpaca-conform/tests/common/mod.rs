//! In-process mock Alpaca devices served with axum

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alpaca_conform::config::Config;
use alpaca_conform::device::DeviceType;
use alpaca_conform::imagebytes::{
    encode, ImageBytesFrame, ImageBytesHeader, HEADER_LEN, IMAGE_BYTES_MIME,
};
use alpaca_conform::members::{common_members, device_members};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use base64::Engine;
use serde_json::{json, Map, Value};

/// Deviations from the protocol the mock can be told to make
#[derive(Debug, Clone, Copy, Default)]
pub struct Behavior {
    /// Spell the `Value` field as `value`
    pub lowercase_value_field: bool,
    /// Always return ClientTransactionID 0
    pub drop_transaction_id: bool,
    /// Accept malformed envelope values with HTTP 200 instead of 400
    pub accept_bad_envelope: bool,
    /// Return ClientTransactionID 0 for PUT connected only
    pub wrong_connect_transaction_id: bool,
    /// Store one more than the written value for numeric setters
    pub drift_on_write: bool,
    /// `connecting` reads true for this many polls after PUT connect
    pub connecting_polls: u32,
    /// `connecting` never clears after PUT connect
    pub connecting_stuck: bool,
    /// Delay before answering GET description
    pub slow_description: Option<Duration>,
    /// Metadata version written into ImageBytes frames, 1 when unset
    pub image_metadata_version: Option<i32>,
    /// Serve a Base64 payload shorter than the hand-off metadata describes
    pub short_base64_payload: bool,
}

/// Image served by the camera: 2 x 2 Int32 pixels
const IMAGE_WIDTH: i32 = 2;
const IMAGE_HEIGHT: i32 = 2;
const IMAGE_ELEMENT_TYPE: i32 = 2;

/// One request as the mock saw it
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: &'static str,
    pub member: String,
    pub accept: Option<String>,
    pub base64_handoff: Option<String>,
}

pub struct MockDevice {
    kind: DeviceType,
    behavior: Behavior,
    connected: AtomicBool,
    connecting_remaining: AtomicU32,
    connecting_reads: AtomicU32,
    server_transaction_id: AtomicU32,
    connected_puts: AtomicU32,
    /// Numeric setters keyed by path element, with the exact parameter name
    settings: Mutex<HashMap<&'static str, (&'static str, Value)>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl MockDevice {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of PUT connected requests that changed state
    pub fn connected_puts(&self) -> u32 {
        self.connected_puts.load(Ordering::SeqCst)
    }

    /// Number of GET connecting requests answered
    pub fn connecting_reads(&self) -> u32 {
        self.connecting_reads.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    fn next_server_transaction_id(&self) -> u32 {
        self.server_transaction_id.fetch_add(1, Ordering::SeqCst)
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub device: Arc<MockDevice>,
}

impl MockServer {
    /// A safety monitor
    pub async fn start(behavior: Behavior) -> Self {
        Self::start_device(DeviceType::SafetyMonitor, behavior).await
    }

    pub async fn start_device(kind: DeviceType, behavior: Behavior) -> Self {
        let mut settings = HashMap::new();
        if kind == DeviceType::Camera {
            settings.insert("gain", ("Gain", json!(0)));
        }

        let device = Arc::new(MockDevice {
            kind,
            behavior,
            connected: AtomicBool::new(false),
            connecting_remaining: AtomicU32::new(0),
            connecting_reads: AtomicU32::new(0),
            server_transaction_id: AtomicU32::new(1),
            connected_puts: AtomicU32::new(0),
            settings: Mutex::new(settings),
            seen: Mutex::new(Vec::new()),
        });

        let router = Router::new()
            .route(
                "/api/v1/{device_type}/{device_number}/{member}",
                get(handle_get).put(handle_put),
            )
            .with_state(Arc::clone(&device));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        Self { addr, device }
    }

    /// A tolerant-mode configuration pointing at this server with short waits
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.device.host = self.addr.ip().to_string();
        config.device.port = self.addr.port();
        config.device.device_type = self.device.kind;
        config.protocol.long_response_timeout = Duration::from_secs(5);
        config.protocol.poll_interval = Duration::from_millis(10);
        config.protocol.settle_timeout = Duration::from_secs(1);
        config
    }

    /// Like `config`, but only the named members are tested and bad URIs are skipped
    pub fn config_for(&self, members: &[&str]) -> Config {
        let mut config = self.config();
        config.tests.bad_uris = false;
        let mut all = common_members();
        all.extend(device_members(self.device.kind));
        let mut skipped: Vec<String> = all
            .iter()
            .filter(|m| !members.iter().any(|keep| keep.eq_ignore_ascii_case(m.name)))
            .map(|m| m.name.to_string())
            .collect();
        skipped.dedup();
        config.tests.skip_members = skipped;
        config
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

type Pairs = Vec<(String, String)>;

async fn handle_get(
    State(device): State<Arc<MockDevice>>,
    Path(path): Path<(String, String, String)>,
    headers: HeaderMap,
    Query(pairs): Query<Pairs>,
) -> Response {
    if path.2 == "description" {
        if let Some(delay) = device.behavior.slow_description {
            tokio::time::sleep(delay).await;
        }
    }
    handle(&device, false, path, &headers, pairs)
}

async fn handle_put(
    State(device): State<Arc<MockDevice>>,
    Path(path): Path<(String, String, String)>,
    headers: HeaderMap,
    Form(pairs): Form<Pairs>,
) -> Response {
    handle(&device, true, path, &headers, pairs)
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, message.to_string()).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not found".to_string()).into_response()
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Envelope values must be unsigned integers; names are case-sensitive
fn envelope_value(pairs: &Pairs, name: &str) -> Result<Option<u32>, ()> {
    match pairs.iter().find(|(n, _)| n == name) {
        None => Ok(None),
        Some((_, v)) => v.parse::<u32>().map(Some).map_err(|_| ()),
    }
}

/// Query parameter names are case-insensitive, form parameter names are not
fn member_param<'a>(pairs: &'a Pairs, name: &str, is_put: bool) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(n, _)| {
            if is_put {
                n == name
            } else {
                n.eq_ignore_ascii_case(name)
            }
        })
        .map(|(_, v)| v.as_str())
}

const COMMON_MEMBERS: &[&str] = &[
    "connected",
    "connecting",
    "description",
    "driverinfo",
    "driverversion",
    "interfaceversion",
    "name",
    "supportedactions",
    "devicestate",
    "connect",
    "action",
    "commandblind",
    "commandbool",
    "commandstring",
];

fn handle(
    device: &MockDevice,
    is_put: bool,
    path: (String, String, String),
    headers: &HeaderMap,
    pairs: Pairs,
) -> Response {
    let (device_type, device_number, member) = path;
    device.seen.lock().unwrap().push(SeenRequest {
        method: if is_put { "PUT" } else { "GET" },
        member: member.clone(),
        accept: header_text(headers, "accept"),
        base64_handoff: header_text(headers, "base64handoff"),
    });

    if device_type != device.kind.path() {
        return not_found();
    }
    let Ok(number) = device_number.parse::<u32>() else {
        return bad_request("Device number must be an integer");
    };
    if number != 0 {
        return not_found();
    }

    let client_transaction_id = match envelope_value(&pairs, "ClientTransactionID") {
        Ok(id) => id.unwrap_or(0),
        Err(()) if device.behavior.accept_bad_envelope => 0,
        Err(()) => return bad_request("Invalid ClientTransactionID"),
    };
    if envelope_value(&pairs, "ClientID").is_err() && !device.behavior.accept_bad_envelope {
        return bad_request("Invalid ClientID");
    }

    if device.kind == DeviceType::Camera && !is_put {
        match member.as_str() {
            "imagearray" => return image_array(device, client_transaction_id, headers),
            "imagearraybase64" => return base64_payload(device),
            _ => {}
        }
    }

    let value = match (is_put, member.as_str()) {
        (false, "connected") => Some(json!(device.is_connected())),
        (false, "connecting") => {
            device.connecting_reads.fetch_add(1, Ordering::SeqCst);
            let busy = device.behavior.connecting_stuck
                || device
                    .connecting_remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            Some(json!(busy))
        }
        (false, "description") => Some(json!("Mock device")),
        (false, "driverinfo") => Some(json!("Mock driver")),
        (false, "driverversion") => Some(json!("1.0")),
        (false, "interfaceversion") => Some(json!(3)),
        (false, "name") => Some(json!("Mock")),
        (false, "supportedactions") => Some(json!([])),
        (false, "devicestate") => Some(json!([
            {"Name": "TimeStamp", "Value": "2026-01-01T00:00:00"}
        ])),
        (false, "issafe") if device.kind == DeviceType::SafetyMonitor => {
            Some(json!(device.is_connected()))
        }
        (true, "connected") => {
            let Some(raw) = member_param(&pairs, "Connected", true) else {
                return bad_request("Missing Connected parameter");
            };
            let Ok(connected) = raw.to_ascii_lowercase().parse::<bool>() else {
                return bad_request("Invalid Connected value");
            };
            device.connected.store(connected, Ordering::SeqCst);
            device.connected_puts.fetch_add(1, Ordering::SeqCst);
            let id = if device.behavior.wrong_connect_transaction_id {
                0
            } else {
                client_transaction_id
            };
            return envelope(device, id, 0, "", None);
        }
        (true, "connect") => {
            device.connected.store(true, Ordering::SeqCst);
            device
                .connecting_remaining
                .store(device.behavior.connecting_polls, Ordering::SeqCst);
            None
        }
        (true, "action" | "commandblind" | "commandbool" | "commandstring") => {
            return envelope(device, client_transaction_id, 0x400, "Not implemented", None);
        }
        (_, name) if COMMON_MEMBERS.contains(&name) => return method_not_allowed(),
        (is_put, name) => match setting(device, is_put, name, &pairs) {
            Some(Ok(value)) => value,
            Some(Err(response)) => return response,
            None => return not_found(),
        },
    };

    envelope(device, client_transaction_id, 0, "", value)
}

fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string()).into_response()
}

/// Read or write a numeric device setting; `None` when the member is unknown
fn setting(
    device: &MockDevice,
    is_put: bool,
    member: &str,
    pairs: &Pairs,
) -> Option<Result<Option<Value>, Response>> {
    let mut settings = device.settings.lock().unwrap();
    let (param, current) = settings.get_mut(member)?;
    if !is_put {
        return Some(Ok(Some(current.clone())));
    }

    let Some(raw) = member_param(pairs, param, true) else {
        return Some(Err(bad_request("Missing parameter")));
    };
    let Ok(written) = raw.parse::<i64>() else {
        return Some(Err(bad_request("Invalid value")));
    };
    let stored = if device.behavior.drift_on_write {
        written + 1
    } else {
        written
    };
    *current = json!(stored);
    Some(Ok(None))
}

fn image_array(device: &MockDevice, client_transaction_id: u32, headers: &HeaderMap) -> Response {
    let behavior = device.behavior;
    let returned_id = if behavior.drop_transaction_id {
        0
    } else {
        client_transaction_id
    };

    let accepts_image_bytes = header_text(headers, "accept")
        .is_some_and(|accept| accept.contains(IMAGE_BYTES_MIME));
    if accepts_image_bytes {
        let frame = ImageBytesFrame {
            header: ImageBytesHeader {
                metadata_version: behavior.image_metadata_version.unwrap_or(1),
                error_number: 0,
                client_transaction_id: returned_id,
                server_transaction_id: device.next_server_transaction_id(),
                data_start: HEADER_LEN as i32,
                image_element_type: IMAGE_ELEMENT_TYPE,
                transmission_element_type: IMAGE_ELEMENT_TYPE,
                rank: 2,
                dimensions: [IMAGE_WIDTH, IMAGE_HEIGHT, 0],
            },
            error_message: None,
            data: vec![0; (IMAGE_WIDTH * IMAGE_HEIGHT * 4) as usize],
        };
        return ([(header::CONTENT_TYPE, IMAGE_BYTES_MIME)], encode(&frame)).into_response();
    }

    let mut body = Map::new();
    body.insert("ClientTransactionID".to_string(), json!(returned_id));
    body.insert(
        "ServerTransactionID".to_string(),
        json!(device.next_server_transaction_id()),
    );
    body.insert("ErrorNumber".to_string(), json!(0));
    body.insert("ErrorMessage".to_string(), json!(""));
    body.insert("Type".to_string(), json!(IMAGE_ELEMENT_TYPE));
    body.insert("Rank".to_string(), json!(2));

    let handoff = header_text(headers, "base64handoff").is_some_and(|v| v == "true");
    if handoff {
        body.insert("Dimension0Length".to_string(), json!(IMAGE_WIDTH));
        body.insert("Dimension1Length".to_string(), json!(IMAGE_HEIGHT));
        body.insert("Dimension2Length".to_string(), json!(0));
        return ([("base64handoff", "true")], Json(Value::Object(body))).into_response();
    }

    body.insert("Value".to_string(), json!([[1, 2], [3, 4]]));
    Json(Value::Object(body)).into_response()
}

fn base64_payload(device: &MockDevice) -> Response {
    let mut bytes = (IMAGE_WIDTH * IMAGE_HEIGHT * 4) as usize;
    if device.behavior.short_base64_payload {
        bytes -= 4;
    }
    let payload = base64::engine::general_purpose::STANDARD.encode(vec![0u8; bytes]);
    ([(header::CONTENT_TYPE, "text/plain")], payload).into_response()
}

fn envelope(
    device: &MockDevice,
    client_transaction_id: u32,
    error_number: i32,
    error_message: &str,
    value: Option<Value>,
) -> Response {
    let behavior = device.behavior;
    let mut body = Map::new();
    let returned_id = if behavior.drop_transaction_id {
        0
    } else {
        client_transaction_id
    };
    body.insert("ClientTransactionID".to_string(), json!(returned_id));
    body.insert(
        "ServerTransactionID".to_string(),
        json!(device.next_server_transaction_id()),
    );
    body.insert("ErrorNumber".to_string(), json!(error_number));
    body.insert("ErrorMessage".to_string(), json!(error_message));
    if let Some(value) = value {
        let name = if behavior.lowercase_value_field {
            "value"
        } else {
            "Value"
        };
        body.insert(name.to_string(), value);
    }
    Json(Value::Object(body)).into_response()
}
