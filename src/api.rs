use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info, warn};

use crate::driver::{ActivityUpdate, DisplaySink, DriverCommand, DriverState};
use crate::time_provider::ClockCorrection;
use crate::timetable::model::{Timetable, TimetableSettings};
use crate::ui::render::{ActivityView, format_block_times};

/// Corrections beyond a day are treated as a broken sync source.
const MAX_CLOCK_OFFSET_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Serialize, Default)]
pub struct RuntimeSnapshot {
    pub clock: String,
    pub date: String,
    pub activity: Option<ActivityView>,
    pub driver_state: &'static str,
    pub source_label: String,
    pub timezone: String,
    pub clock_offset_ms: i64,
    pub updated_unix_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimetableEntryView {
    pub position: usize,
    pub day: String,
    pub end_day: Option<String>,
    pub from: String,
    pub to: String,
    pub times: String,
    pub label: String,
    pub color: Option<String>,
    pub crosses_midnight: bool,
}

pub fn timetable_view(
    timetable: &Timetable,
    settings: &TimetableSettings,
) -> Vec<TimetableEntryView> {
    timetable
        .entries()
        .iter()
        .map(|entry| TimetableEntryView {
            position: entry.position,
            day: settings.day_name(entry.weekday).to_string(),
            end_day: entry
                .crosses_midnight()
                .then(|| settings.day_name(entry.end_weekday()).to_string()),
            from: entry.start_label(),
            to: entry.end_label(),
            times: format_block_times(entry, settings),
            label: entry.label.clone(),
            color: entry.display_color.clone(),
            crosses_midnight: entry.crosses_midnight(),
        })
        .collect()
}

#[derive(Debug)]
pub struct ApiSharedState {
    pub runtime: RuntimeSnapshot,
    timetable: Vec<TimetableEntryView>,
    total_requests: u64,
    server_started_unix_ms: i64,
}

impl Default for ApiSharedState {
    fn default() -> Self {
        Self {
            runtime: RuntimeSnapshot::default(),
            timetable: Vec::new(),
            total_requests: 0,
            server_started_unix_ms: Utc::now().timestamp_millis(),
        }
    }
}

impl ApiSharedState {
    pub fn set_timetable(&mut self, entries: Vec<TimetableEntryView>) {
        self.timetable = entries;
    }
}

/// What remote clients may change: the driver and the clock correction.
#[derive(Clone)]
pub struct ApiControls {
    pub commands: Sender<DriverCommand>,
    pub correction: ClockCorrection,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

pub struct ApiServer {
    pub state: Arc<Mutex<ApiSharedState>>,
    local_addr: Option<SocketAddr>,
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(config: ApiServerConfig, controls: ApiControls) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow!("failed to start API server on {bind}: {err}"))?;
        let local_addr = server.server_addr().to_ip();
        let state = Arc::new(Mutex::new(ApiSharedState::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let state_for_thread = Arc::clone(&state);
        let stop_for_thread = Arc::clone(&stop);
        let http_join = thread::Builder::new()
            .name("lessonclock-api".to_string())
            .spawn(move || run_server_loop(server, state_for_thread, controls, stop_for_thread))
            .map_err(|err| anyhow!("failed to spawn API thread: {err}"))?;
        info!(addr = %bind, "local API listening");

        Ok(Self {
            state,
            local_addr,
            stop,
            http_join: Some(http_join),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

fn run_server_loop(
    server: Server,
    state: Arc<Mutex<ApiSharedState>>,
    controls: ApiControls,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => handle_request(request, &state, &controls),
            Ok(None) => continue,
            Err(_) => continue,
        }
    }
}

#[derive(Debug)]
enum Reply {
    Json(StatusCode, Value),
    Text(StatusCode, &'static str),
}

fn handle_request(
    request: tiny_http::Request,
    state: &Arc<Mutex<ApiSharedState>>,
    controls: &ApiControls,
) {
    if request.method() != &Method::Get {
        let _ = send_text(request, StatusCode(405), "method not allowed");
        return;
    }

    let Some(remote_addr) = request.remote_addr() else {
        let _ = send_text(request, StatusCode(400), "missing remote address");
        return;
    };
    if !is_local_network_ip(remote_addr.ip()) {
        debug!(remote = %remote_addr, "rejected non-local API request");
        let _ = send_text(request, StatusCode(403), "forbidden: local network only");
        return;
    }

    let url = request.url().to_string();
    let (path, query) = split_path_query(&url);
    let base_url = request_base_url(&request);

    let reply = match state.lock() {
        Ok(mut guard) => route(path, query, &base_url, &mut guard, controls),
        Err(_) => Reply::Text(StatusCode(500), "internal state lock error"),
    };
    let sent = match reply {
        Reply::Json(status, body) => send_json(request, status, &body),
        Reply::Text(status, body) => send_text(request, status, body),
    };
    if let Err(err) = sent {
        warn!("failed to answer API request for {path}: {err:#}");
    }
}

fn route(
    path: &str,
    query: &str,
    base_url: &str,
    state: &mut ApiSharedState,
    controls: &ApiControls,
) -> Reply {
    state.total_requests += 1;
    match path {
        "/v1" => Reply::Json(
            StatusCode(200),
            json!({
                "api_base": base_url,
                "state_url": format!("{base_url}/v1/state"),
                "timetable_url": format!("{base_url}/v1/timetable"),
                "pause_url": format!("{base_url}/v1/driver/pause"),
                "resume_url": format!("{base_url}/v1/driver/resume"),
                "refresh_url": format!("{base_url}/v1/driver/refresh"),
                "clock_offset_url": format!("{base_url}/v1/clock/offset"),
                "health_url": format!("{base_url}/healthz"),
            }),
        ),
        "/" | "/v1/state" => {
            let mut runtime = state.runtime.clone();
            runtime.clock_offset_ms = controls.correction.offset_ms();
            Reply::Json(
                StatusCode(200),
                json!({
                    "runtime": runtime,
                    "total_requests": state.total_requests,
                    "server_started_unix_ms": state.server_started_unix_ms,
                }),
            )
        }
        "/v1/timetable" => Reply::Json(StatusCode(200), json!({ "entries": state.timetable })),
        "/v1/driver/pause" => send_command(controls, DriverCommand::Pause, "pause"),
        "/v1/driver/resume" => send_command(controls, DriverCommand::Resume, "resume"),
        "/v1/driver/refresh" => send_command(controls, DriverCommand::Refresh, "refresh"),
        "/v1/clock/offset" => match query_param(query, "ms") {
            None => Reply::Json(
                StatusCode(200),
                json!({ "offset_ms": controls.correction.offset_ms() }),
            ),
            Some(raw) => match parse_offset_ms(raw) {
                Some(offset_ms) => {
                    controls.correction.set_offset_ms(offset_ms);
                    info!(offset_ms, "clock correction updated over API");
                    // The visible minute may have moved.
                    let _ = controls.commands.send(DriverCommand::Refresh);
                    Reply::Json(StatusCode(200), json!({ "offset_ms": offset_ms }))
                }
                None => Reply::Text(StatusCode(400), "ms must be an integer within one day"),
            },
        },
        "/healthz" => Reply::Text(StatusCode(200), "ok"),
        _ => Reply::Text(StatusCode(404), "not found"),
    }
}

fn send_command(controls: &ApiControls, command: DriverCommand, name: &str) -> Reply {
    match controls.commands.send(command) {
        Ok(()) => Reply::Json(
            StatusCode(200),
            json!({ "accepted": true, "command": name }),
        ),
        Err(_) => Reply::Text(StatusCode(503), "driver is not running"),
    }
}

fn parse_offset_ms(input: &str) -> Option<i64> {
    let value = input.trim().parse::<i64>().ok()?;
    (value.abs() <= MAX_CLOCK_OFFSET_MS).then_some(value)
}

/// Mirrors what the displays show so remote clients can follow along.
pub struct ApiDisplay {
    state: Arc<Mutex<ApiSharedState>>,
    settings: TimetableSettings,
}

impl ApiDisplay {
    pub fn new(
        state: Arc<Mutex<ApiSharedState>>,
        settings: TimetableSettings,
        source_label: &'static str,
    ) -> Result<Self> {
        {
            let mut guard = state
                .lock()
                .map_err(|_| anyhow!("failed to lock API state"))?;
            guard.runtime.source_label = source_label.to_string();
            guard.runtime.timezone = settings.zone.label().to_string();
            guard.runtime.driver_state = "idle";
        }
        Ok(Self { state, settings })
    }

    fn update(&self, apply: impl FnOnce(&mut RuntimeSnapshot)) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| anyhow!("failed to lock API state"))?;
        apply(&mut guard.runtime);
        guard.runtime.updated_unix_ms = Utc::now().timestamp_millis();
        Ok(())
    }
}

impl DisplaySink for ApiDisplay {
    fn show_clock(&mut self, text: &str) -> Result<()> {
        self.update(|runtime| runtime.clock = text.to_string())
    }

    fn show_date(&mut self, text: &str) -> Result<()> {
        self.update(|runtime| runtime.date = text.to_string())
    }

    fn show_activity(&mut self, update: &ActivityUpdate<'_>) -> Result<()> {
        let view = ActivityView::from_update(update, &self.settings);
        self.update(|runtime| runtime.activity = Some(view))
    }

    fn show_state(&mut self, state: DriverState) -> Result<()> {
        self.update(|runtime| {
            runtime.driver_state = match state {
                DriverState::Idle => "idle",
                DriverState::Ticking => "ticking",
            }
        })
    }
}

fn send_json<T: Serialize>(
    request: tiny_http::Request,
    status: StatusCode,
    body: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    let content_type = Header::from_str("Content-Type: application/json; charset=utf-8")
        .map_err(|_| anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_data(payload)
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn split_path_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

fn request_base_url(request: &tiny_http::Request) -> String {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv("Host"))
        .map(|header| format!("http://{}", header.value.as_str()))
        .unwrap_or_default()
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        if k == key {
            return Some(v);
        }
    }
    None
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || is_ipv4_mapped_local(v6)
        }
    }
}

fn is_ipv4_mapped_local(v6: Ipv6Addr) -> bool {
    match v6.to_ipv4_mapped() {
        Some(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        None => false,
    }
}
