//! Client tests against an in-memory server.
//!
//! `FakeServer` implements `Transport` and keeps devices and points in
//! memory, paginating reads and listings so the cursor has real pages to walk.
//!
//! Run with: `cargo test --test client`

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::StreamExt;
use reqwest::Method;
use serde_json::{Value, json};
use tempo_stream::{
    BulkWrite, Client, DataPoint, Device, Error, Fold, Pipeline, Response, Row, Selection,
    Selector, Sensor, Transport, WriteOutcome,
};

// ============================================================================
// Fake server
// ============================================================================

#[derive(Default)]
struct State {
    devices: BTreeMap<String, Device>,
    points: BTreeMap<(String, String), Vec<DataPoint>>,
    rejected_devices: BTreeSet<String>,
    fold_rows: Vec<Row>,
    requests: Vec<(Method, String, Value)>,
}

struct FakeServer {
    page_size: usize,
    state: Mutex<State>,
}

impl FakeServer {
    fn new(page_size: usize) -> Arc<Self> {
        Arc::new(Self {
            page_size,
            state: Mutex::new(State::default()),
        })
    }

    /// Writes to this device answer with a per-device failure.
    fn reject_writes_to(&self, device: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_devices
            .insert(device.to_string());
    }

    /// Rows served for reads that carry a pipeline.
    fn serve_fold_rows(&self, rows: Vec<Row>) {
        self.state.lock().unwrap().fold_rows = rows;
    }

    fn requests(&self, path: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(_, p, _)| p == path)
            .map(|(_, _, body)| body.clone())
            .collect()
    }

    /// Methods of every request recorded against `path`.
    fn methods(&self, path: &str) -> Vec<Method> {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(_, p, _)| p == path)
            .map(|(m, _, _)| m.clone())
            .collect()
    }

    fn handle(&self, method: Method, path: &str, body: Value) -> Response {
        let mut state = self.state.lock().unwrap();
        state.requests.push((method.clone(), path.to_string(), body.clone()));

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match (method.as_str(), segments.as_slice()) {
            ("POST", ["v2", "devices"]) => {
                let device: Device = serde_json::from_value(body).unwrap();
                state.devices.insert(device.key.clone(), device.clone());
                ok(json!(device))
            }
            ("GET", ["v2", "devices", key]) => match state.devices.get(*key) {
                Some(device) => ok(json!(device)),
                None => not_found(),
            },
            ("PUT", ["v2", "devices", key]) => {
                if !state.devices.contains_key(*key) {
                    return not_found();
                }
                let device: Device = serde_json::from_value(body).unwrap();
                state.devices.insert(key.to_string(), device.clone());
                ok(json!(device))
            }
            ("DELETE", ["v2", "devices", key]) => match state.devices.remove(*key) {
                Some(_) => Response::new(200, ""),
                None => not_found(),
            },
            ("DELETE", ["v2", "devices"]) => {
                let selection = filters(&body);
                let doomed: Vec<String> = state
                    .devices
                    .values()
                    .filter(|d| matches_device(&selection, d))
                    .map(|d| d.key.clone())
                    .collect();
                for key in &doomed {
                    state.devices.remove(key);
                }
                ok(json!({"deleted": doomed.len()}))
            }
            ("GET", ["v2", "devices"]) => {
                let selection = filters(&body);
                let devices: Vec<Value> = state
                    .devices
                    .values()
                    .filter(|d| matches_device(&selection, d))
                    .map(|d| json!(d))
                    .collect();
                self.page(devices, &body)
            }
            ("POST", ["v2", "write"]) => {
                let write: BTreeMap<String, BTreeMap<String, Vec<DataPoint>>> =
                    serde_json::from_value(body).unwrap();
                let mut failures = serde_json::Map::new();
                for (device, sensors) in write {
                    if state.rejected_devices.contains(&device) {
                        failures.insert(
                            device.clone(),
                            json!({"success": false, "message": format!("{} is read-only", device)}),
                        );
                        continue;
                    }
                    for (sensor, points) in sensors {
                        state
                            .points
                            .entry((device.clone(), sensor))
                            .or_default()
                            .extend(points);
                    }
                }
                if failures.is_empty() {
                    Response::new(200, "")
                } else {
                    Response::new(207, Value::Object(failures).to_string())
                }
            }
            ("GET", ["v2", "read"]) => {
                let query = body.get("query").cloned().unwrap_or_else(|| body.clone());
                if query.get("fold").is_some() {
                    let rows = state.fold_rows.iter().map(|r| json!(r)).collect();
                    return self.page(rows, &body);
                }
                let start = time(&query["read"]["start"]);
                let stop = time(&query["read"]["stop"]);
                let rows = raw_rows(&state, &filters(&body), |t| t >= start && t < stop);
                self.page(rows, &body)
            }
            ("GET", ["v2", "single"]) => {
                let selection = filters(&body);
                let mut row = BTreeMap::<String, BTreeMap<String, f64>>::new();
                let mut latest: Option<DateTime<Utc>> = None;
                for ((device, sensor), points) in &state.points {
                    if !matches_series(&state, &selection, device, sensor) {
                        continue;
                    }
                    if let Some(p) = points.iter().max_by_key(|p| p.timestamp) {
                        row.entry(device.clone()).or_default().insert(sensor.clone(), p.value);
                        latest = latest.max(Some(p.timestamp));
                    }
                }
                let rows = match latest {
                    Some(t) => vec![json!({"t": t, "data": row})],
                    None => vec![],
                };
                self.page(rows, &body)
            }
            ("DELETE", ["v2", "devices", device, "sensors", sensor, "datapoints"]) => {
                let start = time(&body["start"]);
                let stop = time(&body["stop"]);
                let key = (device.to_string(), sensor.to_string());
                let mut deleted = 0;
                if let Some(points) = state.points.get_mut(&key) {
                    let before = points.len();
                    points.retain(|p| p.timestamp < start || p.timestamp >= stop);
                    deleted = before - points.len();
                }
                ok(json!({"deleted": deleted}))
            }
            _ => Response::new(400, "unsupported route"),
        }
    }

    /// Serve `items` `page_size` at a time. Continuation bodies carry the
    /// original query plus an offset.
    fn page(&self, items: Vec<Value>, body: &Value) -> Response {
        let offset = body.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let query = body.get("query").cloned().unwrap_or_else(|| body.clone());
        let end = (offset + self.page_size).min(items.len());
        let data = items[offset.min(end)..end].to_vec();

        let mut page = json!({ "data": data });
        if end < items.len() {
            page["next_page"] = json!({"next_query": {"offset": end, "query": query}});
        }
        ok(page)
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> tempo_stream::Result<Response> {
        let body = match body {
            Some(b) => serde_json::from_str(&b).map_err(|e| Error::Transport(e.to_string()))?,
            None => Value::Null,
        };
        Ok(self.handle(method, path, body))
    }
}

fn ok(body: Value) -> Response {
    Response::new(200, body.to_string())
}

fn not_found() -> Response {
    Response::new(404, r#"{"message":"not found"}"#)
}

fn time(v: &Value) -> DateTime<Utc> {
    serde_json::from_value(v.clone()).unwrap()
}

fn filters(body: &Value) -> Selection {
    let query = body.get("query").unwrap_or(body);
    Selection::from_json(query["search"]["filters"].clone()).unwrap()
}

fn matches(selector: &Selector, key: &str, attributes: &BTreeMap<String, String>) -> bool {
    match selector {
        Selector::All => true,
        Selector::Key(k) => k == key,
        Selector::Attributes(attrs) => attrs.iter().all(|(k, v)| attributes.get(k) == Some(v)),
        Selector::AttributeKey(k) => attributes.contains_key(k),
        Selector::And(items) => items.iter().all(|s| matches(s, key, attributes)),
        Selector::Or(items) => items.iter().any(|s| matches(s, key, attributes)),
        Selector::Raw(_) => false,
    }
}

fn matches_device(selection: &Selection, device: &Device) -> bool {
    selection
        .devices
        .as_ref()
        .is_none_or(|s| matches(s, &device.key, &device.attributes))
}

fn matches_series(state: &State, selection: &Selection, device: &str, sensor: &str) -> bool {
    let Some(d) = state.devices.get(device) else {
        return false;
    };
    let attrs = d.sensor(sensor).map(|s| s.attributes.clone()).unwrap_or_default();
    matches_device(selection, d)
        && selection
            .sensors
            .as_ref()
            .is_none_or(|s| matches(s, sensor, &attrs))
}

fn raw_rows(
    state: &State,
    selection: &Selection,
    in_range: impl Fn(DateTime<Utc>) -> bool,
) -> Vec<Value> {
    let mut grid = BTreeMap::<DateTime<Utc>, BTreeMap<String, BTreeMap<String, f64>>>::new();
    for ((device, sensor), points) in &state.points {
        if !matches_series(state, selection, device, sensor) {
            continue;
        }
        for p in points.iter().filter(|p| in_range(p.timestamp)) {
            grid.entry(p.timestamp)
                .or_default()
                .entry(device.clone())
                .or_default()
                .insert(sensor.clone(), p.value);
        }
    }
    grid.into_iter()
        .map(|(t, data)| json!({"t": t, "data": data}))
        .collect()
}

// ============================================================================
// Helpers
// ============================================================================

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn thermostat(key: &str) -> Device {
    Device::new(key)
        .with_name(format!("Thermostat {}", key))
        .with_attribute("building", "b1")
        .with_sensor(Sensor::new("sensor1").with_attribute("unit", "C"))
        .unwrap()
        .with_sensor(Sensor::new("sensor2"))
        .unwrap()
}

async fn setup(page_size: usize) -> (Arc<FakeServer>, Client) {
    let server = FakeServer::new(page_size);
    let client = Client::from_shared(server.clone());
    client.create_device(&thermostat("device1")).await.unwrap();
    client.create_device(&thermostat("device2")).await.unwrap();
    (server, client)
}

/// One sample per minute, `count` minutes long, for both sensors of `device`.
async fn write_series(client: &Client, device: &str, count: i64) {
    let mut write = BulkWrite::new();
    for i in 0..count {
        let t = start() + Duration::minutes(i);
        write.push(device, "sensor1", DataPoint::new(t, i as f64));
        write.push(device, "sensor2", DataPoint::new(t, (i * 10) as f64));
    }
    assert!(client.write_bulk(write).await.unwrap().is_success());
}

fn tuples(rows: &[Row]) -> Vec<(DateTime<Utc>, String, String, f64)> {
    rows.iter()
        .flat_map(|r| {
            r.values()
                .map(|(d, k, v)| (r.timestamp(), d.to_string(), k.to_string(), v))
                .collect::<Vec<_>>()
        })
        .collect()
}

// ============================================================================
// Devices
// ============================================================================

#[tokio::test]
async fn test_create_then_get_round_trips() {
    let (_, client) = setup(10).await;

    let fetched = client.get_device("device1").await.unwrap().unwrap();
    assert_eq!(fetched, thermostat("device1"));
    assert_eq!(fetched.sensors().len(), 2);
    assert_eq!(fetched.attributes.get("building").map(String::as_str), Some("b1"));
}

#[tokio::test]
async fn test_get_missing_device_is_none() {
    let (_, client) = setup(10).await;
    assert!(client.get_device("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_device() {
    let (_, client) = setup(10).await;

    let mut device = client.get_device("device1").await.unwrap().unwrap();
    device.name = "Renamed".to_string();
    device.add_sensor(Sensor::new("humidity")).unwrap();

    let updated = client.update_device(&device).await.unwrap();
    assert_eq!(updated.name, "Renamed");
    assert!(client.get_device("device1").await.unwrap().unwrap().sensor("humidity").is_some());
}

#[tokio::test]
async fn test_create_rejects_duplicate_sensors_locally() {
    let server = FakeServer::new(10);
    let client = Client::from_shared(server.clone());
    let device: Device =
        serde_json::from_str(r#"{"key":"d","sensors":[{"key":"s"},{"key":"s"}]}"#).unwrap();

    let err = client.create_device(&device).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateSensor { .. }));
    assert!(server.requests("/v2/devices").is_empty());
}

#[tokio::test]
async fn test_delete_device() {
    let (_, client) = setup(10).await;

    assert!(client.delete_device("device1").await.unwrap());
    assert!(!client.delete_device("device1").await.unwrap());
    assert!(client.get_device("device1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_dot_key_never_reaches_collection() {
    let (server, client) = setup(10).await;

    for key in ["..", ".", ""] {
        assert!(matches!(client.delete_device(key).await, Err(Error::InvalidKey(_))));
        assert!(matches!(client.get_device(key).await, Err(Error::InvalidKey(_))));
    }
    let end = start() + Duration::minutes(1);
    assert!(client.delete_datapoints("..", "sensor1", start(), end).await.is_err());

    assert_eq!(server.methods("/v2/devices"), vec![Method::POST, Method::POST]);
    assert!(client.get_device("device1").await.unwrap().is_some());
    assert!(client.get_device("device2").await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_devices_by_selection() {
    let (_, client) = setup(10).await;

    let none = Selection::new().devices(Selector::attribute("building", "b9"));
    assert_eq!(client.delete_devices(&none).await.unwrap().deleted, 0);

    let b1 = Selection::new().devices(Selector::attribute("building", "b1"));
    assert_eq!(client.delete_devices(&b1).await.unwrap().deleted, 2);
}

#[tokio::test]
async fn test_list_devices_pages() {
    let (_, client) = setup(1).await;
    client.create_device(&Device::new("other")).await.unwrap();

    let all = client
        .list_devices(&Selection::new().devices(Selector::All))
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(
        all.iter().map(|d| d.key.as_str()).collect::<Vec<_>>(),
        vec!["device1", "device2", "other"]
    );

    let b1 = client
        .list_devices(&Selection::new().devices(Selector::attribute("building", "b1")))
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(b1.len(), 2);
}

// ============================================================================
// Writes
// ============================================================================

#[tokio::test]
async fn test_write_success() {
    let (_, client) = setup(10).await;

    let status = client
        .write_device("device1", start(), [("sensor1", 4.0), ("sensor2", 2.0)])
        .await
        .unwrap();
    assert!(status.is_success());
    assert_eq!(status.failures().count(), 0);
}

#[tokio::test]
async fn test_write_partial_failure() {
    let (server, client) = setup(10).await;
    server.reject_writes_to("device2");

    let write = BulkWrite::new()
        .with("device1", "sensor1", DataPoint::new(start(), 1.0))
        .with("device2", "sensor1", DataPoint::new(start(), 2.0));
    let status = client.write_bulk(write).await.unwrap();

    assert!(status.is_partial_success());
    assert!(!status.is_success());
    assert_eq!(
        status.failures().collect::<Vec<_>>(),
        vec![("device2", "device2 is read-only")]
    );

    // device1's point was still committed
    let rows = client
        .read_all(
            &Selection::device_key("device1"),
            start(),
            start() + Duration::days(1),
            &Pipeline::new(),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_write_total_failure() {
    let (server, client) = setup(10).await;
    server.reject_writes_to("device1");

    let write = BulkWrite::new().with("device1", "sensor1", DataPoint::new(start(), 1.0));
    let status = client.write_bulk(write).await.unwrap();
    assert_eq!(status.outcome(), WriteOutcome::Failure);
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn test_streamed_and_buffered_reads_agree() {
    let (_, client) = setup(3).await;
    write_series(&client, "device1", 10).await;
    write_series(&client, "device2", 7).await;

    let sel = Selection::new().devices(Selector::All);
    let end = start() + Duration::days(1);

    let buffered = client.read_all(&sel, start(), end, &Pipeline::new()).await.unwrap();

    let mut streamed = Vec::new();
    let mut cursor = client.read(&sel, start(), end, &Pipeline::new()).unwrap();
    while let Some(row) = cursor.next().await {
        streamed.push(row.unwrap());
    }

    assert_eq!(buffered.len(), 10);
    assert_eq!(tuples(&buffered), tuples(&streamed));
    assert!(buffered.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
}

#[tokio::test]
async fn test_read_range_is_half_open() {
    let (_, client) = setup(4).await;
    write_series(&client, "device1", 10).await;

    let rows = client
        .read_all(
            &Selection::device_key("device1"),
            start() + Duration::minutes(2),
            start() + Duration::minutes(5),
            &Pipeline::new(),
        )
        .await
        .unwrap();

    let times: Vec<_> = rows.iter().map(Row::timestamp).collect();
    assert_eq!(
        times,
        vec![
            start() + Duration::minutes(2),
            start() + Duration::minutes(3),
            start() + Duration::minutes(4),
        ]
    );
}

#[tokio::test]
async fn test_read_without_pipeline_returns_raw_values() {
    let (server, client) = setup(10).await;
    client
        .write_device("device1", start(), [("sensor1", 4.0), ("sensor2", 2.0)])
        .await
        .unwrap();

    let rows = client
        .read_all(
            &Selection::device_key("device1"),
            start(),
            start() + Duration::days(1),
            &Pipeline::new(),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value("device1", "sensor1"), Some(4.0));
    assert_eq!(rows[0].value("device1", "sensor2"), Some(2.0));
    assert_eq!(rows[0].value("device1", "mean"), None);
    assert!(server.requests("/v2/read")[0].get("fold").is_none());
}

#[tokio::test]
async fn test_read_sends_pipeline_in_order() {
    let (server, client) = setup(10).await;
    server.serve_fold_rows(vec![Row::new(start()).with_value("device1", "mean", 6.0)]);

    let pipeline = Pipeline::new()
        .rollup(Fold::Sum, "1day", start())
        .aggregate(Fold::Mean);
    let rows = client
        .read_all(
            &Selection::device_key("device1"),
            start(),
            start() + Duration::days(1),
            &pipeline,
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].timestamp(), start());
    assert_eq!(rows[0].value("device1", "mean"), Some(6.0));

    let body = &server.requests("/v2/read")[0];
    assert_eq!(
        body["fold"]["functions"],
        json!([
            {"name": "rollup", "arguments": ["sum", "1day", "2024-01-01T00:00:00Z"]},
            {"name": "aggregation", "arguments": ["mean"]}
        ])
    );
}

#[tokio::test]
async fn test_dropping_cursor_stops_fetching() {
    let (server, client) = setup(2).await;
    write_series(&client, "device1", 10).await;

    let mut cursor = client
        .read(
            &Selection::device_key("device1"),
            start(),
            start() + Duration::days(1),
            &Pipeline::new(),
        )
        .unwrap();
    cursor.next().await.unwrap().unwrap();
    drop(cursor);

    assert_eq!(server.requests("/v2/read").len(), 1);
}

#[tokio::test]
async fn test_latest() {
    let (_, client) = setup(10).await;
    write_series(&client, "device1", 5).await;

    let rows = client
        .latest(&Selection::device_key("device1"), &Pipeline::new())
        .unwrap()
        .collect_all()
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].timestamp(), start() + Duration::minutes(4));
    assert_eq!(rows[0].value("device1", "sensor1"), Some(4.0));
    assert_eq!(rows[0].value("device1", "sensor2"), Some(40.0));
}

#[tokio::test]
async fn test_delete_datapoints() {
    let (_, client) = setup(10).await;
    write_series(&client, "device1", 10).await;

    let summary = client
        .delete_datapoints(
            "device1",
            "sensor1",
            start(),
            start() + Duration::minutes(4),
        )
        .await
        .unwrap();
    assert_eq!(summary.deleted, 4);

    let again = client
        .delete_datapoints("device1", "sensor1", start(), start() + Duration::minutes(4))
        .await
        .unwrap();
    assert_eq!(again.deleted, 0);
}

#[tokio::test]
async fn test_latest_without_data_is_empty() {
    let (_, client) = setup(10).await;
    let result = client
        .single(
            &Selection::device_key("device1"),
            tempo_stream::SingleFunction::Latest,
            &Pipeline::new(),
        )
        .unwrap()
        .collect_all()
        .await;
    assert!(result.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_missing_device_is_error() {
    // Only GET and DELETE normalize 404; an update of a missing device fails.
    let err = Client::from_shared(FakeServer::new(1))
        .update_device(&Device::new("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnexpectedStatus { status: 404, .. }));
}
