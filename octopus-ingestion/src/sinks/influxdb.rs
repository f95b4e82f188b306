use std::{collections::BTreeMap, sync::Arc, time::Duration};

use reqwest::{header::CONTENT_TYPE, StatusCode};
use tokio::{sync::mpsc, task::JoinHandle};

use super::line_protocol::Point;
use crate::config::{InfluxDbConfig, SinkConfig};

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("InfluxDB write request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("InfluxDB rejected write with HTTP {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("write session writer is gone: {0}")]
    WriterGone(String),
}

/// Writes points to an InfluxDB v2 bucket through the HTTP write API.
///
/// Points are not sent directly: [`InfluxDbSink::open_session`] returns a
/// buffered [`WriteSession`] whose writer task posts a batch every
/// `batch_size` points and the remainder on [`WriteSession::close`].
#[derive(Clone)]
pub struct InfluxDbSink {
    http: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    token: String,
    default_tags: Arc<BTreeMap<String, String>>,
    batch_size: usize,
    max_retries: u32,
    retry_backoff: Duration,
    channel_capacity: usize,
}

impl InfluxDbSink {
    pub fn new(influxdb: &InfluxDbConfig, sink: &SinkConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            write_url: format!("{}/api/v2/write", influxdb.url.trim_end_matches('/')),
            org: influxdb.org.clone(),
            bucket: influxdb.bucket.clone(),
            token: influxdb.token.clone(),
            default_tags: Arc::new(BTreeMap::new()),
            batch_size: sink.batch_size.max(1),
            max_retries: sink.max_retries,
            retry_backoff: Duration::from_millis(sink.retry_backoff_ms),
            channel_capacity: sink.channel_capacity.max(1),
        }
    }

    /// Tag applied to every point written through this sink.
    pub fn with_default_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.default_tags).insert(key.into(), value.into());
        self
    }

    pub fn open_session(&self) -> WriteSession {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let writer = self.clone();
        let handle = tokio::spawn(async move { writer.drain(rx).await });

        WriteSession { tx, handle }
    }

    fn encode_batch(&self, batch: &[Point]) -> (String, usize) {
        // Heuristic capacity: ~120 bytes per line.
        let mut body = String::with_capacity(batch.len().saturating_mul(120));
        let mut lines = 0;
        for point in batch {
            if point.write_line(&self.default_tags, &mut body) {
                body.push('\n');
                lines += 1;
            } else {
                tracing::warn!(measurement = point.measurement(), "skipping point without writable fields");
            }
        }
        (body, lines)
    }

    async fn post(&self, body: String) -> Result<(), SinkError> {
        let response = self
            .http
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected { status, body })
    }

    async fn flush_batch(&self, batch: &[Point]) -> Result<usize, SinkError> {
        let (body, lines) = self.encode_batch(batch);
        if lines == 0 {
            return Ok(0);
        }

        let mut attempt: u32 = 0;
        loop {
            match self.post(body.clone()).await {
                Ok(()) => {
                    metrics::counter!("influxdb_points_written_total").increment(lines as u64);
                    tracing::debug!(points = lines, bytes = body.len(), "InfluxDB batch written");
                    return Ok(lines);
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        "InfluxDB write failed, retrying with backoff"
                    );
                    metrics::counter!("influxdb_write_retry_total").increment(1);
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, points = lines, "InfluxDB write failed, giving up");
                    metrics::counter!("influxdb_sink_errors_total").increment(1);
                    return Err(e);
                }
            }
        }
    }

    /// Writer task: buffer until `batch_size`, flush, repeat until every
    /// sender is dropped. A failed batch is dropped; the first error is
    /// reported once the channel is drained.
    async fn drain(self, mut rx: mpsc::Receiver<Point>) -> Result<usize, SinkError> {
        let mut buffer: Vec<Point> = Vec::with_capacity(self.batch_size);
        let mut written = 0;
        let mut first_error: Option<SinkError> = None;

        loop {
            let point = rx.recv().await;
            let done = point.is_none();
            if let Some(point) = point {
                buffer.push(point);
            }

            if buffer.len() >= self.batch_size || (done && !buffer.is_empty()) {
                match self.flush_batch(&buffer).await {
                    Ok(n) => written += n,
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
                buffer.clear();
            }

            if done {
                break;
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }
}

/// Per-cycle buffered channel of points into the sink.
///
/// `write` takes `&self`, so one session can be shared by concurrent
/// producers. Nothing is guaranteed to reach the database until `close`.
pub struct WriteSession {
    tx: mpsc::Sender<Point>,
    handle: JoinHandle<Result<usize, SinkError>>,
}

impl WriteSession {
    pub async fn write(&self, point: Point) -> Result<(), SinkError> {
        self.tx
            .send(point)
            .await
            .map_err(|_| SinkError::WriterGone("session channel closed".to_string()))
    }

    /// Flush everything still buffered and return the number of points
    /// written during the session.
    pub async fn close(self) -> Result<usize, SinkError> {
        drop(self.tx);
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(SinkError::WriterGone(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sink_for(server: &MockServer, batch_size: usize, max_retries: u32) -> InfluxDbSink {
        let influxdb = InfluxDbConfig {
            url: server.uri(),
            token: "influx-token".to_string(),
            org: "home".to_string(),
            bucket: "energy".to_string(),
        };
        let sink = SinkConfig {
            batch_size,
            max_retries,
            retry_backoff_ms: 1,
            ..SinkConfig::default()
        };
        InfluxDbSink::new(&influxdb, &sink).with_default_tag("app", "octopus-energy-consumption-metrics")
    }

    fn reading(consumption: f64) -> Point {
        Point::new("electricity", datetime!(2024-01-01 00:00:00 UTC)).float_field("consumption", consumption)
    }

    async fn write_bodies(server: &MockServer) -> Vec<String> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == "/api/v2/write")
            .map(|r| String::from_utf8_lossy(&r.body).into_owned())
            .collect()
    }

    #[tokio::test]
    async fn close_flushes_buffered_points_with_default_tag() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/write"))
            .and(query_param("org", "home"))
            .and(query_param("bucket", "energy"))
            .and(query_param("precision", "ns"))
            .and(header("Authorization", "Token influx-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let session = sink_for(&server, 100, 0).open_session();
        session.write(reading(2.5)).await.unwrap();
        session.write(reading(0.5)).await.unwrap();

        // Nothing is transmitted before close.
        assert!(write_bodies(&server).await.is_empty());

        let written = session.close().await.unwrap();
        assert_eq!(written, 2);

        let bodies = write_bodies(&server).await;
        assert_eq!(bodies.len(), 1);
        let lines: Vec<&str> = bodies[0].lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines
            .iter()
            .all(|l| l.starts_with("electricity,app=octopus-energy-consumption-metrics ")));
    }

    #[tokio::test]
    async fn full_batches_are_sent_before_close() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v2/write"))
            .respond_with(ResponseTemplate::new(204))
            .expect(3)
            .mount(&server)
            .await;

        let session = sink_for(&server, 2, 0).open_session();
        for i in 0..5 {
            session.write(reading(f64::from(i))).await.unwrap();
        }

        assert_eq!(session.close().await.unwrap(), 5);
        let sizes: Vec<usize> = write_bodies(&server).await.iter().map(|b| b.lines().count()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn empty_session_sends_nothing() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let session = sink_for(&server, 10, 0).open_session();
        assert_eq!(session.close().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejected_write_is_reported_on_close() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"code":"unauthorized"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let session = sink_for(&server, 10, 0).open_session();
        session.write(reading(1.0)).await.unwrap();

        match session.close().await {
            Err(SinkError::Rejected { status, body }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert!(body.contains("unauthorized"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_write_is_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let session = sink_for(&server, 10, 2).open_session();
        session.write(reading(1.0)).await.unwrap();
        assert_eq!(session.close().await.unwrap(), 1);
    }
}
