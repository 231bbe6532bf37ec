use std::path::Path;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};

use crate::errors::{LauncherError, Result};

/// Read timeout per chunk, tuned for large file transfers.
const CHUNK_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Progress events are coalesced to at most one per this interval.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);
/// Throughput is sampled over a sliding window of roughly this length so the
/// UI readout reflects current conditions, not a cumulative average.
const SPEED_WINDOW: Duration = Duration::from_secs(1);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferControl {
    Running,
    Paused,
    Cancelled,
}

#[derive(Clone, Copy, Debug)]
pub struct TransferProgress {
    pub downloaded_bytes: i64,
    pub total_bytes: i64,
    pub speed_bps: f64,
    pub progress: f64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TransferResult {
    Completed { downloaded_bytes: i64, total_bytes: i64 },
    Paused { downloaded_bytes: i64, total_bytes: i64 },
    Cancelled,
}

pub struct TransferRequest<'a> {
    pub url: &'a str,
    pub destination: &'a Path,
    pub resume_from: u64,
    pub auth_token: Option<&'a str>,
    /// Bytes per second, 0 = unlimited.
    pub speed_limit_bps: u64,
}

#[derive(Clone)]
pub struct TransferEngine {
    client: reqwest::Client,
}

impl TransferEngine {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    /// Streams `request.url` to `request.destination`, resuming from
    /// `resume_from` when the server honours byte ranges. Progress is pushed
    /// through `progress`; `control` pauses or cancels the stream between
    /// chunks. Redirects are followed by the client with the same headers
    /// re-applied against each new location.
    pub async fn run(
        &self,
        request: TransferRequest<'_>,
        progress: mpsc::Sender<TransferProgress>,
        mut control: watch::Receiver<TransferControl>,
    ) -> Result<TransferResult> {
        let mut offset = request.resume_from;
        if offset > 0 && !request.destination.exists() {
            offset = 0;
        }

        let mut fresh_restart = false;
        let (response, resumed) = loop {
            let mut builder = self
                .client
                .get(request.url)
                .header("Accept", "*/*")
                // Compression would break byte-offset accounting on resume.
                .header("Accept-Encoding", "identity");
            if offset > 0 {
                builder = builder.header("Range", format!("bytes={offset}-"));
            }
            if let Some(token) = request.auth_token {
                builder = builder.header("Cookie", format!("accountToken={token}"));
            }

            let response = builder.send().await.map_err(|err| {
                if err.is_timeout() {
                    LauncherError::Timeout
                } else {
                    LauncherError::Network(err)
                }
            })?;

            let status = response.status().as_u16();
            match status {
                // Range not satisfiable: discard the partial file and restart
                // from byte zero instead of failing the transfer.
                416 if offset > 0 && !fresh_restart => {
                    tracing::warn!(
                        "server rejected range at offset {offset}, restarting fresh: {}",
                        request.url
                    );
                    let _ = tokio::fs::remove_file(request.destination).await;
                    offset = 0;
                    fresh_restart = true;
                }
                200 => {
                    // A 200 against a ranged request means the server ignored
                    // the range; the body is the whole file.
                    if offset > 0 {
                        offset = 0;
                    }
                    break (response, false);
                }
                206 => break (response, true),
                other => return Err(LauncherError::Http(other)),
            }
        };

        let total_bytes = resolve_total_bytes(&response, resumed, offset);

        let mut file = if offset > 0 {
            OpenOptions::new()
                .append(true)
                .open(request.destination)
                .await?
        } else {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(request.destination)
                .await?
        };

        let mut stream = response.bytes_stream();
        let mut downloaded = offset as i64;
        let mut speed_bps = 0.0_f64;
        let mut window_start = Instant::now();
        let mut window_bytes = 0_u64;
        let mut last_emit: Option<Instant> = None;

        loop {
            // Copy the state out so the watch guard is not held across awaits.
            let state = *control.borrow();
            match state {
                TransferControl::Running => {}
                TransferControl::Paused => {
                    file.flush().await?;
                    return Ok(TransferResult::Paused {
                        downloaded_bytes: downloaded,
                        total_bytes,
                    });
                }
                TransferControl::Cancelled => return Ok(TransferResult::Cancelled),
            }

            let next = tokio::select! {
                chunk = tokio::time::timeout(CHUNK_TIMEOUT, stream.next()) => {
                    chunk.map_err(|_| LauncherError::Timeout)?
                }
                _ = control.changed() => continue,
            };

            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|err| {
                if err.is_timeout() {
                    LauncherError::Timeout
                } else {
                    LauncherError::Network(err)
                }
            })?;

            file.write_all(&chunk).await?;
            downloaded += chunk.len() as i64;
            window_bytes += chunk.len() as u64;

            let window_elapsed = window_start.elapsed();
            if window_elapsed >= SPEED_WINDOW {
                speed_bps = window_bytes as f64 / window_elapsed.as_secs_f64();
                if let Some(debt) =
                    throttle_debt(window_bytes, window_elapsed, request.speed_limit_bps)
                {
                    tokio::time::sleep(debt).await;
                }
                window_start = Instant::now();
                window_bytes = 0;
            }

            let due = last_emit.map_or(true, |at| at.elapsed() >= PROGRESS_INTERVAL);
            if due {
                last_emit = Some(Instant::now());
                let _ = progress
                    .send(TransferProgress {
                        downloaded_bytes: downloaded,
                        total_bytes,
                        speed_bps,
                        progress: percentage(downloaded, total_bytes),
                    })
                    .await;
            }
        }

        file.flush().await?;
        let total_bytes = if total_bytes > 0 { total_bytes } else { downloaded };
        let _ = progress
            .send(TransferProgress {
                downloaded_bytes: downloaded,
                total_bytes,
                speed_bps,
                progress: percentage(downloaded, total_bytes),
            })
            .await;

        Ok(TransferResult::Completed {
            downloaded_bytes: downloaded,
            total_bytes,
        })
    }
}

fn percentage(downloaded: i64, total: i64) -> f64 {
    if total > 0 {
        downloaded as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

/// Total size comes from the `Content-Range` total on a 206, otherwise from
/// `Content-Length`; when resuming with only a length, the bytes already on
/// disk are added in.
fn resolve_total_bytes(response: &reqwest::Response, resumed: bool, offset: u64) -> i64 {
    if resumed {
        if let Some(total) = response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
        {
            return total;
        }
    }

    let length = response.content_length().unwrap_or(0) as i64;
    if length == 0 {
        return 0;
    }
    if resumed {
        length + offset as i64
    } else {
        length
    }
}

/// How much longer the current window should have taken at the configured
/// cap. `None` when unlimited or already at/under budget; the caller sleeps
/// off the difference so throughput tracks the cap instead of undershooting.
fn throttle_debt(window_bytes: u64, elapsed: Duration, limit_bps: u64) -> Option<Duration> {
    if limit_bps == 0 {
        return None;
    }
    let budget = Duration::from_secs_f64(window_bytes as f64 / limit_bps as f64);
    budget.checked_sub(elapsed).filter(|debt| !debt.is_zero())
}

/// Parses the total component of `bytes <start>-<end>/<total>`.
fn parse_content_range_total(value: &str) -> Option<i64> {
    let total = value.rsplit('/').next()?;
    total.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    async fn read_request_head(sock: &mut tokio::net::TcpStream) -> String {
        let mut buf = vec![0_u8; 8192];
        let n = sock.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).to_string()
    }

    /// Serves canned HTTP responses, one connection per closure, in order.
    fn spawn_server(
        handlers: Vec<Box<dyn FnOnce(String) -> Vec<u8> + Send>>,
    ) -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let listener = TcpListener::from_std(listener).unwrap();
            for handler in handlers {
                let (mut sock, _) = listener.accept().await.unwrap();
                let head = read_request_head(&mut sock).await;
                let response = handler(head);
                sock.write_all(&response).await.unwrap();
                sock.flush().await.unwrap();
            }
        });
        addr
    }

    fn ok_response(body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn new_control() -> (watch::Sender<TransferControl>, watch::Receiver<TransferControl>) {
        watch::channel(TransferControl::Running)
    }

    #[tokio::test]
    async fn fresh_download_writes_whole_body() {
        let body = b"hello world".to_vec();
        let expected = body.clone();
        let addr = spawn_server(vec![Box::new(move |head: String| {
            assert!(
                !head.to_ascii_lowercase().contains("range:"),
                "fresh download must not send Range"
            );
            ok_response(&body)
        })]);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("payload.zip");
        let engine = TransferEngine::new().unwrap();
        let (progress_tx, mut progress_rx) = mpsc::channel(64);
        let (_control_tx, control_rx) = new_control();

        let result = engine
            .run(
                TransferRequest {
                    url: &format!("http://{addr}/file.zip"),
                    destination: &dest,
                    resume_from: 0,
                    auth_token: None,
                    speed_limit_bps: 0,
                },
                progress_tx,
                control_rx,
            )
            .await
            .unwrap();

        assert_eq!(
            result,
            TransferResult::Completed {
                downloaded_bytes: 11,
                total_bytes: 11
            }
        );
        assert_eq!(std::fs::read(&dest).unwrap(), expected);

        // Progress is monotonic and lands on the total.
        let mut last = 0;
        while let Ok(event) = progress_rx.try_recv() {
            assert!(event.downloaded_bytes >= last);
            last = event.downloaded_bytes;
        }
        assert_eq!(last, 11);
    }

    #[tokio::test]
    async fn resume_sends_range_and_appends() {
        let addr = spawn_server(vec![Box::new(|head: String| {
            assert!(
                head.to_ascii_lowercase().contains("range: bytes=6-"),
                "missing resume range: {head}"
            );
            let body = b"world";
            let mut out = format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes 6-10/11\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .into_bytes();
            out.extend_from_slice(body);
            out
        })]);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("payload.zip");
        std::fs::write(&dest, b"hello ").unwrap();

        let engine = TransferEngine::new().unwrap();
        let (progress_tx, _progress_rx) = mpsc::channel(64);
        let (_control_tx, control_rx) = new_control();

        let result = engine
            .run(
                TransferRequest {
                    url: &format!("http://{addr}/file.zip"),
                    destination: &dest,
                    resume_from: 6,
                    auth_token: None,
                    speed_limit_bps: 0,
                },
                progress_tx,
                control_rx,
            )
            .await
            .unwrap();

        assert_eq!(
            result,
            TransferResult::Completed {
                downloaded_bytes: 11,
                total_bytes: 11
            }
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn range_rejection_restarts_from_zero() {
        let full = b"0123456789".to_vec();
        let addr = spawn_server(vec![
            Box::new(|_head| {
                b"HTTP/1.1 416 Range Not Satisfiable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    .to_vec()
            }),
            Box::new(move |head: String| {
                assert!(
                    !head.to_ascii_lowercase().contains("range:"),
                    "restart must be un-ranged"
                );
                ok_response(&full)
            }),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("payload.zip");
        std::fs::write(&dest, b"stale partial data").unwrap();

        let engine = TransferEngine::new().unwrap();
        let (progress_tx, _progress_rx) = mpsc::channel(64);
        let (_control_tx, control_rx) = new_control();

        let result = engine
            .run(
                TransferRequest {
                    url: &format!("http://{addr}/file.zip"),
                    destination: &dest,
                    resume_from: 18,
                    auth_token: None,
                    speed_limit_bps: 0,
                },
                progress_tx,
                control_rx,
            )
            .await
            .unwrap();

        // Fresh size, not offset-added.
        assert_eq!(
            result,
            TransferResult::Completed {
                downloaded_bytes: 10,
                total_bytes: 10
            }
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn http_error_status_fails_the_transfer() {
        let addr = spawn_server(vec![Box::new(|_head| {
            b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_vec()
        })]);

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("payload.zip");
        let engine = TransferEngine::new().unwrap();
        let (progress_tx, _progress_rx) = mpsc::channel(64);
        let (_control_tx, control_rx) = new_control();

        let err = engine
            .run(
                TransferRequest {
                    url: &format!("http://{addr}/file.zip"),
                    destination: &dest,
                    resume_from: 0,
                    auth_token: None,
                    speed_limit_bps: 0,
                },
                progress_tx,
                control_rx,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::Http(503)));
    }

    #[tokio::test]
    async fn pause_keeps_partial_bytes() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let listener = TcpListener::from_std(listener).unwrap();
            let (mut sock, _) = listener.accept().await.unwrap();
            let _ = read_request_head(&mut sock).await;
            let head =
                "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n";
            sock.write_all(head.as_bytes()).await.unwrap();
            sock.write_all(&[b'x'; 100]).await.unwrap();
            sock.flush().await.unwrap();
            // Hold the connection open; the pause signal must end the stream.
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("payload.zip");
        let engine = TransferEngine::new().unwrap();
        let (progress_tx, _progress_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = new_control();

        let run = tokio::spawn({
            let dest = dest.clone();
            async move {
                engine
                    .run(
                        TransferRequest {
                            url: &format!("http://{addr}/file.zip"),
                            destination: &dest,
                            resume_from: 0,
                            auth_token: None,
                            speed_limit_bps: 0,
                        },
                        progress_tx,
                        control_rx,
                    )
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        control_tx.send(TransferControl::Paused).unwrap();

        let result = run.await.unwrap().unwrap();
        match result {
            TransferResult::Paused {
                downloaded_bytes,
                total_bytes,
            } => {
                assert!(downloaded_bytes > 0);
                assert_eq!(total_bytes, 1000);
                assert_eq!(
                    std::fs::metadata(&dest).unwrap().len() as i64,
                    downloaded_bytes
                );
            }
            other => panic!("expected pause, got {other:?}"),
        }
    }

    #[test]
    fn throttle_sleeps_only_the_overshoot() {
        // 8000 bytes at a 4000 B/s cap should take 2s; after 1s the debt is 1s.
        assert_eq!(
            throttle_debt(8000, Duration::from_secs(1), 4000),
            Some(Duration::from_secs(1))
        );
        // At or under budget there is nothing to sleep off.
        assert_eq!(throttle_debt(2000, Duration::from_secs(1), 4000), None);
        assert_eq!(throttle_debt(4000, Duration::from_secs(1), 4000), None);
        // Unlimited.
        assert_eq!(throttle_debt(8000, Duration::from_secs(1), 0), None);
    }

    #[test]
    fn content_range_total_parses() {
        assert_eq!(parse_content_range_total("bytes 400-999/1000"), Some(1000));
        assert_eq!(parse_content_range_total("bytes 0-0/1"), Some(1));
        assert_eq!(parse_content_range_total("bytes 0-10/*"), None);
    }
}
