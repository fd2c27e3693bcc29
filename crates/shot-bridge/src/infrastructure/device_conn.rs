//! TCP client for the launch monitor's newline-delimited JSON API.
//!
//! [`OpenConnectClient`] implements [`DeviceSource`]:
//!
//! - `connect` opens the socket (bounded by a timeout) and splits it into a
//!   read half, consumed by `run`, and a write half shared by the heartbeat
//!   task and `send_shot`.
//! - `run` feeds every read into a [`LineDecoder`] and turns shot and status
//!   frames into [`DeviceEvent`]s for the registered callback.
//! - A `Code: 200` reply to a forwarded shot fires the shot-success callback.
//!
//! All methods must be called from the same tokio runtime (the device thread's
//! runtime), because the socket is registered with that runtime's reactor.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use shot_core::protocol::messages::{ResponseFrame, ShotFrame, CODE_PLAYER_INFO};
use shot_core::{encode_frame, DeviceEvent, DeviceFrame, LineDecoder, ShotEvent};

use crate::application::device::{
    DeviceError, DeviceSource, EventCallback, RunOutcome, ShotSuccessCallback,
};
use crate::domain::config::BridgeConfig;

const READ_BUF_SIZE: usize = 4096;

type SharedWriter = Arc<Mutex<Option<OwnedWriteHalf>>>;

/// Launch-monitor client speaking the Open Connect JSON line protocol.
pub struct OpenConnectClient {
    addr: SocketAddr,
    device_id: String,
    connect_timeout: Duration,
    write_timeout: Duration,
    max_line: usize,
    connected: AtomicBool,
    shot_number: Arc<AtomicU64>,
    /// Forwarded shots still waiting for a `Code: 200` reply.
    pending_acks: AtomicU64,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: SharedWriter,
    heartbeat: std::sync::Mutex<Option<JoinHandle<()>>>,
    on_event: RwLock<Option<EventCallback>>,
    on_shot_success: RwLock<Option<ShotSuccessCallback>>,
}

impl std::fmt::Debug for OpenConnectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenConnectClient")
            .field("addr", &self.addr)
            .field("device_id", &self.device_id)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl OpenConnectClient {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            addr: config.device_addr,
            device_id: config.device_id.clone(),
            connect_timeout: config.connect_timeout,
            write_timeout: config.send_timeout,
            max_line: config.max_message_size,
            connected: AtomicBool::new(false),
            shot_number: Arc::new(AtomicU64::new(0)),
            pending_acks: AtomicU64::new(0),
            reader: Mutex::new(None),
            writer: Arc::new(Mutex::new(None)),
            heartbeat: std::sync::Mutex::new(None),
            on_event: RwLock::new(None),
            on_shot_success: RwLock::new(None),
        }
    }

    fn stop_heartbeat(&self) {
        let handle = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn emit(&self, event: DeviceEvent) {
        let callback = self
            .on_event
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(cb) => cb(event),
            None => trace!("no event callback registered; dropping device event"),
        }
    }

    fn handle_frame(&self, frame: DeviceFrame) {
        match frame {
            DeviceFrame::Shot(f) => match f.to_event() {
                Some(shot) => self.emit(DeviceEvent::Shot(shot)),
                None => debug!("shot frame #{} carried no ball data", f.shot_number),
            },
            DeviceFrame::Heartbeat(_) => trace!("device heartbeat"),
            DeviceFrame::Status(s) => self.emit(DeviceEvent::Status(s.to_event())),
            DeviceFrame::Response(r) => self.handle_response(&r),
        }
    }

    fn handle_response(&self, response: &ResponseFrame) {
        if response.is_shot_accepted() {
            let was_pending = self
                .pending_acks
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok();
            if !was_pending {
                trace!("device acknowledged heartbeat");
                return;
            }
            info!("device accepted shot");
            let callback = self
                .on_shot_success
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(cb) = callback {
                cb();
            }
        } else if response.code == CODE_PLAYER_INFO {
            debug!("device player info: {}", response.message);
        } else {
            warn!(
                "device replied with code {}: {}",
                response.code, response.message
            );
        }
    }
}

async fn write_frame(
    writer: &Mutex<Option<OwnedWriteHalf>>,
    bytes: &[u8],
    write_timeout: Duration,
) -> Result<(), DeviceError> {
    let mut guard = writer.lock().await;
    let Some(w) = guard.as_mut() else {
        return Err(DeviceError::NotConnected);
    };
    timeout(write_timeout, w.write_all(bytes))
        .await
        .map_err(|_| DeviceError::Timeout(write_timeout))??;
    Ok(())
}

#[async_trait]
impl DeviceSource for OpenConnectClient {
    async fn connect(&self) -> bool {
        info!("connecting to launch monitor at {}", self.addr);
        let stream = match timeout(self.connect_timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                warn!("cannot reach launch monitor at {}: {e}", self.addr);
                return false;
            }
            Err(_) => {
                warn!(
                    "connecting to launch monitor at {} timed out after {:?}",
                    self.addr, self.connect_timeout
                );
                return false;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {e}");
        }

        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(read_half);
        *self.writer.lock().await = Some(write_half);
        self.pending_acks.store(0, Ordering::Release);
        self.set_connected(true);
        info!("connected to launch monitor at {}", self.addr);
        true
    }

    fn start_heartbeat(&self, interval: Duration) {
        self.stop_heartbeat();

        let writer = Arc::clone(&self.writer);
        let shot_number = Arc::clone(&self.shot_number);
        let device_id = self.device_id.clone();
        let write_timeout = self.write_timeout;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let frame = ShotFrame::heartbeat(&device_id, shot_number.load(Ordering::Acquire));
                let bytes = match encode_frame(&frame) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!("cannot encode heartbeat: {e}");
                        break;
                    }
                };
                if let Err(e) = write_frame(&writer, &bytes, write_timeout).await {
                    warn!("heartbeat write failed, stopping heartbeat: {e}");
                    break;
                }
                trace!("heartbeat sent");
            }
        });

        *self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!("heartbeat started every {interval:?}");
    }

    async fn send_shot(&self, shot: ShotEvent) -> Result<(), DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        let number = self.shot_number.fetch_add(1, Ordering::AcqRel) + 1;
        let bytes = encode_frame(&ShotFrame::from_event(&self.device_id, number, &shot))?;
        self.pending_acks.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = write_frame(&self.writer, &bytes, self.write_timeout).await {
            let _ = self
                .pending_acks
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
            return Err(e);
        }
        debug!("forwarded shot #{number} to device");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    fn set_on_event(&self, callback: EventCallback) {
        *self.on_event.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn set_on_shot_success(&self, callback: ShotSuccessCallback) {
        *self
            .on_shot_success
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    async fn run(&self, cancel: CancellationToken) -> RunOutcome {
        let Some(mut reader) = self.reader.lock().await.take() else {
            debug!("run called without an open connection");
            self.set_connected(false);
            return RunOutcome::Disconnected;
        };

        let mut decoder = LineDecoder::new(self.max_line);
        let mut buf = [0u8; READ_BUF_SIZE];

        let outcome = loop {
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => break RunOutcome::Cancelled,
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        warn!("launch monitor closed the connection");
                        break RunOutcome::Disconnected;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        warn!("launch monitor read error: {e}");
                        break RunOutcome::Disconnected;
                    }
                },
            };

            decoder.push(&buf[..n]);
            while let Some(result) = decoder.next_frame() {
                match result {
                    Ok(frame) => self.handle_frame(frame),
                    Err(e) => warn!("ignoring bad device line: {e}"),
                }
            }
        };

        if outcome == RunOutcome::Disconnected {
            self.set_connected(false);
        }
        outcome
    }

    async fn shutdown(&self) {
        self.stop_heartbeat();
        self.set_connected(false);
        self.reader.lock().await.take();
        if let Some(mut w) = self.writer.lock().await.take() {
            if let Err(e) = w.shutdown().await {
                debug!("device socket shutdown: {e}");
            }
        }
        debug!("device connection closed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, BridgeConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = BridgeConfig {
            device_addr: listener.local_addr().unwrap(),
            connect_timeout: Duration::from_secs(1),
            send_timeout: Duration::from_secs(1),
            ..BridgeConfig::default()
        };
        (listener, config)
    }

    #[tokio::test]
    async fn test_connect_fails_when_nothing_listens() {
        // Arrange: grab a free port, then close the listener
        let (l, config) = listener().await;
        drop(l);
        let client = OpenConnectClient::new(&config);

        // Act / Assert
        assert!(!client.connect().await);
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_send_shot_requires_connection() {
        let (_l, config) = listener().await;
        let client = OpenConnectClient::new(&config);

        let result = client
            .send_shot(ShotEvent::new(100.0, 0.0, 2500.0, 0.0, 12.0))
            .await;

        assert!(matches!(result, Err(DeviceError::NotConnected)));
    }

    #[tokio::test]
    async fn test_inbound_shot_and_status_reach_callback() {
        // Arrange
        let (l, config) = listener().await;
        let client = Arc::new(OpenConnectClient::new(&config));
        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        client.set_on_event(Arc::new(move |ev: DeviceEvent| sink.lock().unwrap().push(ev)));

        let device = tokio::spawn(async move {
            let (mut sock, _) = l.accept().await.unwrap();
            sock.write_all(
                b"{\"ShotNumber\":1,\"BallData\":{\"Speed\":150.2,\"SpinAxis\":3.0,\"TotalSpin\":3100.0,\"HLA\":-1.0,\"VLA\":11.0}}\n",
            )
            .await
            .unwrap();
            sock.write_all(
                b"not json\n{\"type\":\"status\",\"uptime_seconds\":60,\"firmware_version\":\"3.1\",\"shot_count\":7}\n",
            )
            .await
            .unwrap();
            // closing the socket ends `run`
        });

        // Act
        assert!(client.connect().await);
        let outcome = client.run(CancellationToken::new()).await;
        device.await.unwrap();

        // Assert
        assert_eq!(outcome, RunOutcome::Disconnected);
        assert!(!client.is_connected());
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        match &events[0] {
            DeviceEvent::Shot(s) => {
                assert_eq!(s.ball_speed, 150.2);
                assert_eq!(s.vla, 11.0);
            }
            other => panic!("expected shot, got {other:?}"),
        }
        assert!(matches!(&events[1], DeviceEvent::Status(s) if s.shot_count == 7));
    }

    #[tokio::test]
    async fn test_send_shot_writes_frame_and_ack_fires_success() {
        // Arrange
        let (l, config) = listener().await;
        let client = Arc::new(OpenConnectClient::new(&config));
        let acks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&acks);
        client.set_on_shot_success(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let device = tokio::spawn(async move {
            let (sock, _) = l.accept().await.unwrap();
            let (rd, mut wr) = sock.into_split();
            let mut lines = BufReader::new(rd).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            wr.write_all(b"{\"Code\":200,\"Message\":\"Shot received successfully\"}\n")
                .await
                .unwrap();
            line
        });

        assert!(client.connect().await);
        let cancel = CancellationToken::new();
        let runner = {
            let client = Arc::clone(&client);
            let cancel = cancel.clone();
            tokio::spawn(async move { client.run(cancel).await })
        };

        // Act
        client
            .send_shot(ShotEvent::new(120.0, 30.0, 950.0, 2.5, 15.0))
            .await
            .unwrap();
        let line = device.await.unwrap();

        // Assert: outbound frame carries decomposed spin
        let v: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["DeviceID"], "Shot Bridge 1.0");
        assert_eq!(v["ShotNumber"], 1);
        assert_eq!(v["BallData"]["BackSpin"], 823.0);
        assert_eq!(v["BallData"]["SideSpin"], 475.0);
        assert_eq!(v["ShotDataOptions"]["IsHeartBeat"], false);

        tokio::time::timeout(Duration::from_secs(2), async {
            while acks.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("shot-success callback fires");

        cancel.cancel();
        let _ = runner.await.unwrap();
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_heartbeat_writes_keepalive_frames_until_shutdown() {
        let (l, config) = listener().await;
        let client = OpenConnectClient::new(&config);

        let device = tokio::spawn(async move {
            let (sock, _) = l.accept().await.unwrap();
            let mut lines = BufReader::new(sock).lines();
            let mut frames = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                frames.push(line);
            }
            frames
        });

        assert!(client.connect().await);
        client.start_heartbeat(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(110)).await;
        client.shutdown().await;

        let frames = tokio::time::timeout(Duration::from_secs(2), device)
            .await
            .unwrap()
            .unwrap();
        assert!(frames.len() >= 2, "got {} heartbeat(s)", frames.len());
        let v: Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(v["ShotDataOptions"]["IsHeartBeat"], true);
        assert!(v.get("BallData").is_none());
        assert!(client.heartbeat.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_returns_cancelled_on_token() {
        let (l, config) = listener().await;
        let client = OpenConnectClient::new(&config);
        let _device = tokio::spawn(async move {
            let (sock, _) = l.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(sock);
        });
        assert!(client.connect().await);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = client.run(cancel).await;

        assert_eq!(outcome, RunOutcome::Cancelled);
    }
}
