//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

use trajectory_guard::engine::{
    Analysis, DetectionEngine, EngineError, EngineFactory, Trajectory, Verdict,
};
use trajectory_guard::{HttpServer, Phase, ProcessState, ServiceConfig, ServiceError, Shutdown};

/// Origin allowed by [`test_config`].
pub const ALLOWED_ORIGIN: &str = "https://a.example";

/// Counters shared between a test and the engine it installs.
#[derive(Debug, Clone, Default)]
pub struct EngineProbe {
    pub releases: Arc<AtomicUsize>,
    pub drops: Arc<AtomicUsize>,
    pub analyses: Arc<AtomicUsize>,
    /// Completed analyses at the moment `release` ran.
    pub analyses_at_release: Arc<AtomicUsize>,
}

impl EngineProbe {
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    pub fn analyses(&self) -> usize {
        self.analyses.load(Ordering::SeqCst)
    }

    pub fn analyses_at_release(&self) -> usize {
        self.analyses_at_release.load(Ordering::SeqCst)
    }
}

/// Engine that records how it is used. Accepts any trajectory of three or
/// more samples.
pub struct CountingEngine {
    pub id: Uuid,
    probe: EngineProbe,
    fail_release: bool,
    delay: Duration,
}

impl DetectionEngine for CountingEngine {
    fn instance_id(&self) -> Uuid {
        self.id
    }

    fn min_samples(&self) -> usize {
        3
    }

    fn analyze(&self, trajectory: &Trajectory) -> Result<Analysis, EngineError> {
        if trajectory.len() < self.min_samples() {
            return Err(EngineError::InsufficientSamples {
                got: trajectory.len(),
                required: self.min_samples(),
            });
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.probe.analyses.fetch_add(1, Ordering::SeqCst);
        Ok(Analysis {
            error_mean: 0.5,
            interval_cv: 0.25,
            verdict: Verdict::Human,
            samples: trajectory.len(),
        })
    }

    fn release(&self) -> Result<(), EngineError> {
        self.probe
            .analyses_at_release
            .store(self.probe.analyses(), Ordering::SeqCst);
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(EngineError::Cleanup("device busy".into()));
        }
        Ok(())
    }
}

impl Drop for CountingEngine {
    fn drop(&mut self) {
        self.probe.drops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn counting_factory(probe: &EngineProbe) -> Box<dyn EngineFactory> {
    counting_factory_with(probe, false)
}

pub fn counting_factory_with(probe: &EngineProbe, fail_release: bool) -> Box<dyn EngineFactory> {
    build_counting(probe, fail_release, Duration::ZERO)
}

/// Engine whose `analyze` blocks its thread for `delay`.
pub fn slow_factory(probe: &EngineProbe, delay: Duration) -> Box<dyn EngineFactory> {
    build_counting(probe, false, delay)
}

fn build_counting(probe: &EngineProbe, fail_release: bool, delay: Duration) -> Box<dyn EngineFactory> {
    let probe = probe.clone();
    Box::new(move || -> Result<Box<dyn DetectionEngine>, EngineError> {
        Ok(Box::new(CountingEngine {
            id: Uuid::new_v4(),
            probe,
            fail_release,
            delay,
        }))
    })
}

/// Constructor that blocks until `gate` is dropped, then fails.
pub fn gated_factory(gate: std::sync::mpsc::Receiver<()>) -> Box<dyn EngineFactory> {
    Box::new(move || -> Result<Box<dyn DetectionEngine>, EngineError> {
        let _ = gate.recv();
        Err(EngineError::InvalidConfig("construction abandoned".into()))
    })
}

pub fn failing_factory() -> Box<dyn EngineFactory> {
    Box::new(|| -> Result<Box<dyn DetectionEngine>, EngineError> {
        Err(EngineError::InvalidConfig("model weights missing".into()))
    })
}

pub fn panicking_factory() -> Box<dyn EngineFactory> {
    Box::new(|| -> Result<Box<dyn DetectionEngine>, EngineError> {
        panic!("model file truncated")
    })
}

/// Defaults with one allowed origin.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.pipeline.allowed_origins = [ALLOWED_ORIGIN.to_string()].into_iter().collect();
    config
}

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ProcessState>,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), ServiceError>>,
}

impl TestServer {
    pub async fn start(config: ServiceConfig, factory: Box<dyn EngineFactory>) -> Self {
        Self::start_server(HttpServer::new(config, factory)).await
    }

    pub async fn start_server(server: HttpServer) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = server.process_state();
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(server.run(listener, shutdown.signalled()));

        Self {
            addr,
            state,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait until startup has published `phase`.
    pub async fn wait_for(&self, phase: Phase) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.state.phase() != phase {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("server never reached {phase}"));
    }

    /// Trigger graceful shutdown and wait for `run` to return.
    pub async fn stop(self) -> Result<(), ServiceError> {
        self.shutdown.trigger();
        self.join().await
    }

    pub async fn join(self) -> Result<(), ServiceError> {
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// JSON body of `n` samples with irregular timing and a wobbling path.
pub fn trajectory_json(n: usize) -> Value {
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let mut t = 0i64;
    let points: Vec<Value> = (0..n)
        .map(|i| {
            t += 9 + ((i * 7) % 13) as i64;
            let wobble = if i % 2 == 0 { 2.5 } else { -2.5 };
            json!({
                "timestamp": (base + chrono::Duration::milliseconds(t)).to_rfc3339(),
                "x": i as f64 * 3.0,
                "y": i as f64 * 1.5 + wobble,
            })
        })
        .collect();
    Value::Array(points)
}
