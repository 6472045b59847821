//! `Engine`: runs the listeners, the resolver worker pool and the hub.
//!
//! ```text
//! LogListener (per watched program, Tokio task)
//!       │  filter match
//!       ▼
//! bounded Job queue ──► resolver workers (N tasks)
//!                          │ resolve → extract → enrich
//!                          ▼
//!                       Hub::publish ──► cache + every open consumer
//! ```

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use mintfeed_core::error::StreamError;
use mintfeed_core::extract::extract;
use mintfeed_core::transport::RpcTransport;
use mintfeed_core::types::LogNotification;
use mintfeed_hub::{spawn_liveness, Hub, HubServer};
use mintfeed_rpc::{
    DasDescriptorSource, HttpClientConfig, HttpRpcClient, MetadataEnricher, TransactionResolver,
    WsClientConfig, WsRpcClient,
};

use crate::config::{StreamConfig, WatchConfig};
use crate::error::{ConfigError, EngineError};
use crate::listener::LogListener;
use crate::ws_listener::SolanaLogListener;

/// One matched signature waiting for resolution.
#[derive(Debug, Clone)]
pub struct Job {
    pub signature: String,
    pub watch: Arc<WatchConfig>,
}

/// Counters for the whole pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineMetrics {
    pub notifications: u64,
    pub skipped_failed: u64,
    pub matched: u64,
    pub dropped_queue_full: u64,
    pub resolved: u64,
    pub resolve_failed: u64,
    pub extract_missing: u64,
    pub enrich_failed: u64,
    pub published: u64,
}

/// What happened to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Published { mint: String, delivered: usize },
    Unresolved,
    NoRecord,
    NoMetadata,
    HubClosed,
}

/// Resolve → extract → enrich → publish, for one signature at a time.
pub struct Pipeline {
    resolver: TransactionResolver,
    enricher: MetadataEnricher,
    hub: Arc<Hub>,
    metrics: Arc<Mutex<EngineMetrics>>,
}

impl Pipeline {
    pub fn new(resolver: TransactionResolver, enricher: MetadataEnricher, hub: Arc<Hub>) -> Self {
        Self {
            resolver,
            enricher,
            hub,
            metrics: Arc::new(Mutex::new(EngineMetrics::default())),
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn metrics(&self) -> EngineMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Every failure is local to this job: it is logged, counted and the
    /// event is dropped.
    pub async fn process(&self, job: &Job) -> Outcome {
        let signature = job.signature.as_str();

        let tx = match self.resolver.resolve(signature).await {
            Ok(tx) => {
                self.metrics.lock().unwrap().resolved += 1;
                tx
            }
            Err(e) => {
                tracing::warn!(signature, watch = %job.watch.label, error = %e, "dropping event: transaction unresolved");
                self.metrics.lock().unwrap().resolve_failed += 1;
                return Outcome::Unresolved;
            }
        };

        let Some(record) = extract(&tx, &job.watch.layout) else {
            self.metrics.lock().unwrap().extract_missing += 1;
            return Outcome::NoRecord;
        };

        let mint = record.mint.clone();
        let event = match self.enricher.enrich(record).await {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(signature, mint = %mint, error = %e, "dropping event: no metadata");
                self.metrics.lock().unwrap().enrich_failed += 1;
                return Outcome::NoMetadata;
            }
        };

        match self.hub.publish(event).await {
            Ok(delivered) => {
                self.metrics.lock().unwrap().published += 1;
                tracing::info!(signature, mint = %mint, consumers = delivered, "event published");
                Outcome::Published { mint, delivered }
            }
            Err(e) => {
                tracing::warn!(signature, mint = %mint, error = %e, "dropping event: hub closed");
                Outcome::HubClosed
            }
        }
    }
}

pub struct Engine {
    config: StreamConfig,
    pipeline: Arc<Pipeline>,
    listeners: Vec<(Arc<WatchConfig>, Arc<dyn LogListener>)>,
}

impl Engine {
    pub fn new(config: StreamConfig, pipeline: Pipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
            listeners: Vec::new(),
        }
    }

    /// Build the full pipeline against the node endpoints in `config`:
    /// one shared WebSocket client for every watch, one HTTP client for lookups.
    pub async fn connect(config: StreamConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let ws = Arc::new(
            WsRpcClient::connect(
                config.rpc.ws_url.as_str(),
                WsClientConfig {
                    max_reconnect_attempts: config.rpc.max_reconnect_attempts,
                    ..WsClientConfig::default()
                },
            )
            .await?,
        );
        let http = Arc::new(HttpRpcClient::new(
            config.rpc.http_url.as_str(),
            HttpClientConfig {
                request_timeout: config.rpc.request_timeout(),
            },
        )?);

        let das_url = config
            .metadata
            .das_url
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("metadata.das_url is required".into()))?;
        let das: Arc<dyn RpcTransport> = if das_url == config.rpc.http_url {
            http.clone() as Arc<dyn RpcTransport>
        } else {
            Arc::new(HttpRpcClient::new(
                das_url,
                HttpClientConfig {
                    request_timeout: config.metadata.timeout(),
                },
            )?)
        };

        let resolver = TransactionResolver::new(http.clone(), config.resolver.retry_policy())
            .with_commitment(config.rpc.commitment.as_str());
        let source = DasDescriptorSource::new(das, http.http().clone())
            .with_offchain_json(config.metadata.fetch_offchain_json);
        let enricher = MetadataEnricher::new(Arc::new(source), config.metadata.timeout());
        let hub = Arc::new(Hub::new(config.hub.clone()));

        let mut engine = Engine::new(config.clone(), Pipeline::new(resolver, enricher, hub));
        for watch in &config.watch {
            let listener =
                SolanaLogListener::new(ws.clone(), watch.program.as_str(), config.rpc.commitment.as_str());
            engine.add_listener(watch.clone(), Arc::new(listener));
        }
        Ok(engine)
    }

    pub fn add_listener(&mut self, watch: WatchConfig, listener: Arc<dyn LogListener>) {
        self.listeners.push((Arc::new(watch), listener));
    }

    pub fn hub(&self) -> &Arc<Hub> {
        self.pipeline.hub()
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn metrics(&self) -> EngineMetrics {
        self.pipeline.metrics()
    }

    /// Bind the consumer endpoint at `hub.bind`.
    pub async fn bind(&self) -> Result<HubServer, EngineError> {
        Ok(HubServer::bind(&self.config.hub.bind, self.hub().clone()).await?)
    }

    /// Run until `shutdown` flips to `true` or a subscription is lost.
    ///
    /// Shutdown order: stop listeners, drain in-flight jobs for up to
    /// `shutdown_grace_secs`, then close every consumer connection.
    pub async fn run(
        &self,
        server: HubServer,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        tracing::info!(
            watches = self.listeners.len(),
            workers = self.config.resolver.workers,
            "engine starting"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let server_task = tokio::spawn(server.run(stop_rx.clone()));
        let liveness_task = spawn_liveness(self.hub().clone(), stop_rx.clone());

        let (job_tx, job_rx) = mpsc::channel::<Job>(self.config.resolver.queue_capacity.max(1));
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));

        let mut workers = JoinSet::new();
        for worker in 0..self.config.resolver.workers.max(1) {
            let jobs = job_rx.clone();
            let pipeline = self.pipeline.clone();
            workers.spawn(async move {
                loop {
                    let next = jobs.lock().await.recv().await;
                    let Some(job) = next else { break };
                    pipeline.process(&job).await;
                }
                tracing::debug!(worker, "resolver worker stopped");
            });
        }

        let mut listeners = JoinSet::new();
        for (watch, listener) in &self.listeners {
            listeners.spawn(run_listener(
                watch.clone(),
                listener.clone(),
                job_tx.clone(),
                self.pipeline.metrics.clone(),
                stop_rx.clone(),
            ));
        }
        drop(job_tx);

        let outcome = loop {
            tokio::select! {
                joined = listeners.join_next(), if !listeners.is_empty() => match joined {
                    Some(Ok(Err(e))) => break Err(e),
                    Some(Err(e)) => {
                        break Err(StreamError::SubscriptionFailed {
                            program: "unknown".into(),
                            reason: format!("listener task failed: {e}"),
                        })
                    }
                    _ => {}
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                }
            }
        };

        match &outcome {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::error!(error = %e, "ingestion lost, shutting down"),
        }

        let _ = stop_tx.send(true);
        while listeners.join_next().await.is_some() {}

        let grace = self.config.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(grace_secs = grace.as_secs(), "in-flight jobs still running, aborting");
            workers.shutdown().await;
        }

        self.hub().shutdown().await;
        let _ = server_task.await;
        let _ = liveness_task.await;

        let m = self.metrics();
        tracing::info!(
            notifications = m.notifications,
            matched = m.matched,
            dropped_queue_full = m.dropped_queue_full,
            resolved = m.resolved,
            resolve_failed = m.resolve_failed,
            extract_missing = m.extract_missing,
            enrich_failed = m.enrich_failed,
            published = m.published,
            "engine stopped"
        );

        outcome.map_err(EngineError::from)
    }
}

async fn run_listener(
    watch: Arc<WatchConfig>,
    listener: Arc<dyn LogListener>,
    jobs: mpsc::Sender<Job>,
    metrics: Arc<Mutex<EngineMetrics>>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), StreamError> {
    let mut stream = tokio::select! {
        subscribed = listener.subscribe() => subscribed?,
        _ = stop.changed() => return Ok(()),
    };

    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(notification)) => enqueue(&watch, notification, &jobs, &metrics),
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(StreamError::SubscriptionClosed {
                        program: listener.program().to_string(),
                    })
                }
            },
            _ = stop.changed() => return Ok(()),
        }
    }
}

/// Filter one notification and hand a match to the worker pool without
/// ever waiting on it.
fn enqueue(
    watch: &Arc<WatchConfig>,
    notification: LogNotification,
    jobs: &mpsc::Sender<Job>,
    metrics: &Mutex<EngineMetrics>,
) {
    let mut m = metrics.lock().unwrap();
    m.notifications += 1;

    if notification.failed {
        m.skipped_failed += 1;
        return;
    }
    if !watch.filter.matches(&notification.logs) {
        return;
    }
    m.matched += 1;
    tracing::debug!(watch = %watch.label, signature = %notification.signature, "log pattern matched");

    let job = Job {
        signature: notification.signature,
        watch: watch.clone(),
    };
    match jobs.try_send(job) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(job)) => {
            m.dropped_queue_full += 1;
            tracing::warn!(watch = %watch.label, signature = %job.signature, "resolver queue full, dropping signature");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mintfeed_core::filter::LogFilter;

    fn watch() -> Arc<WatchConfig> {
        Arc::new(WatchConfig {
            filter: LogFilter::any_of(["InitializeMint"]),
            ..WatchConfig::amm_v4_pools()
        })
    }

    fn notification(signature: &str, line: &str, failed: bool) -> LogNotification {
        LogNotification {
            program: "P".into(),
            signature: signature.into(),
            logs: vec![line.into()],
            failed,
        }
    }

    #[test]
    fn only_matching_successful_notifications_are_queued() {
        let (tx, mut rx) = mpsc::channel(4);
        let metrics = Mutex::new(EngineMetrics::default());
        let w = watch();

        enqueue(&w, notification("a", "Program log: Instruction: InitializeMint", false), &tx, &metrics);
        enqueue(&w, notification("b", "Program log: Instruction: Transfer", false), &tx, &metrics);
        enqueue(&w, notification("c", "Program log: Instruction: InitializeMint", true), &tx, &metrics);

        assert_eq!(rx.try_recv().unwrap().signature, "a");
        assert!(rx.try_recv().is_err());
        let m = metrics.into_inner().unwrap();
        assert_eq!((m.notifications, m.matched, m.skipped_failed), (3, 1, 1));
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let metrics = Mutex::new(EngineMetrics::default());
        let w = watch();

        for sig in ["a", "b", "c"] {
            enqueue(&w, notification(sig, "InitializeMint", false), &tx, &metrics);
        }
        let m = metrics.into_inner().unwrap();
        assert_eq!(m.matched, 3);
        assert_eq!(m.dropped_queue_full, 2);
    }
}
