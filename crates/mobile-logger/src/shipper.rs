// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The log shipper.
//!
//! [`LogShipper`] is a cheap, cloneable handle over shared state. The host
//! constructs one, feeds it [`LogEntry`] values (directly or through the
//! convenience wrappers and [`HostHooks`]) and the shipper takes care of
//! batching, delivery and retry.
//!
//! # Lifecycle
//!
//! ```text
//!            start()                 stop()
//!   Stopped ─────────> Running ─────────────> Stopped
//!                         │
//!          flush timer ───┤ every batch_interval
//!          sampler ───────┤ every 30s (capture_performance)
//!          observers ─────┘ one per enabled capture kind
//!
//!   retry loop: every 30s from construction until shutdown()
//! ```
//!
//! # Queue Discipline
//!
//! The queue mutex is only held to push, swap out or re-queue, never across
//! an `.await`. A flush swaps the whole queue out first, so records recorded
//! while a batch is in flight land in the fresh queue and are never sent
//! twice. A failed batch goes back in front of them, in its original order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Map, Value};
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DeliveryMode, ShipperConfig};
use crate::device::{DeviceInfo, DeviceMetricsProvider, SystemMetricsProvider};
use crate::error::ShipperError;
use crate::flusher::{Flusher, HttpTransport, LogTransport};
use crate::identity::{load_or_create_device_id, new_session_id};
use crate::observers::{entry_for_event, HostEvent, HostHooks, Observer, ObserverId, ObserverKind};
use crate::queue::RecordQueue;
use crate::record::{category, LogEntry, LogLevel, LogRecord};
use crate::retry::{spawn_retry_loop, RETRY_INTERVAL};
use crate::store::{FailedLogStore, KeyValueStore};

pub const PERFORMANCE_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

const DEFAULT_CATEGORY: &str = category::EVENT;
const DEFAULT_ACTION: &str = "log";
const DEFAULT_SCREEN: &str = "Unknown";

/// Collaborators a shipper is built from.
pub struct ShipperComponents {
    pub store: Arc<dyn KeyValueStore>,
    /// Defaults to HTTP delivery to the configured endpoint.
    pub transport: Option<Arc<dyn LogTransport>>,
    pub metrics: Arc<dyn DeviceMetricsProvider>,
    pub hooks: Option<Arc<HostHooks>>,
    pub retry_interval: Duration,
}

impl ShipperComponents {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            transport: None,
            metrics: Arc::new(SystemMetricsProvider::default()),
            hooks: None,
            retry_interval: RETRY_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn LogTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn DeviceMetricsProvider>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<HostHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    #[must_use]
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }
}

/// Point-in-time view of a shipper.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipperStatus {
    pub running: bool,
    pub device_id: String,
    pub session_id: String,
    pub session_duration_ms: u64,
    pub interaction_count: u64,
    pub queue_size: usize,
    pub failed_count: usize,
}

#[derive(Default)]
struct Lifecycle {
    running: bool,
    timers: Option<CancellationToken>,
    observers: Vec<ObserverId>,
}

struct Inner {
    config: ShipperConfig,
    device_id: String,
    session_id: String,
    session_start: Instant,
    device_info: DeviceInfo,
    interaction_count: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
    queue: Mutex<RecordQueue>,
    flusher: Flusher,
    failed: Arc<FailedLogStore>,
    store: Arc<dyn KeyValueStore>,
    metrics: Arc<dyn DeviceMetricsProvider>,
    hooks: Option<Arc<HostHooks>>,
    runtime: Handle,
    retry_cancel: CancellationToken,
}

/// Handle to a running or stopped log shipper.
#[derive(Clone)]
pub struct LogShipper {
    inner: Arc<Inner>,
}

impl LogShipper {
    /// Builds a shipper, resolves the device id and spawns the retry loop.
    ///
    /// Starts immediately when `config.auto_start` is set. Must be called from
    /// within a Tokio runtime; background work is spawned onto it.
    pub async fn new(
        config: ShipperConfig,
        components: ShipperComponents,
    ) -> Result<Self, ShipperError> {
        config
            .validate()
            .map_err(|e| ShipperError::InvalidConfig(e.to_string()))?;

        let ShipperComponents {
            store,
            transport,
            metrics,
            hooks,
            retry_interval,
        } = components;

        let transport =
            transport.unwrap_or_else(|| Arc::new(HttpTransport::new(&config)) as Arc<dyn LogTransport>);
        let failed = Arc::new(FailedLogStore::new(Arc::clone(&store)));
        let device_id = load_or_create_device_id(store.as_ref(), metrics.as_ref());
        let session_id = new_session_id();

        let retry_cancel = CancellationToken::new();
        spawn_retry_loop(
            Arc::clone(&transport),
            Arc::clone(&failed),
            retry_interval,
            retry_cancel.clone(),
        );

        info!(
            "SHIPPER | Logger initialized device_id={} session_id={} endpoint={}",
            device_id,
            session_id,
            config.logs_url()
        );

        let shipper = Self {
            inner: Arc::new(Inner {
                device_info: metrics.device_info(),
                queue: Mutex::new(RecordQueue::new(config.max_queue_size)),
                flusher: Flusher::new(transport, Arc::clone(&failed)),
                config,
                device_id,
                session_id,
                session_start: Instant::now(),
                interaction_count: AtomicU64::new(0),
                lifecycle: Mutex::new(Lifecycle::default()),
                failed,
                store,
                metrics,
                hooks,
                runtime: Handle::current(),
                retry_cancel,
            }),
        };

        if shipper.inner.config.auto_start {
            shipper.start()?;
        }
        Ok(shipper)
    }

    /// `Stopped -> Running`. Arms the flush timer, the performance sampler and
    /// the enabled observers, then records `App Started`.
    pub fn start(&self) -> Result<(), ShipperError> {
        let inner = &self.inner;
        let timers = {
            let mut lifecycle = inner.lifecycle();
            if lifecycle.running {
                warn!("SHIPPER | Logger is already running");
                return Err(ShipperError::AlreadyRunning);
            }
            lifecycle.running = true;
            let timers = CancellationToken::new();
            lifecycle.timers = Some(timers.clone());
            lifecycle.observers = inner.register_observers();
            timers
        };

        inner.spawn_flush_timer(timers.clone());
        if inner.config.capture_performance {
            inner.spawn_performance_sampler(timers);
        }
        info!("SHIPPER | Logger started");

        inner.enqueue(
            LogEntry::new("App Started", "Mobile application started")
                .level(LogLevel::Info)
                .category(category::SYSTEM)
                .action("app_start"),
        )
    }

    /// `Running -> Stopped`. Cancels timers and observers, awaits one flush of
    /// the queue, then enqueues `App Stopped`, which waits for a later flush.
    pub async fn stop(&self) -> Result<(), ShipperError> {
        let inner = &self.inner;
        let (timers, observers) = {
            let mut lifecycle = inner.lifecycle();
            if !lifecycle.running {
                warn!("SHIPPER | Logger is not running");
                return Err(ShipperError::NotRunning);
            }
            lifecycle.running = false;
            (
                lifecycle.timers.take(),
                std::mem::take(&mut lifecycle.observers),
            )
        };

        if let Some(timers) = timers {
            timers.cancel();
        }
        if let Some(hooks) = &inner.hooks {
            for id in observers {
                hooks.unregister(id);
            }
        }
        info!("SHIPPER | Logger stopped");

        inner.flush().await;

        inner.enqueue(
            LogEntry::new("App Stopped", "Mobile application stopped")
                .level(LogLevel::Info)
                .category(category::SYSTEM)
                .action("app_stop"),
        )
    }

    /// Records one observation. Only valid while running.
    pub fn record(&self, entry: LogEntry) -> Result<(), ShipperError> {
        self.inner.record(entry)
    }

    pub fn error(
        &self,
        title: &str,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), ShipperError> {
        self.record(
            LogEntry::new(title, content)
                .level(LogLevel::Error)
                .category(category::ERROR)
                .metadata(metadata),
        )
    }

    pub fn warning(
        &self,
        title: &str,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), ShipperError> {
        self.record(
            LogEntry::new(title, content)
                .level(LogLevel::Warning)
                .category(category::SYSTEM)
                .metadata(metadata),
        )
    }

    pub fn info(
        &self,
        title: &str,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), ShipperError> {
        self.record(
            LogEntry::new(title, content)
                .level(LogLevel::Info)
                .category(category::EVENT)
                .metadata(metadata),
        )
    }

    pub fn debug(
        &self,
        title: &str,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), ShipperError> {
        self.record(
            LogEntry::new(title, content)
                .level(LogLevel::Debug)
                .category(category::EVENT)
                .metadata(metadata),
        )
    }

    pub fn performance(
        &self,
        title: &str,
        duration_ms: u64,
        metadata: Map<String, Value>,
    ) -> Result<(), ShipperError> {
        self.record(
            LogEntry::new(title, format!("Duration: {duration_ms}ms"))
                .level(LogLevel::Info)
                .category(category::PERFORMANCE)
                .duration(duration_ms)
                .metadata(metadata),
        )
    }

    /// Records a user action and counts it as an interaction.
    pub fn user_action(
        &self,
        action: &str,
        title: &str,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), ShipperError> {
        self.inner.interaction_count.fetch_add(1, Ordering::Relaxed);
        self.record(
            LogEntry::new(title, content)
                .level(LogLevel::Info)
                .category(category::USER_ACTION)
                .action(action)
                .metadata(metadata),
        )
    }

    /// Records an HTTP call made by the app. Statuses from 400 up are errors.
    pub fn network_request(
        &self,
        url: &str,
        method: &str,
        duration_ms: u64,
        status: u16,
        metadata: Map<String, Value>,
    ) -> Result<(), ShipperError> {
        let mut merged = Map::new();
        merged.insert("url".to_string(), json!(url));
        merged.insert("method".to_string(), json!(method));
        merged.insert("status".to_string(), json!(status));
        merged.extend(metadata);
        let (level, category) = if status >= 400 {
            (LogLevel::Error, category::ERROR)
        } else {
            (LogLevel::Info, category::PERFORMANCE)
        };
        self.record(
            LogEntry::new(
                "Network Request",
                format!("{method} {url} - {status} ({duration_ms}ms)"),
            )
            .level(level)
            .category(category)
            .action("network_request")
            .duration(duration_ms)
            .network_status("online")
            .metadata(merged),
        )
    }

    pub fn screen_navigation(
        &self,
        from: &str,
        to: &str,
        metadata: Map<String, Value>,
    ) -> Result<(), ShipperError> {
        let mut merged = Map::new();
        merged.insert("fromScreen".to_string(), json!(from));
        merged.insert("toScreen".to_string(), json!(to));
        merged.extend(metadata);
        self.record(
            LogEntry::new(
                "Screen Navigation",
                format!("Navigated from {from} to {to}"),
            )
            .level(LogLevel::Info)
            .category(category::USER_ACTION)
            .action("screen_navigation")
            .screen(to)
            .metadata(merged),
        )
    }

    /// Ships everything queued as one batch. A failed batch is re-queued.
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    #[must_use]
    pub fn status(&self) -> ShipperStatus {
        let inner = &self.inner;
        ShipperStatus {
            running: inner.is_running(),
            device_id: inner.device_id.clone(),
            session_id: inner.session_id.clone(),
            session_duration_ms: inner.session_duration_ms(),
            interaction_count: inner.interaction_count.load(Ordering::Relaxed),
            queue_size: inner.queue().len(),
            failed_count: inner.failed.len(),
        }
    }

    /// Stops the shipper if running, ends the retry loop and flushes storage.
    pub async fn shutdown(&self) {
        if self.inner.is_running() {
            if let Err(e) = self.stop().await {
                debug!("SHIPPER | Stop during shutdown failed: {}", e);
            }
        }
        self.inner.retry_cancel.cancel();

        let store = Arc::clone(&self.inner.store);
        match tokio::task::spawn_blocking(move || store.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("SHIPPER | Failed to flush storage: {}", e),
            Err(e) => warn!("SHIPPER | Storage flush task failed: {}", e),
        }
        info!("SHIPPER | Logger shut down");
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    #[must_use]
    pub fn config(&self) -> &ShipperConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.retry_cancel.cancel();
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(timers) = lifecycle.timers.take() {
            timers.cancel();
        }
    }
}

impl Inner {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self) -> MutexGuard<'_, RecordQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.lifecycle().running
    }

    fn session_duration_ms(&self) -> u64 {
        u64::try_from(self.session_start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn record(self: &Arc<Self>, entry: LogEntry) -> Result<(), ShipperError> {
        if !self.is_running() {
            warn!("SHIPPER | Logger is not running, dropping log '{}'", entry.title);
            return Err(ShipperError::NotRunning);
        }
        self.enqueue(entry)
    }

    /// Builds and queues a record without checking the running state.
    fn enqueue(self: &Arc<Self>, entry: LogEntry) -> Result<(), ShipperError> {
        let record = self.build_record(entry);
        record.validate()?;
        debug!(
            "SHIPPER | [{}] {}: {}",
            record.category, record.title, record.content
        );

        match self.config.delivery {
            DeliveryMode::Immediate => {
                let flusher = self.flusher.clone();
                self.runtime.spawn(async move {
                    flusher.send_single(record).await;
                });
            }
            DeliveryMode::Batched => {
                // Swap under the lock so no concurrent record joins this batch.
                let full_batch = {
                    let mut queue = self.queue();
                    if queue.push(record) >= self.config.batch_size {
                        Some(queue.take_all())
                    } else {
                        None
                    }
                };
                if let Some(batch) = full_batch {
                    let inner = Arc::clone(self);
                    self.runtime.spawn(async move {
                        inner.deliver(batch).await;
                    });
                }
            }
        }
        Ok(())
    }

    fn build_record(&self, entry: LogEntry) -> LogRecord {
        let LogEntry {
            title,
            content,
            level,
            category,
            action,
            screen,
            mut metadata,
            duration,
            memory_usage,
            network_status,
            error_code,
            error_stack,
            error_context,
            location,
        } = entry;

        metadata.insert(
            "sessionDuration".to_string(),
            json!(self.session_duration_ms()),
        );
        metadata.insert(
            "interactionCount".to_string(),
            json!(self.interaction_count.load(Ordering::Relaxed)),
        );
        metadata.insert("deviceInfo".to_string(), json!(self.device_info));

        LogRecord {
            app: self.config.app.clone(),
            title,
            content,
            log_level: level.unwrap_or(self.config.log_level),
            category: category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            device_id: self.device_id.clone(),
            user_id: self.config.user_id.clone(),
            session_id: self.session_id.clone(),
            timestamp: OffsetDateTime::now_utc(),
            action: action.unwrap_or_else(|| DEFAULT_ACTION.to_string()),
            screen: screen.unwrap_or_else(|| DEFAULT_SCREEN.to_string()),
            app_version: self.device_info.app_version.clone(),
            os_version: self.device_info.system_version.clone(),
            device_model: self.device_info.model.clone(),
            metadata,
            duration,
            memory_usage,
            network_status,
            error_code,
            error_stack,
            error_context,
            location,
        }
    }

    async fn flush(&self) {
        let batch = self.queue().take_all();
        if batch.is_empty() {
            return;
        }
        self.deliver(batch).await;
    }

    async fn deliver(&self, batch: Vec<LogRecord>) {
        if let Some(failed) = self.flusher.flush_batch(batch).await {
            self.queue().requeue_front(failed);
        }
    }

    fn register_observers(self: &Arc<Self>) -> Vec<ObserverId> {
        let Some(hooks) = &self.hooks else {
            return Vec::new();
        };
        let observer: Arc<dyn Observer> = Arc::new(CaptureObserver {
            shipper: Arc::downgrade(self),
        });
        capture_kinds(&self.config)
            .into_iter()
            .map(|kind| hooks.register(kind, Arc::clone(&observer)))
            .collect()
    }

    fn spawn_flush_timer(self: &Arc<Self>, cancel_token: CancellationToken) {
        let weak = Arc::downgrade(self);
        let period = self.config.batch_interval();
        self.runtime.spawn(async move {
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.flush().await;
                    }
                    _ = cancel_token.cancelled() => break,
                }
            }
        });
    }

    fn spawn_performance_sampler(self: &Arc<Self>, cancel_token: CancellationToken) {
        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            let period = PERFORMANCE_SAMPLE_INTERVAL;
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        if let Err(e) = inner.record(inner.performance_sample()) {
                            debug!("SHIPPER | Skipped performance sample: {}", e);
                        }
                    }
                    _ = cancel_token.cancelled() => break,
                }
            }
        });
    }

    fn performance_sample(&self) -> LogEntry {
        let memory = self.metrics.memory_info();
        let network = self.metrics.network_info();
        LogEntry::new(
            "Performance Metrics",
            format!("Memory: {}MB, Network: {}", memory.used, network.kind),
        )
        .level(LogLevel::Info)
        .category(category::PERFORMANCE)
        .action("performance_check")
        .memory_usage(format!("{}MB", memory.used))
        .network_status(network.kind.clone())
        .meta("memory", json!(memory))
        .meta("network", json!(network))
    }
}

/// Kinds registered for the enabled capture options.
fn capture_kinds(config: &ShipperConfig) -> Vec<ObserverKind> {
    let mut kinds = Vec::new();
    if config.capture_errors {
        kinds.extend([ObserverKind::Error, ObserverKind::UnhandledRejection]);
    }
    if config.capture_performance {
        kinds.extend([
            ObserverKind::PageLoad,
            ObserverKind::NetworkRequest,
            ObserverKind::NetworkError,
        ]);
    }
    if config.capture_interactions {
        kinds.extend([
            ObserverKind::Click,
            ObserverKind::FormSubmit,
            ObserverKind::Navigation,
        ]);
    }
    if config.capture_notifications {
        kinds.push(ObserverKind::Notification);
    }
    if config.capture_location {
        kinds.extend([ObserverKind::Location, ObserverKind::LocationError]);
    }
    kinds
}

/// Turns host events into records on the owning shipper.
struct CaptureObserver {
    shipper: Weak<Inner>,
}

impl Observer for CaptureObserver {
    fn on_event(&self, event: &HostEvent) {
        let Some(inner) = self.shipper.upgrade() else {
            return;
        };
        if matches!(event, HostEvent::Click { .. }) {
            inner.interaction_count.fetch_add(1, Ordering::Relaxed);
        }
        if let Err(e) = inner.record(entry_for_event(event)) {
            debug!("SHIPPER | Dropped {:?} event: {}", event.kind(), e);
        }
    }
}
