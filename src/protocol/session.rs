//! Live communication session with one instrument.
//!
//! # Architecture
//!
//! ```text
//!  callers ──execute/submit──▶ Fifo<Job> ──pop──▶ listener task ──▶ serial link
//!     ▲                                               │
//!     └──────── oneshot reply ◀───────────────────────┤
//!                                                     └──▶ EventBus ──▶ subscribers
//! ```
//!
//! The listener is the only task touching the port. It takes one job at a
//! time from the queue and runs its commands back-to-back, so a multi-command
//! sequence (configure, trigger, read) is never interleaved with another
//! caller's commands.
//!
//! For each command the listener optionally drains stale input, writes and
//! flushes the command, reads one reply frame under the command's timeout and
//! lets the command interpret it. Timeouts and framing errors are retried
//! according to the [`RetryPolicy`] if the command is retryable. A closed or
//! failing link ends the session: every job still queued fails with
//! [`SpectroError::SessionClosed`].

use super::command::{escape_bytes, BoxedCommand, CommandId, InstrumentInfo, Reply, SpectroCommand};
use super::event::{EventBus, SpectroEvent};
use super::fifo::Fifo;
use super::framing::read_frame;
use super::recovery::RetryPolicy;
use super::serial::{drain_serial_buffer, open_serial_async, DynSerial};
use crate::drivers::{CalibrationStep, MeasurementSettings, SpectroDriver};
use crate::error::{SpectroError, SpectroResult};
use crate::measurement::Measurement;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, info_span, instrument, trace, warn, Instrument};

/// Default job queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Tuning knobs for a [`Spectrophotometer`] session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Jobs that may wait in the queue.
    pub queue_capacity: usize,
    /// Retry policy for recoverable failures.
    pub retry: RetryPolicy,
    /// Discard stale input before each command.
    pub drain_before_send: bool,
    /// How long to wait for stale input when draining.
    pub drain_window: Duration,
    /// Replaces every command's own timeout when set.
    pub timeout_override: Option<Duration>,
    /// Bus to publish on. A fresh one is created when `None`.
    pub events: Option<EventBus>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry: RetryPolicy::default(),
            drain_before_send: true,
            drain_window: Duration::from_millis(10),
            timeout_override: None,
            events: None,
        }
    }
}

impl SessionOptions {
    /// Set the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enable or disable draining before each command.
    pub fn with_drain_before_send(mut self, drain: bool) -> Self {
        self.drain_before_send = drain;
        self
    }

    /// Set the drain window.
    pub fn with_drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }

    /// Use one timeout for every command.
    pub fn with_timeout_override(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    /// Publish on an existing bus, so subscribers see `Connected`.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }
}

type ReplySender = oneshot::Sender<SpectroResult<Vec<Reply>>>;

struct Job {
    id: CommandId,
    commands: Vec<BoxedCommand>,
    reply: Option<ReplySender>,
}

impl Job {
    fn fail(self, error: SpectroError) {
        if let Some(tx) = self.reply {
            let _ = tx.send(Err(error));
        }
    }
}

/// Session with one instrument over one serial link.
pub struct Spectrophotometer {
    id: String,
    driver: Arc<dyn SpectroDriver>,
    queue: Arc<Fifo<Job>>,
    events: EventBus,
    next_id: AtomicU64,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Spectrophotometer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spectrophotometer")
            .field("id", &self.id)
            .field("driver", &self.driver)
            .field("queue", &self.queue)
            .finish()
    }
}

impl Spectrophotometer {
    /// Start a session on an already-open link.
    ///
    /// Spawns the listener task, so this must run inside a Tokio runtime.
    pub fn open(
        id: impl Into<String>,
        driver: Arc<dyn SpectroDriver>,
        port: DynSerial,
        options: SessionOptions,
    ) -> Self {
        let id = id.into();
        let queue = Arc::new(Fifo::new(options.queue_capacity));
        let events = options.events.clone().unwrap_or_default();

        let listener = Listener {
            instrument: id.clone(),
            queue: queue.clone(),
            events: events.clone(),
            retry: options.retry,
            drain_before_send: options.drain_before_send,
            drain_window: options.drain_window,
            timeout_override: options.timeout_override,
        };
        let span = info_span!("listener", instrument = %id);
        let handle = tokio::spawn(listener.run(BufReader::new(port)).instrument(span));

        info!(instrument = %id, vendor = driver.vendor(), model = driver.model(), "Session opened");
        Self {
            id,
            driver,
            queue,
            events,
            next_id: AtomicU64::new(1),
            listener: Mutex::new(Some(handle)),
        }
    }

    /// Open the serial port at `path` with the driver's line settings and
    /// start a session on it.
    pub async fn connect(
        id: impl Into<String>,
        driver: Arc<dyn SpectroDriver>,
        path: &str,
        options: SessionOptions,
    ) -> SpectroResult<Self> {
        let port = open_serial_async(path, &driver.serial_settings()).await?;
        Ok(Self::open(id, driver, port, options))
    }

    /// Instrument id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Driver in use.
    pub fn driver(&self) -> &Arc<dyn SpectroDriver> {
        &self.driver
    }

    /// Jobs waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether the session still accepts jobs.
    pub fn is_open(&self) -> bool {
        !self.queue.is_closed()
    }

    fn next_id(&self) -> CommandId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Run one command and return its reply.
    pub async fn execute(&self, command: BoxedCommand) -> SpectroResult<Reply> {
        let name = command.name().to_string();
        self.execute_batch(vec![command])
            .await?
            .pop()
            .ok_or_else(|| SpectroError::parse(name, "no reply"))
    }

    /// Run commands back-to-back as one job.
    ///
    /// Returns one reply per command. Stops at the first failing command.
    pub async fn execute_batch(&self, commands: Vec<BoxedCommand>) -> SpectroResult<Vec<Reply>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let (tx, rx) = oneshot::channel();
        let job = Job {
            id: self.next_id(),
            commands,
            reply: Some(tx),
        };
        self.queue.push(job).await.map_err(closed_as_session)?;
        rx.await.map_err(|_| SpectroError::SessionClosed)?
    }

    /// Queue a command without waiting for it.
    ///
    /// Fails with `QueueFull` instead of waiting for space. The outcome is
    /// reported through [`SpectroEvent`]s carrying the returned id.
    pub fn submit(&self, command: BoxedCommand) -> SpectroResult<CommandId> {
        let id = self.next_id();
        self.queue
            .try_push(Job {
                id,
                commands: vec![command],
                reply: None,
            })
            .map_err(closed_as_session)?;
        Ok(id)
    }

    /// Ask the instrument to identify itself.
    #[instrument(skip(self), fields(instrument = %self.id))]
    pub async fn identify(&self) -> SpectroResult<InstrumentInfo> {
        let command = self.driver.identify();
        let name = command.name().to_string();
        match self.execute(command).await? {
            Reply::Identity(info) => {
                info!(%info, "Instrument identified");
                Ok(info)
            }
            other => Err(SpectroError::parse(
                name,
                format!("expected identity, got {other:?}"),
            )),
        }
    }

    /// Perform one calibration step.
    #[instrument(skip(self), fields(instrument = %self.id))]
    pub async fn calibrate(&self, step: CalibrationStep) -> SpectroResult<()> {
        let commands = self.driver.calibrate(step)?;
        self.execute_batch(commands).await?;
        info!(%step, "Calibration complete");
        Ok(())
    }

    /// Take one measurement.
    #[instrument(skip(self), fields(instrument = %self.id))]
    pub async fn measure(&self, settings: &MeasurementSettings) -> SpectroResult<Measurement> {
        self.driver.validate(settings)?;
        let commands = self.driver.measure(settings)?;
        let last = commands
            .last()
            .map(|c| c.name().to_string())
            .unwrap_or_default();

        let mut replies = self.execute_batch(commands).await?;
        let reflectance = match replies.pop() {
            Some(Reply::Spectrum(reflectance)) => reflectance,
            other => {
                return Err(SpectroError::parse(
                    last,
                    format!("expected spectral data, got {other:?}"),
                ))
            }
        };

        let measurement = Measurement::new(
            self.id.clone(),
            self.driver.model(),
            settings.clone(),
            reflectance,
        );
        debug!(id = %measurement.id, samples = measurement.reflectance.len(), "Measurement decoded");
        self.events.publish(SpectroEvent::MeasurementCompleted {
            instrument: self.id.clone(),
            measurement: Arc::new(measurement.clone()),
        });
        Ok(measurement)
    }

    /// Stream of session events from now on. Lagged events are skipped.
    pub fn events(&self) -> impl Stream<Item = SpectroEvent> {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| event.ok())
    }

    /// Raw receiver of session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SpectroEvent> {
        self.events.subscribe()
    }

    /// Stop accepting jobs, let queued jobs finish and wait for the listener.
    pub async fn shutdown(&self) {
        self.queue.close();
        let handle = self.listener.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(instrument = %self.id, error = %e, "Listener task ended abnormally");
            }
        }
    }
}

impl Drop for Spectrophotometer {
    fn drop(&mut self) {
        self.queue.close();
    }
}

fn closed_as_session(error: SpectroError) -> SpectroError {
    match error {
        SpectroError::QueueClosed => SpectroError::SessionClosed,
        other => other,
    }
}

struct Listener {
    instrument: String,
    queue: Arc<Fifo<Job>>,
    events: EventBus,
    retry: RetryPolicy,
    drain_before_send: bool,
    drain_window: Duration,
    timeout_override: Option<Duration>,
}

impl Listener {
    async fn run(self, mut port: BufReader<DynSerial>) {
        self.events.publish(SpectroEvent::Connected {
            instrument: self.instrument.clone(),
        });

        let mut reason = None;
        while let Some(job) = self.queue.pop().await {
            let result = self.run_job(&mut port, job.id, &job.commands).await;
            let lost = match &result {
                Err(e) if e.is_link_lost() => Some(e.to_string()),
                _ => None,
            };
            if let Some(tx) = job.reply {
                let _ = tx.send(result);
            }

            if let Some(why) = lost {
                warn!(instrument = %self.instrument, reason = %why, "Link lost, closing session");
                self.queue.close();
                while let Some(pending) = self.queue.try_pop() {
                    pending.fail(SpectroError::SessionClosed);
                }
                reason = Some(why);
                break;
            }
        }

        info!(instrument = %self.instrument, "Session closed");
        self.events.publish(SpectroEvent::Disconnected {
            instrument: self.instrument.clone(),
            reason,
        });
    }

    async fn run_job(
        &self,
        port: &mut BufReader<DynSerial>,
        id: CommandId,
        commands: &[BoxedCommand],
    ) -> SpectroResult<Vec<Reply>> {
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            match self.run_command(port, id, command.as_ref()).await {
                Ok(reply) => replies.push(reply),
                Err(e) => {
                    warn!(instrument = %self.instrument, id, command = command.name(), error = %e, "Command failed");
                    self.events.publish(SpectroEvent::CommandFailed {
                        instrument: self.instrument.clone(),
                        id,
                        command: command.name().to_string(),
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }
        Ok(replies)
    }

    async fn run_command(
        &self,
        port: &mut BufReader<DynSerial>,
        id: CommandId,
        command: &dyn SpectroCommand,
    ) -> SpectroResult<Reply> {
        let mut retries = 0;
        loop {
            match self.attempt(port, id, command).await {
                Ok(reply) => return Ok(reply),
                Err(e) if self.retry.should_retry(&e, command.retryable(), retries) => {
                    retries += 1;
                    debug!(instrument = %self.instrument, id, command = command.name(), attempt = retries, error = %e, "Retrying");
                    self.events.publish(SpectroEvent::Retrying {
                        instrument: self.instrument.clone(),
                        id,
                        command: command.name().to_string(),
                        attempt: retries,
                        reason: e.to_string(),
                    });
                    self.retry.backoff().await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        port: &mut BufReader<DynSerial>,
        id: CommandId,
        command: &dyn SpectroCommand,
    ) -> SpectroResult<Reply> {
        if self.drain_before_send {
            let buffered = port.buffer().len();
            port.consume(buffered);
            let drained = buffered + drain_serial_buffer(port.get_mut(), self.drain_window).await;
            if drained > 0 {
                debug!(instrument = %self.instrument, bytes = drained, "Discarded stale input");
            }
        }

        let bytes = command.encode();
        trace!(instrument = %self.instrument, id, tx = %escape_bytes(&bytes));
        let link = port.get_mut();
        link.write_all(&bytes).await?;
        link.flush().await?;
        self.events.publish(SpectroEvent::CommandSent {
            instrument: self.instrument.clone(),
            id,
            command: command.name().to_string(),
        });

        let timeout = self.timeout_override.unwrap_or_else(|| command.timeout());
        let started = tokio::time::Instant::now();
        let framing = command.framing();
        let frame = tokio::time::timeout(timeout, read_frame(port, &framing))
            .await
            .map_err(|_| SpectroError::Timeout {
                command: command.name().to_string(),
                timeout,
            })??;
        trace!(instrument = %self.instrument, id, rx = %escape_bytes(&frame));

        let reply = command.interpret(&frame)?;
        self.events.publish(SpectroEvent::ReplyReceived {
            instrument: self.instrument.clone(),
            id,
            command: command.name().to_string(),
            elapsed: started.elapsed(),
        });
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::simulator::XRiteSimulator;
    use crate::drivers::xrite::XRiteDriver;
    use tracing_test::traced_test;

    fn fast() -> SessionOptions {
        SessionOptions::default()
            .with_timeout_override(Duration::from_millis(50))
            .with_retry(RetryPolicy {
                max_attempts: 1,
                backoff_delay: Duration::from_millis(1),
            })
    }

    #[tokio::test]
    #[traced_test]
    async fn retry_is_logged() {
        let (port, _device) = XRiteSimulator::new().drop_replies(1).spawn();
        let session = Spectrophotometer::open("sim", Arc::new(XRiteDriver::default()), port, fast());

        session.identify().await.unwrap();
        session.shutdown().await;

        assert!(logs_contain("Retrying"));
        assert!(logs_contain("Instrument identified"));
        assert!(!logs_contain("Command failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn exhausted_retries_log_failure() {
        let (port, _device) = XRiteSimulator::new().silent().spawn();
        let session = Spectrophotometer::open("sim", Arc::new(XRiteDriver::default()), port, fast());

        assert!(session.identify().await.is_err());
        session.shutdown().await;

        assert!(logs_contain("Command failed"));
        assert!(logs_contain("timed out"));
    }

    #[tokio::test]
    #[traced_test]
    async fn stale_bytes_are_discarded() {
        let (host, device) = tokio::io::duplex(256);
        let mut device = BufReader::new(device);
        device.get_mut().write_all(b"<00>leftover\r\n").await.unwrap();

        let session = Spectrophotometer::open(
            "sim",
            Arc::new(XRiteDriver::default()),
            Box::new(host),
            SessionOptions::default().with_retry(RetryPolicy::none()),
        );
        let reply = tokio::spawn(async move {
            let mut line = Vec::new();
            device.read_until(b'\r', &mut line).await.unwrap();
            device.get_mut().write_all(b"<00>SP64,1.0,A1\r\n").await.unwrap();
            line.clear();
            let _ = device.read_until(b'\r', &mut line).await;
        });

        let info = session.identify().await.unwrap();
        assert_eq!(info.serial_number, "A1");
        assert!(logs_contain("Discarded stale input"));

        session.shutdown().await;
        drop(session);
        reply.await.unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn link_loss_is_logged() {
        let (host, device) = tokio::io::duplex(64);
        drop(device);
        let session = Spectrophotometer::open(
            "gone",
            Arc::new(XRiteDriver::default()),
            Box::new(host),
            SessionOptions::default(),
        );

        let err = session.identify().await.unwrap_err();
        assert!(err.is_link_lost(), "{err:?}");
        session.shutdown().await;
        assert!(logs_contain("Link lost, closing session"));
    }

    #[tokio::test]
    async fn empty_batch_skips_the_link() {
        let (port, device) = XRiteSimulator::new().spawn();
        let session = Spectrophotometer::open(
            "sim",
            Arc::new(XRiteDriver::default()),
            port,
            SessionOptions::default(),
        );

        assert!(session.execute_batch(Vec::new()).await.unwrap().is_empty());
        session.shutdown().await;
        drop(session);
        assert!(device.await.unwrap().commands.is_empty());
    }

    #[test]
    fn queue_closed_maps_to_session_closed() {
        assert!(matches!(
            closed_as_session(SpectroError::QueueClosed),
            SpectroError::SessionClosed
        ));
        assert!(matches!(
            closed_as_session(SpectroError::QueueFull(3)),
            SpectroError::QueueFull(3)
        ));
    }
}
