//! Task scheduling and lifecycle.
//!
//! Each enabled task runs on its own interval in its own spawned future:
//!
//! - **event scan**: window → paginate → decode → dispatch
//! - **due query**: payable-ids view → dispatch
//! - **due-check trigger**: `check_due_payments()` so the program emits fresh events
//!
//! Ticks of one task never overlap; a tick that runs past the interval makes
//! the missed ticks skip. Different tasks are independent of each other.
//! Cancellation stops new ticks and gives an in-flight tick a grace period.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::context::KeeperContext;
use crate::core::dispatcher::{Dispatcher, TickProgress};
use crate::core::trigger::DueCheckTrigger;
use crate::streams::{DueQuerySource, DueSource, EventScanSource};
use crate::types::{AttemptOutcome, PaymentAttempt};
use crate::utils::error::Result;
use crate::utils::logging;

/// Counts reported at the end of a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Signals handed to the dispatcher.
    pub signals: usize,
    pub confirmed: usize,
    pub failed: usize,
    /// Signals withheld by the source.
    pub skipped: usize,
}

impl TickSummary {
    fn from_attempts(signals: usize, skipped: usize, attempts: &[PaymentAttempt]) -> Self {
        let confirmed = attempts.iter().filter(|a| a.is_confirmed()).count();
        let failed = attempts
            .iter()
            .filter(|a| a.failed_stage().is_some())
            .count();
        Self {
            signals,
            confirmed,
            failed,
            skipped,
        }
    }
}

/// One tick of a source-driven task: fetch the batch, dispatch every signal.
///
/// # Errors
///
/// Returns the source's error; dispatch failures are per-attempt and never
/// surface here.
pub async fn run_tick(
    source: &mut dyn DueSource,
    dispatcher: &Dispatcher,
    progress: &TickProgress,
) -> Result<(TickSummary, Vec<PaymentAttempt>)> {
    let signals = source.next_batch().await?;
    let skipped = source.take_skipped();
    for attempt in &skipped {
        logging::log_attempt(attempt);
    }

    let ids: Vec<_> = signals.iter().map(|s| s.obligation_id).collect();
    let attempts = dispatcher.dispatch_tracked(&ids, progress).await;

    for (signal, attempt) in signals.iter().zip(&attempts) {
        source.on_dispatched(signal, attempt);
    }

    Ok((
        TickSummary::from_attempts(signals.len(), skipped.len(), &attempts),
        attempts,
    ))
}

/// Owns the keeper tasks.
///
/// # Example
///
/// ```no_run
/// use starkloop_keeper::{KeeperConfig, KeeperContext, Scheduler};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let ctx = KeeperContext::connect(KeeperConfig::from_env()?).await?;
/// let mut scheduler = Scheduler::new(ctx);
/// scheduler.start()?;
/// scheduler.cancellation_token().cancelled().await;
/// scheduler.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    ctx: Arc<KeeperContext>,
    cancellation_token: CancellationToken,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Scheduler {
    #[must_use]
    pub fn new(ctx: KeeperContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            cancellation_token: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Returns a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Names of the running tasks.
    #[must_use]
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Spawns every enabled task.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::AbiError` if the event scan is enabled and the
    /// ABI has no usable due event. Nothing is spawned in that case.
    pub fn start(&mut self) -> Result<()> {
        let intervals = self.ctx.config.intervals;
        let grace = self.ctx.config.shutdown_grace;

        // Build everything fallible before spawning anything.
        let scan = match intervals.scan() {
            Some(every) => Some((EventScanSource::new(&self.ctx)?, every)),
            None => None,
        };

        if let Some((source, every)) = scan {
            self.spawn_source(Box::new(source), every, grace);
        }
        if let Some(every) = intervals.due_query() {
            self.spawn_source(Box::new(DueQuerySource::new(&self.ctx)), every, grace);
        }
        if let Some(every) = intervals.trigger() {
            let trigger = DueCheckTrigger::new(&self.ctx);
            let token = self.cancellation_token.clone();
            let handle = tokio::spawn(run_trigger_task(trigger, every, grace, token));
            self.tasks.push(("due-check-trigger".to_string(), handle));
        }

        logging::log_startup(
            &format!("{:#x}", self.ctx.contract),
            &format!("{:#x}", self.ctx.config.account_address),
            &self.ctx.config.rpc_url,
            &self.task_names(),
        );
        Ok(())
    }

    fn spawn_source(&mut self, source: Box<dyn DueSource>, every: Duration, grace: Duration) {
        let name = source.source_name().to_string();
        let task = SourceTask {
            name: name.clone(),
            source,
            dispatcher: self.ctx.dispatcher(),
            ctx: self.ctx.clone(),
        };
        let token = self.cancellation_token.clone();
        let handle = tokio::spawn(task.run(every, grace, token));
        self.tasks.push((name, handle));
    }

    /// Cancels the token when Ctrl+C is received.
    pub fn handle_ctrl_c(&self) {
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, shutting down...");
                token.cancel();
            }
        });
    }

    /// Starts, waits for cancellation, then shuts down.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::start`].
    pub async fn run(mut self) -> Result<()> {
        self.start()?;
        self.handle_ctrl_c();
        self.cancellation_token.cancelled().await;
        self.shutdown().await;
        Ok(())
    }

    /// Cancels all tasks and waits for each to finish.
    pub async fn shutdown(self) {
        self.cancellation_token.cancel();
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                logging::log_error(&name, &format!("task join error: {e}"));
            }
        }
        tracing::info!("Keeper stopped");
    }
}

struct SourceTask {
    name: String,
    source: Box<dyn DueSource>,
    dispatcher: Dispatcher,
    ctx: Arc<KeeperContext>,
}

impl SourceTask {
    async fn run(mut self, every: Duration, grace: Duration, token: CancellationToken) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let started = Instant::now();
            let progress = TickProgress::new();
            let tick = run_tick(self.source.as_mut(), &self.dispatcher, &progress);
            tokio::pin!(tick);

            let result = tokio::select! {
                result = &mut tick => result,
                () = token.cancelled() => {
                    if let Ok(result) = timeout(grace, &mut tick).await {
                        result
                    } else {
                        let unsettled: Vec<String> =
                            progress.unsettled().iter().map(ToString::to_string).collect();
                        tracing::warn!(
                            task = %self.name,
                            unsettled = ?unsettled,
                            "Tick abandoned after {}s grace; obligations left in unknown state",
                            grace.as_secs()
                        );
                        break;
                    }
                }
            };

            match result {
                Ok((summary, attempts)) => {
                    let duration_ms =
                        u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    logging::log_tick(
                        &self.name,
                        summary.signals,
                        summary.confirmed,
                        summary.failed,
                        summary.skipped,
                        duration_ms,
                    );
                    explain_rejections(&self.ctx, &attempts).await;
                }
                Err(e) => logging::log_error(&self.name, &e.to_string()),
            }
        }

        tracing::debug!(task = %self.name, "Task stopped");
    }
}

/// Reads rejected obligations back from the program for the debug log.
async fn explain_rejections(ctx: &KeeperContext, attempts: &[PaymentAttempt]) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    for attempt in attempts {
        if !matches!(attempt.outcome, AttemptOutcome::Rejected { .. }) {
            continue;
        }
        match ctx.read_obligation(attempt.obligation_id).await {
            Ok(obligation) => tracing::debug!(
                obligation_id = %attempt.obligation_id,
                active = obligation.active,
                last_payment = obligation.last_payment,
                periodicity = obligation.periodicity,
                expiry = obligation.expiry,
                "Rejected obligation state"
            ),
            Err(e) => tracing::debug!(
                obligation_id = %attempt.obligation_id,
                error = %e,
                "Could not read rejected obligation"
            ),
        }
    }
}

async fn run_trigger_task(
    trigger: DueCheckTrigger,
    every: Duration,
    grace: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let fire = trigger.fire();
        tokio::pin!(fire);
        let result = tokio::select! {
            result = &mut fire => result,
            () = token.cancelled() => {
                if let Ok(result) = timeout(grace, &mut fire).await {
                    result
                } else {
                    tracing::warn!("Due-check trigger abandoned after {}s grace", grace.as_secs());
                    break;
                }
            }
        };

        if let Err(e) = result {
            logging::log_error("due-check-trigger", &e.to_string());
        }
    }

    tracing::debug!(task = "due-check-trigger", "Task stopped");
}
