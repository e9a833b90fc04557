//! Scripted in-memory ledger shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use starknet::core::types::Felt;
use starknet::core::utils::get_selector_from_name;
use starkloop_keeper::core::codec::felt_to_u64;
use starkloop_keeper::streams::due_query::DUE_QUERY_ENTRYPOINT;
use starkloop_keeper::types::{EventsPage, RawEvent};
use starkloop_keeper::utils::rpc::EventQuery;
use starkloop_keeper::{
    KeeperConfig, KeeperConfigBuilder, KeeperError, LedgerGateway, Result, TaskIntervals,
    TerminalStatus,
};
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

pub const CONTRACT: &str = "0x123";
pub const PAY_ENTRYPOINT: &str = "make_schedule_payment";

/// Ledger with a settable head, a fixed event log and per-id estimate failures.
#[derive(Default)]
pub struct ScriptedGateway {
    head: AtomicU64,
    events: Mutex<Vec<RawEvent>>,
    due_ids: Mutex<Vec<u64>>,
    fail_estimate: Mutex<HashSet<u64>>,
    hang_confirmations: AtomicBool,
    submit_latency_ms: AtomicU64,
    confirm_latency_ms: AtomicU64,
    invokes_in_flight: AtomicU32,
    confirms_in_flight: AtomicU32,
    pub max_invokes_in_flight: AtomicU32,
    pub max_confirms_in_flight: AtomicU32,
    next_tx: AtomicU64,
    invocations: Mutex<Vec<(String, Vec<Felt>)>>,
    pub head_calls: AtomicU32,
    pub event_calls: AtomicU32,
    pub estimate_calls: AtomicU32,
}

impl ScriptedGateway {
    pub fn new(head: u64) -> Self {
        let gateway = Self::default();
        gateway.set_head(head);
        gateway
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn push_event(&self, event: RawEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn set_due_ids(&self, ids: &[u64]) {
        *self.due_ids.lock().unwrap() = ids.to_vec();
    }

    pub fn fail_estimate_for(&self, id: u64) {
        self.fail_estimate.lock().unwrap().insert(id);
    }

    pub fn hang_confirmations(&self) {
        self.hang_confirmations.store(true, Ordering::SeqCst);
    }

    /// Makes every submission and confirmation take simulated time.
    pub fn set_latency(&self, submit: Duration, confirm: Duration) {
        self.submit_latency_ms
            .store(submit.as_millis() as u64, Ordering::SeqCst);
        self.confirm_latency_ms
            .store(confirm.as_millis() as u64, Ordering::SeqCst);
    }

    /// Ids passed to the payment entrypoint, in submission order.
    pub fn paid_ids(&self) -> Vec<u64> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|(entrypoint, _)| entrypoint == PAY_ENTRYPOINT)
            .map(|(_, calldata)| felt_to_u64(&calldata[0]).unwrap())
            .collect()
    }

    pub fn invoked_entrypoints(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|(entrypoint, _)| entrypoint.clone())
            .collect()
    }
}

#[async_trait]
impl LedgerGateway for ScriptedGateway {
    async fn get_chain_head(&self) -> Result<u64> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_events(
        &self,
        query: &EventQuery,
        continuation_token: Option<String>,
    ) -> Result<EventsPage> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);

        let matching: Vec<RawEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.block_number.map_or(true, |b| query.window.contains(b)))
            .cloned()
            .collect();

        let offset = match continuation_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| KeeperError::RpcError(format!("bad token {token}")))?,
            None => 0,
        };
        let page_size = usize::try_from(query.page_size).unwrap();
        let end = (offset + page_size).min(matching.len());

        Ok(EventsPage {
            events: matching[offset.min(end)..end].to_vec(),
            continuation_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn call(&self, _: Felt, entrypoint: &str, _: &[Felt]) -> Result<Vec<Felt>> {
        if entrypoint != DUE_QUERY_ENTRYPOINT {
            return Err(KeeperError::RpcError(format!("no view {entrypoint}")));
        }
        let ids = self.due_ids.lock().unwrap();
        let mut felts = vec![Felt::from(ids.len() as u64)];
        for id in ids.iter() {
            felts.push(Felt::from(*id));
            felts.push(Felt::ZERO);
        }
        Ok(felts)
    }

    async fn estimate_fee(&self, _: Felt, entrypoint: &str, calldata: &[Felt]) -> Result<u128> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        if entrypoint == PAY_ENTRYPOINT {
            let id = felt_to_u64(&calldata[0])?;
            if self.fail_estimate.lock().unwrap().contains(&id) {
                return Err(KeeperError::EstimationFailed(format!(
                    "obligation {id} not payable"
                )));
            }
        }
        Ok(1_000)
    }

    async fn invoke(&self, _: Felt, entrypoint: &str, calldata: &[Felt], _: u128) -> Result<Felt> {
        let in_flight = self.invokes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_invokes_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        simulate(&self.submit_latency_ms).await;
        self.invokes_in_flight.fetch_sub(1, Ordering::SeqCst);

        self.invocations
            .lock()
            .unwrap()
            .push((entrypoint.to_string(), calldata.to_vec()));
        Ok(Felt::from(self.next_tx.fetch_add(1, Ordering::SeqCst) + 0x100))
    }

    async fn wait_for_confirmation(&self, _: Felt) -> Result<TerminalStatus> {
        if self.hang_confirmations.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let in_flight = self.confirms_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_confirms_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        simulate(&self.confirm_latency_ms).await;
        self.confirms_in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(TerminalStatus::Succeeded)
    }
}

async fn simulate(latency_ms: &AtomicU64) {
    let ms = latency_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Lines containing every one of `needles`.
    pub fn lines_with(&self, needles: &[&str]) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| needles.iter().all(|n| line.contains(n)))
            .map(str::to_string)
            .collect()
    }
}

pub struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(self.0.clone())
    }
}

/// Routes this thread's `info` and above into a buffer until the guard drops.
///
/// `#[tokio::test]` runs on a current-thread runtime, so spawned tasks log
/// through the same subscriber.
pub fn capture_logs() -> (LogBuffer, DefaultGuard) {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}

/// A `DuePayment` record for obligation `id` at `block`.
pub fn due_event(id: u64, time: u64, block: u64, tx: u64) -> RawEvent {
    RawEvent {
        from_address: Felt::from_hex(CONTRACT).unwrap(),
        keys: vec![get_selector_from_name("DuePayment").unwrap()],
        data: vec![Felt::from(id), Felt::ZERO, Felt::from(time)],
        block_number: Some(block),
        transaction_hash: Felt::from(tx),
    }
}

pub fn config_builder(intervals: TaskIntervals) -> KeeperConfigBuilder {
    KeeperConfigBuilder::new()
        .with_rpc("http://localhost:5050")
        .account_address("0x1")
        .private_key("0x2")
        .contract_address(CONTRACT)
        .with_intervals(intervals)
}

pub fn scan_only() -> KeeperConfig {
    config_builder(TaskIntervals {
        scan_secs: 10,
        due_query_secs: 0,
        trigger_secs: 0,
    })
    .build()
    .unwrap()
}
