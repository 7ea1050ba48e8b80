#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use outbound_breaker::{
    CallReport, CounterStore, InMemoryStore, MetricSink, Request, Response, State, StoreError,
    Transport, TransportError,
};

// Transport that answers every request with a configurable status, or fails.
pub struct StatusTransport {
    status: AtomicU16,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl StatusTransport {
    pub fn new(status: u16) -> Self {
        Self {
            status: AtomicU16::new(status),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_status(&self, status: u16) {
        self.fail.store(false, Ordering::SeqCst);
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn set_failing(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for StatusTransport {
    fn send(&self, _request: &Request) -> Result<Response, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout(Duration::from_secs(1)));
        }
        Ok(Response::new(
            self.status.load(Ordering::SeqCst),
            vec![("content-type".to_string(), "text/plain".to_string())],
            b"ok".to_vec(),
        ))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<CallReport>>,
    transitions: Mutex<Vec<(String, State, State)>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<CallReport> {
        self.calls.lock().unwrap().clone()
    }

    pub fn transitions(&self) -> Vec<(String, State, State)> {
        self.transitions.lock().unwrap().clone()
    }
}

impl MetricSink for RecordingSink {
    fn record_call(&self, report: &CallReport) {
        self.calls.lock().unwrap().push(report.clone());
    }

    fn record_state_transition(&self, breaker: &str, from: State, to: State) {
        self.transitions
            .lock()
            .unwrap()
            .push((breaker.to_string(), from, to));
    }
}

#[derive(Debug)]
pub struct Unreachable;

impl std::fmt::Display for Unreachable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection refused")
    }
}

impl std::error::Error for Unreachable {}

// In-memory store with switchable failures and per-command counters.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    incrs: AtomicUsize,
    expires: AtomicUsize,
    deletes: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn incrs(&self) -> usize {
        self.incrs.load(Ordering::SeqCst)
    }

    pub fn expires(&self) -> usize {
        self.expires.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn value(&self, key: &str) -> Option<u64> {
        self.inner.get(key).ok().flatten()
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend(Unreachable));
        }
        Ok(())
    }
}

impl CounterStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::backend(Unreachable));
        }
        self.inner.get(key)
    }

    fn incr(&self, key: &str) -> Result<u64, StoreError> {
        self.check_write()?;
        self.incrs.fetch_add(1, Ordering::SeqCst);
        self.inner.incr(key)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_write()?;
        self.expires.fetch_add(1, Ordering::SeqCst);
        self.inner.expire(key, ttl)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check_write()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key)
    }
}
