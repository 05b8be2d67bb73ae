//! The accept loop
//!
//! Single-threaded owner of the listener and the worker registry. Each
//! cycle waits for one connection, starts a worker for it, then sweeps
//! the registry for workers whose completion flag the kernel has cleared.
//!
//! The accept wait is unbounded while no worker is registered and bounded
//! by `accept_timeout` otherwise, so finished workers are reclaimed even
//! when no new client shows up.

use crate::config::{ConfigError, ServerConfig};
use crate::descriptor::WorkerHandle;
use crate::worker::WorkerOutcome;

use socketor_core::error::{ServerError, ServerResult};
use socketor_core::registry::Registry;
use socketor_core::transport::{Accepted, LineListener};
use socketor_core::{kdebug, kinfo, kwarn, Operation};

use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// What one `run_once` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cycle {
    /// A worker was started this cycle
    pub accepted: bool,
    /// Workers reclaimed by this cycle's sweep
    pub reclaimed: usize,
    /// Workers still registered afterwards
    pub live: usize,
}

/// Running totals since the loop was built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub accepted: u64,
    pub reclaimed: u64,
    pub accept_errors: u64,
    pub served: u64,
    pub faulted: u64,
}

/// Accept loop over any `LineListener`
pub struct AcceptLoop<L: LineListener> {
    listener: L,
    config: ServerConfig,
    operation: Arc<Operation>,
    registry: Registry<WorkerHandle<L::Conn>>,
    stats: LoopStats,
    next_serial: u64,
    /// Error of the current run of consecutive accept failures
    accept_failure: Option<(io::ErrorKind, Option<i32>)>,
}

impl<L: LineListener> AcceptLoop<L> {
    pub fn new(listener: L, config: ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let operation = Arc::new(config.operation.clone());
        Ok(Self {
            listener,
            config,
            operation,
            registry: Registry::new(),
            stats: LoopStats::default(),
            next_serial: 0,
            accept_failure: None,
        })
    }

    /// Serve forever; returns only on a fatal error
    pub fn run(&mut self) -> ServerResult<Infallible> {
        loop {
            self.run_once()?;
        }
    }

    /// One accept-spawn-sweep cycle
    pub fn run_once(&mut self) -> ServerResult<Cycle> {
        let accepted = match self.listener.accept(self.accept_timeout()) {
            Accepted::Connection(conn) => {
                self.accept_failure = None;
                self.spawn(conn)?;
                true
            }
            Accepted::TimedOut => {
                self.accept_failure = None;
                false
            }
            // Treated as "no connection". EMFILE/ENFILE leave the client
            // queued, so the next poll returns at once and the loop spins
            // until a sweep frees a descriptor.
            Accepted::Failed(e) => {
                if self.note_accept_error(&e) {
                    kwarn!("accept failed: {}", e);
                }
                false
            }
        };

        let reclaimed = self.sweep();
        Ok(Cycle {
            accepted,
            reclaimed,
            live: self.registry.len(),
        })
    }

    /// Count an accept failure; `true` when it starts a new run of errors
    /// and should be logged
    fn note_accept_error(&mut self, e: &io::Error) -> bool {
        self.stats.accept_errors += 1;
        let key = (e.kind(), e.raw_os_error());
        let repeated = self.accept_failure == Some(key);
        self.accept_failure = Some(key);
        !repeated
    }

    /// How long the next accept may block; `None` means forever
    pub fn accept_timeout(&self) -> Option<Duration> {
        if self.registry.is_empty() {
            None
        } else {
            Some(self.config.accept_timeout)
        }
    }

    fn spawn(&mut self, conn: L::Conn) -> ServerResult<()> {
        let serial = self.next_serial;
        self.next_serial += 1;

        let handle = WorkerHandle::new(serial, conn, Arc::clone(&self.operation), self.config.stack_size)?;
        let id = self.registry.append(handle);

        let spawned = self
            .registry
            .get(id)
            .map(WorkerHandle::spawn)
            .unwrap_or(Err(ServerError::Platform(libc::ENOENT)));

        match spawned {
            Ok(tid) => {
                self.stats.accepted += 1;
                kdebug!("worker {} started (tid {}), {} live", serial, tid, self.registry.len());
                Ok(())
            }
            Err(e) => {
                // Never started, so removal frees it outright
                drop(self.registry.remove(id));
                Err(e)
            }
        }
    }

    /// Reclaim every terminated worker; returns how many
    pub fn sweep(&mut self) -> usize {
        let done = self.registry.sweep(|h| h.is_terminated());

        for handle in &done {
            match handle.exchange().map(|ex| (ex, ex.outcome)) {
                Some((ex, WorkerOutcome::Served(_))) => {
                    self.stats.served += 1;
                    kinfo!("Accepted: {}", ex.response);
                }
                Some((ex, outcome)) => {
                    self.stats.faulted += 1;
                    kwarn!(
                        "worker {} closed without response ({:?}, a={:?} b={:?})",
                        handle.serial(),
                        outcome,
                        ex.a,
                        ex.b
                    );
                }
                None => {}
            }
        }

        self.stats.reclaimed += done.len() as u64;
        done.len()
    }

    /// Workers registered and not yet reclaimed
    #[inline]
    pub fn live_workers(&self) -> usize {
        self.registry.len()
    }

    #[inline]
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    #[inline]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[inline]
    pub fn listener(&self) -> &L {
        &self.listener
    }
}

impl<L: LineListener> Drop for AcceptLoop<L> {
    fn drop(&mut self) {
        let live = self.registry.len();
        if live > 0 {
            kdebug!("accept loop dropped with {} live workers", live);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::futex::{futex_wait, futex_wake};
    use crate::worker::tests::ScriptedConnection;
    use socketor_core::{Line, LineConnection};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::time::Instant;

    enum Event {
        Conn(&'static [u8]),
        /// Connection whose first read blocks until the gate is opened
        Gated(&'static [u8], Arc<AtomicI32>),
        Fail,
        FailWith(i32),
    }

    /// Scripted connection that can be held in `read_line` on a futex
    struct GatedConnection {
        gate: Option<Arc<AtomicI32>>,
        inner: ScriptedConnection,
    }

    impl LineConnection for GatedConnection {
        fn read_line(&mut self, line: &mut Line) -> io::Result<()> {
            if let Some(gate) = &self.gate {
                while gate.load(Ordering::Acquire) == 0 {
                    let _ = futex_wait(gate, 0, None);
                }
            }
            self.inner.read_line(line)
        }

        fn write_line(&mut self, text: &[u8]) -> io::Result<()> {
            self.inner.write_line(text)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }

        fn close(&mut self) -> io::Result<()> {
            self.inner.close()
        }
    }

    fn open_gate(gate: &AtomicI32) {
        gate.store(1, Ordering::Release);
        futex_wake(gate, i32::MAX).unwrap();
    }

    /// Hands out scripted connections, then times out
    struct ScriptedListener {
        events: RefCell<VecDeque<Event>>,
        timeouts: RefCell<Vec<Option<Duration>>>,
        pause: Cell<Duration>,
    }

    impl ScriptedListener {
        fn new(events: Vec<Event>) -> Self {
            Self {
                events: RefCell::new(events.into()),
                timeouts: RefCell::new(Vec::new()),
                pause: Cell::new(Duration::from_millis(5)),
            }
        }
    }

    impl LineListener for ScriptedListener {
        type Conn = GatedConnection;

        fn accept(&self, timeout: Option<Duration>) -> Accepted<GatedConnection> {
            self.timeouts.borrow_mut().push(timeout);
            match self.events.borrow_mut().pop_front() {
                Some(Event::Conn(script)) => Accepted::Connection(GatedConnection {
                    gate: None,
                    inner: ScriptedConnection::new(script),
                }),
                Some(Event::Gated(script, gate)) => Accepted::Connection(GatedConnection {
                    gate: Some(gate),
                    inner: ScriptedConnection::new(script),
                }),
                Some(Event::Fail) => Accepted::Failed(io::ErrorKind::ConnectionAborted.into()),
                Some(Event::FailWith(errno)) => Accepted::Failed(io::Error::from_raw_os_error(errno)),
                None => {
                    std::thread::sleep(self.pause.get());
                    Accepted::TimedOut
                }
            }
        }
    }

    fn config(op: &str) -> ServerConfig {
        ServerConfig::new()
            .operation(Operation::new(op))
            .accept_timeout(Duration::from_millis(20))
    }

    fn drain<L: LineListener>(lp: &mut AcceptLoop<L>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while lp.live_workers() > 0 {
            assert!(Instant::now() < deadline, "workers never drained");
            lp.run_once().unwrap();
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let listener = ScriptedListener::new(vec![]);
        let bad = config("+").accept_timeout(Duration::ZERO);
        assert!(AcceptLoop::new(listener, bad).is_err());
    }

    #[test]
    fn test_timeout_unbounded_only_when_empty() {
        let listener = ScriptedListener::new(vec![Event::Conn(b"1\n2\n")]);
        let mut lp = AcceptLoop::new(listener, config("+")).unwrap();

        assert_eq!(lp.accept_timeout(), None);
        let cycle = lp.run_once().unwrap();
        assert!(cycle.accepted);

        drain(&mut lp);
        let timeouts = lp.listener().timeouts.borrow().clone();
        assert_eq!(timeouts[0], None);
        // Every later accept ran with workers registered until the last one
        assert!(timeouts[1..].iter().all(|t| *t == Some(Duration::from_millis(20))));
        assert_eq!(lp.accept_timeout(), None);
    }

    #[test]
    fn test_concurrent_requests_are_reclaimed() {
        let listener = ScriptedListener::new(vec![
            Event::Conn(b"6\n3\n"),
            Event::Conn(b"10\n10\n"),
            Event::Conn(b"0\n5\n"),
        ]);
        let mut lp = AcceptLoop::new(listener, config("*")).unwrap();

        for _ in 0..3 {
            assert!(lp.run_once().unwrap().accepted);
        }
        let stats = lp.stats();
        assert_eq!(stats.accepted, 3);
        assert!(lp.live_workers() as u64 <= stats.accepted - stats.reclaimed);

        drain(&mut lp);
        let stats = lp.stats();
        assert_eq!(stats.reclaimed, 3);
        assert_eq!(stats.served, 3);
        assert_eq!(stats.faulted, 0);
        assert_eq!(lp.live_workers(), 0);
    }

    #[test]
    fn test_len_tracks_accepted_minus_reclaimed() {
        let events = (0..8).map(|_| Event::Conn(b"2\n2\n")).collect();
        let mut lp = AcceptLoop::new(ScriptedListener::new(events), config("+")).unwrap();

        for _ in 0..12 {
            lp.run_once().unwrap();
            let stats = lp.stats();
            assert_eq!(lp.live_workers() as u64, stats.accepted - stats.reclaimed);
        }
        drain(&mut lp);
        assert_eq!(lp.stats().reclaimed, 8);
    }

    #[test]
    fn test_faulted_workers_are_counted() {
        let listener = ScriptedListener::new(vec![Event::Conn(b"1\n0\n"), Event::Conn(b"1\n")]);
        let mut lp = AcceptLoop::new(listener, config("/")).unwrap();
        lp.run_once().unwrap();
        lp.run_once().unwrap();
        drain(&mut lp);

        let stats = lp.stats();
        assert_eq!(stats.faulted, 2);
        assert_eq!(stats.served, 0);
        assert_eq!(stats.reclaimed, 2);
    }

    #[test]
    fn test_accept_errors_are_not_fatal() {
        let listener = ScriptedListener::new(vec![Event::Fail, Event::Conn(b"4\n4\n")]);
        let mut lp = AcceptLoop::new(listener, config("-")).unwrap();

        let cycle = lp.run_once().unwrap();
        assert!(!cycle.accepted);
        assert_eq!(lp.stats().accept_errors, 1);

        assert!(lp.run_once().unwrap().accepted);
        drain(&mut lp);
        assert_eq!(lp.stats().served, 1);
    }

    #[test]
    fn test_stack_failure_is_fatal() {
        let listener = ScriptedListener::new(vec![Event::Conn(b"1\n1\n")]);
        let mut lp = AcceptLoop::new(listener, config("+")).unwrap();
        // Bypass validation to force a mapping error
        lp.config.stack_size = 1;

        assert!(lp.run_once().is_err());
        assert_eq!(lp.live_workers(), 0);
        assert_eq!(lp.stats().accepted, 0);
    }

    #[test]
    fn test_repeated_accept_errors_logged_once() {
        let listener = ScriptedListener::new(vec![
            Event::FailWith(libc::EMFILE),
            Event::FailWith(libc::EMFILE),
            Event::FailWith(libc::EMFILE),
            Event::FailWith(libc::ENFILE),
        ]);
        let mut lp = AcceptLoop::new(listener, config("+")).unwrap();

        let emfile = io::Error::from_raw_os_error(libc::EMFILE);
        let enfile = io::Error::from_raw_os_error(libc::ENFILE);
        assert!(lp.note_accept_error(&emfile));
        assert!(!lp.note_accept_error(&emfile));
        assert!(lp.note_accept_error(&enfile));
        assert_eq!(lp.stats().accept_errors, 3);

        lp.accept_failure = None;
        for _ in 0..4 {
            assert!(!lp.run_once().unwrap().accepted);
        }
        assert_eq!(lp.stats().accept_errors, 7);
        assert_eq!(lp.accept_failure, Some((enfile.kind(), Some(libc::ENFILE))));

        // A timeout ends the run, so the same errno is reported again
        lp.run_once().unwrap();
        assert_eq!(lp.accept_failure, None);
        assert!(lp.note_accept_error(&enfile));
    }

    #[test]
    fn test_stalled_worker_does_not_block_others() {
        let gate = Arc::new(AtomicI32::new(0));
        let listener = ScriptedListener::new(vec![
            Event::Gated(b"1\n1\n", Arc::clone(&gate)),
            Event::Conn(b"2\n3\n"),
            Event::Conn(b"4\n4\n"),
        ]);
        let mut lp = AcceptLoop::new(listener, config("+")).unwrap();

        for _ in 0..3 {
            assert!(lp.run_once().unwrap().accepted);
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while lp.stats().reclaimed < 2 {
            assert!(Instant::now() < deadline, "free workers never reclaimed");
            lp.run_once().unwrap();
        }

        for _ in 0..5 {
            let cycle = lp.run_once().unwrap();
            assert_eq!(cycle.live, 1);
            // Whatever survives a sweep is still running
            assert!(lp.registry.iter().all(|h| !h.completion().is_clear()));
        }
        assert_eq!(lp.stats().reclaimed, 2);
        assert_eq!(lp.stats().served, 2);

        open_gate(&gate);
        drain(&mut lp);
        let stats = lp.stats();
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.reclaimed, 3);
        assert_eq!(stats.served, 3);
    }
}
