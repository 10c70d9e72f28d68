//! This file contains the transport interceptor: a `Connector` that opens the
//! real transport and hands back a drop-in wrapper. The wrapper runs every
//! outbound frame and every inbound message through the fault injector, and
//! binds the handle to a session when the target names one.
//!
//! `TransportSlot` is where the process-wide constructor lives. Installing the
//! interceptor there happens at most once.
//!
//! SPDX-License-Identifier: MIT

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::err::FaultErr;
use crate::frame::Frame;
use crate::injector::{Direction, FaultInjector, FaultTally, Outcome, TallySnapshot, Verdict};
use crate::misc::lock;
use crate::policy::InterceptContext;
use crate::session::{HookRegistry, SessionBinding};
use crate::transport::{Connector, Event, EventKind, Listener, ReadyState, Transport};

/// Runs deferred corruption work. On a tokio runtime the work is spawned and
/// tracked so `settle` can wait for it; without one it runs inline.
#[derive(Clone, Default)]
struct Deferred {
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Deferred {
    fn run<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let task = runtime.spawn(work);
                let mut pending = lock(&self.pending);
                pending.retain(|t| !t.is_finished());
                pending.push(task);
            }
            Err(_) => futures::executor::block_on(work),
        }
    }

    async fn settle(&self) {
        loop {
            let tasks = std::mem::take(&mut *lock(&self.pending));
            if tasks.is_empty() {
                break;
            }

            for task in tasks {
                if let Err(e) = task.await {
                    warn!("Deferred corruption task failed: {}", e);
                }
            }
        }
    }
}

fn deliver(listener: &Mutex<Listener>, event: &Event) {
    let mut listener = lock(listener);
    (*listener)(event);
}

/// Factory producing intercepted transports from a real connector
#[derive(Clone)]
pub struct Interceptor<C> {
    real: C,
    ctx: InterceptContext,
}

impl<C: Connector> Interceptor<C> {
    pub fn new(real: C, ctx: InterceptContext) -> Self {
        Interceptor { real, ctx }
    }

    pub fn context(&self) -> &InterceptContext {
        &self.ctx
    }
}

impl<C: Connector> Connector for Interceptor<C> {
    type Transport = InterceptedTransport<C::Transport>;

    fn connect(
        &self,
        target: &str,
        protocols: Option<&[String]>,
    ) -> Result<Self::Transport, FaultErr> {
        // Construction failures propagate untouched
        let inner = self.real.connect(target, protocols)?;
        let session = SessionBinding::bind(target, &self.ctx.hooks);

        debug!(
            "Intercepted '{}' (session: {})",
            target,
            session.as_ref().map_or("none", |s| s.session_id())
        );

        Ok(InterceptedTransport {
            inner: Arc::new(Mutex::new(inner)),
            url: target.to_string(),
            injector: self.ctx.injector(),
            hooks: self.ctx.hooks.clone(),
            session,
            closed: Arc::new(AtomicBool::new(false)),
            tally: Arc::new(FaultTally::default()),
            deferred: Deferred::default(),
        })
    }
}

/// Drop-in wrapper around a real transport
pub struct InterceptedTransport<T> {
    inner: Arc<Mutex<T>>,
    url: String,
    injector: FaultInjector,
    hooks: HookRegistry,
    session: Option<SessionBinding>,
    closed: Arc<AtomicBool>,
    tally: Arc<FaultTally>,
    deferred: Deferred,
}

impl<T: Transport + 'static> InterceptedTransport<T> {
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id())
    }

    pub fn tally(&self) -> TallySnapshot {
        self.tally.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait for every in-flight deferred corruption on this handle
    pub async fn settle(&self) {
        self.deferred.settle().await;
    }

    fn wrap_inbound(&self, listener: Listener) -> Listener {
        let original = Arc::new(Mutex::new(listener));
        let injector = self.injector.clone();
        let closed = self.closed.clone();
        let tally = self.tally.clone();
        let deferred = self.deferred.clone();

        Box::new(move |event: &Event| {
            if closed.load(Ordering::Acquire) {
                return;
            }

            let Event::Message(message) = event else {
                deliver(&original, event);
                return;
            };

            let verdict = injector.decide(Direction::Inbound);
            tally.record(Direction::Inbound, verdict);
            if verdict == Verdict::Pass {
                deliver(&original, event);
                return;
            }

            match injector.apply_inbound(verdict, message.clone()) {
                Outcome::Dropped => {}
                Outcome::Deliver(corrupted) => {
                    deliver(&original, &Event::Message(corrupted));
                }
                Outcome::Deferred(work) => {
                    let original = original.clone();
                    let closed = closed.clone();
                    deferred.run(async move {
                        let corrupted = work.await;
                        if closed.load(Ordering::Acquire) {
                            debug!("Handle closed, discarding deferred inbound frame");
                            return;
                        }

                        deliver(&original, &Event::Message(corrupted));
                    });
                }
            }
        })
    }
}

impl<T: Transport + 'static> Transport for InterceptedTransport<T> {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn protocol(&self) -> String {
        lock(&self.inner).protocol()
    }

    fn ready_state(&self) -> ReadyState {
        lock(&self.inner).ready_state()
    }

    fn send(&mut self, frame: Frame) -> Result<(), FaultErr> {
        let verdict = self.injector.decide(Direction::Outbound);
        self.tally.record(Direction::Outbound, verdict);

        match self.injector.apply_outbound(verdict, frame) {
            Outcome::Dropped => Ok(()),
            Outcome::Deliver(frame) => lock(&self.inner).send(frame),
            Outcome::Deferred(work) => {
                let inner = self.inner.clone();
                let closed = self.closed.clone();
                self.deferred.run(async move {
                    let frame = work.await;
                    if closed.load(Ordering::Acquire) {
                        debug!("Handle closed, discarding deferred outbound frame");
                        return;
                    }

                    if let Err(e) = lock(&inner).send(frame) {
                        warn!("Deferred send failed: {}", e);
                    }
                });

                Ok(())
            }
        }
    }

    fn close(&mut self, code: Option<u16>, reason: Option<&str>) -> Result<(), FaultErr> {
        // The real close succeeds exactly once
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Ends at most once, a retried close does not fire the hooks again
        if let Some(session) = &self.session {
            session.end(&self.hooks, self.tally.snapshot());
        }

        let closing = lock(&self.inner).close(code, reason);
        if let Err(e) = &closing {
            warn!("Close of '{}' failed, handle stays open: {}", self.url, e);
            self.closed.store(false, Ordering::Release);
        }

        closing
    }

    fn add_listener(&mut self, kind: EventKind, listener: Listener) {
        let listener = match kind {
            EventKind::Message => self.wrap_inbound(listener),
            _ => listener,
        };

        lock(&self.inner).add_listener(kind, listener);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Installation {
    Installed,
    AlreadyInstalled,
}

/// The process-wide socket constructor. Until the interceptor is installed it
/// hands out plain transports.
pub struct TransportSlot<C> {
    real: Arc<C>,
    hooked: OnceLock<Interceptor<Arc<C>>>,
}

impl<C: Connector + 'static> TransportSlot<C> {
    pub fn new(real: C) -> Self {
        TransportSlot {
            real: Arc::new(real),
            hooked: OnceLock::new(),
        }
    }

    /// Install the interceptor. Later attempts are no-ops.
    pub fn install(&self, ctx: InterceptContext) -> Installation {
        let mut installation = Installation::AlreadyInstalled;
        self.hooked.get_or_init(|| {
            installation = Installation::Installed;
            Interceptor::new(self.real.clone(), ctx)
        });

        if installation == Installation::AlreadyInstalled {
            debug!("Interceptor already installed, ignoring");
        }

        installation
    }

    pub fn is_installed(&self) -> bool {
        self.hooked.get().is_some()
    }

    pub fn interceptor(&self) -> Option<&Interceptor<Arc<C>>> {
        self.hooked.get()
    }

    pub fn connect(
        &self,
        target: &str,
        protocols: Option<&[String]>,
    ) -> Result<Box<dyn Transport>, FaultErr> {
        match self.hooked.get() {
            Some(interceptor) => Ok(Box::new(interceptor.connect(target, protocols)?)),
            None => Ok(Box::new(self.real.connect(target, protocols)?)),
        }
    }
}
