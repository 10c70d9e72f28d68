//! Session hook dispatcher. A connection target may carry a session
//! identifier after the `gameId=` marker; when it does, the handle is bound to
//! that session and external collaborators hear about discovery, liveness
//! updates, and the end of the session through the hooks registered here.
//!
//! Hooks belong to other components, so a hook that errors or panics is
//! logged and skipped. It never reaches the transport path.
//!
//! SPDX-License-Identifier: MIT

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::err::FaultErr;
use crate::injector::TallySnapshot;
use crate::misc::lock;

/// Marker that precedes the session identifier in a connection target
pub const SESSION_MARKER: &str = "gameId=";

/// Everything after the marker, or `None` when the marker is absent or
/// nothing follows it
pub fn extract_session_id(target: &str) -> Option<&str> {
    let (_, id) = target.split_once(SESSION_MARKER)?;
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Final state of a session, handed to "session ended" hooks
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub target: String,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    pub last_liveness: Option<String>,
    pub tally: TallySnapshot,
}

pub type DiscoveredHook = Arc<dyn Fn(&str) -> Result<(), FaultErr> + Send + Sync>;
pub type LivenessHook = Arc<dyn Fn(Option<&str>) -> Result<(), FaultErr> + Send + Sync>;
pub type EndedHook = Arc<dyn Fn(&SessionSnapshot) -> Result<(), FaultErr> + Send + Sync>;

/// Receives liveness values from a `LivenessSource`
pub type LivenessSink = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// External observer of session liveness (players alive, heartbeats, ...)
pub trait LivenessSource: Send + Sync {
    fn start(&self, sink: LivenessSink) -> Result<(), FaultErr>;
    fn stop(&self) -> Result<(), FaultErr>;
}

#[derive(Default)]
struct Hooks {
    discovered: Vec<(String, DiscoveredHook)>,
    liveness: Vec<(String, LivenessHook)>,
    ended: Vec<(String, EndedHook)>,
    source: Option<Arc<dyn LivenessSource>>,
}

// Replace a hook registered under the same name, or append a new one
fn upsert<H>(hooks: &mut Vec<(String, H)>, name: &str, hook: H) {
    match hooks.iter_mut().find(|(existing, _)| existing.as_str() == name) {
        Some(slot) => slot.1 = hook,
        None => hooks.push((name.to_string(), hook)),
    }
}

/// Run one external callback, containing both errors and panics. Returns
/// whether it succeeded.
fn isolate(stage: &str, name: &str, hook: impl FnOnce() -> Result<(), FaultErr>) -> bool {
    match catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("{} hook '{}' failed: {}", stage, name, e);
            false
        }
        Err(_) => {
            warn!("{} hook '{}' panicked", stage, name);
            false
        }
    }
}

/// Named callbacks supplied by external collaborators. Cloning shares the
/// registry.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Arc<RwLock<Hooks>>,
}

impl HookRegistry {
    pub fn on_session_discovered(
        &self,
        name: &str,
        hook: impl Fn(&str) -> Result<(), FaultErr> + Send + Sync + 'static,
    ) {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        let hook: DiscoveredHook = Arc::new(hook);
        upsert(&mut hooks.discovered, name, hook);
    }

    pub fn on_liveness_update(
        &self,
        name: &str,
        hook: impl Fn(Option<&str>) -> Result<(), FaultErr> + Send + Sync + 'static,
    ) {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        let hook: LivenessHook = Arc::new(hook);
        upsert(&mut hooks.liveness, name, hook);
    }

    pub fn on_session_ended(
        &self,
        name: &str,
        hook: impl Fn(&SessionSnapshot) -> Result<(), FaultErr> + Send + Sync + 'static,
    ) {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        let hook: EndedHook = Arc::new(hook);
        upsert(&mut hooks.ended, name, hook);
    }

    pub fn set_liveness_source(&self, source: Arc<dyn LivenessSource>) {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        hooks.source = Some(source);
    }

    /// Drop every hook registered under `name`
    pub fn remove(&self, name: &str) {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        hooks.discovered.retain(|(n, _)| n != name);
        hooks.liveness.retain(|(n, _)| n != name);
        hooks.ended.retain(|(n, _)| n != name);
    }

    // Hooks are cloned out before running so a hook may register others
    // without deadlocking
    fn read<T>(&self, f: impl FnOnce(&Hooks) -> T) -> T {
        let hooks = self.hooks.read().unwrap_or_else(|e| e.into_inner());
        f(&hooks)
    }

    /// Returns the number of hooks that failed
    pub fn dispatch_discovered(&self, session_id: &str) -> usize {
        let hooks = self.read(|h| h.discovered.clone());
        hooks
            .iter()
            .filter(|(name, hook)| !isolate("session discovered", name, || hook(session_id)))
            .count()
    }

    pub fn dispatch_liveness(&self, value: Option<&str>) -> usize {
        let hooks = self.read(|h| h.liveness.clone());
        hooks
            .iter()
            .filter(|(name, hook)| !isolate("liveness update", name, || hook(value)))
            .count()
    }

    pub fn dispatch_ended(&self, snapshot: &SessionSnapshot) -> usize {
        let hooks = self.read(|h| h.ended.clone());
        hooks
            .iter()
            .filter(|(name, hook)| !isolate("session ended", name, || hook(snapshot)))
            .count()
    }

    /// Start the liveness subscription, `false` if there is no source or it
    /// failed to start
    pub fn start_liveness(&self, sink: LivenessSink) -> bool {
        match self.read(|h| h.source.clone()) {
            Some(source) => isolate("liveness start", "source", || source.start(sink)),
            None => false,
        }
    }

    pub fn stop_liveness(&self) {
        if let Some(source) = self.read(|h| h.source.clone()) {
            isolate("liveness stop", "source", || source.stop());
        }
    }
}

/// One handle's association with a session. Established once at construction
/// and never reassigned.
pub struct SessionBinding {
    session_id: String,
    target: String,
    started_at: DateTime<Local>,
    last_liveness: Arc<Mutex<Option<String>>>,
    ended: Arc<AtomicBool>,
    subscribed: bool,
}

impl SessionBinding {
    /// Bind `target` to its session if it names one, announcing it and
    /// starting the liveness subscription
    pub fn bind(target: &str, hooks: &HookRegistry) -> Option<Self> {
        let session_id = extract_session_id(target)?;
        info!("Session '{}' discovered", session_id);

        hooks.dispatch_discovered(session_id);

        let last_liveness = Arc::new(Mutex::new(None));
        let ended = Arc::new(AtomicBool::new(false));

        let sink: LivenessSink = {
            let last_liveness = last_liveness.clone();
            let ended = ended.clone();
            let hooks = hooks.clone();
            Arc::new(move |value: Option<String>| {
                if ended.load(Ordering::Acquire) {
                    return;
                }

                *lock(&last_liveness) = value.clone();
                hooks.dispatch_liveness(value.as_deref());
            })
        };
        let subscribed = hooks.start_liveness(sink);

        Some(SessionBinding {
            session_id: session_id.to_string(),
            target: target.to_string(),
            started_at: Local::now(),
            last_liveness,
            ended,
            subscribed,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn snapshot(&self, tally: TallySnapshot) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            target: self.target.clone(),
            started_at: self.started_at,
            ended_at: Local::now(),
            last_liveness: lock(&self.last_liveness).clone(),
            tally,
        }
    }

    /// Fire the "session ended" hooks and stop liveness. Only the first call
    /// does anything; returns whether this call ended the session.
    pub fn end(&self, hooks: &HookRegistry, tally: TallySnapshot) -> bool {
        if self.ended.swap(true, Ordering::AcqRel) {
            return false;
        }

        let snapshot = self.snapshot(tally);
        info!(
            "Session '{}' ended after {}s",
            self.session_id,
            (snapshot.ended_at - snapshot.started_at).num_seconds()
        );

        hooks.dispatch_ended(&snapshot);
        if self.subscribed {
            hooks.stop_liveness();
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct ManualLiveness {
        sink: Mutex<Option<LivenessSink>>,
        stops: AtomicUsize,
    }

    impl ManualLiveness {
        fn push(&self, value: &str) {
            if let Some(sink) = lock(&self.sink).clone() {
                sink(Some(value.to_string()));
            }
        }
    }

    impl LivenessSource for ManualLiveness {
        fn start(&self, sink: LivenessSink) -> Result<(), FaultErr> {
            *lock(&self.sink) = Some(sink);
            Ok(())
        }

        fn stop(&self) -> Result<(), FaultErr> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn extracts_identifier_after_marker() {
        assert_eq!(
            extract_session_id("wss://eu.example.io/play?gameId=abc123"),
            Some("abc123")
        );
        assert_eq!(extract_session_id("ws://host/?region=eu&gameId=abc123"), Some("abc123"));
    }

    #[test]
    fn missing_or_empty_identifier() {
        assert_eq!(extract_session_id("ws://host/lobby"), None);
        assert_eq!(extract_session_id("ws://host/?gameId="), None);
    }

    #[test]
    fn failing_hooks_are_counted_not_propagated() {
        let hooks = HookRegistry::default();
        hooks.on_session_discovered("ok", |_| Ok(()));
        hooks.on_session_discovered("err", |_| Err(FaultErr::hook("nope")));
        hooks.on_session_discovered("panic", |_| panic!("hook blew up"));
        assert_eq!(hooks.dispatch_discovered("abc"), 2);
    }

    #[test]
    fn same_name_replaces() {
        let hooks = HookRegistry::default();
        hooks.on_session_discovered("a", |_| Err(FaultErr::hook("old")));
        hooks.on_session_discovered("a", |_| Ok(()));
        assert_eq!(hooks.dispatch_discovered("abc"), 0);

        hooks.on_session_discovered("b", |_| Err(FaultErr::hook("b")));
        hooks.remove("b");
        assert_eq!(hooks.dispatch_discovered("abc"), 0);
    }

    #[test]
    fn binding_tracks_liveness_and_ends_once() {
        let hooks = HookRegistry::default();
        let source = Arc::new(ManualLiveness::default());
        hooks.set_liveness_source(source.clone());

        let updates = Arc::new(AtomicUsize::new(0));
        let counter = updates.clone();
        hooks.on_liveness_update("count", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let ended = Arc::new(Mutex::new(Vec::new()));
        let seen = ended.clone();
        hooks.on_session_ended("record", move |snap| {
            lock(&seen).push(snap.clone());
            Ok(())
        });

        let binding = SessionBinding::bind("ws://host/?gameId=xyz", &hooks).unwrap();
        assert_eq!(binding.session_id(), "xyz");

        source.push("42");
        source.push("41");
        assert_eq!(updates.load(Ordering::SeqCst), 2);

        assert!(binding.end(&hooks, TallySnapshot::default()));
        assert!(!binding.end(&hooks, TallySnapshot::default()));
        assert_eq!(source.stops.load(Ordering::SeqCst), 1);

        // Updates after the end are ignored
        source.push("40");
        assert_eq!(updates.load(Ordering::SeqCst), 2);

        let ended = lock(&ended);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].session_id, "xyz");
        assert_eq!(ended[0].last_liveness.as_deref(), Some("41"));
    }

    #[test]
    fn no_marker_no_binding() {
        let hooks = HookRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        hooks.on_session_discovered("count", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(SessionBinding::bind("ws://host/lobby", &hooks).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
