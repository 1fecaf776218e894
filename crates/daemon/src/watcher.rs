//! Directory watcher: filesystem events in, schedule/cancel emissions out.
//!
//! Added files collect in a pending list guarded by a stabilization
//! timer; every further event restarts the timer, so a file must survive
//! a quiet window before it is considered ready. When the timer fires the
//! pending snapshot is sorted, pushed through the filter chain, and each
//! surviving file is emitted as a schedule event.

use notify::{RecursiveMode, Watcher as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::filters::FilterChain;

/// Default quiet window a file must survive before processing.
pub const DEFAULT_STABILIZATION: Duration = Duration::from_secs(60);

/// Emission toward the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Schedule(PathBuf),
    Cancel(PathBuf),
}

#[derive(Default)]
struct WatchState {
    pending: Vec<PathBuf>,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    state: Mutex<WatchState>,
    filters: FilterChain,
    events: UnboundedSender<WatchEvent>,
    stabilization: Duration,
    /// Serializes flushes: a snapshot finishes emitting before the next
    /// one starts.
    flush_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    fn restart_timer(inner: &Arc<Inner>, state: &mut WatchState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        let timer_inner = Arc::clone(inner);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timer_inner.stabilization).await;
            Inner::flush(&timer_inner).await;
        }));
    }

    fn on_add(inner: &Arc<Inner>, path: PathBuf) {
        if path.is_dir() {
            return;
        }
        let mut state = inner.state.lock().expect("watch state lock");
        if !state.pending.contains(&path) {
            debug!(file = %path.display(), "pending");
            state.pending.push(path);
        }
        Self::restart_timer(inner, &mut state);
    }

    fn on_change(inner: &Arc<Inner>, path: &Path) {
        let mut state = inner.state.lock().expect("watch state lock");
        if state.pending.iter().any(|p| p == path) {
            Self::restart_timer(inner, &mut state);
        }
    }

    fn on_remove(inner: &Arc<Inner>, path: &Path) {
        {
            let mut state = inner.state.lock().expect("watch state lock");
            if let Some(pos) = state.pending.iter().position(|p| p == path) {
                state.pending.remove(pos);
                Self::restart_timer(inner, &mut state);
            }
        }
        // A cancel goes out regardless; the scheduler treats unknown
        // files as a no-op.
        let _ = inner.events.send(WatchEvent::Cancel(path.to_path_buf()));
    }

    async fn flush(inner: &Arc<Inner>) {
        let _guard = inner.flush_lock.lock().await;

        let mut snapshot = {
            let mut state = inner.state.lock().expect("watch state lock");
            state.timer = None;
            std::mem::take(&mut state.pending)
        };
        if snapshot.is_empty() {
            return;
        }
        snapshot.sort();
        snapshot.dedup();

        for file in snapshot {
            match inner.filters.check(&file).await {
                Ok(()) => {
                    let _ = inner.events.send(WatchEvent::Schedule(file));
                }
                Err(reason) => {
                    debug!("IGNORE: '{}': {}", file.display(), reason);
                }
            }
        }
    }

    fn is_quiescent(&self) -> bool {
        let state = self.state.lock().expect("watch state lock");
        state.pending.is_empty() && state.timer.is_none() && self.flush_lock.try_lock().is_ok()
    }
}

/// Debounced directory watcher.
pub struct DirectoryWatcher {
    inner: Arc<Inner>,
    fs_watcher: Option<notify::RecommendedWatcher>,
    pump: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    pub fn new(
        stabilization: Duration,
        filters: FilterChain,
        events: UnboundedSender<WatchEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(WatchState::default()),
                filters,
                events,
                stabilization,
                flush_lock: tokio::sync::Mutex::new(()),
            }),
            fs_watcher: None,
            pump: None,
        }
    }

    /// Feed an added file. Used by the initial scan and the fs bridge.
    pub fn notify_add(&self, path: PathBuf) {
        Inner::on_add(&self.inner, path);
    }

    /// Feed a change event for a file.
    pub fn notify_change(&self, path: &Path) {
        Inner::on_change(&self.inner, path);
    }

    /// Feed a removal; always emits a cancel downstream.
    pub fn notify_remove(&self, path: &Path) {
        Inner::on_remove(&self.inner, path);
    }

    /// True when nothing is pending, no timer is armed and no flush is in
    /// flight.
    pub fn is_quiescent(&self) -> bool {
        self.inner.is_quiescent()
    }

    /// Start watching a directory tree for filesystem events.
    pub fn watch(&mut self, dir: &Path) -> Result<(), notify::Error> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut fs_watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                let _ = tx.send(res);
            })?;
        fs_watcher.watch(dir, RecursiveMode::Recursive)?;
        self.fs_watcher = Some(fs_watcher);

        let inner = Arc::clone(&self.inner);
        self.pump = Some(tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => Self::dispatch(&inner, event),
                    Err(e) => warn!("watch error: {}", e),
                }
            }
        }));
        Ok(())
    }

    fn dispatch(inner: &Arc<Inner>, event: notify::Event) {
        use notify::EventKind;
        for path in event.paths {
            match event.kind {
                EventKind::Create(_) => Inner::on_add(inner, path),
                EventKind::Modify(_) => Inner::on_change(inner, &path),
                EventKind::Remove(_) => Inner::on_remove(inner, &path),
                _ => {}
            }
        }
    }

    /// Stop watching and disarm the timer.
    pub fn close(&mut self) {
        self.fs_watcher = None;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        let mut state = self.inner.state.lock().expect("watch state lock");
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.pending.clear();
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::ExtensionFilter;
    use tokio::sync::mpsc;

    const WINDOW: Duration = Duration::from_millis(40);

    fn watcher(filters: FilterChain) -> (DirectoryWatcher, mpsc::UnboundedReceiver<WatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (DirectoryWatcher::new(WINDOW, filters, tx), rx)
    }

    async fn collect(rx: &mut mpsc::UnboundedReceiver<WatchEvent>, wait: Duration) -> Vec<WatchEvent> {
        tokio::time::sleep(wait).await;
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn test_add_emits_schedule_after_window() {
        let (watcher, mut rx) = watcher(FilterChain::pass_all());
        watcher.notify_add(PathBuf::from("/in/film.mkv"));

        // Nothing before the window elapses.
        let early = collect(&mut rx, Duration::from_millis(10)).await;
        assert!(early.is_empty());

        let events = collect(&mut rx, WINDOW * 3).await;
        assert_eq!(events, vec![WatchEvent::Schedule(PathBuf::from("/in/film.mkv"))]);
    }

    #[tokio::test]
    async fn test_flush_is_sorted_ascending() {
        let (watcher, mut rx) = watcher(FilterChain::pass_all());
        watcher.notify_add(PathBuf::from("/in/b.mkv"));
        watcher.notify_add(PathBuf::from("/in/a.mkv"));
        watcher.notify_add(PathBuf::from("/in/c.mkv"));

        let events = collect(&mut rx, WINDOW * 3).await;
        assert_eq!(
            events,
            vec![
                WatchEvent::Schedule(PathBuf::from("/in/a.mkv")),
                WatchEvent::Schedule(PathBuf::from("/in/b.mkv")),
                WatchEvent::Schedule(PathBuf::from("/in/c.mkv")),
            ]
        );
    }

    #[tokio::test]
    async fn test_remove_drops_pending_and_always_cancels() {
        let (watcher, mut rx) = watcher(FilterChain::pass_all());
        watcher.notify_add(PathBuf::from("/in/film.mkv"));
        watcher.notify_remove(Path::new("/in/film.mkv"));
        // Removing a file that was never pending still emits a cancel.
        watcher.notify_remove(Path::new("/in/ghost.mkv"));

        let events = collect(&mut rx, WINDOW * 3).await;
        assert_eq!(
            events,
            vec![
                WatchEvent::Cancel(PathBuf::from("/in/film.mkv")),
                WatchEvent::Cancel(PathBuf::from("/in/ghost.mkv")),
            ]
        );
    }

    #[tokio::test]
    async fn test_change_restarts_the_window() {
        // A generous window keeps this test stable on slow runners.
        let window = Duration::from_millis(150);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = DirectoryWatcher::new(window, FilterChain::pass_all(), tx);
        watcher.notify_add(PathBuf::from("/in/film.mkv"));

        // Keep poking the file before the window elapses.
        for _ in 0..3 {
            tokio::time::sleep(window / 3).await;
            watcher.notify_change(Path::new("/in/film.mkv"));
        }
        // The window restarted each time: still nothing emitted.
        assert!(rx.try_recv().is_err());

        let events = collect(&mut rx, window * 2).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_change_of_unknown_file_does_not_arm_timer() {
        let (watcher, mut rx) = watcher(FilterChain::pass_all());
        watcher.notify_change(Path::new("/in/never-added.mkv"));

        let events = collect(&mut rx, WINDOW * 3).await;
        assert!(events.is_empty());
        assert!(watcher.is_quiescent());
    }

    #[tokio::test]
    async fn test_filters_reject_before_emission() {
        let chain = FilterChain::new(vec![Box::new(
            ExtensionFilter::new(Some("mkv"), None).unwrap(),
        )]);
        let (watcher, mut rx) = watcher(chain);
        watcher.notify_add(PathBuf::from("/in/film.mkv"));
        watcher.notify_add(PathBuf::from("/in/notes.txt"));

        let events = collect(&mut rx, WINDOW * 3).await;
        assert_eq!(events, vec![WatchEvent::Schedule(PathBuf::from("/in/film.mkv"))]);
    }

    #[tokio::test]
    async fn test_duplicate_adds_emit_once() {
        let (watcher, mut rx) = watcher(FilterChain::pass_all());
        watcher.notify_add(PathBuf::from("/in/film.mkv"));
        watcher.notify_add(PathBuf::from("/in/film.mkv"));

        let events = collect(&mut rx, WINDOW * 3).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_quiescent_after_flush() {
        let (watcher, mut rx) = watcher(FilterChain::pass_all());
        assert!(watcher.is_quiescent());

        watcher.notify_add(PathBuf::from("/in/film.mkv"));
        assert!(!watcher.is_quiescent());

        let _ = collect(&mut rx, WINDOW * 3).await;
        assert!(watcher.is_quiescent());
    }
}
