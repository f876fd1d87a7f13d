//! The notifier: subscriptions in, native calls out, events routed back

use crate::backend::Backend;
use crate::config::NotifierConfig;
use crate::dispatch;
use crate::error::{Error, Result};
use crate::index::ChannelIndex;
use crate::native::Native;
use crate::plan;
use crate::subscriber::Subscriber;
use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, trace, warn};
use treewatch_core::{canonicalize, split_recursive, Event, NativeWatch, RawEvent, SubscriberId, Tree, Walk};

/// Tree and channel index, guarded together
#[derive(Default)]
pub(crate) struct State {
    pub(crate) tree: Tree,
    pub(crate) index: ChannelIndex,
}

struct Inner {
    state: RwLock<State>,
    native: Native,
}

/// Filesystem change notifier
///
/// Subscribers register interest in paths with [`Notifier::watch`]. A path
/// ending in `...` (for example `/src/...`) watches the whole tree below it.
/// The notifier keeps the native watches minimal: overlapping recursive
/// watches are merged into one at their topmost root, and split again when
/// that root goes away.
///
/// Events are delivered without blocking; a subscriber whose channel is full
/// misses events until it catches up.
pub struct Notifier {
    inner: Arc<Inner>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Notifier {
    /// Create a notifier that is fed events through [`Notifier::dispatch`]
    pub fn new(backend: Backend, config: &NotifierConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                native: Native::new(backend, config),
            }),
            shutdown: None,
            worker: None,
        }
    }

    /// Create a notifier with a dispatcher thread draining `events`
    ///
    /// The thread runs until the notifier is dropped or every sender of
    /// `events` is gone.
    pub fn with_events(backend: Backend, events: Receiver<RawEvent>, config: &NotifierConfig) -> Self {
        let mut notifier = Self::new(backend, config);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let inner = Arc::clone(&notifier.inner);

        notifier.worker = Some(std::thread::spawn(move || {
            debug!("dispatcher started");
            loop {
                select! {
                    recv(events) -> msg => match msg {
                        Ok(raw) => inner.dispatch(raw),
                        Err(_) => break,
                    },
                    recv(shutdown_rx) -> _ => break,
                }
            }
            debug!("dispatcher stopped");
        }));
        notifier.shutdown = Some(shutdown_tx);
        notifier
    }

    /// Create a notifier on the platform's native watcher
    pub fn recommended(config: &NotifierConfig) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded(config.queue_capacity);
        let backend = crate::platform::recommended(tx)?;
        info!("Using {:?} backend", backend);
        Ok(Self::with_events(backend, rx, config))
    }

    /// Register `subscriber` for `events` at `path`
    ///
    /// A trailing `...` segment makes the watch recursive; it then requires
    /// an existing directory. Only the visible event kinds of `events` are
    /// used, and an empty set is accepted and ignored. Registering the same
    /// subscriber again adds to its previous events.
    ///
    /// On failure nothing changes: native calls already made are undone and
    /// the registration is dropped.
    pub fn watch(&self, path: impl AsRef<Path>, subscriber: &Subscriber, events: Event) -> Result<()> {
        let mut mask = events.visible();
        if mask.is_empty() {
            return Ok(());
        }

        let (path, recursive) = split_recursive(path.as_ref());
        let path = canonicalize(&path)?;
        if recursive {
            if !path.is_dir() {
                return Err(treewatch_core::Error::NotDirectory(path).into());
            }
            mask |= Event::RECURSIVE;
        }

        let mut state = self.inner.state.write();
        state.watch(&self.inner.native, path, subscriber, mask)
    }

    /// Remove every registration of `subscriber`
    ///
    /// The subscriber is gone afterwards even if some native calls failed;
    /// the first such failure is returned.
    pub fn stop(&self, subscriber: &Subscriber) -> Result<()> {
        let mut state = self.inner.state.write();
        state.stop(&self.inner.native, subscriber.id())
    }

    /// Route one raw event to the interested subscribers
    pub fn dispatch(&self, raw: RawEvent) {
        self.inner.dispatch(raw);
    }

    /// Check if nothing is registered and no native watch is held
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.read();
        state.tree.is_empty() && state.index.is_empty()
    }

    /// Native watches currently held, in tree order
    pub fn native_watches(&self) -> Vec<(PathBuf, NativeWatch)> {
        let state = self.inner.state.read();
        let mut watches = Vec::new();
        let _ = state.tree.walk::<(), _>(|node, path| {
            if let Some(native) = node.native() {
                watches.push((path.to_path_buf(), native.clone()));
            }
            Ok(Walk::Continue)
        });
        watches
    }

    /// Paths `subscriber` is registered at
    pub fn watched_paths(&self, subscriber: &Subscriber) -> Vec<PathBuf> {
        let state = self.inner.state.read();
        state
            .index
            .paths(subscriber.id())
            .map(|paths| paths.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Dispatcher thread panicked");
            }
        }
    }
}

impl Inner {
    fn dispatch(&self, raw: RawEvent) {
        trace!("raw {} {}", raw.event, raw.path.display());
        let deliveries = dispatch::route(&self.state.read(), &raw);
        dispatch::deliver(deliveries);

        if self.native.is_emulated() && dispatch::affects_emulation(&raw) {
            dispatch::track(&mut self.state.write(), &self.native, &raw);
        }
    }
}

impl State {
    fn watch(&mut self, native: &Native, path: PathBuf, subscriber: &Subscriber, mask: Event) -> Result<()> {
        let id = subscriber.id();
        let created = !self.tree.contains(&path);
        let node = self.tree.add(&path)?;
        let before = node.watchpoint().get(id);
        let diff = node.watchpoint_mut().add(id, mask);

        if diff.is_none() {
            trace!("{} already covered at {}", mask, path.display());
            self.index.insert(subscriber, &path);
            return Ok(());
        }

        match self.settle(native, &path) {
            Ok(()) => {
                debug!("{:?} watching {} for {}", id, path.display(), mask);
                self.index.insert(subscriber, &path);
                Ok(())
            }
            Err(err) => {
                if created {
                    self.tree.del(&path)?;
                } else {
                    let node = self.tree.get_mut(&path)?;
                    match before {
                        Some(before) => node.watchpoint_mut().shrink(id, mask - before),
                        None => node.watchpoint_mut().del(id),
                    };
                    self.tree.prune(&path)?;
                }
                Err(err)
            }
        }
    }

    fn stop(&mut self, native: &Native, id: SubscriberId) -> Result<()> {
        let Some(paths) = self.index.remove(id) else {
            return Ok(());
        };

        let mut regions: Vec<PathBuf> = Vec::new();
        for path in &paths {
            let Ok(node) = self.tree.get_mut(path) else {
                warn!("{:?} registered at {} but no node exists", id, path.display());
                continue;
            };
            if node.watchpoint_mut().del(id).is_none() {
                continue;
            }
            match plan::region(&self.tree, path) {
                Ok(region) => regions.push(region),
                Err(err) => warn!("Skipping {}: {}", path.display(), err),
            }
        }

        regions.sort();
        regions.dedup();
        let mut tops: Vec<PathBuf> = Vec::with_capacity(regions.len());
        for region in regions {
            if !tops.iter().any(|top| region.starts_with(top)) {
                tops.push(region);
            }
        }

        let mut first_err: Option<Error> = None;
        for top in &tops {
            if let Err(err) = self.settle(native, top) {
                warn!("Failed to release watches under {}: {}", top.display(), err);
                first_err.get_or_insert(err);
            }
        }

        for path in &paths {
            self.tree.prune(path)?;
        }
        debug!("{:?} stopped", id);
        first_err.map_or(Ok(()), Err)
    }

    /// Plan and execute the native calls for the region around `path`,
    /// recording the outcome only if every call succeeded
    fn settle(&mut self, native: &Native, path: &Path) -> Result<()> {
        let region = plan::region(&self.tree, path)?;
        let ops = plan::reconcile(&self.tree, &region, native.is_emulated())?;
        if ops.is_empty() {
            return Ok(());
        }
        let updates = native.execute(&ops)?;
        plan::commit(&mut self.tree, updates)?;
        Ok(())
    }
}
