use std::{
    num::NonZeroUsize,
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    dispatch::{
        chat_locks::ChatLocks,
        queue::{self, SharedReceiver, UpdateQueue},
        worker::{Worker, WorkerShared},
    },
    domain::BotIdentity,
    errors::Error,
    message::Message,
    messaging::MessagingService,
    ports::{ErrorReporter, Frontend, LogReporter, MessageProcessor, Translator},
    session::SessionStore,
    Result,
};

const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of a [`Dispatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    Created,
    Initializing,
    Running,
    Stopping,
    Stopped,
}

/// Number of logical processing units on this host (at least 1).
pub fn available_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

pub struct DispatcherBuilder {
    frontend: Arc<dyn Frontend>,
    store: Arc<dyn SessionStore>,
    messenger: Arc<dyn MessagingService>,
    processor: Arc<dyn MessageProcessor>,
    reporter: Arc<dyn ErrorReporter>,
    translator: Option<Arc<dyn Translator>>,
    identity: BotIdentity,
    worker_count: Option<usize>,
    serialize_chats: bool,
    shutdown_grace: Duration,
}

impl DispatcherBuilder {
    pub fn new(
        frontend: Arc<dyn Frontend>,
        store: Arc<dyn SessionStore>,
        messenger: Arc<dyn MessagingService>,
        processor: Arc<dyn MessageProcessor>,
    ) -> Self {
        Self {
            frontend,
            store,
            messenger,
            processor,
            reporter: Arc::new(LogReporter),
            translator: None,
            identity: BotIdentity::default(),
            worker_count: None,
            serialize_chats: true,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Apply the dispatcher-related settings from `cfg`.
    pub fn configure(mut self, cfg: &Config) -> Self {
        self.worker_count = cfg.workers;
        self.serialize_chats = cfg.serialize_chats;
        self.shutdown_grace = cfg.shutdown_grace;
        self.identity.bot_id = cfg.bot_id.clone();
        self.identity.language = cfg.bot_language.clone();
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn identity(mut self, identity: BotIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Override the pool size (defaults to [`available_workers`]).
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Serialize processing per chat id (default on). When off, two updates for
    /// the same chat may be processed concurrently and the last persist wins.
    pub fn serialize_chats(mut self, enabled: bool) -> Self {
        self.serialize_chats = enabled;
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn build(self) -> Dispatcher {
        let count = self.worker_count.unwrap_or_else(available_workers).max(1);
        let shared = Arc::new(WorkerShared {
            store: self.store,
            messenger: self.messenger,
            processor: self.processor,
            reporter: self.reporter,
            translator: self.translator,
            identity: self.identity,
            chat_locks: self.serialize_chats.then(ChatLocks::default),
        });
        let workers = (0..count)
            .map(|id| Worker::new(id, shared.clone()))
            .collect();
        let (queue, receiver) = queue::channel();
        let (state, _) = watch::channel(DispatcherState::Created);

        Dispatcher {
            frontend: self.frontend,
            shared,
            workers,
            queue,
            receiver,
            state,
            shutdown_grace: self.shutdown_grace,
        }
    }
}

/// Owns the worker pool, the inbound queue and the startup/shutdown sequence.
pub struct Dispatcher {
    frontend: Arc<dyn Frontend>,
    shared: Arc<WorkerShared>,
    workers: Vec<Worker>,
    queue: UpdateQueue,
    receiver: SharedReceiver,
    state: watch::Sender<DispatcherState>,
    shutdown_grace: Duration,
}

impl Dispatcher {
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions; keeps the last state after `listen` returns.
    pub fn subscribe(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    /// A producer handle for transports that enqueue from elsewhere.
    pub fn queue(&self) -> UpdateQueue {
        self.queue.clone()
    }

    pub fn enqueue(&self, update: Message) -> Result<()> {
        self.queue.enqueue(update)
    }

    /// Run the bot until the frontend stops serving.
    ///
    /// Blocks the calling thread; must not be called from inside a tokio
    /// runtime. Initialization runs to completion before any worker starts; a
    /// failure there, or a worker thread that cannot be spawned, aborts startup
    /// and leaves the dispatcher `Stopped`.
    pub fn listen(self) -> Result<()> {
        self.listen_with(Worker::spawn)
    }

    /// [`listen`](Self::listen) with the thread spawn step supplied by the caller.
    fn listen_with<S>(mut self, mut spawn: S) -> Result<()>
    where
        S: FnMut(
            Worker,
            SharedReceiver,
            CancellationToken,
            mpsc::Sender<()>,
        ) -> std::io::Result<JoinHandle<()>>,
    {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        self.transition(DispatcherState::Initializing);
        if let Err(e) = rt.block_on(self.initialize()) {
            tracing::error!("startup aborted: {e}");
            self.transition(DispatcherState::Stopped);
            return Err(Error::Init(e.to_string()));
        }

        let stop = CancellationToken::new();
        let (done_tx, done_rx) = mpsc::channel();
        let mut handles = Vec::with_capacity(self.workers.len());
        let mut spawn_error = None;
        for worker in self.workers.drain(..) {
            let id = worker.id();
            match spawn(worker, self.receiver.clone(), stop.clone(), done_tx.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    spawn_error = Some(Error::Init(format!("failed to spawn worker {id}: {e}")));
                    break;
                }
            }
        }
        drop(done_tx);

        if let Some(e) = spawn_error {
            // Never reached Running; wind down the partial pool and stop.
            tracing::error!("startup aborted: {e}");
            stop.cancel();
            self.await_workers(handles, done_rx);
            self.transition(DispatcherState::Stopped);
            return Err(e);
        }

        self.transition(DispatcherState::Running);
        tracing::info!(workers = handles.len(), "bot ready");
        let served = rt.block_on(self.frontend.serve(self.queue.clone()));

        self.transition(DispatcherState::Stopping);
        tracing::info!("stopping workers");
        stop.cancel();
        self.await_workers(handles, done_rx);
        self.transition(DispatcherState::Stopped);
        tracing::info!("dispatcher stopped");
        served
    }

    async fn initialize(&self) -> Result<()> {
        self.shared.messenger.initialize().await?;
        self.frontend.initialize(&self.shared.identity).await
    }

    fn transition(&self, next: DispatcherState) {
        let prev = self.state.send_replace(next);
        tracing::debug!(?prev, ?next, "dispatcher state");
    }

    /// Wait up to the shutdown grace for every worker thread to exit; detach
    /// whatever is still busy after that.
    fn await_workers(&self, handles: Vec<JoinHandle<()>>, done: mpsc::Receiver<()>) {
        let deadline = Instant::now() + self.shutdown_grace;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match done.recv_timeout(remaining) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    let busy = handles.iter().filter(|h| !h.is_finished()).count();
                    tracing::warn!(busy, "workers still busy after shutdown grace; detaching");
                    return;
                }
            }
        }

        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("worker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{ChatId, MessageId, UserId},
        message::User,
        ports::Turn,
        session::{InMemoryStore, SessionRecord, StateMap},
        testing::NullMessenger,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Barrier, Mutex,
    };

    type Until = Box<dyn Fn() -> bool + Send + Sync>;

    struct FakeFrontend {
        fail_init: bool,
        init_calls: AtomicUsize,
        serve_calls: AtomicUsize,
        feed: Mutex<Vec<Message>>,
        until: Until,
    }

    impl FakeFrontend {
        fn new(until: Until) -> Self {
            Self {
                fail_init: false,
                init_calls: AtomicUsize::new(0),
                serve_calls: AtomicUsize::new(0),
                feed: Mutex::new(Vec::new()),
                until,
            }
        }
    }

    #[async_trait]
    impl Frontend for FakeFrontend {
        async fn initialize(&self, _bot: &BotIdentity) -> Result<()> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(Error::External("setMyCommands rejected".to_string()));
            }
            Ok(())
        }

        async fn serve(&self, queue: UpdateQueue) -> Result<()> {
            self.serve_calls.fetch_add(1, Ordering::SeqCst);
            let feed = std::mem::take(&mut *self.feed.lock().unwrap());
            for update in feed {
                queue.enqueue(update)?;
            }

            let started = Instant::now();
            while !(self.until)() {
                if started.elapsed() > Duration::from_secs(10) {
                    return Err(Error::External("timed out waiting for workers".to_string()));
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(())
        }
    }

    /// Records each update and stores its text under `ask_<text>`.
    #[derive(Default)]
    struct Tally {
        seen: Mutex<Vec<MessageId>>,
        threads: Mutex<HashSet<String>>,
        stalled: AtomicBool,
    }

    impl Tally {
        fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageProcessor for Tally {
        async fn process(&self, turn: Turn<'_>) -> Result<()> {
            let name = std::thread::current().name().unwrap_or("").to_string();
            self.threads.lock().unwrap().insert(name);

            let text = turn.message.text.clone().unwrap_or_default();
            if text == "stall" {
                self.stalled.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_secs(3));
            }
            turn.session.set(format!("ask_{text}"), true);
            self.seen.lock().unwrap().push(turn.message.message_id);
            Ok(())
        }
    }

    /// In-memory store whose first two loads rendezvous before returning, so
    /// both loads happen before either persist.
    struct RendezvousStore {
        inner: InMemoryStore,
        barrier: Barrier,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl SessionStore for RendezvousStore {
        async fn create_or_get_chat_session(&self, user_id: UserId) -> Result<SessionRecord> {
            let record = self.inner.create_or_get_chat_session(user_id).await?;
            self.barrier.wait();
            Ok(record)
        }

        async fn set_chat_context(
            &self,
            user_id: UserId,
            context: &StateMap,
            preferences: &StateMap,
        ) -> Result<()> {
            self.inner
                .set_chat_context(user_id, context, preferences)
                .await?;
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn update(id: i32, chat: i64, text: &str) -> Message {
        Message::builder(MessageId(id), UserId(chat), ChatId(chat), User::default())
            .text(text)
            .build()
    }

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(fut)
    }

    fn builder(
        frontend: Arc<FakeFrontend>,
        store: Arc<dyn SessionStore>,
        processor: Arc<Tally>,
    ) -> DispatcherBuilder {
        DispatcherBuilder::new(frontend, store, Arc::new(NullMessenger), processor)
    }

    #[test]
    fn pool_size_follows_host_parallelism_unless_overridden() {
        let frontend = Arc::new(FakeFrontend::new(Box::new(|| true)));
        let store = Arc::new(InMemoryStore::new());
        let tally = Arc::new(Tally::default());

        let default = builder(frontend.clone(), store.clone(), tally.clone()).build();
        assert_eq!(default.worker_count(), available_workers());
        assert_eq!(default.state(), DispatcherState::Created);

        let fixed = builder(frontend, store, tally).worker_count(3).build();
        assert_eq!(fixed.worker_count(), 3);
    }

    #[test]
    fn updates_enqueued_before_listen_are_each_delivered_once() {
        const M: usize = 60;
        let tally = Arc::new(Tally::default());
        let watch = tally.clone();
        let frontend = Arc::new(FakeFrontend::new(Box::new(move || watch.count() >= M)));
        let store = Arc::new(InMemoryStore::new());

        let dispatcher = builder(frontend.clone(), store, tally.clone())
            .worker_count(4)
            .build();
        for id in 0..M {
            dispatcher
                .enqueue(update(id as i32, (id % 7) as i64, "x"))
                .unwrap();
        }
        let states = dispatcher.subscribe();
        dispatcher.listen().unwrap();

        let mut seen: Vec<i32> = tally.seen.lock().unwrap().iter().map(|m| m.0).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..M as i32).collect::<Vec<_>>());
        assert!(tally
            .threads
            .lock()
            .unwrap()
            .iter()
            .all(|name| name.starts_with("cbot-worker-")));
        assert_eq!(*states.borrow(), DispatcherState::Stopped);
        assert_eq!(frontend.init_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn updates_enqueued_while_serving_are_delivered() {
        let tally = Arc::new(Tally::default());
        let watch = tally.clone();
        let frontend = Arc::new(FakeFrontend::new(Box::new(move || watch.count() >= 3)));
        *frontend.feed.lock().unwrap() = vec![update(1, 1, "a"), update(2, 1, "b"), update(3, 2, "c")];
        let store = Arc::new(InMemoryStore::new());

        builder(frontend, store.clone(), tally.clone())
            .worker_count(2)
            .build()
            .listen()
            .unwrap();

        let chat_one = block_on(store.record(UserId(1))).unwrap();
        assert_eq!(chat_one.context.get("ask_a"), Some(&json!(true)));
        assert_eq!(chat_one.context.get("ask_b"), Some(&json!(true)));
        let chat_two = block_on(store.record(UserId(2))).unwrap();
        assert_eq!(chat_two.context.get("ask_c"), Some(&json!(true)));
    }

    #[test]
    fn failed_initialization_starts_no_workers() {
        let tally = Arc::new(Tally::default());
        let mut frontend = FakeFrontend::new(Box::new(|| true));
        frontend.fail_init = true;
        let frontend = Arc::new(frontend);

        let dispatcher = builder(frontend.clone(), Arc::new(InMemoryStore::new()), tally.clone())
            .worker_count(2)
            .build();
        dispatcher.enqueue(update(1, 1, "a")).unwrap();
        let queue = dispatcher.queue();
        let states = dispatcher.subscribe();

        let err = dispatcher.listen().unwrap_err();
        assert!(matches!(err, Error::Init(_)));
        assert_eq!(frontend.serve_calls.load(Ordering::SeqCst), 0);
        assert_eq!(tally.count(), 0);
        assert_eq!(*states.borrow(), DispatcherState::Stopped);
        assert!(matches!(queue.enqueue(update(2, 1, "b")), Err(Error::QueueClosed)));
    }

    #[test]
    fn worker_spawn_failure_stops_without_serving() {
        let tally = Arc::new(Tally::default());
        let frontend = Arc::new(FakeFrontend::new(Box::new(|| true)));

        let dispatcher = builder(frontend.clone(), Arc::new(InMemoryStore::new()), tally.clone())
            .worker_count(3)
            .build();
        let queue = dispatcher.queue();
        let states = dispatcher.subscribe();

        let mut seen_states = Vec::new();
        let err = dispatcher
            .listen_with(|worker, rx, stop, done| {
                seen_states.push(*states.borrow());
                if worker.id() == 1 {
                    return Err(std::io::Error::other("no threads left"));
                }
                worker.spawn(rx, stop, done)
            })
            .unwrap_err();

        assert!(matches!(&err, Error::Init(msg) if msg.contains("worker 1")));
        assert_eq!(seen_states, vec![DispatcherState::Initializing; 2]);
        assert_eq!(frontend.serve_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*states.borrow(), DispatcherState::Stopped);
        // Worker 0 was stopped and joined, so nothing holds the receiver.
        assert!(matches!(queue.enqueue(update(1, 1, "a")), Err(Error::QueueClosed)));
        assert_eq!(tally.count(), 0);
    }

    #[test]
    fn same_chat_updates_race_without_serialization() {
        // Two workers load the same empty session before either persists, so
        // the second write overwrites the first one's change.
        let store = Arc::new(RendezvousStore {
            inner: InMemoryStore::new(),
            barrier: Barrier::new(2),
            writes: AtomicUsize::new(0),
        });
        let tally = Arc::new(Tally::default());
        let watch = store.clone();
        let frontend = Arc::new(FakeFrontend::new(Box::new(move || {
            watch.writes.load(Ordering::SeqCst) >= 2
        })));

        let dispatcher = builder(frontend, store.clone(), tally.clone())
            .worker_count(2)
            .serialize_chats(false)
            .build();
        dispatcher.enqueue(update(1, 5, "foo")).unwrap();
        dispatcher.enqueue(update(2, 5, "bar")).unwrap();
        dispatcher.listen().unwrap();

        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
        let record = block_on(store.inner.record(UserId(5))).unwrap();
        let kept: Vec<&String> = record.context.keys().collect();
        assert_eq!(kept.len(), 1, "one of the two updates is lost: {kept:?}");
        assert!(kept[0] == "ask_foo" || kept[0] == "ask_bar");
    }

    #[test]
    fn same_chat_updates_are_all_kept_with_serialization() {
        const M: usize = 24;
        let tally = Arc::new(Tally::default());
        let watch = tally.clone();
        let frontend = Arc::new(FakeFrontend::new(Box::new(move || watch.count() >= M)));
        let store = Arc::new(InMemoryStore::new());

        let dispatcher = builder(frontend, store.clone(), tally)
            .worker_count(4)
            .build();
        for id in 0..M {
            dispatcher
                .enqueue(update(id as i32, 9, &format!("q{id}")))
                .unwrap();
        }
        dispatcher.listen().unwrap();

        let record = block_on(store.record(UserId(9))).unwrap();
        assert_eq!(record.context.len(), M);
    }

    #[test]
    fn shutdown_does_not_wait_past_grace_for_in_flight_work() {
        let tally = Arc::new(Tally::default());
        let watch = tally.clone();
        let frontend = Arc::new(FakeFrontend::new(Box::new(move || {
            watch.stalled.load(Ordering::SeqCst)
        })));

        let dispatcher = builder(frontend, Arc::new(InMemoryStore::new()), tally)
            .worker_count(1)
            .shutdown_grace(Duration::from_millis(50))
            .build();
        dispatcher.enqueue(update(1, 1, "stall")).unwrap();
        let states = dispatcher.subscribe();

        let started = Instant::now();
        dispatcher.listen().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(*states.borrow(), DispatcherState::Stopped);
    }
}
