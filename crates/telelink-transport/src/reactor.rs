//! The shared I/O reactor that drives every socket transport.
//!
//! A single-threaded tokio runtime parked on its own thread. Transports hand
//! it futures through [`Reactor::spawn`] from any thread; the tasks then run
//! only on the reactor thread, so handlers registered on socket connections
//! are invoked from there.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use tokio::runtime::{Builder, EnterGuard, Handle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle as TaskHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::link::{lock, Link};

const THREAD_NAME: &str = "telelink-reactor";

static SHARED: Mutex<Option<Arc<Reactor>>> = Mutex::new(None);

/// Handle to a running reactor thread.
#[derive(Debug)]
pub struct Reactor {
    handle: Handle,
    running: Arc<AtomicBool>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl Reactor {
    /// Start a new, independent reactor thread.
    ///
    /// Most callers want [`Reactor::shared`]; a private reactor is useful to
    /// isolate tests or to give a group of connections their own thread.
    pub fn start() -> Result<Arc<Self>, TransportError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| TransportError::Io {
                transport: "reactor",
                source,
            })?;
        let handle = runtime.handle().clone();
        let running = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                // Either an explicit stop or every Reactor handle going away.
                let _ = runtime.block_on(stop_rx);
                flag.store(false, Ordering::Release);
                drop(runtime);
                debug!("reactor thread exiting");
            })
            .map_err(|source| TransportError::Io {
                transport: "reactor",
                source,
            })?;

        let thread_id = thread.thread().id();
        info!(thread = THREAD_NAME, "reactor started");
        Ok(Arc::new(Self {
            handle,
            running,
            stop: Mutex::new(Some(stop_tx)),
            thread: Mutex::new(Some(thread)),
            thread_id,
        }))
    }

    /// The process-wide reactor, started on first call.
    ///
    /// Every later call returns the same instance until it is shut down; the
    /// next call after a shutdown starts a fresh one.
    pub fn shared() -> Result<Arc<Self>, TransportError> {
        let mut slot = lock(&SHARED);
        if let Some(reactor) = slot.as_ref() {
            if reactor.is_running() {
                return Ok(Arc::clone(reactor));
            }
        }
        let reactor = Self::start()?;
        *slot = Some(Arc::clone(&reactor));
        Ok(reactor)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the caller is running on this reactor's thread.
    pub fn on_reactor_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Run `future` on the reactor thread.
    pub fn spawn<F>(&self, future: F) -> Result<TaskHandle<F::Output>, TransportError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if !self.is_running() {
            return Err(TransportError::Shutdown);
        }
        Ok(self.handle.spawn(future))
    }

    /// Spawn a cancellable task built by `task` from its stop token.
    ///
    /// If the reactor shuts down before the task finishes or is cancelled,
    /// `link` fails with [`TransportError::Shutdown`].
    pub(crate) fn spawn_task<F, Fut>(
        &self,
        link: &Link,
        task: F,
    ) -> Result<ReactorTask, TransportError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.is_running() {
            return Err(TransportError::Shutdown);
        }
        let token = CancellationToken::new();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let future = task(token.clone());
        let mut abandoned = Abandoned {
            link: Some(link.clone()),
            token: token.clone(),
        };
        self.spawn(async move {
            future.await;
            abandoned.link = None;
            drop(done_tx);
        })?;
        Ok(ReactorTask {
            token,
            done: done_rx,
            reactor_thread: self.thread_id,
        })
    }

    /// Enter the reactor's runtime context on the current thread.
    ///
    /// Needed to register std sockets with the reactor (`from_std`).
    pub fn enter(&self) -> Result<EnterGuard<'_>, TransportError> {
        if !self.is_running() {
            return Err(TransportError::Shutdown);
        }
        Ok(self.handle.enter())
    }

    /// Stop the reactor thread. Tasks still running on it are dropped and
    /// their links fail with [`TransportError::Shutdown`].
    ///
    /// Waits for the thread to exit unless called from the reactor itself.
    pub fn shutdown(&self) {
        let stop = lock(&self.stop).take();
        let Some(stop) = stop else {
            return;
        };
        let _ = stop.send(());
        self.running.store(false, Ordering::Release);

        if self.on_reactor_thread() {
            return;
        }
        let thread = lock(&self.thread).take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
        info!("reactor stopped");
    }
}

/// Owner side of a task running on a reactor.
///
/// Dropping it cancels the task without waiting.
#[derive(Debug)]
pub(crate) struct ReactorTask {
    token: CancellationToken,
    done: mpsc::Receiver<()>,
    reactor_thread: ThreadId,
}

impl ReactorTask {
    /// Cancel the task and wait up to `wait` for it to finish.
    ///
    /// Does not wait when called from the reactor thread, since the task
    /// cannot make progress until the caller returns.
    pub(crate) fn stop(&self, wait: Duration) {
        self.token.cancel();
        if thread::current().id() == self.reactor_thread {
            return;
        }
        // Disconnected once the task has finished or was dropped.
        let _ = self.done.recv_timeout(wait);
    }
}

impl Drop for ReactorTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Fails its link if the task future is dropped before it finishes.
struct Abandoned {
    link: Option<Link>,
    token: CancellationToken,
}

impl Drop for Abandoned {
    fn drop(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        if !self.token.is_cancelled() {
            link.fail(TransportError::Shutdown);
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::channel::ChannelRegistry;
    use crate::link::LinkEvent;

    #[test]
    fn spawned_tasks_run_on_reactor_thread() {
        let reactor = Reactor::start().unwrap();
        let (tx, rx) = mpsc::channel();
        reactor
            .spawn(async move {
                let name = thread::current().name().map(str::to_owned);
                tx.send(name).unwrap();
            })
            .unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some(THREAD_NAME));
    }

    #[test]
    fn shutdown_rejects_new_work() {
        let reactor = Reactor::start().unwrap();
        reactor.shutdown();
        reactor.shutdown();
        assert!(!reactor.is_running());
        assert!(matches!(
            reactor.spawn(async {}),
            Err(TransportError::Shutdown)
        ));
        assert!(reactor.enter().is_err());
    }

    #[test]
    fn shared_is_started_once() {
        let a = Reactor::shared().unwrap();
        let b = Reactor::shared().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    fn link() -> Link {
        let registry = Arc::new(ChannelRegistry::new());
        let lease = registry.lease().unwrap();
        Link::new(lease, registry)
    }

    #[test]
    fn stopping_a_task_waits_for_it() {
        let reactor = Reactor::start().unwrap();
        let link = link();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let task = reactor
            .spawn_task(&link, |token| async move {
                token.cancelled().await;
                tokio::time::sleep(Duration::from_millis(20)).await;
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();

        task.stop(Duration::from_secs(5));
        assert!(finished.load(Ordering::SeqCst));
        assert!(!link.is_closed());
    }

    #[test]
    fn shutdown_fails_links_of_unfinished_tasks() {
        let reactor = Reactor::start().unwrap();
        let link = link();
        let (tx, rx) = mpsc::channel();
        link.subscribe_events(Arc::new(move |event: &LinkEvent| {
            if let LinkEvent::Failed(err) = event {
                tx.send(matches!(err, TransportError::Shutdown)).unwrap();
            }
        }));
        let _task = reactor
            .spawn_task(&link, |token| async move { token.cancelled().await })
            .unwrap();

        reactor.shutdown();

        assert!(rx.try_recv().unwrap());
        assert!(link.is_closed());
        assert_eq!(link.registry().available(), crate::MAX_CHANNELS);
    }

    #[test]
    fn timers_work_on_reactor() {
        let reactor = Reactor::start().unwrap();
        let (tx, rx) = mpsc::channel();
        reactor
            .spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                tx.send(()).unwrap();
            })
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}
