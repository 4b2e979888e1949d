//! Trailing-edge debouncing for high-frequency inputs.
//!
//! Typed search text and slider drags fire many times per interaction but
//! should reach shared state (and, transitively, the network) once per
//! settled value. Both primitives here are trailing-edge: a burst collapses
//! into a single emission carrying the last value, after the input has been
//! quiet for the configured delay. Dropping a debouncer aborts its worker,
//! so a pending trailing emission can never fire after teardown.

use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

/// Debounces a rapidly-changing value into a settled one.
///
/// Feed raw values in with [`push`](Self::push); read the settled value from
/// the watch receiver returned by [`settled`](Self::settled). Must be
/// created inside a tokio runtime.
///
/// # Examples
///
/// ```no_run
/// # async fn demo() {
/// use std::time::Duration;
/// use erbario::ValueDebouncer;
///
/// let debouncer = ValueDebouncer::new(String::new(), Duration::from_millis(300));
/// let mut settled = debouncer.settled();
///
/// debouncer.push("Ole".to_owned());
/// debouncer.push("Olea".to_owned());
///
/// settled.changed().await.unwrap();
/// assert_eq!(*settled.borrow(), "Olea");
/// # }
/// ```
#[derive(Debug)]
pub struct ValueDebouncer<T> {
    input: mpsc::UnboundedSender<T>,
    output: watch::Receiver<T>,
    worker: JoinHandle<()>,
}

impl<T> ValueDebouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(initial: T, delay: Duration) -> Self {
        let (input, mut rx) = mpsc::unbounded_channel::<T>();
        let (settled_tx, output) = watch::channel(initial);

        let worker = tokio::spawn(async move {
            let mut pending: Option<T> = None;
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        // Every new value restarts the settle window.
                        Some(value) => pending = Some(value),
                        // Input side gone: the pending value is discarded.
                        None => break,
                    },
                    () = tokio::time::sleep(delay), if pending.is_some() => {
                        if let Some(value) = pending.take() {
                            let _ = settled_tx.send(value);
                        }
                    }
                }
            }
        });

        Self {
            input,
            output,
            worker,
        }
    }

    /// Feed one raw value. Restarts the settle window.
    pub fn push(&self, value: T) {
        let _ = self.input.send(value);
    }

    /// Receiver of settled values.
    #[must_use]
    pub fn settled(&self) -> watch::Receiver<T> {
        self.output.clone()
    }

    /// The most recently settled value.
    #[must_use]
    pub fn current(&self) -> T {
        self.output.borrow().clone()
    }
}

impl<T> Drop for ValueDebouncer<T> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

enum Command<A> {
    Invoke(A),
    Cancel,
}

/// Debounces invocations of a callback.
///
/// [`call`](Self::call) collapses bursts into one trailing invocation
/// carrying the arguments of the last call within the window. Used for
/// range-slider commits: the slider fires continuously while dragged, the
/// store mutation runs once the drag settles.
#[derive(Debug)]
pub struct CallbackDebouncer<A> {
    commands: mpsc::UnboundedSender<Command<A>>,
    worker: JoinHandle<()>,
}

impl<A> CallbackDebouncer<A>
where
    A: Send + 'static,
{
    /// Must be created inside a tokio runtime.
    #[must_use]
    pub fn new(delay: Duration, mut callback: impl FnMut(A) + Send + 'static) -> Self {
        let (commands, mut rx) = mpsc::unbounded_channel::<Command<A>>();

        let worker = tokio::spawn(async move {
            let mut pending: Option<A> = None;
            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(Command::Invoke(args)) => pending = Some(args),
                        Some(Command::Cancel) => pending = None,
                        None => break,
                    },
                    () = tokio::time::sleep(delay), if pending.is_some() => {
                        if let Some(args) = pending.take() {
                            callback(args);
                        }
                    }
                }
            }
        });

        Self { commands, worker }
    }

    /// Schedule an invocation with these arguments, replacing any pending
    /// one and restarting the settle window.
    pub fn call(&self, args: A) {
        let _ = self.commands.send(Command::Invoke(args));
    }

    /// Discard the pending trailing invocation, if any.
    pub fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel);
    }
}

impl<A> Drop for CallbackDebouncer<A> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
