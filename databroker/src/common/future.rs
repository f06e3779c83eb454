use crate::errors::{BrokerError, BrokerResult, ErrorKind};
use parking_lot::{Condvar, Mutex};
use std::fmt::{Debug, Formatter};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

type Callback<T> = Box<dyn FnOnce(BrokerResult<T>) + Send>;

/// Single-assignment asynchronous result of a broker operation.
///
/// # Purpose
///
/// Every read, exists and submit in the broker returns a `BrokerFuture`. The
/// producer side (a backend store, the commit coordinator) completes it once
/// with a value or a [`BrokerError`]; the consumer side either registers a
/// completion callback, blocks on [`get`](Self::get), or awaits it as a
/// regular [`std::future::Future`].
///
/// # Characteristics
///
/// - **Cheap to clone**: clones observe the same result
/// - **Write once**: only the first completion wins, later ones are ignored
/// - **Non-blocking chaining**: `on_complete`, `map`, `and_then` never block;
///   callbacks run on the thread that completes the future, or immediately
///   when it is already complete
/// - **Thread-safe**: `Send + Sync` for `T: Send`
///
/// # Examples
///
/// ```rust
/// use databroker::common::BrokerFuture;
///
/// let future: BrokerFuture<u32> = BrokerFuture::new();
/// let doubled = future.map(|v| v * 2);
/// future.set(21);
/// assert_eq!(doubled.get().unwrap(), 42);
/// ```
pub struct BrokerFuture<T> {
    inner: Arc<FutureInner<T>>,
}

struct FutureInner<T> {
    state: Mutex<FutureState<T>>,
    done: Condvar,
}

struct FutureState<T> {
    result: Option<BrokerResult<T>>,
    callbacks: Vec<Callback<T>>,
    wakers: Vec<Waker>,
}

impl<T> Clone for BrokerFuture<T> {
    fn clone(&self) -> Self {
        BrokerFuture {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Default for BrokerFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> BrokerFuture<T> {
    /// Creates a pending future.
    pub fn new() -> Self {
        BrokerFuture {
            inner: Arc::new(FutureInner {
                state: Mutex::new(FutureState {
                    result: None,
                    callbacks: Vec::new(),
                    wakers: Vec::new(),
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// Creates a future already completed with `value`.
    pub fn completed(value: T) -> Self {
        let future = Self::new();
        future.set(value);
        future
    }

    /// Creates a future already failed with `error`.
    pub fn failed(error: BrokerError) -> Self {
        let future = Self::new();
        future.set_error(error);
        future
    }

    /// Completes the future with `result`.
    ///
    /// Returns `false` if the future was already complete, in which case
    /// `result` is dropped.
    pub fn complete(&self, result: BrokerResult<T>) -> bool {
        let (callbacks, wakers) = {
            let mut state = self.inner.state.lock();
            if state.result.is_some() {
                return false;
            }
            state.result = Some(result.clone());
            (
                std::mem::take(&mut state.callbacks),
                std::mem::take(&mut state.wakers),
            )
        };
        self.inner.done.notify_all();

        // run outside the lock, a callback may chain onto this future again
        for callback in callbacks {
            callback(result.clone());
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }

    pub fn set(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    pub fn set_error(&self, error: BrokerError) -> bool {
        self.complete(Err(error))
    }

    pub fn is_done(&self) -> bool {
        self.inner.state.lock().result.is_some()
    }

    /// Returns the result if the future is complete, without blocking.
    pub fn try_get(&self) -> Option<BrokerResult<T>> {
        self.inner.state.lock().result.clone()
    }

    /// Registers a callback invoked once with the result.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(BrokerResult<T>) + Send + 'static,
    {
        let ready = {
            let mut state = self.inner.state.lock();
            match &state.result {
                Some(result) => result.clone(),
                None => {
                    state.callbacks.push(Box::new(callback));
                    return;
                }
            }
        };
        callback(ready);
    }

    /// Blocks the calling thread until the future completes.
    pub fn get(&self) -> BrokerResult<T> {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(result) = &state.result {
                return result.clone();
            }
            self.inner.done.wait(&mut state);
        }
    }

    /// Blocks until the future completes or `timeout` elapses.
    pub fn get_timeout(&self, timeout: Duration) -> BrokerResult<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if let Some(result) = &state.result {
                return result.clone();
            }
            if self.inner.done.wait_until(&mut state, deadline).timed_out() {
                return match &state.result {
                    Some(result) => result.clone(),
                    None => Err(BrokerError::new(
                        &format!("Future did not complete within {:?}", timeout),
                        ErrorKind::Timeout,
                    )),
                };
            }
        }
    }

    pub fn map<U, F>(&self, f: F) -> BrokerFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let mapped = BrokerFuture::new();
        let target = mapped.clone();
        self.on_complete(move |result| {
            target.complete(result.map(f));
        });
        mapped
    }

    pub fn map_err<F>(&self, f: F) -> BrokerFuture<T>
    where
        F: FnOnce(BrokerError) -> BrokerError + Send + 'static,
    {
        let mapped = BrokerFuture::new();
        let target = mapped.clone();
        self.on_complete(move |result| {
            target.complete(result.map_err(f));
        });
        mapped
    }

    /// Chains an asynchronous step that runs only if this future succeeds.
    pub fn and_then<U, F>(&self, f: F) -> BrokerFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> BrokerFuture<U> + Send + 'static,
    {
        let chained = BrokerFuture::new();
        let target = chained.clone();
        self.on_complete(move |result| match result {
            Ok(value) => {
                let next = f(value);
                next.on_complete(move |r| {
                    target.complete(r);
                });
            }
            Err(e) => {
                target.set_error(e);
            }
        });
        chained
    }

    /// Succeeds with every value once all futures succeed, fails with the
    /// first error as soon as any one fails.
    pub fn all(futures: Vec<BrokerFuture<T>>) -> BrokerFuture<Vec<T>> {
        let result = BrokerFuture::new();
        for future in &futures {
            let target = result.clone();
            future.on_complete(move |r| {
                if let Err(e) = r {
                    target.set_error(e);
                }
            });
        }

        let target = result.clone();
        BrokerFuture::join_all(futures).on_complete(move |results| {
            if let Ok(results) = results {
                target.complete(results.into_iter().collect());
            }
        });
        result
    }

    /// Completes once every future has completed, successfully or not.
    ///
    /// The joined future never fails; each slot carries its own result, in
    /// input order.
    pub fn join_all(futures: Vec<BrokerFuture<T>>) -> BrokerFuture<Vec<BrokerResult<T>>> {
        let joined = BrokerFuture::new();
        let total = futures.len();
        if total == 0 {
            joined.set(Vec::new());
            return joined;
        }

        let slots: Arc<Mutex<(Vec<Option<BrokerResult<T>>>, usize)>> =
            Arc::new(Mutex::new((vec![None; total], 0)));
        for (index, future) in futures.iter().enumerate() {
            let slots = slots.clone();
            let target = joined.clone();
            future.on_complete(move |result| {
                let finished = {
                    let mut guard = slots.lock();
                    guard.0[index] = Some(result);
                    guard.1 += 1;
                    if guard.1 == total {
                        Some(std::mem::take(&mut guard.0))
                    } else {
                        None
                    }
                };
                if let Some(results) = finished {
                    target.set(results.into_iter().flatten().collect());
                }
            });
        }
        joined
    }
}

impl<T: Clone + Send + 'static> std::future::Future for BrokerFuture<T> {
    type Output = BrokerResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.state.lock();
        if let Some(result) = &state.result {
            return Poll::Ready(result.clone());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T> Debug for BrokerFuture<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        let status = match &state.result {
            None => "pending",
            Some(Ok(_)) => "succeeded",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("BrokerFuture").field("status", &status).finish()
    }
}
