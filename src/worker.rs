//! Background worker threads and single-value promises.
//!
//! The render loop must never wait for slow work like texture decoding or model loading. That
//! work is sent to a [`Worker`] (or a one-off thread), and its result comes back through a
//! [`Promise`]. The render loop later checks the matching [`PromiseHandle`] without blocking.

use std::{
    io,
    panic::resume_unwind,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Sender, TryRecvError};

/// Creates a connected pair of [`Promise`] and [`PromiseHandle`].
pub fn promise<T>() -> (Promise<T>, PromiseHandle<T>) {
    // Capacity of 1 means that `Promise::fulfill` will never block, which is the property we want.
    let (sender, recv) = crossbeam::channel::bounded(1);
    (Promise { inner: sender }, PromiseHandle { recv })
}

/// An empty slot that can be filled with a `T`, fulfilling the promise.
///
/// Fulfilling a [`Promise`] lets the connected [`PromiseHandle`] retrieve the value. A connected
/// pair of [`Promise`] and [`PromiseHandle`] can be created by calling [`promise`].
pub struct Promise<T> {
    inner: Sender<T>,
}

impl<T> Promise<T> {
    /// Fulfills the promise with a value, consuming it.
    ///
    /// This method does not block. If the connected [`PromiseHandle`] was dropped, `value` is
    /// handed back as an error so that the caller can clean it up.
    pub fn fulfill(self, value: T) -> Result<(), T> {
        self.inner.send(value).map_err(|err| err.into_inner())
    }
}

/// A handle connected to a [`Promise`] that will eventually resolve to a value of type `T`.
///
/// A connected pair of [`Promise`] and [`PromiseHandle`] can be created by calling [`promise`].
pub struct PromiseHandle<T> {
    recv: crossbeam::channel::Receiver<T>,
}

impl<T> PromiseHandle<T> {
    /// Checks whether the [`Promise`] has been fulfilled, without blocking.
    ///
    /// Returns `Ok(None)` while the promise is still pending. Once the value has been taken out,
    /// further calls report [`PromiseDropped`].
    pub fn poll(&mut self) -> Result<Option<T>, PromiseDropped> {
        match self.recv.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PromiseDropped { _priv: () }),
        }
    }
}

/// An error indicating that the connected [`Promise`] object was dropped without being
/// fulfilled.
#[derive(Debug, Clone, Copy)]
pub struct PromiseDropped {
    _priv: (),
}

/// A builder object that can be used to configure and spawn a [`Worker`].
#[derive(Clone)]
pub struct WorkerBuilder {
    name: Option<String>,
    capacity: Option<usize>,
}

impl WorkerBuilder {
    /// Sets the name of the [`Worker`] thread.
    pub fn name<N: Into<String>>(self, name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Makes the channel of the [`Worker`] unbounded, so that [`Worker::send`] never blocks.
    ///
    /// By default, the channel has no capacity, and [`Worker::send`] blocks until the worker has
    /// finished processing any preceding message.
    pub fn unbounded(self) -> Self {
        Self {
            capacity: None,
            ..self
        }
    }

    /// Spawns a [`Worker`] thread that uses `handler` to process incoming messages.
    pub fn spawn<I, F>(self, mut handler: F) -> io::Result<Worker<I>>
    where
        I: Send + 'static,
        F: FnMut(I) + Send + 'static,
    {
        let (sender, recv) = match self.capacity {
            Some(capacity) => crossbeam::channel::bounded(capacity),
            None => crossbeam::channel::unbounded(),
        };
        let mut builder = thread::Builder::new();
        if let Some(name) = self.name.clone() {
            builder = builder.name(name);
        }
        let name = self.name.unwrap_or_else(|| "<unnamed>".into());
        let handle = builder.spawn(move || {
            log::trace!("worker '{name}' starting");
            for message in recv {
                handler(message);
            }
            log::trace!("worker '{name}' exiting");
        })?;

        Ok(Worker {
            sender: Some(sender),
            handle: Some(handle),
        })
    }
}

/// A handle to a worker thread that processes messages of type `I`.
///
/// When dropped, the channel to the thread will be dropped and the thread will be joined after it
/// has processed all queued messages. If the thread has panicked, the panic will be forwarded to
/// the thread dropping the `Worker`.
pub struct Worker<I: Send + 'static> {
    sender: Option<Sender<I>>,
    handle: Option<JoinHandle<()>>,
}

impl<I: Send + 'static> Drop for Worker<I> {
    fn drop(&mut self) {
        // Close the channel to signal the thread to exit.
        drop(self.sender.take());

        self.wait_for_exit();
    }
}

impl Worker<()> {
    /// Returns a builder that can be used to configure and spawn a [`Worker`].
    #[inline]
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder {
            name: None,
            capacity: Some(0),
        }
    }
}

impl<I: Send + 'static> Worker<I> {
    fn wait_for_exit(&mut self) {
        // Wait for it to exit and propagate its panic if it panicked.
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(()) => {}
                Err(payload) => {
                    if !thread::panicking() {
                        resume_unwind(payload);
                    }
                }
            }
        }
    }

    /// Sends a message to the worker thread.
    ///
    /// For bounded workers, this will block until the thread is available to accept the message.
    ///
    /// If the worker has panicked, this will propagate the panic to the calling thread.
    pub fn send(&mut self, msg: I) {
        let Some(sender) = &self.sender else { return };
        if sender.send(msg).is_err() {
            self.wait_for_exit();
        }
    }
}
