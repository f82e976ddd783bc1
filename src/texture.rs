//! Background texture loading and caching.
//!
//! Textures are identified by a string key, typically a path relative to a texture directory.
//! The first request for a key fetches and decodes it on a background [`Worker`]; until that has
//! finished, the key reports as not ready. Once decoded, an entry never changes and is never
//! decoded again. Failures are permanent for the key until it is explicitly
//! [forgotten](TextureCache::forget).

use std::{
    any::Any,
    collections::HashMap,
    fmt, fs, io,
    panic::{self, AssertUnwindSafe},
    path::{Component, Path, PathBuf},
};

use anyhow::{anyhow, bail, Context};

use crate::{
    cancel::CancellationToken,
    image::Image,
    worker::{promise, Promise, PromiseHandle, Worker},
    Error,
};

/// Fetches the encoded bytes of a texture.
///
/// Invoked on the decoder thread, so it may block. A panic fails the key being fetched, as if an
/// error had been returned.
pub trait TextureSource: Send + 'static {
    fn fetch(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Resolves texture keys as file paths relative to a root directory.
///
/// Keys have to stay inside of the root: absolute keys and keys containing `..` fail to load.
#[derive(Debug, Clone)]
pub struct FsTextureSource {
    root: PathBuf,
}

impl FsTextureSource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TextureSource for FsTextureSource {
    fn fetch(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("texture key '{key}' is not a path inside of the texture root");
        }
        let path = self.root.join(relative);
        fs::read(&path).with_context(|| format!("failed to read '{}'", path.display()))
    }
}

/// A fully decoded texture.
pub struct Texture {
    key: String,
    image: Image,
}

impl Texture {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn image(&self) -> &Image {
        &self.image
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("key", &self.key)
            .field("resolution", &self.image.resolution())
            .finish()
    }
}

/// The loading state of a texture key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureState {
    /// The key was never requested (or was forgotten).
    Unknown,
    /// The texture is being fetched or decoded.
    Pending,
    /// The texture is decoded and can be drawn.
    Ready,
    /// Fetching or decoding failed. The key will not be retried.
    Failed,
}

enum Slot {
    Pending(PromiseHandle<anyhow::Result<Image>>),
    Ready(Texture),
    Failed,
}

struct DecodeJob {
    key: String,
    promise: Promise<anyhow::Result<Image>>,
}

/// Memoizes decoded textures by key.
///
/// None of the methods block: they only check whether the decoder has delivered a result yet.
///
/// Dropping the cache discards queued requests. Only a fetch that is already running is waited
/// for.
pub struct TextureCache {
    slots: HashMap<String, Slot>,
    closing: CancellationToken,
    decoder: Worker<DecodeJob>,
}

impl TextureCache {
    /// Creates an empty cache that loads textures from `source`.
    ///
    /// This spawns the decoder thread.
    pub fn new<S: TextureSource>(source: S) -> io::Result<Self> {
        let closing = CancellationToken::new();
        let skip_queued = closing.clone();
        let decoder = Worker::builder()
            .name("texture decoder")
            .unbounded()
            .spawn(move |job: DecodeJob| {
                if skip_queued.is_cancelled() {
                    log::trace!("cache dropped, skipping texture '{}'", job.key);
                    return;
                }

                log::debug!("decoding texture '{}'", job.key);
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    source
                        .fetch(&job.key)
                        .and_then(|bytes| Image::decode(&bytes))
                }))
                .unwrap_or_else(|payload| {
                    Err(anyhow!("panicked: {}", panic_message(&*payload)))
                });
                job.promise.fulfill(result).ok();
            })?;

        Ok(Self {
            slots: HashMap::new(),
            closing,
            decoder,
        })
    }

    /// Starts loading `key` unless it was requested before.
    pub fn request(&mut self, key: &str) {
        if self.slots.contains_key(key) {
            return;
        }

        let (promise, handle) = promise();
        self.slots.insert(key.to_string(), Slot::Pending(handle));
        self.decoder.send(DecodeJob {
            key: key.to_string(),
            promise,
        });
    }

    /// Returns the current state of `key`, without requesting it.
    pub fn state(&mut self, key: &str) -> TextureState {
        self.poll(key);
        match self.slots.get(key) {
            None => TextureState::Unknown,
            Some(Slot::Pending(_)) => TextureState::Pending,
            Some(Slot::Ready(_)) => TextureState::Ready,
            Some(Slot::Failed) => TextureState::Failed,
        }
    }

    /// Returns whether `key` has been fully decoded.
    pub fn is_ready(&mut self, key: &str) -> bool {
        self.state(key) == TextureState::Ready
    }

    /// Returns the texture for `key` if it is ready, requesting it if it was never requested.
    pub fn get(&mut self, key: &str) -> Option<&Texture> {
        self.request(key);
        self.poll(key);
        match self.slots.get(key) {
            Some(Slot::Ready(texture)) => Some(texture),
            _ => None,
        }
    }

    /// Drops everything known about `key`, so that the next request loads it again.
    ///
    /// Returns whether there was anything to forget. If a decode is still in progress, its result
    /// is discarded.
    pub fn forget(&mut self, key: &str) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Returns the number of keys that have been requested and not forgotten.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn poll(&mut self, key: &str) {
        let Some(slot) = self.slots.get_mut(key) else {
            return;
        };
        let Slot::Pending(handle) = &mut *slot else {
            return;
        };

        let next = match handle.poll() {
            Ok(None) => return,
            Ok(Some(Ok(image))) => {
                log::debug!("texture '{key}' ready ({})", image.resolution());
                Slot::Ready(Texture {
                    key: key.to_string(),
                    image,
                })
            }
            Ok(Some(Err(source))) => {
                let err = Error::DecodeFailure {
                    key: key.to_string(),
                    source,
                };
                log::error!("{}", err.chain());
                Slot::Failed
            }
            Err(_) => {
                log::error!("texture decoder exited before finishing '{key}'");
                Slot::Failed
            }
        };
        *slot = next;
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        self.closing.cancel();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string payload>"
    }
}
