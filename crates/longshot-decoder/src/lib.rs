//! Decode worker pool — turns raw per-monitor capture bytes into displayable
//! RGBA bitmaps for the static multi-monitor background at session start.
//!
//! # Architecture
//!
//! ```text
//! decode()  ──► FIFO job queue ──► worker thread 1..N ──► oneshot reply
//!                                   (fetch → byte-order fix → bitmap)
//! ```
//!
//! A fixed pool of 1–4 OS threads (sized from hardware concurrency) pulls one
//! task at a time. Workers share no mutable state and communicate only through
//! channels; a failed task rejects just its own caller and is never retried.
//! The pool is an explicitly owned object: [`DecodePool::close`] (also run on
//! drop) shuts the queue and joins every worker, so repeated capture sessions
//! do not leak threads.

use std::num::NonZeroUsize;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use bytes::Bytes;
use longshot_core::{DecodeError, DecodedBitmap, PixelFormat};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Upper bound on pool size regardless of hardware concurrency.
const MAX_WORKERS: usize = 4;

// ── RawPixelSource ────────────────────────────────────────────────────────────

/// A fetchable reference to one monitor's raw pixel bytes, exposed by the
/// capture platform layer. `fetch` blocks and runs on a pool worker.
pub trait RawPixelSource: Send + Sync {
    fn fetch(&self) -> Result<Vec<u8>, DecodeError>;
}

// ── MonitorSource ─────────────────────────────────────────────────────────────

/// One monitor's decode job: the raw source plus its reported dimensions and
/// source-native byte order.
#[derive(Clone)]
pub struct MonitorSource {
    pub source: Arc<dyn RawPixelSource>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

// ── DecodePool ────────────────────────────────────────────────────────────────

struct Job {
    source: Arc<dyn RawPixelSource>,
    width: u32,
    height: u32,
    format: PixelFormat,
    reply: oneshot::Sender<Result<DecodedBitmap, DecodeError>>,
}

/// Fixed-size pool of decode workers.
pub struct DecodePool {
    queue: Option<mpsc::Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl DecodePool {
    /// Spawn the pool. `workers = None` sizes it from hardware concurrency,
    /// clamped to 1–4.
    pub fn new(workers: Option<usize>) -> Self {
        let size = workers
            .unwrap_or_else(|| {
                thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(1)
            })
            .clamp(1, MAX_WORKERS);

        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..size)
            .map(|index| {
                let rx = Arc::clone(&rx);
                thread::Builder::new()
                    .name(format!("longshot-decode-{index}"))
                    .spawn(move || worker_loop(index, rx))
                    .expect("spawn decode worker")
            })
            .collect();

        debug!("Decode pool started with {} worker(s)", size);
        Self { queue: Some(tx), workers: handles }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue one decode and await its bitmap. Fails only for this task; the
    /// pool stays up.
    pub async fn decode(
        &self,
        source: Arc<dyn RawPixelSource>,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<DecodedBitmap, DecodeError> {
        let queue = self.queue.as_ref().ok_or(DecodeError::PoolClosed)?;
        let (reply, rx) = oneshot::channel();
        queue
            .send(Job { source, width, height, format, reply })
            .map_err(|_| DecodeError::PoolClosed)?;
        rx.await.map_err(|_| DecodeError::PoolClosed)?
    }

    /// Decode every monitor for the initial composite background.
    ///
    /// All-or-nothing: the first failed decode aborts the whole batch, so one
    /// bad monitor kills the initial render. Kept as-is deliberately; the
    /// per-task API above already supports partial-success callers.
    pub async fn decode_all(&self, monitors: &[MonitorSource]) -> Result<Vec<DecodedBitmap>, DecodeError> {
        let queue = self.queue.as_ref().ok_or(DecodeError::PoolClosed)?;

        // Queue everything up front so the workers run in parallel…
        let mut pending = Vec::with_capacity(monitors.len());
        for m in monitors {
            let (reply, rx) = oneshot::channel();
            queue
                .send(Job {
                    source: Arc::clone(&m.source),
                    width: m.width,
                    height: m.height,
                    format: m.format,
                    reply,
                })
                .map_err(|_| DecodeError::PoolClosed)?;
            pending.push(rx);
        }

        // …then collect in monitor order.
        let mut bitmaps = Vec::with_capacity(pending.len());
        for rx in pending {
            bitmaps.push(rx.await.map_err(|_| DecodeError::PoolClosed)??);
        }
        Ok(bitmaps)
    }

    /// Close the queue and join every worker. Idempotent.
    pub fn close(&mut self) {
        if self.queue.take().is_some() {
            debug!("Decode pool closing — joining {} worker(s)", self.workers.len());
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

fn worker_loop(index: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        // Lock released as soon as recv returns; exactly one idle worker
        // waits on the queue at a time, giving FIFO task pickup.
        let job = match rx.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => break,
        };
        let Ok(job) = job else { break };

        let result = run_job(&job);
        if let Err(e) = &result {
            warn!("Decode worker {index}: task failed: {e}");
        }
        // Caller may have given up; nothing to do then.
        let _ = job.reply.send(result);
    }
    debug!("Decode worker {index} exiting");
}

fn run_job(job: &Job) -> Result<DecodedBitmap, DecodeError> {
    let mut data = job.source.fetch()?;

    let expected = job.width as usize * job.height as usize * 4;
    if data.len() != expected {
        return Err(DecodeError::PayloadSize { expected, actual: data.len() });
    }

    if job.format == PixelFormat::Bgra {
        for px in data.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
    }

    Ok(DecodedBitmap {
        data: Bytes::from(data),
        width: job.width,
        height: job.height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource(Vec<u8>);

    impl RawPixelSource for StaticSource {
        fn fetch(&self) -> Result<Vec<u8>, DecodeError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl RawPixelSource for FailingSource {
        fn fetch(&self) -> Result<Vec<u8>, DecodeError> {
            Err(DecodeError::Fetch { reason: "shm segment gone".into() })
        }
    }

    fn bgra_pixels(count: usize) -> Vec<u8> {
        // B G R A repeated — decode must flip to R G B A.
        (0..count).flat_map(|_| [0x10u8, 0x20, 0x30, 0xFF]).collect()
    }

    #[test]
    fn pool_size_is_clamped() {
        assert_eq!(DecodePool::new(Some(0)).size(), 1);
        assert_eq!(DecodePool::new(Some(99)).size(), 4);
        let auto = DecodePool::new(None).size();
        assert!((1..=4).contains(&auto));
    }

    #[tokio::test]
    async fn decode_fixes_byte_order() {
        let pool = DecodePool::new(Some(2));
        let source = Arc::new(StaticSource(bgra_pixels(6)));

        let bitmap = pool.decode(source, 3, 2, PixelFormat::Bgra).await.unwrap();
        assert_eq!(bitmap.width, 3);
        assert_eq!(bitmap.height, 2);
        assert_eq!(&bitmap.data[..4], &[0x30, 0x20, 0x10, 0xFF]);
    }

    #[tokio::test]
    async fn rgba_input_passes_through_unchanged() {
        let pool = DecodePool::new(Some(1));
        let raw: Vec<u8> = (0..16).collect();
        let source = Arc::new(StaticSource(raw.clone()));

        let bitmap = pool.decode(source, 2, 2, PixelFormat::Rgba).await.unwrap();
        assert_eq!(&bitmap.data[..], &raw[..]);
    }

    #[tokio::test]
    async fn size_mismatch_rejects_only_that_task() {
        let pool = DecodePool::new(Some(1));

        let bad = Arc::new(StaticSource(vec![0; 10]));
        let err = pool.decode(bad, 4, 4, PixelFormat::Bgra).await.unwrap_err();
        assert!(matches!(err, DecodeError::PayloadSize { expected: 64, actual: 10 }));

        // The pool survives the failure.
        let good = Arc::new(StaticSource(bgra_pixels(16)));
        assert!(pool.decode(good, 4, 4, PixelFormat::Bgra).await.is_ok());
    }

    #[tokio::test]
    async fn decode_all_is_all_or_nothing() {
        let pool = DecodePool::new(Some(2));
        let monitors = vec![
            MonitorSource {
                source: Arc::new(StaticSource(bgra_pixels(4))),
                width: 2,
                height: 2,
                format: PixelFormat::Bgra,
            },
            MonitorSource {
                source: Arc::new(FailingSource),
                width: 2,
                height: 2,
                format: PixelFormat::Bgra,
            },
        ];

        let err = pool.decode_all(&monitors).await.unwrap_err();
        assert!(matches!(err, DecodeError::Fetch { .. }));

        // Pool still usable for the next session.
        let ok = pool.decode_all(&monitors[..1]).await.unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[tokio::test]
    async fn closed_pool_rejects_new_work() {
        let mut pool = DecodePool::new(Some(2));
        pool.close();
        let source = Arc::new(StaticSource(bgra_pixels(1)));
        let err = pool.decode(source, 1, 1, PixelFormat::Bgra).await.unwrap_err();
        assert!(matches!(err, DecodeError::PoolClosed));
    }
}
