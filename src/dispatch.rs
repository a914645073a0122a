//! Scheduling of warp requests.
//!
//! [`MoveCoalescer`] is the rate-limiting policy applied to pointer moves before
//! they reach the overlay. [`BackgroundWarper`] moves warps off the event thread
//! while keeping at most one warp in flight, and the latest request wins.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};

use image::RgbaImage;

use crate::{
    geometry::{Point, Quad},
    strip::StripWarp,
    WarpResult,
};

/// Coalesces pointer moves that arrive within `window` of the last dispatched one.
///
/// Held moves are not dropped. The newest one is kept and handed out on the next
/// [`offer`](Self::offer) past the window or on [`flush`](Self::flush).
#[derive(Debug, Clone, Default)]
pub struct MoveCoalescer {
    window: Duration,
    last_dispatch: Option<Instant>,
    pending: Option<Point>,
}

impl MoveCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_dispatch: None,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Offers a move observed at `at`. Returns the point to apply now, if any.
    pub fn offer(&mut self, at: Instant, point: Point) -> Option<Point> {
        let due = match self.last_dispatch {
            Some(last) => at.saturating_duration_since(last) >= self.window,
            None => true,
        };
        if due {
            self.pending = None;
            self.last_dispatch = Some(at);
            Some(point)
        } else {
            self.pending = Some(point);
            None
        }
    }

    /// Takes the held move, if any.
    pub fn flush(&mut self) -> Option<Point> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Forgets timing and held moves, e.g. when a drag ends.
    pub fn reset(&mut self) {
        self.last_dispatch = None;
        self.pending = None;
    }
}

/// Output of one background warp.
#[derive(Debug)]
pub struct Rendered {
    /// Generation returned by [`BackgroundWarper::submit`] for this quad.
    pub generation: u64,
    pub quad: Quad,
    pub result: WarpResult<RgbaImage>,
}

struct Shared {
    pending: Mutex<Option<(u64, Quad)>>,
    latest: Mutex<Option<Rendered>>,
    ready: Condvar,
    running: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs strip warps of one source on the rayon pool.
///
/// Submitting a quad replaces any request that has not started yet, so a burst of
/// drag events costs at most one extra warp. Results carry the generation they
/// were submitted with, and an older result never replaces a newer one.
pub struct BackgroundWarper {
    engine: StripWarp,
    source: Arc<RgbaImage>,
    generation: AtomicU64,
    shared: Arc<Shared>,
}

impl BackgroundWarper {
    pub fn new(engine: StripWarp, source: Arc<RgbaImage>) -> Self {
        Self {
            engine,
            source,
            generation: AtomicU64::new(0),
            shared: Arc::new(Shared {
                pending: Mutex::new(None),
                latest: Mutex::new(None),
                ready: Condvar::new(),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Queues a warp of the source into `quad`'s canvas and returns its generation.
    pub fn submit(&self, quad: Quad) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.shared.pending) = Some((generation, quad));
        if !self.shared.running.swap(true, Ordering::SeqCst) {
            let (engine, source, shared) = (self.engine, self.source.clone(), self.shared.clone());
            rayon::spawn(move || drain(engine, &source, &shared));
        }
        generation
    }

    /// Takes the newest finished result, if there is one.
    pub fn take(&self) -> Option<Rendered> {
        lock(&self.shared.latest).take()
    }

    /// Blocks until a result of at least `generation` is available or `timeout`
    /// elapses.
    pub fn wait_for(&self, generation: u64, timeout: Duration) -> Option<Rendered> {
        let deadline = Instant::now() + timeout;
        let mut latest = lock(&self.shared.latest);
        loop {
            if latest.as_ref().is_some_and(|r| r.generation >= generation) {
                return latest.take();
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            latest = self
                .shared
                .ready
                .wait_timeout(latest, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

fn drain(engine: StripWarp, source: &RgbaImage, shared: &Shared) {
    loop {
        let job = lock(&shared.pending).take();
        let Some((generation, quad)) = job else {
            shared.running.store(false, Ordering::SeqCst);
            // A submit may have queued work after the take above but before the
            // flag was cleared; reclaim the worker role if so.
            if lock(&shared.pending).is_some() && !shared.running.swap(true, Ordering::SeqCst) {
                continue;
            }
            return;
        };

        debug!("background warp generation {}", generation);
        let (width, height) = quad.canvas_size();
        let result = engine.warp(source, quad, width, height);

        let mut latest = lock(&shared.latest);
        if latest.as_ref().map_or(true, |r| r.generation < generation) {
            *latest = Some(Rendered {
                generation,
                quad,
                result,
            });
        }
        drop(latest);
        shared.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn zero_window_dispatches_every_move() {
        let mut coalescer = MoveCoalescer::default();
        let t0 = Instant::now();
        for i in 0..5 {
            let p = Point::new(i as f32, 0.0);
            assert_eq!(coalescer.offer(t0, p), Some(p));
        }
        assert!(!coalescer.has_pending());
    }

    #[test]
    fn moves_inside_window_are_held_latest_wins() {
        let mut coalescer = MoveCoalescer::new(Duration::from_millis(50));
        let t0 = Instant::now();
        let first = Point::new(1.0, 1.0);
        assert_eq!(coalescer.offer(t0, first), Some(first));
        assert_eq!(coalescer.offer(t0 + Duration::from_millis(10), Point::new(2.0, 2.0)), None);
        assert_eq!(coalescer.offer(t0 + Duration::from_millis(20), Point::new(3.0, 3.0)), None);
        assert!(coalescer.has_pending());
        assert_eq!(coalescer.flush(), Some(Point::new(3.0, 3.0)));
        assert_eq!(coalescer.flush(), None);

        let late = Point::new(4.0, 4.0);
        assert_eq!(coalescer.offer(t0 + Duration::from_millis(60), late), Some(late));
    }

    #[test]
    fn dispatch_past_window_discards_stale_pending() {
        let mut coalescer = MoveCoalescer::new(Duration::from_millis(50));
        let t0 = Instant::now();
        coalescer.offer(t0, Point::new(0.0, 0.0));
        coalescer.offer(t0 + Duration::from_millis(5), Point::new(1.0, 0.0));
        let p = Point::new(9.0, 9.0);
        assert_eq!(coalescer.offer(t0 + Duration::from_millis(80), p), Some(p));
        assert_eq!(coalescer.flush(), None);
    }

    #[test]
    fn background_warper_delivers_latest_generation() {
        let source = Arc::new(RgbaImage::from_fn(40, 30, |x, y| {
            Rgba([x as u8 * 5, y as u8 * 7, 0, 255])
        }));
        let engine = StripWarp::default();
        let warper = BackgroundWarper::new(engine, source.clone());

        let first = Quad::from_rect(40, 30);
        let second = Quad::new([
            Point::new(4.0, 2.0),
            Point::new(36.0, 0.0),
            Point::new(40.0, 30.0),
            Point::new(0.0, 26.0),
        ]);
        let g1 = warper.submit(first);
        let g2 = warper.submit(second);
        assert!(g2 > g1);

        let rendered = warper
            .wait_for(g2, Duration::from_secs(10))
            .expect("background warp did not finish");
        assert_eq!(rendered.generation, g2);
        assert_eq!(rendered.quad, second);
        let expected = engine.warp(&source, second, 40, 30).unwrap();
        assert_eq!(rendered.result.unwrap(), expected);
        assert!(warper.take().is_none());
    }
}
