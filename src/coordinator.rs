//! The per-frame screenshot coordinator.
//!
//! Each `advance()` copies the just-rendered frame into the front slot of a
//! ring of frame buffers and hands the requests of an older slot, whose copy
//! has had time to land, to the encode pool. The render thread only ever
//! blocks on the reuse barrier of the slot it is about to overwrite.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use crate::backend::ReadbackBackend;
use crate::encode::{EncodeContext, EncodeTask, EventHub, ImageCrateWriter, ImageWriter, ShotEvent};
use crate::error::{ShotError, ShotResult};
use crate::format::ShotFormat;
use crate::pool::EncodePool;
use crate::request::ScreenshotRequest;
use crate::ring::{SlotPhase, SlotRing};
use crate::stats::ShotStats;

const DEFAULT_MAX_ENCODE_WORKERS: usize = 4;

const ENV_SLOTS: &str = "DEFERRED_SHOT_SLOTS";
const ENV_WORKERS: &str = "DEFERRED_SHOT_WORKERS";
const ENV_BARRIER_WARN_MS: &str = "DEFERRED_SHOT_BARRIER_WARN_MS";
const ENV_NO_MKDIR: &str = "DEFERRED_SHOT_NO_MKDIR";

/// Read `name` and parse it, ignoring unset or non-UTF-8 values.
fn env_override<T>(name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| parse(raw.trim()))
}

/// Nonzero integer; zero and garbage both mean "keep the default".
fn parse_count(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().filter(|n| *n > 0)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShotConfig {
    /// Frame buffers in the ring. At least 2.
    pub slot_count: usize,
    pub encode_workers: usize,
    /// How long the reuse barrier may block before a stall is reported.
    /// The wait itself always runs to completion.
    pub barrier_warn_after: Duration,
    /// Frame number given to the first dispatched encode task.
    pub first_frame: u64,
    /// Create missing parent directories of output files. Only affects the
    /// default writer.
    pub create_parent_dirs: bool,
}

impl Default for ShotConfig {
    fn default() -> Self {
        Self {
            slot_count: 2,
            encode_workers: std::thread::available_parallelism()
                .map_or(1, NonZeroUsize::get)
                .min(DEFAULT_MAX_ENCODE_WORKERS),
            barrier_warn_after: Duration::from_millis(100),
            first_frame: 1,
            create_parent_dirs: true,
        }
    }
}

impl ShotConfig {
    /// Defaults with environment overrides applied:
    /// `DEFERRED_SHOT_SLOTS`, `DEFERRED_SHOT_WORKERS`,
    /// `DEFERRED_SHOT_BARRIER_WARN_MS` and `DEFERRED_SHOT_NO_MKDIR`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(slots) = env_override(ENV_SLOTS, parse_count) {
            config.slot_count = usize::try_from(slots).unwrap_or(usize::MAX);
        }
        if let Some(workers) = env_override(ENV_WORKERS, parse_count) {
            config.encode_workers = usize::try_from(workers).unwrap_or(usize::MAX);
        }
        if let Some(ms) = env_override(ENV_BARRIER_WARN_MS, parse_count) {
            config.barrier_warn_after = Duration::from_millis(ms);
        }
        if env_override(ENV_NO_MKDIR, parse_flag) == Some(true) {
            config.create_parent_dirs = false;
        }
        config
    }
}

pub struct ShotCoordinatorBuilder {
    backend: Option<Arc<dyn ReadbackBackend>>,
    writer: Option<Arc<dyn ImageWriter>>,
    config: ShotConfig,
}

impl Default for ShotCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShotCoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            writer: None,
            config: ShotConfig::default(),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ReadbackBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replace the default `image`-crate writer.
    pub fn with_writer(mut self, writer: Arc<dyn ImageWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_config(mut self, config: ShotConfig) -> Self {
        self.config = config;
        self
    }

    pub fn slot_count(mut self, slot_count: usize) -> Self {
        self.config.slot_count = slot_count;
        self
    }

    pub fn encode_workers(mut self, workers: usize) -> Self {
        self.config.encode_workers = workers;
        self
    }

    pub fn barrier_warn_after(mut self, after: Duration) -> Self {
        self.config.barrier_warn_after = after;
        self
    }

    pub fn first_frame(mut self, frame: u64) -> Self {
        self.config.first_frame = frame;
        self
    }

    pub fn create_parent_dirs(mut self, enabled: bool) -> Self {
        self.config.create_parent_dirs = enabled;
        self
    }

    pub fn build(self) -> ShotResult<ShotCoordinator> {
        let backend = self.backend.ok_or_else(|| {
            ShotError::InvalidConfig("no readback backend configured".into())
        })?;
        let config = self.config;

        let buffers = (0..config.slot_count)
            .map(|_| backend.create_frame_buffer())
            .collect::<ShotResult<Vec<_>>>()?;
        let ring = SlotRing::new(buffers)?;
        let pool = EncodePool::new(config.encode_workers)?;

        let writer: Arc<dyn ImageWriter> = match self.writer {
            Some(writer) => writer,
            None => Arc::new(ImageCrateWriter::new(config.create_parent_dirs)),
        };
        let ctx = EncodeContext {
            writer,
            stats: Arc::new(ShotStats::default()),
            events: Arc::new(EventHub::default()),
        };
        let (request_tx, request_rx) = mpsc::channel();

        log::info!(
            "screenshot coordinator ready: {} slots (drain offset {}), {} encode workers",
            ring.len(),
            ring.len() / 2,
            pool.workers()
        );

        Ok(ShotCoordinator {
            backend,
            ring,
            pool,
            ctx,
            next_frame: config.first_frame,
            config,
            request_tx,
            request_rx,
        })
    }
}

/// Cloneable handle for queuing screenshots from threads other than the
/// render thread. Requests land in the front slot at the start of the next
/// `advance()` or `flush()`.
#[derive(Clone, Debug)]
pub struct ShotRequester {
    tx: Sender<ScreenshotRequest>,
}

impl ShotRequester {
    pub fn request(&self, template: impl Into<String>, format: ShotFormat) -> ShotResult<()> {
        let request = ScreenshotRequest::new(template, format)?;
        self.tx.send(request).map_err(|_| ShotError::CoordinatorGone)
    }
}

pub struct ShotCoordinator {
    backend: Arc<dyn ReadbackBackend>,
    ring: SlotRing,
    pool: EncodePool,
    ctx: EncodeContext,
    config: ShotConfig,
    next_frame: u64,
    request_tx: Sender<ScreenshotRequest>,
    request_rx: Receiver<ScreenshotRequest>,
}

impl ShotCoordinator {
    pub fn builder() -> ShotCoordinatorBuilder {
        ShotCoordinatorBuilder::new()
    }

    /// Queue a screenshot of the next frame copied. Never blocks and does no
    /// I/O; only rejects templates that cannot name a file.
    pub fn request_screenshot(
        &mut self,
        template: impl Into<String>,
        format: ShotFormat,
    ) -> ShotResult<()> {
        let request = ScreenshotRequest::new(template, format)?;
        self.ring.front_mut().queue.push(request);
        ShotStats::bump(&self.ctx.stats.requests_queued);
        Ok(())
    }

    /// Run one capture cycle. Call once per rendered frame, after the frame
    /// is complete and before it is presented over.
    pub fn advance(&mut self) {
        self.collect_remote_requests();
        ShotStats::bump(&self.ctx.stats.frames_advanced);

        let front = self.ring.front_index();
        self.reclaim_slot(front);
        self.copy_into_front();

        let drain = self.ring.drain_index();
        let dispatched = self.drain_slot(drain);
        log::debug!(
            "advance: copied into slot {front}, drained slot {drain} ({dispatched} tasks)"
        );

        self.ring.rotate();
    }

    /// Dispatch every request whose pixels are already copied, then wait for
    /// all encode tasks and unmap every slot. Requests queued on the front
    /// slot stay queued for the next copy.
    pub fn flush(&mut self) {
        self.collect_remote_requests();
        // Oldest copy first so frame numbers follow capture order.
        for offset in 1..self.ring.len() {
            let index = self.ring.index_after_front(offset);
            self.drain_slot(index);
        }
        self.wait_idle();
        for slot in self.ring.slots_mut() {
            slot.unmap();
            if slot.phase == SlotPhase::Draining {
                slot.phase = SlotPhase::Retiring;
            }
        }
    }

    /// Block until every dispatched encode task has finished.
    pub fn wait_idle(&self) {
        for slot in self.ring.slots() {
            slot.tasks.wait();
        }
    }

    pub fn requester(&self) -> ShotRequester {
        ShotRequester {
            tx: self.request_tx.clone(),
        }
    }

    /// Receive a [`ShotEvent`] for every encode task dispatched from now on.
    pub fn subscribe(&self) -> Receiver<ShotEvent> {
        let (tx, rx) = mpsc::channel();
        self.ctx.events.subscribe(tx);
        rx
    }

    pub fn front_index(&self) -> usize {
        self.ring.front_index()
    }

    pub fn drain_index(&self) -> usize {
        self.ring.drain_index()
    }

    pub fn slot_count(&self) -> usize {
        self.ring.len()
    }

    pub fn slot_phase(&self, index: usize) -> SlotPhase {
        self.ring.slot(index).phase()
    }

    /// Frame number the next dispatched encode task will get.
    pub fn next_frame_number(&self) -> u64 {
        self.next_frame
    }

    /// Requests queued on any slot and not yet dispatched. Requests sent
    /// through a [`ShotRequester`] are counted once an `advance()` or
    /// `flush()` has moved them onto the front slot.
    pub fn pending_requests(&self) -> usize {
        self.ring.slots().map(|slot| slot.pending_requests()).sum()
    }

    pub fn stats(&self) -> &Arc<ShotStats> {
        &self.ctx.stats
    }

    pub fn config(&self) -> &ShotConfig {
        &self.config
    }

    fn collect_remote_requests(&mut self) {
        let front = self.ring.front_mut();
        let mut received = 0;
        while let Ok(request) = self.request_rx.try_recv() {
            front.queue.push(request);
            received += 1;
        }
        ShotStats::add(&self.ctx.stats.requests_queued, received);
    }

    /// Reuse barrier: wait for the slot's tasks, then release its mapping.
    fn reclaim_slot(&mut self, index: usize) {
        let stats = &self.ctx.stats;
        let warn_after = self.config.barrier_warn_after;
        let slot = self.ring.slot_mut(index);

        let started = Instant::now();
        if !slot.tasks.wait_timeout(warn_after) {
            ShotStats::bump(&stats.barrier_stalls);
            log::warn!(
                "slot {index} still has {} encode tasks after {warn_after:?}; render thread waiting",
                slot.tasks.pending()
            );
            slot.tasks.wait();
        }
        stats.record_barrier_wait(started.elapsed());
        slot.unmap();
        slot.phase = SlotPhase::Filling;
    }

    fn copy_into_front(&mut self) {
        let area = self.backend.window_area();
        let stats = &self.ctx.stats;
        let index = self.ring.front_index();
        let slot = self.ring.front_mut();

        assert!(
            slot.tasks.is_idle(),
            "slot {index} copied while {} encode tasks still read it",
            slot.tasks.pending()
        );

        let result = if area.is_empty() {
            Err(ShotError::EmptyArea)
        } else {
            slot.buffer.copy(area)
        };
        match result {
            Ok(()) => {
                slot.copied_area = Some(area);
                slot.phase = SlotPhase::Copied;
            }
            Err(ShotError::BufferInUse) => {
                panic!("frame buffer of slot {index} reused while its pixels are still shared")
            }
            Err(err) => {
                slot.copied_area = None;
                slot.phase = SlotPhase::Retiring;
                ShotStats::bump(&stats.copies_failed);
                let dropped = slot.queue.drain_all().len();
                ShotStats::add(&stats.requests_dropped, dropped as u64);
                if dropped > 0 {
                    log::warn!("capture into slot {index} failed: {err}; dropped {dropped} requests");
                } else {
                    log::warn!("capture into slot {index} failed: {err}");
                }
            }
        }
    }

    /// Map a copied slot once and dispatch one encode task per queued
    /// request. Returns the number of tasks dispatched.
    fn drain_slot(&mut self, index: usize) -> usize {
        let stats = &self.ctx.stats;
        let slot = self.ring.slot_mut(index);
        if slot.phase != SlotPhase::Copied {
            return 0;
        }
        slot.phase = SlotPhase::Retiring;
        if slot.queue.is_empty() {
            return 0;
        }

        let requests = slot.queue.drain_all();
        let pixels = match slot.buffer.map() {
            Ok(view) => view,
            Err(err) => {
                ShotStats::add(&stats.requests_dropped, requests.len() as u64);
                log::warn!(
                    "mapping slot {index} failed: {err}; dropped {} requests",
                    requests.len()
                );
                return 0;
            }
        };
        slot.mapped = true;
        slot.phase = SlotPhase::Draining;

        let count = requests.len();
        for request in requests {
            let frame = self.next_frame;
            self.next_frame = frame.wrapping_add(1);
            if self.next_frame == 0 {
                log::warn!("screenshot frame counter wrapped after frame {frame}");
            }
            let task = EncodeTask::new(pixels.clone(), request, frame);
            let ctx = self.ctx.clone();
            self.pool.run(&slot.tasks, move || task.run(&ctx));
        }
        ShotStats::add(&stats.tasks_dispatched, count as u64);
        count
    }
}

impl Drop for ShotCoordinator {
    fn drop(&mut self) {
        self.flush();
        let discarded: usize = self
            .ring
            .slots_mut()
            .map(|slot| slot.queue.drain_all().len())
            .sum();
        if discarded > 0 {
            ShotStats::add(&self.ctx.stats.requests_dropped, discarded as u64);
            log::warn!("discarding {discarded} screenshot requests that were never captured");
        }
    }
}

impl std::fmt::Debug for ShotCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShotCoordinator")
            .field("ring", &self.ring)
            .field("pool", &self.pool)
            .field("config", &self.config)
            .field("next_frame", &self.next_frame)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use super::*;
    use crate::backend::{RowOrder, SourcePixelFormat};
    use crate::format::ColorMode;
    use crate::software::{SoftwareBackend, SoftwareSurface};

    /// Records what would have been written. Paths containing `fail` error
    /// out; `delay` simulates a slow encoder.
    #[derive(Default)]
    struct RecordingWriter {
        delay: Option<Duration>,
        written: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    }

    impl RecordingWriter {
        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn paths(&self) -> BTreeSet<PathBuf> {
            self.written
                .lock()
                .map(|w| w.iter().map(|(p, _)| p.clone()).collect())
                .unwrap_or_default()
        }

        fn first_pixels(&self) -> BTreeMap<PathBuf, Vec<u8>> {
            self.written
                .lock()
                .map(|w| {
                    w.iter()
                        .map(|(p, px)| (p.clone(), px[..3].to_vec()))
                        .collect()
                })
                .unwrap_or_default()
        }

        fn count(&self) -> usize {
            self.written.lock().map(|w| w.len()).unwrap_or(0)
        }
    }

    impl ImageWriter for RecordingWriter {
        fn write(
            &self,
            path: &Path,
            pixels: &[u8],
            _width: u32,
            _height: u32,
            _mode: ColorMode,
            _format: &ShotFormat,
        ) -> ShotResult<()> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if path.to_string_lossy().contains("fail") {
                return Err(ShotError::Io(std::io::Error::other("simulated failure")));
            }
            if let Ok(mut written) = self.written.lock() {
                written.push((path.to_path_buf(), pixels.to_vec()));
            }
            Ok(())
        }
    }

    struct Harness {
        surface: Arc<SoftwareSurface>,
        writer: Arc<RecordingWriter>,
    }

    impl Harness {
        fn new(writer: RecordingWriter) -> ShotResult<Self> {
            Ok(Self {
                surface: Arc::new(SoftwareSurface::new(4, 3)?),
                writer: Arc::new(writer),
            })
        }

        fn builder(&self, slots: usize) -> ShotCoordinatorBuilder {
            ShotCoordinator::builder()
                .with_backend(Arc::new(SoftwareBackend::new(Arc::clone(&self.surface))))
                .with_writer(self.writer.clone())
                .slot_count(slots)
                .encode_workers(2)
        }
    }

    #[test]
    fn single_request_fires_on_the_second_advance() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        let mut coord = h.builder(2).build()?;
        coord.request_screenshot("shot_####.png", ShotFormat::png())?;

        coord.advance();
        coord.wait_idle();
        assert_eq!(coord.stats().snapshot().tasks_dispatched, 0);
        assert_eq!(h.writer.count(), 0);

        coord.advance();
        coord.wait_idle();
        assert_eq!(coord.stats().snapshot().tasks_dispatched, 1);
        assert_eq!(h.writer.paths(), BTreeSet::from([PathBuf::from("shot_0001.png")]));
        assert_eq!(coord.next_frame_number(), 2);
        Ok(())
    }

    #[test]
    fn identical_templates_get_sequential_frames() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        let mut coord = h.builder(2).build()?;
        coord.request_screenshot("dup_####.png", ShotFormat::png())?;
        coord.request_screenshot("dup_####.png", ShotFormat::png())?;
        coord.advance();
        coord.advance();
        coord.wait_idle();

        let expected = BTreeSet::from(["dup_0001.png", "dup_0002.png"].map(PathBuf::from));
        assert_eq!(h.writer.paths(), expected);
        Ok(())
    }

    #[test]
    fn full_rotation_without_requests_dispatches_nothing() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        for slots in 2..=6 {
            let mut coord = h.builder(slots).build()?;
            let start = coord.front_index();
            for _ in 0..slots {
                coord.advance();
            }
            assert_eq!(coord.front_index(), start, "ring of {slots}");
            assert_eq!(coord.stats().snapshot().tasks_dispatched, 0);
        }
        assert_eq!(h.writer.count(), 0);
        Ok(())
    }

    #[test]
    fn requests_capture_the_pixels_of_their_own_cycle() -> ShotResult<()> {
        for slots in 2..=5 {
            let h = Harness::new(RecordingWriter::default())?;
            let mut coord = h.builder(slots).build()?;
            for cycle in 1..=12u8 {
                h.surface.fill([cycle, 255 - cycle, 0, 255]);
                coord.request_screenshot(format!("cycle{cycle}_#.png"), ShotFormat::png())?;
                if cycle % 3 == 0 {
                    coord.request_screenshot(format!("extra{cycle}_#.png"), ShotFormat::png())?;
                }
                coord.advance();
            }
            coord.flush();

            let pixels = h.writer.first_pixels();
            assert_eq!(pixels.len(), 16, "ring of {slots}");
            for (path, px) in &pixels {
                let name = path.to_string_lossy();
                let digits: String = name
                    .trim_start_matches(char::is_alphabetic)
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();
                let cycle: u8 = digits.parse().map_err(|_| {
                    ShotError::InvalidRequest(format!("unexpected output {name}"))
                })?;
                assert_eq!(px, &vec![cycle, 255 - cycle, 0], "{name} in ring of {slots}");
            }
        }
        Ok(())
    }

    #[test]
    fn one_failed_write_does_not_affect_its_siblings() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        let mut coord = h.builder(3).build()?;
        let events = coord.subscribe();
        coord.request_screenshot("ok_a_#.png", ShotFormat::png())?;
        coord.request_screenshot("fail_#.png", ShotFormat::png())?;
        coord.request_screenshot("ok_b_#.png", ShotFormat::png())?;
        coord.advance();
        coord.flush();

        assert_eq!(h.writer.count(), 2);
        let snap = coord.stats().snapshot();
        assert_eq!(snap.files_written, 2);
        assert_eq!(snap.encode_failures, 1);

        let events: Vec<ShotEvent> = events.try_iter().collect();
        assert_eq!(events.len(), 3);
        let failed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ShotEvent::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].path(), Path::new("fail_2.png"));
        Ok(())
    }

    #[test]
    fn slow_encoders_never_stall_the_render_loop_past_the_barrier_threshold()
    -> ShotResult<()> {
        let threshold = Duration::from_millis(500);
        let h = Harness::new(RecordingWriter::slow(Duration::from_millis(1)))?;
        let mut coord = h
            .builder(4)
            .encode_workers(4)
            .barrier_warn_after(threshold)
            .build()?;

        let mut slowest = Duration::ZERO;
        for _ in 0..1000 {
            coord.request_screenshot("stress/frame_####.png", ShotFormat::png())?;
            let started = Instant::now();
            coord.advance();
            slowest = slowest.max(started.elapsed());
        }
        coord.flush();

        assert!(slowest < threshold, "advance blocked for {slowest:?}");
        assert_eq!(h.writer.count(), 1000);
        let expected: BTreeSet<PathBuf> = (1..=1000)
            .map(|frame| PathBuf::from(format!("stress/frame_{frame:04}.png")))
            .collect();
        assert_eq!(h.writer.paths(), expected);
        assert_eq!(coord.stats().snapshot().barrier_stalls, 0);
        Ok(())
    }

    #[test]
    fn png_files_round_trip_through_the_default_writer() -> ShotResult<()> {
        let dir = tempfile::tempdir()?;
        let surface = Arc::new(SoftwareSurface::new(3, 2)?);
        surface.fill([10, 20, 30, 255]);
        surface.put_pixel(2, 0, [250, 128, 1, 255])?;
        let backend = SoftwareBackend::new(Arc::clone(&surface))
            .with_readback_format(SourcePixelFormat::Bgra8)?
            .with_row_order(RowOrder::BottomUp);

        let mut coord = ShotCoordinator::builder()
            .with_backend(Arc::new(backend))
            .slot_count(2)
            .encode_workers(1)
            .build()?;
        let template = dir.path().join("out/shot_####.png");
        coord.request_screenshot(template.to_string_lossy().into_owned(), ShotFormat::png())?;
        coord.advance();
        coord.advance();
        coord.wait_idle();

        let image = image::open(dir.path().join("out/shot_0001.png"))?.to_rgb8();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 0).0, [250, 128, 1]);
        assert_eq!(image.get_pixel(0, 1).0, [10, 20, 30]);
        Ok(())
    }

    #[test]
    fn requests_from_other_threads_join_the_next_copy() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        let mut coord = h.builder(2).build()?;
        let requester = coord.requester();
        let worker = std::thread::spawn(move || {
            requester.request("remote_#.bmp", ShotFormat::new(crate::format::ImageFileType::Bmp))
        });
        match worker.join() {
            Ok(result) => result?,
            Err(_) => panic!("requester thread panicked"),
        }

        coord.advance();
        coord.advance();
        coord.wait_idle();
        assert_eq!(
            h.writer.paths(),
            BTreeSet::from([PathBuf::from("remote_1.bmp")])
        );

        let orphan = coord.requester();
        drop(coord);
        assert!(matches!(
            orphan.request("late_#.png", ShotFormat::png()),
            Err(ShotError::CoordinatorGone)
        ));
        Ok(())
    }

    #[test]
    fn flush_leaves_uncopied_requests_queued() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        let mut coord = h.builder(3).build()?;
        coord.request_screenshot("early_#.png", ShotFormat::png())?;
        coord.flush();
        assert_eq!(coord.pending_requests(), 1);
        assert_eq!(h.writer.count(), 0);

        coord.advance();
        coord.flush();
        assert_eq!(coord.pending_requests(), 0);
        assert_eq!(h.writer.paths(), BTreeSet::from([PathBuf::from("early_1.png")]));
        Ok(())
    }

    #[test]
    fn dropping_the_coordinator_writes_copied_requests() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        let mut coord = h.builder(4).build()?;
        coord.request_screenshot("copied_#.png", ShotFormat::png())?;
        coord.advance();
        coord.request_screenshot("never_copied_#.png", ShotFormat::png())?;
        let stats = Arc::clone(coord.stats());
        drop(coord);

        assert_eq!(h.writer.paths(), BTreeSet::from([PathBuf::from("copied_1.png")]));
        assert_eq!(stats.snapshot().requests_dropped, 1);
        Ok(())
    }

    #[test]
    fn failed_captures_drop_their_requests_and_recover() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        let mut coord = h.builder(2).build()?;

        h.surface.resize(0, 0)?;
        coord.request_screenshot("lost_#.png", ShotFormat::png())?;
        coord.advance();
        let snap = coord.stats().snapshot();
        assert_eq!(snap.copies_failed, 1);
        assert_eq!(snap.requests_dropped, 1);

        h.surface.resize(2, 2)?;
        coord.request_screenshot("found_#.png", ShotFormat::png())?;
        coord.advance();
        coord.advance();
        coord.wait_idle();
        assert_eq!(h.writer.paths(), BTreeSet::from([PathBuf::from("found_1.png")]));
        Ok(())
    }

    #[test]
    fn slow_tasks_are_reported_as_barrier_stalls() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::slow(Duration::from_millis(150)))?;
        let mut coord = h
            .builder(2)
            .barrier_warn_after(Duration::from_millis(10))
            .build()?;
        coord.request_screenshot("slow_#.png", ShotFormat::png())?;
        coord.advance();
        coord.advance();
        // Slot 0 is back at the front with its task still sleeping.
        coord.advance();

        let snap = coord.stats().snapshot();
        assert_eq!(snap.barrier_stalls, 1);
        assert!(snap.barrier_wait_avg > Duration::ZERO);
        assert_eq!(h.writer.count(), 1);
        Ok(())
    }

    #[test]
    fn first_frame_number_is_configurable() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        let mut coord = h.builder(2).first_frame(250).build()?;
        coord.request_screenshot("f_#####.png", ShotFormat::png())?;
        coord.advance();
        coord.flush();
        assert_eq!(h.writer.paths(), BTreeSet::from([PathBuf::from("f_00250.png")]));
        assert_eq!(coord.next_frame_number(), 251);
        Ok(())
    }

    #[test]
    fn invalid_builds_and_requests_are_rejected() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        assert!(matches!(
            h.builder(1).build(),
            Err(ShotError::InvalidConfig(_))
        ));
        assert!(matches!(
            h.builder(2).encode_workers(0).build(),
            Err(ShotError::InvalidConfig(_))
        ));
        assert!(matches!(
            ShotCoordinator::builder().build(),
            Err(ShotError::InvalidConfig(_))
        ));

        let mut coord = h.builder(2).build()?;
        assert!(matches!(
            coord.request_screenshot("", ShotFormat::png()),
            Err(ShotError::InvalidRequest(_))
        ));
        assert!(matches!(
            coord.request_screenshot("shots/", ShotFormat::png()),
            Err(ShotError::InvalidRequest(_))
        ));
        assert_eq!(coord.pending_requests(), 0);
        Ok(())
    }

    #[test]
    fn slot_phases_follow_the_cycle() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::slow(Duration::from_millis(200)))?;
        let mut coord = h.builder(2).build()?;
        assert_eq!(coord.slot_phase(0), SlotPhase::Filling);
        coord.request_screenshot("p_#.png", ShotFormat::png())?;
        coord.advance();
        assert_eq!(coord.slot_phase(0), SlotPhase::Copied);
        assert_eq!(coord.slot_phase(1), SlotPhase::Filling);

        coord.advance();
        // Slot 0 is the front again but its task still reads the pixels.
        assert_eq!(coord.front_index(), 0);
        assert_eq!(coord.slot_phase(0), SlotPhase::Draining);
        assert_eq!(coord.slot_phase(1), SlotPhase::Copied);

        coord.flush();
        assert_eq!(coord.slot_phase(0), SlotPhase::Retiring);
        assert_eq!(coord.slot_phase(1), SlotPhase::Retiring);

        coord.advance();
        assert_eq!(coord.slot_phase(0), SlotPhase::Copied);
        assert_eq!(coord.slot_phase(1), SlotPhase::Filling);
        Ok(())
    }

    #[test]
    fn frame_counter_wraps_instead_of_panicking() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        let mut coord = h.builder(2).first_frame(u64::MAX).build()?;
        coord.request_screenshot("last_#.png", ShotFormat::png())?;
        coord.request_screenshot("wrapped_#.png", ShotFormat::png())?;
        coord.advance();
        coord.advance();
        coord.wait_idle();

        let expected = BTreeSet::from([
            PathBuf::from(format!("last_{}.png", u64::MAX)),
            PathBuf::from("wrapped_0.png"),
        ]);
        assert_eq!(h.writer.paths(), expected);
        assert_eq!(coord.next_frame_number(), 1);
        Ok(())
    }

    #[test]
    fn unbounded_barrier_warning_never_panics() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::slow(Duration::from_millis(20)))?;
        let mut coord = h.builder(2).barrier_warn_after(Duration::MAX).build()?;
        coord.request_screenshot("calm_#.png", ShotFormat::png())?;
        for _ in 0..4 {
            coord.advance();
        }
        assert_eq!(h.writer.paths(), BTreeSet::from([PathBuf::from("calm_1.png")]));
        assert_eq!(coord.stats().snapshot().barrier_stalls, 0);
        Ok(())
    }

    #[test]
    fn remote_requests_count_as_pending_once_collected() -> ShotResult<()> {
        let h = Harness::new(RecordingWriter::default())?;
        let mut coord = h.builder(3).build()?;
        coord.requester().request("remote_#.png", ShotFormat::png())?;
        assert_eq!(coord.pending_requests(), 0);
        coord.flush();
        assert_eq!(coord.pending_requests(), 1);
        Ok(())
    }

    #[test]
    fn env_values_parse_leniently() {
        assert_eq!(parse_count("8"), Some(8));
        assert_eq!(parse_count("0"), None);
        assert_eq!(parse_count("-3"), None);
        assert_eq!(parse_count("many"), None);
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag("yes"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
