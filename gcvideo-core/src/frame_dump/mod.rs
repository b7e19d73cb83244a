//! Frame dumping and screenshots.
//!
//! Encoding runs on a single `FrameDumping` worker thread. The video thread
//! hands over one frame at a time through a single slot: it fills the slot,
//! signals `start`, and must wait for `done` before filling the slot again
//! (see [`FrameDumper::finish_frame_data`]). Frames are therefore encoded in
//! submission order and the producer stalls rather than dropping a frame.
//!
//! The GPU side (render texture, readback textures) lives in the renderer;
//! this module only sees owned copies of the mapped rows.

pub mod image_dump;
#[cfg(feature = "video-dump")]
pub mod y4m;

use crate::config::VideoConfig;
use crate::error::Result;
use crate::host::FrameDumpPrompt;
use crate::overlay::{duration, OverlayHandle};
use crate::sync::{Event, Flag};
use image_dump::ImageSequence;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Longest a caller waits for a requested screenshot.
pub const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(2);

/// Timing of the emulated frame a dump belongs to.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub ticks: u64,
    pub frame_number: u64,
    pub refresh_rate: f32,
}

/// One frame handed to the worker. `data` holds RGBA8 rows `stride` bytes apart.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDumpConfig {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub state: FrameState,
}

/// Output settings read when the worker starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpSettings {
    pub path: PathBuf,
    pub as_images: bool,
    pub silent: bool,
}

impl DumpSettings {
    pub fn from_config(config: &VideoConfig) -> Self {
        Self {
            path: config.dump_path.clone(),
            as_images: config.dump_frames_as_images,
            silent: config.dump_frames_silent,
        }
    }
}

impl Default for DumpSettings {
    fn default() -> Self {
        Self::from_config(&VideoConfig::default())
    }
}

/// State shared between the video thread, the worker and screenshot callers.
#[derive(Debug, Default)]
pub struct FrameDumpShared {
    slot: Mutex<Option<FrameDumpConfig>>,
    start: Event,
    done: Event,
    screenshot_completed: Event,
    running: Flag,
    screenshot_request: Flag,
    screenshot_name: Mutex<String>,
    dump_frames: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl FrameDumpShared {
    pub fn dump_frames(&self) -> bool {
        self.dump_frames.load(Ordering::Acquire)
    }

    pub fn set_dump_frames(&self, enable: bool) {
        self.dump_frames.store(enable, Ordering::Release);
    }

    pub fn screenshot_requested(&self) -> bool {
        self.screenshot_request.is_set()
    }

    /// True while a screenshot is pending or frames are being dumped.
    pub fn is_frame_dumping(&self) -> bool {
        self.screenshot_requested() || self.dump_frames()
    }
}

/// Host-side handle for screenshots and the dump toggle.
#[derive(Debug, Clone)]
pub struct ScreenshotHandle {
    shared: Arc<FrameDumpShared>,
}

impl ScreenshotHandle {
    /// Requests a PNG of the next presented frame.
    ///
    /// With `wait`, blocks up to [`SCREENSHOT_TIMEOUT`] and returns whether
    /// the screenshot was written in time.
    pub fn save_screenshot(&self, path: impl AsRef<Path>, wait: bool) -> bool {
        {
            let mut name = lock(&self.shared.screenshot_name);
            *name = path.as_ref().to_string_lossy().into_owned();
            self.shared.screenshot_completed.reset();
            self.shared.screenshot_request.set();
        }

        if !wait {
            return true;
        }
        let completed = self.shared.screenshot_completed.wait_for(SCREENSHOT_TIMEOUT);
        if !completed {
            log::warn!("Timeout waiting for screenshot '{}'", path.as_ref().display());
        }
        completed
    }

    pub fn set_dump_frames(&self, enable: bool) {
        self.shared.set_dump_frames(enable);
    }

    pub fn dump_frames(&self) -> bool {
        self.shared.dump_frames()
    }

    pub fn is_frame_dumping(&self) -> bool {
        self.shared.is_frame_dumping()
    }
}

/// Video-thread side of the frame dump worker.
pub struct FrameDumper {
    shared: Arc<FrameDumpShared>,
    thread: Option<JoinHandle<()>>,
    frame_running: bool,
    settings: DumpSettings,
    overlay: OverlayHandle,
    prompt: Arc<dyn FrameDumpPrompt>,
}

impl FrameDumper {
    pub fn new(overlay: OverlayHandle, prompt: Arc<dyn FrameDumpPrompt>) -> Self {
        Self {
            shared: Arc::new(FrameDumpShared::default()),
            thread: None,
            frame_running: false,
            settings: DumpSettings::default(),
            overlay,
            prompt,
        }
    }

    pub fn shared(&self) -> &Arc<FrameDumpShared> {
        &self.shared
    }

    pub fn screenshot_handle(&self) -> ScreenshotHandle {
        ScreenshotHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_frame_dumping(&self) -> bool {
        self.shared.is_frame_dumping()
    }

    /// Settings used the next time the worker starts.
    pub fn set_settings(&mut self, settings: DumpSettings) {
        self.settings = settings;
    }

    pub fn is_thread_running(&self) -> bool {
        self.shared.running.is_set()
    }

    pub fn is_frame_running(&self) -> bool {
        self.frame_running
    }

    /// Hands `config` to the worker, starting it if needed.
    ///
    /// The previous frame must have been finished with
    /// [`finish_frame_data`](Self::finish_frame_data).
    pub fn dump_frame_data(&mut self, config: FrameDumpConfig) {
        debug_assert!(!self.frame_running, "frame dump slot overwritten while in flight");
        *lock(&self.shared.slot) = Some(config);

        if !self.shared.running.is_set() {
            self.shared.running.set();
            match self.spawn_worker() {
                Ok(handle) => self.thread = Some(handle),
                Err(e) => {
                    log::error!("Failed to start frame dump thread: {e}");
                    self.shared.running.clear();
                    lock(&self.shared.slot).take();
                    return;
                }
            }
        }

        self.shared.start.set();
        self.frame_running = true;
    }

    fn spawn_worker(&self) -> Result<JoinHandle<()>> {
        let shared = Arc::clone(&self.shared);
        let overlay = self.overlay.clone();
        let prompt = Arc::clone(&self.prompt);
        let settings = self.settings.clone();
        let handle = std::thread::Builder::new()
            .name("FrameDumping".to_string())
            .spawn(move || run_frame_dumps(&shared, &overlay, prompt.as_ref(), settings))?;
        log::info!("Frame dump thread started");
        Ok(handle)
    }

    /// Blocks until the in-flight frame has been written.
    pub fn finish_frame_data(&mut self) {
        if !self.frame_running {
            return;
        }
        self.shared.done.wait();
        self.frame_running = false;
    }

    /// Stops the worker after the in-flight frame. Returns whether a thread was running.
    pub fn stop_thread(&mut self) -> bool {
        if !self.shared.running.is_set() {
            return false;
        }
        self.finish_frame_data();
        self.shared.running.clear();
        self.shared.start.set();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("Frame dump thread panicked");
            }
        }
        log::info!("Frame dump thread stopped");
        true
    }
}

impl Drop for FrameDumper {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

/// Where the worker writes dumped frames.
enum DumpOutput {
    Images(ImageSequence),
    #[cfg(feature = "video-dump")]
    Video(y4m::Y4mDump),
}

impl DumpOutput {
    fn start(
        settings: &DumpSettings,
        config: &FrameDumpConfig,
        prompt: &dyn FrameDumpPrompt,
        overlay: &OverlayHandle,
    ) -> Option<Self> {
        if !settings.as_images {
            #[cfg(feature = "video-dump")]
            {
                let _ = overlay;
                return match y4m::Y4mDump::start(&settings.path, config) {
                    Ok(dump) => Some(DumpOutput::Video(dump)),
                    Err(e) => {
                        log::error!("Failed to start video frame dump: {e}");
                        None
                    }
                };
            }
            #[cfg(not(feature = "video-dump"))]
            {
                let _ = config;
                log::warn!(
                    "Video frame dump requested, but built without video-dump support. \
                     Frame dump will be saved as images instead."
                );
                overlay.add_message("Video dumping unavailable, dumping images", duration::NORMAL);
            }
        }

        ImageSequence::start(&settings.path, settings.silent, prompt).map(DumpOutput::Images)
    }

    fn write(&mut self, config: &FrameDumpConfig) {
        let result = match self {
            DumpOutput::Images(images) => images.write_frame(config),
            #[cfg(feature = "video-dump")]
            DumpOutput::Video(video) => video.write_frame(config),
        };
        if let Err(e) = result {
            log::error!("Failed to dump frame {}: {e}", config.state.frame_number);
        }
    }

    fn stop(self) {
        match self {
            DumpOutput::Images(images) => {
                log::info!("Frame dump finished after {} images", images.frames_written())
            }
            #[cfg(feature = "video-dump")]
            DumpOutput::Video(video) => {
                if let Err(e) = video.stop() {
                    log::error!("Failed to finish video frame dump: {e}");
                }
            }
        }
    }
}

fn run_frame_dumps(
    shared: &FrameDumpShared,
    overlay: &OverlayHandle,
    prompt: &dyn FrameDumpPrompt,
    settings: DumpSettings,
) {
    let mut output: Option<DumpOutput> = None;
    let mut started = false;

    loop {
        shared.start.wait();
        if !shared.running.is_set() {
            break;
        }

        let Some(config) = lock(&shared.slot).take() else {
            shared.done.set();
            continue;
        };

        if shared.screenshot_request.test_and_clear() {
            let mut name = lock(&shared.screenshot_name);
            match image_dump::write_png(Path::new(name.as_str()), &config) {
                Ok(()) => overlay.add_message(format!("Screenshot saved to {name}"), duration::NORMAL),
                Err(e) => log::error!("Failed to save screenshot '{name}': {e}"),
            }
            name.clear();
            shared.screenshot_completed.set();
        }

        if shared.dump_frames() {
            if !started {
                output = DumpOutput::start(&settings, &config, prompt, overlay);
                started = output.is_some();
                if !started {
                    shared.set_dump_frames(false);
                }
            }
            if let Some(output) = output.as_mut() {
                output.write(&config);
            }
        }

        shared.done.set();
    }

    if let Some(output) = output {
        output.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FixedAnswer;

    fn frame(width: u32, height: u32, value: u8) -> FrameDumpConfig {
        FrameDumpConfig {
            data: vec![value; (width * height * 4) as usize],
            width,
            height,
            stride: width * 4,
            state: FrameState {
                ticks: 0,
                frame_number: 0,
                refresh_rate: 60.0,
            },
        }
    }

    fn dumper(path: &Path) -> FrameDumper {
        let mut dumper = FrameDumper::new(OverlayHandle::new(), Arc::new(FixedAnswer(true)));
        dumper.set_settings(DumpSettings {
            path: path.to_path_buf(),
            as_images: true,
            silent: true,
        });
        dumper
    }

    #[test]
    fn screenshot_is_written_and_signalled() {
        let dir = tempfile::tempdir().unwrap();
        let mut dumper = dumper(dir.path());
        let handle = dumper.screenshot_handle();
        let path = dir.path().join("shot.png");

        assert!(handle.save_screenshot(&path, false));
        assert!(dumper.is_frame_dumping());
        dumper.dump_frame_data(frame(8, 4, 0x80));
        dumper.finish_frame_data();

        assert!(path.exists());
        assert!(!dumper.is_frame_dumping());
        assert!(dumper.stop_thread());
        assert!(!dumper.is_thread_running());
    }

    #[test]
    fn image_sequence_numbers_from_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut dumper = dumper(dir.path());
        dumper.shared().set_dump_frames(true);

        for i in 0..3 {
            dumper.dump_frame_data(frame(4, 4, i));
            dumper.finish_frame_data();
        }
        dumper.stop_thread();

        for n in 1..=3 {
            assert!(dir.path().join(format!("framedump_{n}.png")).exists());
        }
        assert!(!dir.path().join("framedump_4.png").exists());
    }

    #[test]
    fn declined_overwrite_disables_dumping() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("framedump_1.png"), b"old").unwrap();
        let mut dumper = FrameDumper::new(OverlayHandle::new(), Arc::new(FixedAnswer(false)));
        dumper.set_settings(DumpSettings {
            path: dir.path().to_path_buf(),
            as_images: true,
            silent: false,
        });
        dumper.shared().set_dump_frames(true);

        dumper.dump_frame_data(frame(4, 4, 1));
        dumper.finish_frame_data();

        assert!(!dumper.shared().dump_frames());
        assert_eq!(std::fs::read(dir.path().join("framedump_1.png")).unwrap(), b"old");
    }

    #[test]
    fn finish_without_frame_returns_immediately() {
        let mut dumper = FrameDumper::new(OverlayHandle::new(), Arc::new(FixedAnswer(true)));
        dumper.finish_frame_data();
        assert!(!dumper.stop_thread());
    }
}
