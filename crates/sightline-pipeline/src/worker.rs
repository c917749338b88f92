//! Per-camera worker threads.
//!
//! A worker owns one frame source and one [`VisionPipeline`]. Each loop it
//! pulls a frame, copies the camera's current settings under the camera
//! lock, runs the pipeline outside the lock and hands the result to its
//! consumer. Settings edits made between frames are picked up by the next
//! frame; a run never sees a half-applied edit.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use image::RgbImage;
use log::{debug, error, info, warn};
use sightline_calib::CalibrationError;
use sightline_core::CameraCalibrationCoefficients;
use sightline_pipes::Frame;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::context::{lock_camera, SharedCamera};
use crate::pipeline::{PipelineResult, VisionPipeline};

/// Consecutive capture failures after which a worker gives up.
pub const MAX_CONSECUTIVE_CAPTURE_ERRORS: u32 = 10;

/// One image as delivered by a frame source.
#[derive(Clone, Debug)]
pub struct Capture {
    pub image: RgbImage,
    pub timestamp_nanos: i64,
}

#[derive(thiserror::Error, Debug)]
pub enum FrameSourceError {
    #[error("frame source is exhausted")]
    EndOfStream,
    #[error("capture failed: {0}")]
    Capture(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Anything that produces frames for a worker.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Capture, FrameSourceError>;
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("result consumer is closed")]
pub struct ConsumerClosed;

/// Receives every pipeline result of a worker, in frame order.
pub trait ResultConsumer: Send {
    /// An error stops the worker.
    fn accept(&mut self, result: PipelineResult) -> Result<(), ConsumerClosed>;
}

impl ResultConsumer for Sender<PipelineResult> {
    fn accept(&mut self, result: PipelineResult) -> Result<(), ConsumerClosed> {
        self.send(result).map_err(|_| ConsumerClosed)
    }
}

/// Still images replayed as a camera, in the given order.
#[derive(Debug)]
pub struct ImageFileSource {
    paths: VecDeque<PathBuf>,
    start: Instant,
}

impl ImageFileSource {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            start: Instant::now(),
        }
    }

    /// Every PNG or JPEG in `dir`, sorted by file name.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, FrameSourceError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"));
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(Self::new(paths))
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageFileSource {
    fn next_frame(&mut self) -> Result<Capture, FrameSourceError> {
        let path = self.paths.pop_front().ok_or(FrameSourceError::EndOfStream)?;
        let image = image::open(&path)
            .map_err(|e| FrameSourceError::Capture(format!("{}: {e}", path.display())))?
            .to_rgb8();
        Ok(Capture {
            image,
            timestamp_nanos: self.start.elapsed().as_nanos() as i64,
        })
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum WorkerError {
    #[error("the active pipeline is not a calibration pipeline")]
    NotCalibrating,
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error("worker has stopped")]
    Stopped,
}

type CalibrationReply = Sender<Result<CameraCalibrationCoefficients, WorkerError>>;

enum WorkerCommand {
    TakeSnapshot,
    RunCalibration(CalibrationReply),
}

/// Counters returned when a worker exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub frames: u64,
    pub capture_errors: u64,
}

/// Handle to a running camera worker. Dropping it stops the worker.
#[derive(Debug)]
pub struct CameraWorker {
    name: String,
    commands: Sender<WorkerCommand>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<WorkerStats>>,
}

impl CameraWorker {
    /// Start a worker thread for `camera`.
    pub fn spawn(
        name: &str,
        camera: SharedCamera,
        source: Box<dyn FrameSource>,
        consumer: Box<dyn ResultConsumer>,
    ) -> std::io::Result<Self> {
        let (commands, command_rx) = crossbeam_channel::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let shutdown = Arc::clone(&shutdown);
            let name = name.to_string();
            thread::Builder::new()
                .name(format!("camera-{name}"))
                .spawn(move || run_loop(&name, camera, source, consumer, command_rx, shutdown))?
        };
        info!("camera {name:?}: worker started");
        Ok(Self {
            name: name.to_string(),
            commands,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Keep the calibration board seen in the next frame.
    pub fn take_snapshot(&self) -> Result<(), WorkerError> {
        self.commands
            .send(WorkerCommand::TakeSnapshot)
            .map_err(|_| WorkerError::Stopped)
    }

    /// Solve the camera calibration from the snapshots taken so far and
    /// store it with the camera. Blocks until the worker's next frame.
    pub fn run_calibration(&self) -> Result<CameraCalibrationCoefficients, WorkerError> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.commands
            .send(WorkerCommand::RunCalibration(reply))
            .map_err(|_| WorkerError::Stopped)?;
        response.recv().map_err(|_| WorkerError::Stopped)?
    }

    /// Stop the worker and wait for it to exit.
    pub fn stop(mut self) -> WorkerStats {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> WorkerStats {
        self.shutdown.store(true, Ordering::Relaxed);
        let Some(handle) = self.handle.take() else {
            return WorkerStats::default();
        };
        match handle.join() {
            Ok(stats) => stats,
            Err(_) => {
                error!("camera {:?}: worker panicked", self.name);
                WorkerStats::default()
            }
        }
    }
}

impl Drop for CameraWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown_and_join();
        }
    }
}

fn handle_command(
    name: &str,
    command: WorkerCommand,
    pipeline: &mut VisionPipeline,
    camera: &SharedCamera,
) {
    match command {
        WorkerCommand::TakeSnapshot => match pipeline.as_calibration_mut() {
            Some(p) => p.request_snapshot(),
            None => debug!("camera {name:?}: snapshot ignored, not calibrating"),
        },
        WorkerCommand::RunCalibration(reply) => {
            let result = match pipeline.as_calibration_mut() {
                Some(p) => p.run_calibration().map_err(WorkerError::from),
                None => Err(WorkerError::NotCalibrating),
            };
            match &result {
                Ok(coefficients) => lock_camera(camera).add_calibration(coefficients.clone()),
                Err(e) => warn!("camera {name:?}: calibration failed: {e}"),
            }
            // The caller may have given up waiting.
            let _ = reply.send(result);
        }
    }
}

#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(camera = name))
)]
fn run_loop(
    name: &str,
    camera: SharedCamera,
    mut source: Box<dyn FrameSource>,
    mut consumer: Box<dyn ResultConsumer>,
    commands: Receiver<WorkerCommand>,
    shutdown: Arc<AtomicBool>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut pipeline = VisionPipeline::default();
    let mut consecutive_errors = 0u32;

    while !shutdown.load(Ordering::Relaxed) {
        let capture = match source.next_frame() {
            Ok(capture) => {
                consecutive_errors = 0;
                capture
            }
            Err(FrameSourceError::EndOfStream) => {
                info!("camera {name:?}: end of stream");
                break;
            }
            Err(e) => {
                stats.capture_errors += 1;
                consecutive_errors += 1;
                warn!("camera {name:?}: {e}");
                if consecutive_errors >= MAX_CONSECUTIVE_CAPTURE_ERRORS {
                    error!("camera {name:?}: {consecutive_errors} capture failures in a row, stopping");
                    break;
                }
                continue;
            }
        };

        let (settings, properties) = {
            let state = lock_camera(&camera);
            let properties = state.frame_properties(capture.image.width(), capture.image.height());
            (state.manager.snapshot(), properties)
        };
        if pipeline.pipeline_type() != settings.pipeline_type() {
            pipeline = VisionPipeline::for_type(settings.pipeline_type());
        }
        for command in commands.try_iter() {
            handle_command(name, command, &mut pipeline, &camera);
        }

        let frame = Frame::new(capture.image, capture.timestamp_nanos, properties);
        let mut result = pipeline.run(frame, &settings);
        result.sequence = stats.frames;
        stats.frames += 1;
        if consumer.accept(result).is_err() {
            info!("camera {name:?}: result consumer closed");
            break;
        }
    }
    debug!("camera {name:?}: worker exiting after {} frames", stats.frames);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CameraState;
    use crate::io::CameraConfig;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Blank {
        remaining: Option<usize>,
    }

    impl FrameSource for Blank {
        fn next_frame(&mut self) -> Result<Capture, FrameSourceError> {
            if let Some(n) = self.remaining.as_mut() {
                if *n == 0 {
                    return Err(FrameSourceError::EndOfStream);
                }
                *n -= 1;
            } else {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(Capture {
                image: RgbImage::new(64, 48),
                timestamp_nanos: 0,
            })
        }
    }

    struct Broken;

    impl FrameSource for Broken {
        fn next_frame(&mut self) -> Result<Capture, FrameSourceError> {
            Err(FrameSourceError::Capture("unplugged".into()))
        }
    }

    fn camera() -> SharedCamera {
        let state = CameraState::from_config(CameraConfig::new("test", 70.0)).expect("valid");
        Arc::new(Mutex::new(state))
    }

    #[test]
    fn results_are_numbered_in_frame_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = CameraWorker::spawn(
            "test",
            camera(),
            Box::new(Blank { remaining: Some(5) }),
            Box::new(tx),
        )
        .expect("spawn");
        let sequences: Vec<u64> = rx.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, [0, 1, 2, 3, 4]);
        let stats = worker.stop();
        assert_eq!(stats.frames, 5);
        assert_eq!(stats.capture_errors, 0);
    }

    #[test]
    fn calibration_commands_need_calibration_pipeline() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let worker = CameraWorker::spawn(
            "test",
            camera(),
            Box::new(Blank { remaining: None }),
            Box::new(tx),
        )
        .expect("spawn");
        worker.take_snapshot().expect("queued");
        assert_eq!(worker.run_calibration(), Err(WorkerError::NotCalibrating));
        assert!(worker.stop().frames >= 1);
    }

    #[test]
    fn calibration_without_snapshots_fails() {
        let cam = camera();
        lock_camera(&cam)
            .manager
            .set_current(crate::manager::CALIBRATION_INDEX)
            .expect("select");
        let (tx, _rx) = crossbeam_channel::unbounded();
        let worker = CameraWorker::spawn(
            "test",
            Arc::clone(&cam),
            Box::new(Blank { remaining: None }),
            Box::new(tx),
        )
        .expect("spawn");
        assert!(matches!(
            worker.run_calibration(),
            Err(WorkerError::Calibration(CalibrationError::NotEnoughViews { got: 0, .. }))
        ));
        worker.stop();
        assert!(lock_camera(&cam).config.calibrations.is_empty());
    }

    #[test]
    fn repeated_capture_errors_stop_the_worker() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker =
            CameraWorker::spawn("test", camera(), Box::new(Broken), Box::new(tx)).expect("spawn");
        assert!(rx.recv().is_err());
        let stats = worker.stop();
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.capture_errors, u64::from(MAX_CONSECUTIVE_CAPTURE_ERRORS));
    }

    #[test]
    fn commands_after_exit_report_stopped() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = CameraWorker::spawn(
            "test",
            camera(),
            Box::new(Blank { remaining: Some(0) }),
            Box::new(tx),
        )
        .expect("spawn");
        assert!(rx.recv().is_err());
        while !worker.is_finished() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(worker.run_calibration(), Err(WorkerError::Stopped));
    }
}
