//! Single-threaded frame loop driving a [`CaptureSession`].

use std::time::Duration;

use camcal_core::PatternKind;

use crate::runner::{attempt_status, CalibrationError, CalibrationResult, CalibrationRunner};
use crate::session::{CaptureSession, FrameOutcome};
use crate::traits::{
    Clock, ControlInput, ControlSignal, CornerRefiner, Frame, FrameSource, ParameterSolver,
    PatternDetector, SourceError,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Consecutive source errors tolerated before the loop gives up.
const MAX_SOURCE_ERRORS: usize = 5;

/// External collaborators of the loop.
pub struct CaptureDevices<'a> {
    pub source: &'a mut dyn FrameSource,
    pub detector: &'a dyn PatternDetector,
    /// Applied to chessboard detections only.
    pub refiner: Option<&'a dyn CornerRefiner>,
    pub clock: &'a dyn Clock,
    pub control: &'a mut dyn ControlInput,
}

/// Hooks for reporting progress; all methods default to no-ops.
pub trait CaptureObserver {
    fn on_frame(&mut self, _frame: &Frame, _outcome: &FrameOutcome, _session: &CaptureSession) {}

    fn on_attempt(
        &mut self,
        _attempt: &Result<CalibrationResult, CalibrationError>,
        _session: &CaptureSession,
    ) {
    }
}

impl CaptureObserver for () {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopOptions {
    /// Mirror every frame vertically before detection.
    pub flip_vertical: bool,
    /// Wait for control input after each frame.
    pub poll_timeout: Duration,
}

impl LoopOptions {
    /// 50 ms key wait for live feeds, none otherwise.
    pub fn for_session(session: &CaptureSession) -> Self {
        Self {
            flip_vertical: false,
            poll_timeout: if session.mode().is_live() {
                Duration::from_millis(50)
            } else {
                Duration::ZERO
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// The user asked to quit.
    Cancelled,
    /// The source ran out of frames.
    Exhausted,
    /// A non-live session made its calibration attempt.
    Finished,
}

#[derive(Clone, Debug)]
pub struct LoopSummary {
    pub exit: LoopExit,
    pub frames: usize,
    pub attempts: usize,
    /// Result of the last attempt, if it succeeded.
    pub result: Option<CalibrationResult>,
}

/// Pull frames until the source ends, the user quits, or (outside live mode)
/// one calibration attempt has run.
///
/// Cancellation is checked once per frame, never while the solver runs.
/// A frame that fails to decode is skipped. After five failures in a row
/// the stored views get their final attempt and the last error is returned.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn run_capture_loop<S: ParameterSolver>(
    session: &mut CaptureSession,
    runner: &CalibrationRunner<S>,
    devices: CaptureDevices<'_>,
    observer: &mut dyn CaptureObserver,
    options: LoopOptions,
) -> Result<LoopSummary, SourceError> {
    let CaptureDevices {
        source,
        detector,
        refiner,
        clock,
        control,
    } = devices;

    let mut summary = LoopSummary {
        exit: LoopExit::Exhausted,
        frames: 0,
        attempts: 0,
        result: None,
    };
    let mut image_size = None;
    let mut source_errors = 0usize;
    let mut status = session.status_text();
    match source.len_hint() {
        Some(n) => log::info!("{:?} source with {n} frames, {status}", session.mode()),
        None => log::info!("{:?} source, {status}", session.mode()),
    }

    loop {
        let next = match source.next_frame() {
            Ok(next) => {
                source_errors = 0;
                next
            }
            Err(err) => {
                source_errors += 1;
                if source_errors < MAX_SOURCE_ERRORS {
                    log::warn!("skipping frame: {err}");
                    continue;
                }
                log::error!("giving up after {source_errors} failed frames: {err}");
                final_attempt(session, runner, image_size, &mut summary, observer);
                return Err(err);
            }
        };
        let Some(mut frame) = next else {
            final_attempt(session, runner, image_size, &mut summary, observer);
            summary.exit = LoopExit::Exhausted;
            break;
        };
        summary.frames += 1;
        if options.flip_vertical {
            frame.image.flip_vertical();
        }
        let size = frame.image.size();
        image_size = Some(size);

        let view = frame.image.view();
        let detection = detector.detect(&view, session.board()).map(|pts| {
            match (session.board().kind, refiner) {
                (PatternKind::Chessboard, Some(r)) => r.refine(&view, pts),
                _ => pts,
            }
        });
        let now = frame.timestamp.unwrap_or_else(|| clock.now());
        let outcome = session.observe(now, detection);
        observer.on_frame(&frame, &outcome, session);
        log_status_change(&mut status, session);

        if let FrameOutcome::ReadyToCalibrate { .. } = outcome {
            let attempt = session.calibrate(runner, size);
            report(&mut summary, &attempt, session, observer);
            log_status_change(&mut status, session);
            if !session.mode().is_live() {
                summary.exit = LoopExit::Finished;
                break;
            }
        }

        match control.poll(options.poll_timeout) {
            Some(ControlSignal::Quit) => {
                log::info!("cancelled after {} frames", summary.frames);
                summary.exit = LoopExit::Cancelled;
                break;
            }
            Some(ControlSignal::StartCapture) => {
                session.start();
                log_status_change(&mut status, session);
            }
            Some(ControlSignal::ToggleUndistort) => {
                let on = session.toggle_undistort();
                log::info!("undistorted preview {}", if on { "on" } else { "off" });
            }
            None => {}
        }
    }

    Ok(summary)
}

fn final_attempt<S: ParameterSolver>(
    session: &mut CaptureSession,
    runner: &CalibrationRunner<S>,
    image_size: Option<(usize, usize)>,
    summary: &mut LoopSummary,
    observer: &mut dyn CaptureObserver,
) {
    let Some(size) = image_size else {
        return;
    };
    if let Some(attempt) = session.finish(runner, size) {
        report(summary, &attempt, session, observer);
    }
}

fn log_status_change(last: &mut String, session: &CaptureSession) {
    let status = session.status_text();
    if status != *last {
        log::info!("{status}");
        *last = status;
    }
}

fn report(
    summary: &mut LoopSummary,
    attempt: &Result<CalibrationResult, CalibrationError>,
    session: &CaptureSession,
    observer: &mut dyn CaptureObserver,
) {
    summary.attempts += 1;
    log::debug!("{}", attempt_status(attempt));
    summary.result = attempt.as_ref().ok().cloned();
    observer.on_attempt(attempt, session);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunnerOptions;
    use crate::session::{AcquisitionMode, CaptureConfig, CaptureState};
    use crate::test_support::{synthetic_views, test_board, test_camera, FixedSolver, ManualClock};
    use camcal_core::{BoardSpec, GrayImage, GrayImageView};
    use nalgebra::Point2;
    use std::collections::VecDeque;

    /// Frames carry the index of a synthetic view in their first pixel;
    /// 255 means "no board".
    struct IndexedDetector(Vec<Vec<Point2<f64>>>);

    impl PatternDetector for IndexedDetector {
        fn detect(&self, image: &GrayImageView<'_>, _: &BoardSpec) -> Option<Vec<Point2<f64>>> {
            self.0.get(image.data[0] as usize).cloned()
        }
    }

    struct Frames(VecDeque<u8>);

    impl FrameSource for Frames {
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            Ok(self.0.pop_front().map(|tag| {
                let mut img = GrayImage::new(8, 6);
                img.data[0] = tag;
                Frame::new(img)
            }))
        }
    }

    struct Script(VecDeque<Option<ControlSignal>>);

    impl ControlInput for Script {
        fn poll(&mut self, _timeout: Duration) -> Option<ControlSignal> {
            self.0.pop_front().flatten()
        }
    }

    #[derive(Default)]
    struct Recorder {
        outcomes: Vec<FrameOutcome>,
        statuses: Vec<String>,
    }

    impl CaptureObserver for Recorder {
        fn on_frame(&mut self, _: &Frame, outcome: &FrameOutcome, _: &CaptureSession) {
            self.outcomes.push(outcome.clone());
        }

        fn on_attempt(
            &mut self,
            attempt: &Result<CalibrationResult, CalibrationError>,
            _: &CaptureSession,
        ) {
            self.statuses.push(attempt_status(attempt));
        }
    }

    #[test]
    fn image_list_stops_after_reaching_target() {
        let board = test_board();
        let (views, poses) = synthetic_views(&board, 4);
        let detector = IndexedDetector(views.into_iter().map(|v| v.points).collect());
        let runner = CalibrationRunner::new(
            FixedSolver::new(test_camera(), poses),
            RunnerOptions::default(),
        );
        let cfg = CaptureConfig {
            target_frames: 3,
            ..CaptureConfig::default()
        };
        let mut session = CaptureSession::new(board, AcquisitionMode::ImageList, cfg);
        let mut source = Frames(VecDeque::from(vec![0, 255, 1, 2, 3]));
        let clock = ManualClock::default();
        let mut control = crate::traits::NoControl;
        let mut rec = Recorder::default();

        let opts = LoopOptions::for_session(&session);

        let summary = run_capture_loop(
            &mut session,
            &runner,
            CaptureDevices {
                source: &mut source,
                detector: &detector,
                refiner: None,
                clock: &clock,
                control: &mut control,
            },
            &mut rec,
            opts,
        )
        .expect("loop");

        assert_eq!(summary.exit, LoopExit::Finished);
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.attempts, 1);
        assert!(summary.result.is_some());
        assert_eq!(rec.outcomes[1], FrameOutcome::Missed);
        assert_eq!(
            rec.statuses,
            vec!["Calibration succeeded. avg reprojection error = 0.00"]
        );
        assert_eq!(source.0.len(), 1);
    }

    #[test]
    fn live_waits_for_start_and_honours_quit() {
        let board = test_board();
        let (views, poses) = synthetic_views(&board, 1);
        let detector = IndexedDetector(views.into_iter().map(|v| v.points).collect());
        let runner = CalibrationRunner::new(
            FixedSolver::new(test_camera(), poses),
            RunnerOptions::default(),
        );
        let mut session =
            CaptureSession::new(board, AcquisitionMode::Live, CaptureConfig::default());
        let mut source = Frames(VecDeque::from(vec![0; 10]));
        let clock = ManualClock::default();
        let mut control = Script(VecDeque::from(vec![
            None,
            Some(ControlSignal::StartCapture),
            None,
            Some(ControlSignal::Quit),
        ]));
        let mut rec = Recorder::default();

        let opts = LoopOptions::for_session(&session);

        let summary = run_capture_loop(
            &mut session,
            &runner,
            CaptureDevices {
                source: &mut source,
                detector: &detector,
                refiner: None,
                clock: &clock,
                control: &mut control,
            },
            &mut rec,
            opts,
        )
        .expect("loop");

        assert_eq!(summary.exit, LoopExit::Cancelled);
        assert_eq!(summary.frames, 4);
        assert_eq!(rec.outcomes[0], FrameOutcome::Ignored);
        assert_eq!(rec.outcomes[2], FrameOutcome::Accepted { count: 1 });
        // Same clock reading: the gate throttles the next detection.
        assert_eq!(rec.outcomes[3], FrameOutcome::Throttled);
        assert_eq!(session.state(), CaptureState::Capturing);
        assert_eq!(summary.attempts, 0);
    }

    #[test]
    fn exhausted_source_triggers_final_attempt() {
        let board = test_board();
        let (views, poses) = synthetic_views(&board, 2);
        let detector = IndexedDetector(views.into_iter().map(|v| v.points).collect());
        let solver = FixedSolver::new(test_camera(), poses);
        let runner = CalibrationRunner::new(&solver, RunnerOptions::default());
        let mut session =
            CaptureSession::new(board, AcquisitionMode::ImageList, CaptureConfig::default());
        let mut source = Frames(VecDeque::from(vec![0, 1]));
        let clock = ManualClock::default();
        let mut control = crate::traits::NoControl;

        let opts = LoopOptions::for_session(&session);

        let summary = run_capture_loop(
            &mut session,
            &runner,
            CaptureDevices {
                source: &mut source,
                detector: &detector,
                refiner: None,
                clock: &clock,
                control: &mut control,
            },
            &mut (),
            opts,
        )
        .expect("loop");

        assert_eq!(summary.exit, LoopExit::Exhausted);
        assert_eq!(summary.attempts, 1);
        assert_eq!(solver.calls(), 1);
        assert_eq!(session.state(), CaptureState::Calibrated);
    }

    /// Scripted frames: `Some(tag)` is a frame, `None` a decode error. Once
    /// the script runs out the source either ends or keeps failing.
    struct Flaky<'a> {
        script: VecDeque<Option<u8>>,
        fail_forever: bool,
        tick: Option<(&'a ManualClock, Duration)>,
    }

    impl Flaky<'_> {
        fn new(script: Vec<Option<u8>>) -> Self {
            Self {
                script: script.into(),
                fail_forever: false,
                tick: None,
            }
        }
    }

    impl FrameSource for Flaky<'_> {
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            if let Some((clock, step)) = self.tick {
                clock.advance(step);
            }
            let decode_error = || SourceError::Decode {
                what: "frame".into(),
                reason: "corrupt".into(),
            };
            match self.script.pop_front() {
                Some(Some(tag)) => {
                    let mut img = GrayImage::new(8, 6);
                    img.data[0] = tag;
                    Ok(Some(Frame::new(img)))
                }
                Some(None) => Err(decode_error()),
                None if self.fail_forever => Err(decode_error()),
                None => Ok(None),
            }
        }
    }

    #[test]
    fn undecodable_frames_are_skipped() {
        let board = test_board();
        let (views, poses) = synthetic_views(&board, 2);
        let detector = IndexedDetector(views.into_iter().map(|v| v.points).collect());
        let solver = FixedSolver::new(test_camera(), poses);
        let runner = CalibrationRunner::new(&solver, RunnerOptions::default());
        let mut session =
            CaptureSession::new(board, AcquisitionMode::ImageList, CaptureConfig::default());
        let mut source = Flaky::new(vec![Some(0), None, None, Some(1)]);
        let clock = ManualClock::default();
        let mut control = crate::traits::NoControl;

        let opts = LoopOptions::for_session(&session);

        let summary = run_capture_loop(
            &mut session,
            &runner,
            CaptureDevices {
                source: &mut source,
                detector: &detector,
                refiner: None,
                clock: &clock,
                control: &mut control,
            },
            &mut (),
            opts,
        )
        .expect("loop");

        assert_eq!(summary.exit, LoopExit::Exhausted);
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.attempts, 1);
        assert_eq!(solver.calls(), 1);
        assert_eq!(session.store().len(), 2);
        assert_eq!(session.state(), CaptureState::Calibrated);
    }

    #[test]
    fn failing_source_gets_a_final_attempt_before_the_error() {
        let board = test_board();
        let (views, poses) = synthetic_views(&board, 2);
        let detector = IndexedDetector(views.into_iter().map(|v| v.points).collect());
        let solver = FixedSolver::new(test_camera(), poses);
        let runner = CalibrationRunner::new(&solver, RunnerOptions::default());
        let mut session =
            CaptureSession::new(board, AcquisitionMode::ImageList, CaptureConfig::default());
        let mut source = Flaky::new(vec![Some(0), Some(1)]);
        source.fail_forever = true;
        let clock = ManualClock::default();
        let mut control = crate::traits::NoControl;
        let mut rec = Recorder::default();

        let opts = LoopOptions::for_session(&session);

        let res = run_capture_loop(
            &mut session,
            &runner,
            CaptureDevices {
                source: &mut source,
                detector: &detector,
                refiner: None,
                clock: &clock,
                control: &mut control,
            },
            &mut rec,
            opts,
        );

        assert!(matches!(res, Err(SourceError::Decode { .. })));
        assert_eq!(solver.calls(), 1);
        assert_eq!(session.store().len(), 2);
        assert_eq!(
            rec.statuses,
            vec!["Calibration succeeded. avg reprojection error = 0.00"]
        );
    }

    #[test]
    fn video_without_timestamps_is_gated_by_the_clock() {
        let board = test_board();
        let (views, poses) = synthetic_views(&board, 2);
        let detector = IndexedDetector(views.into_iter().map(|v| v.points).collect());
        let runner = CalibrationRunner::new(
            FixedSolver::new(test_camera(), poses),
            RunnerOptions::default(),
        );
        let mut session =
            CaptureSession::new(board, AcquisitionMode::Video, CaptureConfig::default());
        let clock = ManualClock::default();
        let mut source = Flaky::new(vec![Some(0); 6]);
        source.tick = Some((&clock, Duration::from_millis(400)));
        let mut control = crate::traits::NoControl;
        let mut rec = Recorder::default();

        let opts = LoopOptions::for_session(&session);

        run_capture_loop(
            &mut session,
            &runner,
            CaptureDevices {
                source: &mut source,
                detector: &detector,
                refiner: None,
                clock: &clock,
                control: &mut control,
            },
            &mut rec,
            opts,
        )
        .expect("loop");

        // Frames at 400..=2400 ms against a 1000 ms gate.
        assert_eq!(
            rec.outcomes,
            vec![
                FrameOutcome::Accepted { count: 1 },
                FrameOutcome::Throttled,
                FrameOutcome::Throttled,
                FrameOutcome::Accepted { count: 2 },
                FrameOutcome::Throttled,
                FrameOutcome::Throttled,
            ]
        );
    }
}
