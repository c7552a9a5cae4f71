//! Capture state machine: which detections become calibration views.

use std::time::Duration;

use camcal_core::BoardSpec;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::runner::{CalibrationError, CalibrationResult, CalibrationRunner};
use crate::store::{CorrespondenceStore, StoreError};
use crate::traits::ParameterSolver;

/// Where frames come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Camera feed; capture starts on user request.
    Live,
    /// Pre-recorded stream.
    Video,
    /// Fixed list of still images.
    ImageList,
}

impl AcquisitionMode {
    #[inline]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureState {
    /// Pattern detection runs, nothing is collected.
    Detection,
    /// Successful detections are collected.
    Capturing,
    /// A calibration attempt succeeded.
    Calibrated,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Views to collect before calibrating.
    pub target_frames: usize,
    /// Minimum time between two accepted views (live and video).
    #[serde(with = "millis")]
    pub min_delay: Duration,
    /// Start with the undistorted preview enabled.
    pub show_undistorted: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_frames: 10,
            min_delay: Duration::from_millis(1000),
            show_undistorted: false,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// What happened to one observed frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The pattern was not found.
    Missed,
    /// Found, but the session is not capturing.
    Ignored,
    /// Found too soon after the previous accepted view.
    Throttled,
    Accepted { count: usize },
    /// Found with the wrong number of points.
    Rejected(StoreError),
    /// Accepted and the target count is reached.
    ReadyToCalibrate { count: usize },
}

impl FrameOutcome {
    #[inline]
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. } | Self::ReadyToCalibrate { .. })
    }
}

/// Session bundling the mode, capture settings, accepted views and state.
#[derive(Clone, Debug)]
pub struct CaptureSession {
    board: BoardSpec,
    mode: AcquisitionMode,
    config: CaptureConfig,
    store: CorrespondenceStore,
    state: CaptureState,
    last_accept: Option<Duration>,
    attempted: bool,
    undistort: bool,
    calibration: Option<CalibrationResult>,
}

impl CaptureSession {
    pub fn new(board: BoardSpec, mode: AcquisitionMode, config: CaptureConfig) -> Self {
        let state = match mode {
            AcquisitionMode::Live => CaptureState::Detection,
            AcquisitionMode::Video | AcquisitionMode::ImageList => CaptureState::Capturing,
        };
        Self {
            store: CorrespondenceStore::new(&board),
            board,
            mode,
            config,
            state,
            last_accept: None,
            attempted: false,
            undistort: config.show_undistorted,
            calibration: None,
        }
    }

    pub fn board(&self) -> &BoardSpec {
        &self.board
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn store(&self) -> &CorrespondenceStore {
        &self.store
    }

    /// Last successful calibration of this session.
    pub fn calibration(&self) -> Option<&CalibrationResult> {
        self.calibration.as_ref()
    }

    /// Begin a new capture cycle. Only live sessions react.
    pub fn start(&mut self) {
        if !self.mode.is_live() {
            log::debug!("start ignored in {:?} mode", self.mode);
            return;
        }
        log::info!("capture started");
        self.store.clear();
        self.last_accept = None;
        self.attempted = false;
        self.state = CaptureState::Capturing;
    }

    /// Feed one frame's detection result, observed at time `now`.
    pub fn observe(&mut self, now: Duration, detection: Option<Vec<Point2<f64>>>) -> FrameOutcome {
        let Some(points) = detection else {
            return FrameOutcome::Missed;
        };
        if self.state != CaptureState::Capturing {
            return FrameOutcome::Ignored;
        }
        if !self.delay_elapsed(now) {
            return FrameOutcome::Throttled;
        }

        match self.store.push(points) {
            Ok(count) => {
                self.last_accept = Some(now);
                log::debug!("accepted view {}/{}", count, self.config.target_frames);
                if count >= self.config.target_frames {
                    FrameOutcome::ReadyToCalibrate { count }
                } else {
                    FrameOutcome::Accepted { count }
                }
            }
            Err(err) => {
                log::warn!("dropping detection: {err}");
                FrameOutcome::Rejected(err)
            }
        }
    }

    fn delay_elapsed(&self, now: Duration) -> bool {
        if self.mode == AcquisitionMode::ImageList {
            return true;
        }
        match self.last_accept {
            None => true,
            Some(prev) => now.saturating_sub(prev) > self.config.min_delay,
        }
    }

    /// Run one attempt on the stored views.
    ///
    /// Success moves to `Calibrated`; failure returns to `Detection` and keeps
    /// the views until the next [`CaptureSession::start`].
    pub fn calibrate<S: ParameterSolver>(
        &mut self,
        runner: &CalibrationRunner<S>,
        image_size: (usize, usize),
    ) -> Result<CalibrationResult, CalibrationError> {
        self.attempted = true;
        let attempt = runner.run(self.store.views(), &self.board, image_size);
        match &attempt {
            Ok(res) => {
                self.state = CaptureState::Calibrated;
                self.calibration = Some(res.clone());
            }
            Err(err) => {
                log::warn!("calibration failed: {err}");
                self.state = CaptureState::Detection;
            }
        }
        attempt
    }

    /// The source is exhausted. Makes a final attempt when views were
    /// collected but no attempt ran during this capture cycle.
    pub fn finish<S: ParameterSolver>(
        &mut self,
        runner: &CalibrationRunner<S>,
        image_size: (usize, usize),
    ) -> Option<Result<CalibrationResult, CalibrationError>> {
        if self.state != CaptureState::Capturing || self.store.is_empty() || self.attempted {
            return None;
        }
        log::info!(
            "source exhausted with {}/{} views, calibrating",
            self.store.len(),
            self.config.target_frames
        );
        Some(self.calibrate(runner, image_size))
    }

    /// `"n/target"` collection progress.
    pub fn progress(&self) -> String {
        format!("{}/{}", self.store.len(), self.config.target_frames)
    }

    /// Short status for display overlays.
    pub fn status_text(&self) -> String {
        match self.state {
            CaptureState::Capturing => self.progress(),
            CaptureState::Calibrated => "Calibrated".to_string(),
            CaptureState::Detection if self.mode.is_live() => "Press 'g' to start".to_string(),
            CaptureState::Detection => "Detection".to_string(),
        }
    }

    /// Flip the undistorted preview; only possible once calibrated.
    pub fn toggle_undistort(&mut self) -> bool {
        if self.state == CaptureState::Calibrated {
            self.undistort = !self.undistort;
        }
        self.undistort_preview()
    }

    pub fn undistort_preview(&self) -> bool {
        self.state == CaptureState::Calibrated && self.undistort
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunnerOptions;
    use crate::test_support::{
        synthetic_views, test_board, test_camera, FailingSolver, FixedSolver,
    };

    fn config(target: usize, delay_ms: u64) -> CaptureConfig {
        CaptureConfig {
            target_frames: target,
            min_delay: Duration::from_millis(delay_ms),
            show_undistorted: false,
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn initial_state_depends_on_mode() {
        let b = test_board();
        let cfg = CaptureConfig::default();
        assert_eq!(
            CaptureSession::new(b, AcquisitionMode::Live, cfg).state(),
            CaptureState::Detection
        );
        assert_eq!(
            CaptureSession::new(b, AcquisitionMode::Video, cfg).state(),
            CaptureState::Capturing
        );
        assert_eq!(
            CaptureSession::new(b, AcquisitionMode::ImageList, cfg).state(),
            CaptureState::Capturing
        );
    }

    #[test]
    fn live_detections_are_ignored_until_started() {
        let board = test_board();
        let (views, _) = synthetic_views(&board, 1);
        let mut s = CaptureSession::new(board, AcquisitionMode::Live, config(5, 1000));
        assert_eq!(
            s.observe(ms(0), Some(views[0].points.clone())),
            FrameOutcome::Ignored
        );
        assert_eq!(s.observe(ms(0), None), FrameOutcome::Missed);

        s.start();
        assert_eq!(s.state(), CaptureState::Capturing);
        assert_eq!(
            s.observe(ms(10), Some(views[0].points.clone())),
            FrameOutcome::Accepted { count: 1 }
        );
    }

    #[test]
    fn live_delay_gate_accepts_at_most_one_view_per_interval() {
        // Detections every 100 ms for 1 s with a 300 ms gate.
        let board = test_board();
        let (views, _) = synthetic_views(&board, 1);
        let mut s = CaptureSession::new(board, AcquisitionMode::Live, config(100, 300));
        s.start();

        // Frames every 50 ms; the board is only found on the even ones.
        let mut accepted = Vec::new();
        for t in (0..=1000).step_by(50) {
            if t % 100 == 0 {
                if s.observe(ms(t), Some(views[0].points.clone())).accepted() {
                    accepted.push(t);
                }
            } else {
                assert_eq!(s.observe(ms(t), None), FrameOutcome::Missed);
            }
        }
        assert_eq!(accepted, vec![0, 400, 800]);
        assert_eq!(s.store().len(), 3);
    }

    #[test]
    fn video_applies_the_gate_image_list_does_not() {
        let board = test_board();
        let (views, _) = synthetic_views(&board, 1);
        let pts = || Some(views[0].points.clone());

        let mut video = CaptureSession::new(board, AcquisitionMode::Video, config(10, 500));
        assert!(video.observe(ms(0), pts()).accepted());
        assert_eq!(video.observe(ms(200), pts()), FrameOutcome::Throttled);
        assert!(video.observe(ms(501), pts()).accepted());

        let mut list = CaptureSession::new(board, AcquisitionMode::ImageList, config(10, 500));
        for i in 1..=3 {
            assert_eq!(list.observe(ms(0), pts()), FrameOutcome::Accepted { count: i });
        }
    }

    #[test]
    fn wrong_point_count_is_rejected() {
        let board = test_board();
        let mut s = CaptureSession::new(board, AcquisitionMode::ImageList, config(3, 0));
        let outcome = s.observe(ms(0), Some(vec![Point2::origin(); 3]));
        assert!(matches!(outcome, FrameOutcome::Rejected(_)));
        assert!(s.store().is_empty());
    }

    #[test]
    fn reaching_target_then_calibrating_succeeds() {
        let board = test_board();
        let (views, poses) = synthetic_views(&board, 3);
        let runner = CalibrationRunner::new(
            FixedSolver::new(test_camera(), poses),
            RunnerOptions::default(),
        );
        let mut s = CaptureSession::new(board, AcquisitionMode::ImageList, config(3, 0));
        let outcomes: Vec<_> = views
            .iter()
            .map(|v| s.observe(ms(0), Some(v.points.clone())))
            .collect();
        assert_eq!(outcomes[2], FrameOutcome::ReadyToCalibrate { count: 3 });

        let res = s.calibrate(&runner, (640, 480)).expect("calibrated");
        assert!(res.total_avg_error() < 1e-9);
        assert_eq!(s.state(), CaptureState::Calibrated);
        assert!(s.calibration().is_some());
        // An attempt already ran: exhaustion does not retry.
        assert!(s.finish(&runner, (640, 480)).is_none());
    }

    #[test]
    fn short_image_list_gets_exactly_one_attempt() {
        let board = test_board();
        let (views, poses) = synthetic_views(&board, 3);
        let solver = FixedSolver::new(test_camera(), poses);
        let runner = CalibrationRunner::new(&solver, RunnerOptions::default());
        let mut s = CaptureSession::new(board, AcquisitionMode::ImageList, config(10, 0));
        for v in &views {
            assert!(s.observe(ms(0), Some(v.points.clone())).accepted());
        }

        let attempt = s.finish(&runner, (640, 480)).expect("one attempt");
        assert!(attempt.is_ok());
        assert_eq!(solver.calls(), 1);
        assert_eq!(solver.last_request().map(|r| r.view_count()), Some(3));
        assert!(s.finish(&runner, (640, 480)).is_none());
        assert_eq!(solver.calls(), 1);
    }

    #[test]
    fn nothing_collected_means_no_attempt() {
        let board = test_board();
        let solver = FixedSolver::new(test_camera(), Vec::new());
        let runner = CalibrationRunner::new(&solver, RunnerOptions::default());
        let mut s = CaptureSession::new(board, AcquisitionMode::ImageList, config(10, 0));
        assert!(s.finish(&runner, (640, 480)).is_none());
        assert_eq!(solver.calls(), 0);
    }

    #[test]
    fn failed_attempt_returns_to_detection_and_keeps_views() {
        let board = test_board();
        let (views, _) = synthetic_views(&board, 2);
        let runner = CalibrationRunner::new(FailingSolver, RunnerOptions::default());
        let mut s = CaptureSession::new(board, AcquisitionMode::Live, config(2, 0));
        s.start();
        for (i, v) in views.iter().enumerate() {
            s.observe(ms(10 * i as u64), Some(v.points.clone()));
        }

        assert!(s.calibrate(&runner, (640, 480)).is_err());
        assert_eq!(s.state(), CaptureState::Detection);
        assert_eq!(s.store().len(), 2);

        s.start();
        assert!(s.store().is_empty());
        assert_eq!(s.state(), CaptureState::Capturing);
    }

    #[test]
    fn start_is_ignored_outside_live_mode() {
        let board = test_board();
        let (views, _) = synthetic_views(&board, 1);
        let mut s = CaptureSession::new(board, AcquisitionMode::Video, config(10, 0));
        s.observe(ms(0), Some(views[0].points.clone()));
        s.start();
        assert_eq!(s.store().len(), 1);
    }

    #[test]
    fn undistort_toggle_requires_calibration() {
        let board = test_board();
        let (views, poses) = synthetic_views(&board, 2);
        let runner = CalibrationRunner::new(
            FixedSolver::new(test_camera(), poses),
            RunnerOptions::default(),
        );
        let mut s = CaptureSession::new(board, AcquisitionMode::ImageList, config(2, 0));
        assert!(!s.toggle_undistort());
        assert_eq!(s.status_text(), "0/2");

        for v in &views {
            s.observe(ms(0), Some(v.points.clone()));
        }
        s.calibrate(&runner, (640, 480)).expect("calibrated");
        assert!(s.toggle_undistort());
        assert!(!s.toggle_undistort());
        assert_eq!(s.status_text(), "Calibrated");
    }
}
