use std::cell::{Cell, RefCell};
use std::time::Duration;

use camcal_core::{
    generate_reference_points, project_points, BoardSpec, ExtrinsicPose, Intrinsics, ObservedView,
    PatternKind,
};
use nalgebra::Vector3;

use crate::traits::{Clock, ParameterSolver, SolverError, SolverOutput, SolverRequest};

pub fn test_board() -> BoardSpec {
    BoardSpec::new(4, 5, 0.025, PatternKind::Chessboard).expect("board")
}

pub fn test_camera() -> Intrinsics {
    Intrinsics::new(800.0, 780.0, 320.0, 240.0)
}

pub fn test_pose(i: usize) -> ExtrinsicPose {
    let t = i as f64;
    ExtrinsicPose::new(
        Vector3::new(0.1 * (t * 0.7).sin(), 0.1 * (t * 1.3).cos(), 0.05 * t.sin()),
        Vector3::new(-0.05 + 0.01 * t.sin(), -0.04, 0.5 + 0.02 * t),
    )
}

/// Noiseless projections of `board` under `n` distinct poses.
pub fn synthetic_views(board: &BoardSpec, n: usize) -> (Vec<ObservedView>, Vec<ExtrinsicPose>) {
    let obj = generate_reference_points(board);
    let cam = test_camera();
    let poses: Vec<_> = (0..n).map(test_pose).collect();
    let views = poses
        .iter()
        .enumerate()
        .map(|(i, p)| ObservedView::new(i, project_points(&cam, p, &obj)))
        .collect();
    (views, poses)
}

/// Returns a preset fit and records what it was asked.
pub struct FixedSolver {
    intrinsics: Intrinsics,
    poses: Vec<ExtrinsicPose>,
    last: RefCell<Option<SolverRequest>>,
    calls: Cell<usize>,
}

impl FixedSolver {
    pub fn new(intrinsics: Intrinsics, poses: Vec<ExtrinsicPose>) -> Self {
        Self {
            intrinsics,
            poses,
            last: RefCell::new(None),
            calls: Cell::new(0),
        }
    }

    pub fn last_request(&self) -> Option<SolverRequest> {
        self.last.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl ParameterSolver for FixedSolver {
    fn fit(&self, request: &SolverRequest) -> Result<SolverOutput, SolverError> {
        self.calls.set(self.calls.get() + 1);
        *self.last.borrow_mut() = Some(request.clone());
        let n = request.view_count().min(self.poses.len());
        let poses = self.poses[..n].to_vec();
        Ok(SolverOutput {
            rms: 0.0,
            intrinsics: self.intrinsics,
            poses,
        })
    }
}

/// Always fails.
pub struct FailingSolver;

impl ParameterSolver for FailingSolver {
    fn fit(&self, _request: &SolverRequest) -> Result<SolverOutput, SolverError> {
        Err(SolverError::Failed("stub".into()))
    }
}

/// Clock advanced by hand.
#[derive(Default)]
pub struct ManualClock(Cell<Duration>);

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.0.get()
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }
}
