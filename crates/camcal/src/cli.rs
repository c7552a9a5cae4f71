//! The `camcal` command-line tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camcal_capture::{
    attempt_status, run_capture_loop, AcquisitionMode, CalibrationError, CalibrationResult,
    CalibrationRunner, CaptureDevices, CaptureObserver, CaptureSession, ControlInput, Frame,
    FrameOutcome, FrameSource, LoopExit, LoopOptions, MonotonicClock, NoControl, SourceError,
};
use camcal_core::{BoardSpec, BoardSpecError, PatternKind, RemapTable};
use camcal_io::{load_image_list, save_result, CalibrationConfig, OutputOptions, ResultIoError};
use clap::{ArgAction, CommandFactory, Parser};
use log::LevelFilter;

use crate::control::TerminalControl;
use crate::detect::ChessboardDetector;
use crate::refine::SubpixRefiner;
use crate::solver::PlanarLinearSolver;
use crate::source::{open_video, ImageListSource};

/// Exit code for invalid arguments.
pub const EXIT_INVALID_ARGUMENT: i32 = -1;
/// Exit code when no frame source can be opened.
pub const EXIT_SOURCE_UNAVAILABLE: i32 = -2;

#[derive(Parser, Debug)]
#[command(
    name = "camcal",
    about = "Calibrate a camera from views of a chessboard or circle grid",
    long_about = "Calibrate a camera from views of a chessboard or circle grid.\n\n\
        INPUT is an image-list file (JSON array of paths, or an object whose first \
        member is such an array), a recorded video (animated GIF or a directory of \
        frames), or a camera index. Without INPUT camera 0 is used.\n\n\
        Live keys: g = start capturing, u = toggle undistorted output, q/Esc = quit.",
    disable_help_flag = true
)]
pub struct CliArgs {
    /// Number of board points per row.
    #[arg(short = 'w', long = "board-width")]
    pub board_width: Option<u32>,
    /// Number of board points per column.
    #[arg(short = 'h', long = "board-height")]
    pub board_height: Option<u32>,
    /// Target layout: chessboard, circles or acircles.
    #[arg(long, value_parser = parse_pattern)]
    pub pattern: Option<PatternKind>,
    /// Views to collect before calibrating (> 3).
    #[arg(short = 'n', long = "frames")]
    pub frames: Option<usize>,
    /// Minimum delay between captured views in ms (live and video).
    #[arg(short = 'd', long = "delay")]
    pub delay: Option<u64>,
    /// Square size in user units (e.g. metres).
    #[arg(short = 's', long = "square-size")]
    pub square_size: Option<f64>,
    /// Output file for the calibration result.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Write detected image points to the output.
    #[arg(long = "write-points")]
    pub write_points: bool,
    /// Write per-view poses and errors to the output.
    #[arg(long = "write-extrinsics")]
    pub write_extrinsics: bool,
    /// Assume zero tangential distortion.
    #[arg(long = "zero-tangent")]
    pub zero_tangent: bool,
    /// Fix fx/fy to this ratio.
    #[arg(short = 'a', long = "aspect-ratio")]
    pub aspect_ratio: Option<f64>,
    /// Keep the principal point at the image center.
    #[arg(short = 'p', long = "fix-principal-point")]
    pub fix_principal_point: bool,
    /// Flip frames around the horizontal axis.
    #[arg(short = 'v', long = "flip-vertical")]
    pub flip_vertical: bool,
    /// Treat INPUT as a video even if it parses as an image list.
    #[arg(short = 'V', long = "video")]
    pub video: bool,
    /// Write undistorted frames after a successful calibration.
    #[arg(long = "show-undistorted")]
    pub show_undistorted: bool,
    /// JSON configuration file; flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Log level: off, error, warn, info, debug, trace.
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: LevelFilter,
    /// Log as JSON (with the `tracing` feature).
    #[arg(long = "log-json")]
    pub log_json: bool,
    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    pub help: Option<bool>,
    /// Image list, video path or camera index.
    pub input: Option<String>,
}

fn parse_pattern(s: &str) -> Result<PatternKind, String> {
    s.parse::<PatternKind>().map_err(|e| e.to_string())
}

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Board(#[from] BoardSpecError),
    #[error("could not initialize video capture: {0}")]
    SourceUnavailable(String),
    #[error(transparent)]
    Io(#[from] ResultIoError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) | Self::Board(_) => EXIT_INVALID_ARGUMENT,
            Self::SourceUnavailable(_) => EXIT_SOURCE_UNAVAILABLE,
            Self::Io(_) | Self::Source(_) => 1,
        }
    }
}

/// Where frames come from, resolved from INPUT.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputSpec {
    Camera(usize),
    Path(PathBuf),
}

impl InputSpec {
    pub fn parse(input: Option<&str>) -> Self {
        match input {
            None => Self::Camera(0),
            Some(s) if s.starts_with(|c: char| c.is_ascii_digit()) => {
                match s.parse::<usize>() {
                    Ok(index) => Self::Camera(index),
                    Err(_) => Self::Path(PathBuf::from(s)),
                }
            }
            Some(s) => Self::Path(PathBuf::from(s)),
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Clone, Debug)]
pub struct RunSettings {
    pub board: BoardSpec,
    pub config: CalibrationConfig,
    pub show_undistorted: bool,
    pub input: InputSpec,
}

/// Merge the config file (if any) with command-line flags and validate.
pub fn resolve_settings(args: &CliArgs) -> Result<RunSettings, CliError> {
    let mut config = match &args.config {
        Some(path) => CalibrationConfig::load_json(path)?,
        None => CalibrationConfig::default(),
    };

    let mut board = config.board.unwrap_or(BoardSpec {
        rows: 0,
        cols: 0,
        square_size: 1.0,
        kind: PatternKind::Chessboard,
    });
    if let Some(w) = args.board_width {
        board.cols = w;
    }
    if let Some(h) = args.board_height {
        board.rows = h;
    }
    if let Some(s) = args.square_size {
        board.square_size = s;
    }
    if let Some(kind) = args.pattern {
        board.kind = kind;
    }
    if board.cols == 0 {
        return Err(CliError::InvalidArgument(
            "board width (-w) must be given and positive".into(),
        ));
    }
    if board.rows == 0 {
        return Err(CliError::InvalidArgument(
            "board height (-h) must be given and positive".into(),
        ));
    }
    let board = BoardSpec::new(board.rows, board.cols, board.square_size, board.kind)?;

    let capture = &mut config.capture;
    if let Some(n) = args.frames {
        capture.target_frames = n;
    }
    if let Some(ms) = args.delay {
        capture.min_delay = Duration::from_millis(ms);
    }
    capture.show_undistorted |= args.show_undistorted;
    if capture.target_frames <= 3 {
        return Err(CliError::InvalidArgument(
            "number of frames (-n) must be greater than 3".into(),
        ));
    }
    if capture.min_delay.is_zero() {
        return Err(CliError::InvalidArgument("delay (-d) must be positive".into()));
    }

    let runner = &mut config.runner;
    if let Some(a) = args.aspect_ratio {
        runner.aspect_ratio = Some(a);
    }
    if let Some(a) = runner.aspect_ratio {
        if !(a.is_finite() && a > 0.0) {
            return Err(CliError::InvalidArgument(
                "aspect ratio (-a) must be positive".into(),
            ));
        }
    }
    runner.fix_principal_point |= args.fix_principal_point;
    runner.zero_tangent_dist |= args.zero_tangent;

    config.output.write_points |= args.write_points;
    config.output.write_extrinsics |= args.write_extrinsics;
    if let Some(out) = &args.output {
        config.output_path = out.display().to_string();
    }
    config.flip_vertical |= args.flip_vertical;
    config.video |= args.video;
    config.board = Some(board);

    if board.kind != PatternKind::Chessboard {
        return Err(CliError::InvalidArgument(format!(
            "no detector available for {} boards",
            board.kind
        )));
    }

    Ok(RunSettings {
        board,
        show_undistorted: config.capture.show_undistorted,
        config,
        input: InputSpec::parse(args.input.as_deref()),
    })
}

/// An opened frame source and the mode it implies.
pub struct OpenedSource {
    pub mode: AcquisitionMode,
    pub source: Box<dyn FrameSource>,
    /// Image paths, for image-list input.
    pub images: Option<Vec<PathBuf>>,
}

/// Open INPUT: an image list unless forced to video, falling back to video
/// when the file is not a list.
pub fn open_input(input: &InputSpec, force_video: bool) -> Result<OpenedSource, CliError> {
    match input {
        InputSpec::Camera(index) => open_camera(*index),
        InputSpec::Path(path) => {
            if !force_video {
                match load_image_list(path) {
                    Ok(list) if !list.is_empty() => {
                        let images: Vec<PathBuf> = list.into_iter().map(PathBuf::from).collect();
                        return Ok(OpenedSource {
                            mode: AcquisitionMode::ImageList,
                            source: Box::new(ImageListSource::new(images.clone())),
                            images: Some(images),
                        });
                    }
                    Ok(_) => {
                        return Err(CliError::SourceUnavailable(format!(
                            "{} lists no images",
                            path.display()
                        )))
                    }
                    Err(err) => log::debug!("{}: {err}, trying as video", path.display()),
                }
            }
            let source =
                open_video(path).map_err(|e| CliError::SourceUnavailable(e.to_string()))?;
            Ok(OpenedSource {
                mode: AcquisitionMode::Video,
                source,
                images: None,
            })
        }
    }
}

#[cfg(feature = "v4l")]
fn open_camera(index: usize) -> Result<OpenedSource, CliError> {
    let source = crate::source::CameraSource::open(index)
        .map_err(|e| CliError::SourceUnavailable(e.to_string()))?;
    Ok(OpenedSource {
        mode: AcquisitionMode::Live,
        source: Box::new(source),
        images: None,
    })
}

#[cfg(not(feature = "v4l"))]
fn open_camera(index: usize) -> Result<OpenedSource, CliError> {
    Err(CliError::SourceUnavailable(format!(
        "camera {index}: built without camera support (enable the `v4l` feature)"
    )))
}

/// Prints attempt status lines, saves results and writes undistorted frames.
struct CliObserver {
    output: PathBuf,
    output_options: OutputOptions,
    undistorted_dir: Option<PathBuf>,
    remap: Option<RemapTable>,
    save_error: Option<ResultIoError>,
}

impl CliObserver {
    fn write_undistorted(&mut self, result: &CalibrationResult, frame: &Frame, name: &str) {
        let Some(dir) = &self.undistorted_dir else {
            return;
        };
        let (w, h) = frame.image.size();
        let remap = match self.remap.take() {
            Some(t) if t.width == w && t.height == h => t,
            _ => RemapTable::build(result.intrinsics(), w, h),
        };
        let out = remap.apply(&frame.image.view());
        self.remap = Some(remap);
        if let Err(err) = write_gray(&dir.join(name), &out) {
            log::warn!("cannot write undistorted frame: {err}");
        }
    }
}

impl CaptureObserver for CliObserver {
    fn on_frame(&mut self, frame: &Frame, _outcome: &FrameOutcome, session: &CaptureSession) {
        if !session.undistort_preview() {
            return;
        }
        if let Some(result) = session.calibration() {
            self.write_undistorted(result, frame, "undistorted_preview.png");
        }
    }

    fn on_attempt(
        &mut self,
        attempt: &Result<CalibrationResult, CalibrationError>,
        _session: &CaptureSession,
    ) {
        println!("{}", attempt_status(attempt));
        self.remap = None;
        match attempt {
            Ok(result) => {
                if let Err(err) = save_result(result, &self.output_options, &self.output) {
                    log::error!("cannot save {}: {err}", self.output.display());
                    self.save_error = Some(err);
                }
            }
            Err(err) => log::warn!("Calibration failed: {err}"),
        }
    }
}

fn write_gray(path: &Path, img: &camcal_core::GrayImage) -> Result<(), image::ImageError> {
    image::save_buffer(
        path,
        &img.data,
        img.width as u32,
        img.height as u32,
        image::ExtendedColorType::L8,
    )
}

fn undistorted_dir(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "camcal".to_string());
    output.with_file_name(format!("{stem}_undistorted"))
}

fn init_logging(args: &CliArgs) {
    #[cfg(feature = "tracing")]
    camcal_core::init_tracing(args.log_json, args.log_level);
    #[cfg(not(feature = "tracing"))]
    {
        let _ = camcal_core::init_with_level(args.log_level);
        if args.log_json {
            log::warn!("--log-json needs the `tracing` feature");
        }
    }
}

/// Run the tool with parsed arguments; returns the process exit code.
pub fn run(args: CliArgs) -> Result<i32, CliError> {
    init_logging(&args);
    let settings = resolve_settings(&args)?;
    let RunSettings {
        board,
        mut config,
        show_undistorted,
        input,
    } = settings;

    let opened = open_input(&input, config.video)?;
    if let Some(images) = &opened.images {
        config.capture.target_frames = images.len();
    }
    let output = config.output_path();
    let flip_vertical = config.flip_vertical;
    log::info!(
        "{:?} input, {}x{} {} board, collecting {} views",
        opened.mode,
        board.cols,
        board.rows,
        board.kind,
        config.capture.target_frames
    );

    let mut session = CaptureSession::new(board, opened.mode, config.capture);
    let runner = CalibrationRunner::new(PlanarLinearSolver::new(), config.runner);
    let detector = ChessboardDetector::default();
    let refiner = SubpixRefiner::default();
    let clock = MonotonicClock::new();
    let mut control: Box<dyn ControlInput> = if opened.mode.is_live() {
        println!("Press 'g' to start capturing, 'u' to toggle undistortion, 'q' to quit");
        Box::new(TerminalControl::new())
    } else {
        Box::new(NoControl)
    };

    let undistorted = show_undistorted.then(|| undistorted_dir(&output));
    if let Some(dir) = &undistorted {
        std::fs::create_dir_all(dir).map_err(ResultIoError::from)?;
    }
    let mut observer = CliObserver {
        output,
        output_options: config.output,
        undistorted_dir: undistorted.clone(),
        remap: None,
        save_error: None,
    };

    let mut options = LoopOptions::for_session(&session);
    options.flip_vertical = flip_vertical;
    let mut source = opened.source;
    let summary = run_capture_loop(
        &mut session,
        &runner,
        CaptureDevices {
            source: source.as_mut(),
            detector: &detector,
            refiner: Some(&refiner),
            clock: &clock,
            control: control.as_mut(),
        },
        &mut observer,
        options,
    )?;
    drop(control);

    log::info!(
        "{} frames, {} views, {} attempts ({:?})",
        summary.frames,
        session.store().len(),
        summary.attempts,
        summary.exit
    );
    if let Some(err) = observer.save_error.take() {
        return Err(err.into());
    }

    // Stills and recordings are replayed once through the fitted camera.
    if let (Some(result), Some(dir), false) =
        (&summary.result, &undistorted, opened.mode.is_live())
    {
        let replay: Box<dyn FrameSource> = match &opened.images {
            Some(images) => Box::new(ImageListSource::new(images.clone())),
            None => match &input {
                InputSpec::Path(path) => open_video(path)?,
                InputSpec::Camera(_) => return Ok(0),
            },
        };
        write_undistorted_replay(replay, result, dir, flip_vertical)?;
    }

    if summary.exit == LoopExit::Cancelled {
        log::info!("cancelled");
    }
    Ok(0)
}

fn write_undistorted_replay(
    mut source: Box<dyn FrameSource>,
    result: &CalibrationResult,
    dir: &Path,
    flip_vertical: bool,
) -> Result<(), CliError> {
    let mut remap: Option<RemapTable> = None;
    let mut index = 0usize;
    while let Some(mut frame) = source.next_frame()? {
        if flip_vertical {
            frame.image.flip_vertical();
        }
        let (w, h) = frame.image.size();
        let table = match remap.take() {
            Some(t) if t.width == w && t.height == h => t,
            _ => RemapTable::build(result.intrinsics(), w, h),
        };
        let out = table.apply(&frame.image.view());
        remap = Some(table);
        let path = dir.join(format!("{index:04}.png"));
        if let Err(err) = write_gray(&path, &out) {
            log::warn!("cannot write {}: {err}", path.display());
        }
        index += 1;
    }
    log::info!("wrote {index} undistorted frames to {}", dir.display());
    Ok(())
}

/// Parse `argv`, run, and map every outcome to an exit code.
pub fn main_with_args<I, T>(argv: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    if argv.len() <= 1 {
        let _ = CliArgs::command().print_long_help();
        return 0;
    }

    let args = match CliArgs::try_parse_from(&argv) {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                EXIT_INVALID_ARGUMENT
            } else {
                0
            };
        }
    };

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            err.exit_code()
        }
    }
}
