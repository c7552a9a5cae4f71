//! Frame sources: image lists, recorded video and (feature `v4l`) cameras.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camcal_capture::{Frame, FrameSource, SourceError};
use camcal_core::GrayImage;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageReader};

/// Frame rate assumed for directories of frames.
const DEFAULT_DIR_FPS: f64 = 30.0;

fn open_err(what: &Path, reason: impl ToString) -> SourceError {
    SourceError::Open {
        what: what.display().to_string(),
        reason: reason.to_string(),
    }
}

fn decode_err(what: &Path, reason: impl ToString) -> SourceError {
    SourceError::Decode {
        what: what.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Convert a decoded image into the workspace grayscale type.
pub fn to_gray(img: DynamicImage) -> GrayImage {
    let luma = img.to_luma8();
    let (w, h) = (luma.width() as usize, luma.height() as usize);
    GrayImage {
        width: w,
        height: h,
        data: luma.into_raw(),
    }
}

/// Decode a still image from disk.
pub fn load_gray(path: &Path) -> Result<GrayImage, SourceError> {
    let reader = ImageReader::open(path)
        .map_err(|e| open_err(path, e))?
        .with_guessed_format()
        .map_err(|e| open_err(path, e))?;
    let img = reader.decode().map_err(|e| decode_err(path, e))?;
    Ok(to_gray(img))
}

/// Still images decoded in list order. Unreadable entries are skipped.
#[derive(Clone, Debug)]
pub struct ImageListSource {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageListSource {
    pub fn new<P: Into<PathBuf>>(paths: impl IntoIterator<Item = P>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            next: 0,
        }
    }
}

impl FrameSource for ImageListSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        while let Some(path) = self.paths.get(self.next) {
            self.next += 1;
            match load_gray(path) {
                Ok(img) => return Ok(Some(Frame::new(img))),
                Err(err) => log::warn!("skipping image: {err}"),
            }
        }
        Ok(None)
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.paths.len())
    }
}

/// A directory of frames played back in file-name order at a fixed rate.
#[derive(Clone, Debug)]
pub struct FrameDirSource {
    inner: ImageListSource,
    frame_interval: Duration,
    index: u32,
}

impl FrameDirSource {
    pub fn open(dir: &Path, fps: f64) -> Result<Self, SourceError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| open_err(dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(open_err(dir, "no frames"));
        }
        Ok(Self {
            inner: ImageListSource::new(paths),
            frame_interval: Duration::from_secs_f64(1.0 / fps),
            index: 0,
        })
    }
}

impl FrameSource for FrameDirSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(frame) = self.inner.next_frame()? else {
            return Ok(None);
        };
        let ts = self.frame_interval * self.index;
        self.index += 1;
        Ok(Some(frame.with_timestamp(ts)))
    }

    fn len_hint(&self) -> Option<usize> {
        self.inner.len_hint()
    }
}

/// Animated GIF decoded frame by frame; timestamps follow the frame delays.
pub struct GifSource {
    path: PathBuf,
    frames: image::Frames<'static>,
    elapsed: Duration,
}

impl GifSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|e| open_err(path, e))?;
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| open_err(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            frames: decoder.into_frames(),
            elapsed: Duration::ZERO,
        })
    }
}

impl FrameSource for GifSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(next) = self.frames.next() else {
            return Ok(None);
        };
        let frame = next.map_err(|e| decode_err(&self.path, e))?;
        let (num, den) = frame.delay().numer_denom_ms();
        let ts = self.elapsed;
        if den > 0 {
            self.elapsed += Duration::from_secs_f64(num as f64 / den as f64 / 1000.0);
        }
        let img = to_gray(DynamicImage::ImageRgba8(frame.into_buffer()));
        Ok(Some(Frame::new(img).with_timestamp(ts)))
    }
}

/// Open a recorded video: a directory of frames or an animated GIF.
pub fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, SourceError> {
    if path.is_dir() {
        return Ok(Box::new(FrameDirSource::open(path, DEFAULT_DIR_FPS)?));
    }
    if !path.exists() {
        return Err(open_err(path, "no such file or directory"));
    }
    let format = ImageReader::open(path)
        .map_err(|e| open_err(path, e))?
        .with_guessed_format()
        .map_err(|e| open_err(path, e))?
        .format();
    match format {
        Some(image::ImageFormat::Gif) => Ok(Box::new(GifSource::open(path)?)),
        _ => Err(open_err(path, "unsupported video container")),
    }
}

#[cfg(feature = "v4l")]
pub use camera::CameraSource;

#[cfg(feature = "v4l")]
mod camera {
    use super::*;
    use v4l::buffer::Type;
    use v4l::io::traits::CaptureStream;
    use v4l::prelude::*;
    use v4l::video::Capture;
    use v4l::FourCC;

    const BUFFER_COUNT: u32 = 4;

    /// Live V4L2 camera delivering grayscale frames.
    pub struct CameraSource {
        stream: MmapStream<'static>,
        width: usize,
        height: usize,
        fourcc: FourCC,
        _device: Device,
    }

    impl CameraSource {
        pub fn open(index: usize) -> Result<Self, SourceError> {
            let what = Path::new("/dev").join(format!("video{index}"));
            let device = Device::new(index).map_err(|e| open_err(&what, e))?;

            let mut format = device.format().map_err(|e| open_err(&what, e))?;
            format.fourcc = FourCC::new(b"YUYV");
            let format = match device.set_format(&format) {
                Ok(f) => f,
                Err(e) => {
                    log::warn!("could not select YUYV ({e}), keeping device format");
                    device.format().map_err(|e| open_err(&what, e))?
                }
            };
            log::info!(
                "{}: {}x{} {}",
                what.display(),
                format.width,
                format.height,
                format.fourcc
            );

            let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
                .map_err(|e| open_err(&what, e))?;
            Ok(Self {
                stream,
                width: format.width as usize,
                height: format.height as usize,
                fourcc: format.fourcc,
                _device: device,
            })
        }

        fn to_gray(&self, buf: &[u8]) -> Option<GrayImage> {
            let n = self.width * self.height;
            match &self.fourcc.repr {
                b"YUYV" | b"YUY2" => {
                    let luma: Vec<u8> = buf.iter().step_by(2).take(n).copied().collect();
                    GrayImage::from_raw(self.width, self.height, luma)
                }
                b"GREY" => GrayImage::from_raw(self.width, self.height, buf.get(..n)?.to_vec()),
                b"MJPG" => image::load_from_memory(buf).ok().map(super::to_gray),
                _ => None,
            }
        }
    }

    impl FrameSource for CameraSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            let (buf, _meta) = self.stream.next()?;
            let buf = buf.to_vec();
            let img = self.to_gray(&buf).ok_or_else(|| SourceError::Decode {
                what: "camera frame".into(),
                reason: format!("unsupported pixel format {}", self.fourcc),
            })?;
            Ok(Some(Frame::new(img)))
        }
    }
}
