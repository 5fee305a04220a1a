//! Camera frame sources.
//!
//! `CameraSource` stands in for the camera subsystem:
//! - `stub://<name>` produces deterministic synthetic frames (tests, demos)
//! - a local path replays back-to-back raw frames from a file
//!
//! Every frame handed out is leased; `CameraSource::outstanding` reports frames
//! the pipeline has not released yet.

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::PathBuf;

use crate::frame::{FrameLeases, PixelFormat, RawFrame};

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://...` or a local file path.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: i32,
    pub format: PixelFormat,
    /// Target frame rate; pacing is left to the caller.
    pub fps: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 480,
            rotation_degrees: 90,
            format: PixelFormat::Nv21,
            fps: 30,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub frames_released: u64,
    pub url: String,
}

pub struct CameraSource {
    backend: SourceBackend,
    config: SourceConfig,
    leases: FrameLeases,
    frame_count: u64,
}

enum SourceBackend {
    Synthetic(SyntheticFrames),
    RawFile(RawFileFrames),
}

impl CameraSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        let frame_len = config
            .format
            .frame_len(config.width, config.height)
            .ok_or_else(|| anyhow!("source dimensions overflow"))?;

        let backend = if let Some(name) = config.url.strip_prefix("stub://") {
            SourceBackend::Synthetic(SyntheticFrames::new(name, frame_len))
        } else if config.url.contains("://") {
            return Err(anyhow!(
                "camera source only supports stub:// or local paths, got {}",
                config.url
            ));
        } else {
            SourceBackend::RawFile(RawFileFrames::open(PathBuf::from(&config.url), frame_len)?)
        };

        log::info!(
            "CameraSource: {} ({}x{} {:?}, rotation {})",
            config.url,
            config.width,
            config.height,
            config.format,
            config.rotation_degrees
        );
        Ok(Self {
            backend,
            config,
            leases: FrameLeases::new(),
            frame_count: 0,
        })
    }

    /// Capture the next frame. `None` once a file source is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let data = match &mut self.backend {
            SourceBackend::Synthetic(frames) => Some(frames.next_pixels()),
            SourceBackend::RawFile(frames) => frames.next_pixels()?,
        };
        let Some(data) = data else {
            return Ok(None);
        };

        self.frame_count += 1;
        let frame = RawFrame::new(
            data,
            self.config.width,
            self.config.height,
            self.config.rotation_degrees,
            self.config.format,
        )
        .with_sequence(self.frame_count);
        Ok(Some(self.leases.lease(frame)))
    }

    /// Frames handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.leases.outstanding()
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            frames_released: self.leases.released(),
            url: self.config.url.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticFrames {
    rng: StdRng,
    frame_len: usize,
}

impl SyntheticFrames {
    fn new(name: &str, frame_len: usize) -> Self {
        // Same name, same frame sequence.
        let seed = name
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
                (acc ^ b as u64).wrapping_mul(0x0100_0000_01b3)
            });
        Self {
            rng: StdRng::seed_from_u64(seed),
            frame_len,
        }
    }

    fn next_pixels(&mut self) -> Vec<u8> {
        let base: u8 = self.rng.gen();
        let mut pixels = vec![0u8; self.frame_len];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = base.wrapping_add((i % 251) as u8);
        }
        pixels
    }
}

// ----------------------------------------------------------------------------
// Raw file replay
// ----------------------------------------------------------------------------

struct RawFileFrames {
    reader: BufReader<File>,
    frame_len: usize,
    path: PathBuf,
}

impl RawFileFrames {
    fn open(path: PathBuf, frame_len: usize) -> Result<Self> {
        let file = File::open(&path)
            .with_context(|| format!("failed to open raw frame file {}", path.display()))?;
        Ok(Self {
            reader: BufReader::new(file),
            frame_len,
            path,
        })
    }

    fn next_pixels(&mut self) -> Result<Option<Vec<u8>>> {
        let mut pixels = vec![0u8; self.frame_len];
        match self.reader.read_exact(&mut pixels) {
            Ok(()) => Ok(Some(pixels)),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                log::info!("CameraSource: end of {}", self.path.display());
                Ok(None)
            }
            Err(err) => Err(err)
                .with_context(|| format!("failed to read frame from {}", self.path.display())),
        }
    }
}
