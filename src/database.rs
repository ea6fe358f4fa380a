//! Loading and owning the measured HRIR/HRTF grid.
//!
//! The database is built once from a directory tree of raw KEMAR files laid
//! out as `root/elev{e}/H{e}e{aaa}a{ext}`, one file per measured position.
//! Each file is decoded into a time-domain impulse response pair (HRIR) and
//! transformed once into its frequency-domain counterpart (HRTF). After a
//! successful build the database is read only; a failed build returns an
//! error and leaves nothing behind.

use std::env;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use realfft::num_complex::Complex;
use realfft::num_traits::Zero;

use crate::decode;
use crate::fft::Transform;
use crate::grid::{self, GridIndex};

/// Environment variable overriding the configured measurement root.
pub const ROOT_ENV: &str = "HRTFROOT";

/// Upper bound on the filter length in stereo frames. The transform length
/// for the block convolution path is twice this.
pub const MAX_FILTER_LEN: usize = 128;

/// Scale applied when converting 16-bit filter taps to float.
pub(crate) const FILTER_NORM: f32 = 32768.0;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: file holds no sample pairs")]
    Empty { path: PathBuf },
    #[error("{path}: unexpected length of {frames} frames, limit is {MAX_FILTER_LEN}")]
    Oversized { path: PathBuf, frames: usize },
    #[error("transform failed")]
    Transform(#[from] realfft::FftError),
}

/// Head-related impulse response: one time-domain filter per ear.
#[derive(Debug)]
pub struct Hrir {
    pub left: Box<[i16]>,
    pub right: Box<[i16]>,
}

/// Head-related transfer function: the spectra of an [`Hrir`] pair, stored
/// at the full transform length as conjugate symmetric arrays.
#[derive(Debug)]
pub struct Hrtf {
    pub left: Box<[Complex<f32>]>,
    pub right: Box<[Complex<f32>]>,
}

/// Global sample extremes over all loaded impulse responses, kept as load
/// time telemetry.
#[derive(Clone, Copy, Debug)]
pub struct SampleExtremes {
    pub min_left: i16,
    pub max_left: i16,
    pub min_right: i16,
    pub max_right: i16,
}

impl Default for SampleExtremes {
    fn default() -> Self {
        SampleExtremes {
            min_left: i16::MAX,
            max_left: i16::MIN,
            min_right: i16::MAX,
            max_right: i16::MIN,
        }
    }
}

impl SampleExtremes {
    fn update(&mut self, left: &[i16], right: &[i16]) {
        for &s in left {
            self.min_left = self.min_left.min(s);
            self.max_left = self.max_left.max(s);
        }
        for &s in right {
            self.min_right = self.min_right.min(s);
            self.max_right = self.max_right.max(s);
        }
    }
}

/// Options controlling how a [`Database`] is opened.
#[derive(Clone, Debug)]
pub struct OpenOptions {
    sample_rate: u32,
    extension: String,
}

impl OpenOptions {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sample rate the measurement set was recorded at. Default is 44_100,
    /// matching the compact and diffuse sets; the resampled set is 32_000.
    pub fn sample_rate(&mut self, sample_rate: u32) -> &mut Self {
        self.sample_rate = sample_rate;
        self
    }

    /// File extension selecting the data variant, e.g. `.dat` for the
    /// 44.1 kHz compact and diffuse sets or `.res` for the resampled set.
    pub fn extension(&mut self, extension: &str) -> &mut Self {
        self.extension = extension.to_owned();
        self
    }

    /// Load the full measurement grid rooted at `root`.
    ///
    /// The `HRTFROOT` environment variable, when set, takes precedence
    /// over `root`. Any file that is missing, unreadable or empty fails
    /// the whole build.
    pub fn open<P: AsRef<Path>>(&self, root: P) -> Result<Database, Error> {
        let root = match env::var_os(ROOT_ENV) {
            Some(path) => PathBuf::from(path),
            None => root.as_ref().to_owned(),
        };

        info!("loading HRTFs from {}", root.display());

        let mut transform = Transform::new(MAX_FILTER_LEN * 2);
        let mut extremes = SampleExtremes::default();
        let mut filter_len = 0;

        let cells: usize = (0..grid::N_ELEVATIONS).map(grid::azimuth_count).sum();
        let mut hrirs = Vec::with_capacity(cells);
        let mut hrtfs = Vec::with_capacity(cells);
        let mut row_offsets = [0; grid::N_ELEVATIONS];

        for el_idx in 0..grid::N_ELEVATIONS {
            row_offsets[el_idx] = hrirs.len();
            debug!(
                "elevation {:3}: loading {} azimuths",
                grid::index_to_elevation(el_idx),
                grid::azimuth_count(el_idx)
            );

            for az_idx in 0..grid::azimuth_count(el_idx) {
                let path = hrir_path(&root, &self.extension, el_idx, az_idx);
                let (hrir, frames) = load_hrir(&path, &mut extremes)?;

                if filter_len == 0 {
                    filter_len = frames;
                } else if frames != filter_len {
                    warn!(
                        "{}: filter length {} differs from established {}",
                        path.display(),
                        frames,
                        filter_len
                    );
                }

                let hrtf = Hrtf {
                    left: transform_hrir(&mut transform, &hrir.left)?,
                    right: transform_hrir(&mut transform, &hrir.right)?,
                };

                hrirs.push(hrir);
                hrtfs.push(hrtf);
            }
        }

        info!(
            "HRIR global range L: [{} {}] R: [{} {}]",
            extremes.min_left, extremes.max_left, extremes.min_right, extremes.max_right
        );

        Ok(Database {
            root,
            extension: self.extension.clone(),
            sample_rate: self.sample_rate,
            filter_len,
            extremes,
            row_offsets,
            hrirs,
            hrtfs,
        })
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            sample_rate: 44_100,
            extension: ".dat".to_owned(),
        }
    }
}

/// Path of the measurement file at `(el_idx, az_idx)`.
fn hrir_path(root: &Path, extension: &str, el_idx: usize, az_idx: usize) -> PathBuf {
    let elev = grid::index_to_elevation(el_idx);
    let azim = grid::index_to_azimuth(el_idx, az_idx);

    root.join(format!("elev{elev}"))
        .join(format!("H{elev}e{azim:03}a{extension}"))
}

fn load_hrir(path: &Path, extremes: &mut SampleExtremes) -> Result<(Hrir, usize), Error> {
    let samples = decode::load_stereo_s16be(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;

    let frames = samples.len() / 2;
    if frames == 0 {
        return Err(Error::Empty {
            path: path.to_owned(),
        });
    }
    if frames > MAX_FILTER_LEN {
        return Err(Error::Oversized {
            path: path.to_owned(),
            frames,
        });
    }

    let (left, right) = decode::split_stereo(&samples);
    extremes.update(&left, &right);

    Ok((Hrir { left, right }, frames))
}

/// Transform one HRIR channel into its spectrum.
///
/// The taps land in the second half of the transform window, preceded by a
/// filter length of zeros, which is the alignment the block convolution
/// path relies on.
fn transform_hrir(
    transform: &mut Transform,
    taps: &[i16],
) -> Result<Box<[Complex<f32>]>, Error> {
    let len = transform.len();
    let mut time = vec![0.0f32; len];

    for (slot, &tap) in time[len / 2..].iter_mut().zip(taps) {
        *slot = tap as f32 / FILTER_NORM;
    }

    let mut spectrum = vec![Complex::zero(); len].into_boxed_slice();
    transform.forward(&time, &mut spectrum)?;

    Ok(spectrum)
}

/// The full measured grid of HRIR/HRTF pairs.
///
/// Rows are stored back to back in one flat arena indexed through per-row
/// offsets derived from the fixed grid shape.
#[derive(Debug)]
pub struct Database {
    root: PathBuf,
    extension: String,
    sample_rate: u32,
    filter_len: usize,
    extremes: SampleExtremes,
    row_offsets: [usize; grid::N_ELEVATIONS],
    hrirs: Vec<Hrir>,
    hrtfs: Vec<Hrtf>,
}

impl Database {
    /// Open the measurement set rooted at `root` with default options.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Database, Error> {
        OpenOptions::new().open(root)
    }

    /// Canonical filter length in stereo frames, fixed by the first loaded
    /// file.
    pub fn filter_len(&self) -> usize {
        self.filter_len
    }

    /// Transform length used for the stored spectra.
    pub fn fft_len(&self) -> usize {
        MAX_FILTER_LEN * 2
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Global sample extremes recorded while loading.
    pub fn extremes(&self) -> SampleExtremes {
        self.extremes
    }

    fn cell(&self, index: GridIndex) -> usize {
        self.row_offsets[index.elevation] + index.azimuth
    }

    /// Impulse response pair for a resolved grid cell, returned as
    /// `(left, right)` with the flip already applied.
    pub fn hrir(&self, index: GridIndex) -> (&[i16], &[i16]) {
        let hrir = &self.hrirs[self.cell(index)];
        if index.flip {
            (&hrir.right, &hrir.left)
        } else {
            (&hrir.left, &hrir.right)
        }
    }

    /// Spectrum pair for a resolved grid cell, returned as `(left, right)`
    /// with the flip already applied.
    pub fn hrtf(&self, index: GridIndex) -> (&[Complex<f32>], &[Complex<f32>]) {
        let hrtf = &self.hrtfs[self.cell(index)];
        if index.flip {
            (&hrtf.right, &hrtf.left)
        } else {
            (&hrtf.left, &hrtf.right)
        }
    }
}
