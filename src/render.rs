//! Rendering of mono input into binaural stereo.
//!
//! Two paths share the [`Database`]: a per-sample path that convolves the
//! most recent input history against the raw impulse responses with the
//! dot kernels, and a block path that multiplies spectra and crossfades
//! between the old and new filter pair whenever the source moves. Neither
//! path allocates or performs I/O once the spatializer is built.

use log::debug;

use realfft::num_complex::Complex;
use realfft::num_traits::Zero;

use crate::database::{Database, FILTER_NORM, MAX_FILTER_LEN};
use crate::dot::DotKernel;
use crate::fft::{spectral_mul, Transform};
use crate::grid::{self, GridIndex};

/// Number of control slots on the control surface.
pub const N_CONTROLS: usize = 64;
/// Control slot steering the azimuth.
pub const CTL_AZIMUTH: usize = 2;
/// Control slot steering the attenuation.
pub const CTL_ATTENUATION: usize = 3;
/// Control slot steering the elevation.
pub const CTL_ELEVATION: usize = 4;

/// Highest control value; controls span `0..=127`.
pub const MAX_CONTROL: i32 = 127;

const MIN_AZIMUTH: f32 = -180.0;
const MAX_AZIMUTH: f32 = 180.0;
const MIN_ATTENUATION: f32 = 0.0;
const MAX_ATTENUATION: f32 = 20.0;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no filter data loaded, filter length is zero")]
    NotLoaded,
    #[error("output length {0} does not match stereo block length {1}")]
    InvalidOutputLen(usize, usize),
    #[error("transform failed")]
    Transform(#[from] realfft::FftError),
}

/// Binaural renderer owning the database and all processing state.
pub struct Spatializer {
    db: Database,
    kernel: DotKernel,
    transform: Transform,

    block_len: usize,
    fft_len: usize,

    controls: [i32; N_CONTROLS],

    position: GridIndex,
    last_position: GridIndex,
    attenuation: f32,
    last_attenuation: f32,
    gain: f32,
    old_gain: f32,
    old_position: GridIndex,
    changed: bool,

    // Ping-pong mono input history; `slot` marks the buffer the caller
    // fills next. Swapped by flipping the flag, never by copying.
    inputs: [Box<[f32]>; 2],
    slot: usize,

    fwd_time: Box<[f32]>,
    fwd_spec: Box<[Complex<f32>]>,
    prod_spec: Box<[Complex<f32>]>,
    inv_left: Box<[f32]>,
    inv_right: Box<[f32]>,

    out_new: Box<[f32]>,
    out_old: Box<[f32]>,

    ramp_up: Box<[f32]>,
    ramp_down: Box<[f32]>,
}

impl Spatializer {
    /// Wrap a loaded database, pre-allocating every runtime buffer.
    pub fn new(db: Database) -> Result<Self, Error> {
        if db.filter_len() == 0 {
            return Err(Error::NotLoaded);
        }

        let block_len = MAX_FILTER_LEN;
        let fft_len = db.fft_len();

        let mut ramp_up = vec![0.0; block_len].into_boxed_slice();
        let mut ramp_down = vec![0.0; block_len].into_boxed_slice();
        for i in 0..block_len {
            ramp_up[i] = i as f32 / block_len as f32;
            ramp_down[i] = 1.0 - ramp_up[i];
        }

        let mut controls = [0; N_CONTROLS];
        controls[CTL_ELEVATION] = 40;

        let mut spatializer = Spatializer {
            db,
            kernel: DotKernel::detect(),
            transform: Transform::new(fft_len),
            block_len,
            fft_len,
            controls,
            position: GridIndex::default(),
            last_position: GridIndex::default(),
            attenuation: 0.0,
            last_attenuation: 0.0,
            gain: 1.0,
            old_gain: 1.0,
            old_position: GridIndex::default(),
            changed: false,
            inputs: [
                vec![0.0; block_len].into_boxed_slice(),
                vec![0.0; block_len].into_boxed_slice(),
            ],
            slot: 0,
            fwd_time: vec![0.0; fft_len].into_boxed_slice(),
            fwd_spec: vec![Complex::zero(); fft_len].into_boxed_slice(),
            prod_spec: vec![Complex::zero(); fft_len].into_boxed_slice(),
            inv_left: vec![0.0; fft_len].into_boxed_slice(),
            inv_right: vec![0.0; fft_len].into_boxed_slice(),
            out_new: vec![0.0; block_len * 2].into_boxed_slice(),
            out_old: vec![0.0; block_len * 2].into_boxed_slice(),
            ramp_up,
            ramp_down,
        };

        // Settle the position state on the initial control values so the
        // first block does not start with a spurious crossfade.
        let (elevation, azimuth, attenuation) = spatializer.controls_to_position();
        let index = grid::resolve(elevation, azimuth);
        spatializer.position = index;
        spatializer.last_position = index;
        spatializer.old_position = index;
        spatializer.attenuation = attenuation;
        spatializer.last_attenuation = attenuation;
        spatializer.gain = gain_from_attenuation(attenuation);
        spatializer.old_gain = spatializer.gain;

        Ok(spatializer)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Number of mono frames consumed, and stereo frames produced, per
    /// block.
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// The grid cell the renderer last resolved.
    pub fn position(&self) -> GridIndex {
        self.position
    }

    /// Gain currently applied by the block path.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Store a control surface value. Out of range control numbers are
    /// ignored; values are expected in `0..=MAX_CONTROL`.
    pub fn set_control(&mut self, number: usize, value: i32) {
        if number < N_CONTROLS {
            self.controls[number] = value;
        }
    }

    pub fn control(&self, number: usize) -> i32 {
        self.controls[number]
    }

    /// Map the control values onto `(elevation, azimuth, attenuation)` in
    /// degrees and decibel.
    pub fn controls_to_position(&self) -> (f32, f32, f32) {
        let elevation = grid::MIN_ELEVATION as f32
            + (grid::MAX_ELEVATION - grid::MIN_ELEVATION) as f32
                * self.control_value(CTL_ELEVATION);
        let azimuth = MIN_AZIMUTH + (MAX_AZIMUTH - MIN_AZIMUTH) * self.control_value(CTL_AZIMUTH);
        let attenuation = MIN_ATTENUATION
            + (MAX_ATTENUATION - MIN_ATTENUATION) * self.control_value(CTL_ATTENUATION);

        (elevation, azimuth, attenuation)
    }

    fn control_value(&self, number: usize) -> f32 {
        self.controls[number] as f32 / MAX_CONTROL as f32
    }

    /// Resolve a position, fold it into the change detection state and
    /// log when the resolved cell moved.
    fn note_position(&mut self, index: GridIndex) {
        self.position = index;
        if index != self.last_position {
            self.changed = true;
            debug!(
                "elev {} azim {} atten {:.0}",
                grid::index_to_elevation(index.elevation),
                index.signed_azimuth(),
                self.attenuation
            );
        }
        self.last_position = index;
    }

    /// Filter one output frame from the input history at an explicit
    /// position.
    ///
    /// `history` holds the most recent mono input samples, latest first;
    /// up to one filter length of it is consumed. Never allocates.
    pub fn filter(
        &mut self,
        elevation: f32,
        azimuth: f32,
        history: &[f32],
    ) -> Result<(f32, f32), Error> {
        let filter_len = self.db.filter_len();
        if filter_len == 0 {
            return Err(Error::NotLoaded);
        }

        let index = grid::resolve(elevation, azimuth);
        self.note_position(index);

        let (left, right) = self.db.hrir(index);
        let n = history.len().min(filter_len);

        let out_left = self.kernel.dot_i16(&history[..n], left) / FILTER_NORM;
        let out_right = self.kernel.dot_i16(&history[..n], right) / FILTER_NORM;

        Ok((out_left, out_right))
    }

    /// The mono input slot the caller fills before the next
    /// [`process_block`](Self::process_block) call.
    pub fn input_block(&mut self) -> &mut [f32] {
        &mut self.inputs[self.slot]
    }

    /// Render one block of interleaved stereo output from the position
    /// controls.
    ///
    /// The freshly filled input slot is convolved together with the
    /// previous block against the current filter pair; when the resolved
    /// position or attenuation moved since the last block the previous
    /// pair is rendered as well and the two results are blended along the
    /// linear ramps, giving a click-free transition exactly once per
    /// change. Afterwards the input slots swap roles.
    pub fn process_block(&mut self, out: &mut [f32]) -> Result<(), Error> {
        if self.db.filter_len() == 0 {
            return Err(Error::NotLoaded);
        }
        if out.len() != self.block_len * 2 {
            return Err(Error::InvalidOutputLen(out.len(), self.block_len * 2));
        }

        let (elevation, azimuth, attenuation) = self.controls_to_position();
        self.attenuation = attenuation;

        let previous_position = self.last_position;
        let previous_gain = self.gain;

        self.changed = false;
        self.note_position(grid::resolve(elevation, azimuth));
        if attenuation != self.last_attenuation {
            self.changed = true;
        }
        self.last_attenuation = attenuation;
        self.gain = gain_from_attenuation(attenuation);

        if self.changed {
            self.old_position = previous_position;
            self.old_gain = previous_gain;
        }

        // Sliding window: previous block first, new block second. The
        // filter spectra were built against the mirrored alignment, so
        // the first half of the inverse transform is the valid output.
        let half = self.fft_len / 2;
        self.fwd_time[..half].copy_from_slice(&self.inputs[self.slot ^ 1]);
        self.fwd_time[half..].copy_from_slice(&self.inputs[self.slot]);
        self.transform.forward(&self.fwd_time, &mut self.fwd_spec)?;

        render_pass(
            &mut self.transform,
            &self.fwd_spec,
            &mut self.prod_spec,
            &mut self.inv_left,
            &mut self.inv_right,
            self.db.hrtf(self.position),
            self.gain,
            &mut self.out_new,
        )?;

        if self.changed {
            render_pass(
                &mut self.transform,
                &self.fwd_spec,
                &mut self.prod_spec,
                &mut self.inv_left,
                &mut self.inv_right,
                self.db.hrtf(self.old_position),
                self.old_gain,
                &mut self.out_old,
            )?;

            for i in 0..self.block_len {
                let up = self.ramp_up[i];
                let down = self.ramp_down[i];
                self.out_new[2 * i] = self.out_new[2 * i] * up + self.out_old[2 * i] * down;
                self.out_new[2 * i + 1] =
                    self.out_new[2 * i + 1] * up + self.out_old[2 * i + 1] * down;
            }
        }

        out.copy_from_slice(&self.out_new);

        // Swap slot roles; the caller's next input overwrites the oldest
        // history.
        self.slot ^= 1;

        Ok(())
    }
}

/// Spectral multiply against one filter pair, inverse transform, scale and
/// interleave into `out`.
#[allow(clippy::too_many_arguments)]
fn render_pass(
    transform: &mut Transform,
    fwd_spec: &[Complex<f32>],
    prod_spec: &mut [Complex<f32>],
    inv_left: &mut [f32],
    inv_right: &mut [f32],
    filter: (&[Complex<f32>], &[Complex<f32>]),
    gain: f32,
    out: &mut [f32],
) -> Result<(), Error> {
    let fft_len = fwd_spec.len();
    let scale = gain / fft_len as f32;
    let frames = out.len() / 2;

    spectral_mul(fwd_spec, filter.0, prod_spec);
    transform.inverse(prod_spec, inv_left)?;

    spectral_mul(fwd_spec, filter.1, prod_spec);
    transform.inverse(prod_spec, inv_right)?;

    for i in 0..frames {
        out[2 * i] = inv_left[i] * scale;
        out[2 * i + 1] = inv_right[i] * scale;
    }

    Ok(())
}

fn gain_from_attenuation(attenuation_db: f32) -> f32 {
    10.0f32.powf(-attenuation_db / 20.0)
}
