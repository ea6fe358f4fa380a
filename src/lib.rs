//! # Spatializer
//!
//! Binaural 3D-audio rendering driven by the measured KEMAR HRTF set.
//!
//! The [`database`] module loads the raw measurement tree into an
//! elevation by azimuth grid of impulse response pairs and their spectra.
//! The [`render`] module turns mono input into stereo: per sample through
//! time-domain convolution, or per block through spectral multiplication
//! with a crossfade whenever the source moves.
//!
//! # Example
//!
//! ```no_run
//! use spatializer::database::Database;
//! use spatializer::render::{Spatializer, CTL_AZIMUTH};
//!
//! // Load the compact KEMAR set; HRTFROOT overrides the path if set.
//! let db = Database::open("KEMAR/compact").unwrap();
//! let mut spatializer = Spatializer::new(db).unwrap();
//!
//! // Put the source on the right, then render one block.
//! spatializer.set_control(CTL_AZIMUTH, 96);
//!
//! let block_len = spatializer.block_len();
//! spatializer.input_block().fill(0.5);
//!
//! let mut stereo = vec![0.0; block_len * 2];
//! spatializer.process_block(&mut stereo).unwrap();
//! ```

pub mod database;
pub mod decode;
pub mod dot;
pub mod fft;
pub mod grid;
pub mod render;
