//! Decoding of raw KEMAR sample files.
//!
//! The measurement files store interleaved stereo samples as big-endian
//! signed 16-bit integers with no header. Only whole stereo pairs are
//! decoded; a trailing odd byte is ignored.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};

/// Load every whole pair of big-endian 16-bit samples from `path`.
///
/// The returned vector holds interleaved left/right samples; its length
/// divided by two is the number of stereo frames.
pub fn load_stereo_s16be<P: AsRef<Path>>(path: P) -> io::Result<Vec<i16>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    decode_s16be(&bytes)
}

/// Decode interleaved big-endian 16-bit samples out of a raw byte buffer.
pub fn decode_s16be(bytes: &[u8]) -> io::Result<Vec<i16>> {
    let pairs = bytes.len() / 4;
    let count = pairs * 2;

    let mut samples = vec![0i16; count];
    (&bytes[..count * 2]).read_i16_into::<BigEndian>(&mut samples)?;

    Ok(samples)
}

/// Split interleaved stereo samples into left and right channel buffers.
pub fn split_stereo(interleaved: &[i16]) -> (Box<[i16]>, Box<[i16]>) {
    let frames = interleaved.len() / 2;

    let mut left = vec![0i16; frames];
    let mut right = vec![0i16; frames];

    for (frame, pair) in interleaved.chunks_exact(2).enumerate() {
        left[frame] = pair[0];
        right[frame] = pair[1];
    }

    (left.into_boxed_slice(), right.into_boxed_slice())
}
