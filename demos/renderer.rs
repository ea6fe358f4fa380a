use anyhow::{bail, Context, Error};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use spatializer::database::OpenOptions;
use spatializer::render::{Spatializer, CTL_AZIMUTH, CTL_ELEVATION, MAX_CONTROL};

use std::env;

// Azimuth control steps applied per block to circle the source around the
// listener.
const SWEEP_STEP: i32 = 1;

fn main() -> Result<(), Error> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        bail!("Usage: {} MONO_WAV_FILE HRTF_ROOT OUT_WAV_FILE", args[0]);
    }

    let mut reader = WavReader::open(&args[1]).context("Open wav file failed")?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Float || spec.channels != 1 {
        bail!("Unsupported format, must be F32, mono channel");
    }

    let db = OpenOptions::new()
        .sample_rate(spec.sample_rate)
        .open(&args[2])
        .context("Load HRTF data failed")?;

    println!(
        "Loaded {} frame filters from {}",
        db.filter_len(),
        db.root().display()
    );

    let mut spatializer = Spatializer::new(db)?;
    spatializer.set_control(CTL_ELEVATION, 40);

    let out_spec = WavSpec {
        channels: 2,
        sample_rate: spec.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&args[3], out_spec).context("Create wav file failed")?;

    let block_len = spatializer.block_len();
    let mut stereo = vec![0.0f32; block_len * 2];
    let mut azimuth = 0;

    let samples: Vec<f32> = reader.samples::<f32>().collect::<Result<_, _>>()?;

    for block in samples.chunks(block_len) {
        let input = spatializer.input_block();
        input.fill(0.0);
        input[..block.len()].copy_from_slice(block);

        spatializer.set_control(CTL_AZIMUTH, azimuth);
        azimuth = (azimuth + SWEEP_STEP) % (MAX_CONTROL + 1);

        spatializer.process_block(&mut stereo)?;

        for sample in &stereo {
            writer.write_sample(*sample)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
