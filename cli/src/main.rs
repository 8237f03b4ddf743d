use clap::{Parser, Subcommand};
use std::path::PathBuf;
use twotone_core::{tone_power, DemodConfig, Demodulator, ReplayDriver, ADC_MIDSCALE};

#[derive(Parser)]
#[command(name = "twotone")]
#[command(about = "Offline decoder for two-tone FSK captures")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a WAV capture to a bit stream
    Decode {
        /// Input WAV file (mono capture of the received audio)
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Baud rate in symbols per second
        #[arg(long, default_value = "32")]
        baud: u32,

        /// Tone frequency decoded as bit 0 (Hz)
        #[arg(long, default_value = "1100.0")]
        freq0: f32,

        /// Tone frequency decoded as bit 1 (Hz)
        #[arg(long, default_value = "2200.0")]
        freq1: f32,

        /// Tone power threshold separating signal from silence
        #[arg(long, default_value = "1e8")]
        threshold: f32,
    },

    /// Print per-symbol Goertzel power at one frequency (threshold calibration aid)
    Probe {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Frequency to probe (Hz)
        #[arg(long)]
        freq: f32,

        /// Baud rate used to size the probe window
        #[arg(long, default_value = "32")]
        baud: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            input,
            baud,
            freq0,
            freq1,
            threshold,
        } => decode_command(&input, baud, freq0, freq1, threshold),
        Commands::Probe { input, freq, baud } => probe_command(&input, freq, baud),
    }
}

/// Read a mono WAV capture and re-bias it to unsigned ADC-style counts
/// around [`ADC_MIDSCALE`]. Returns the samples and the file's sample rate.
fn read_capture(path: &PathBuf) -> Result<(Vec<u16>, u32), Box<dyn std::error::Error>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    println!(
        "Read WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );
    if spec.channels != 1 {
        return Err(format!("expected mono capture, got {} channels", spec.channels).into());
    }

    let samples: Vec<u16> = match spec.bits_per_sample {
        16 => {
            let int_samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
            int_samples?
                .into_iter()
                .map(|s| (ADC_MIDSCALE as i32 + (s as i32 >> 4)).clamp(0, 4095) as u16)
                .collect()
        }
        32 => {
            let float_samples: Result<Vec<f32>, _> = reader.samples::<f32>().collect();
            float_samples?
                .into_iter()
                .map(|s| {
                    let scaled = ADC_MIDSCALE as f32 + s.clamp(-1.0, 1.0) * 2047.0;
                    scaled as u16
                })
                .collect()
        }
        other => return Err(format!("unsupported bit depth: {other}").into()),
    };

    println!("Extracted {} samples", samples.len());
    Ok((samples, spec.sample_rate))
}

fn decode_command(
    input: &PathBuf,
    baud: u32,
    freq0: f32,
    freq1: f32,
    threshold: f32,
) -> Result<(), Box<dyn std::error::Error>> {
    let (samples, sample_rate) = read_capture(input)?;

    let config = DemodConfig {
        baud_rate: baud,
        sample_rate,
        freq0,
        freq1,
        power_threshold: threshold,
    };
    println!(
        "Decoding at {} baud, {} samples per symbol",
        baud,
        config.chunk_size()
    );

    let bits = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let collected = std::rc::Rc::clone(&bits);

    let (driver, handle) = ReplayDriver::new(samples);
    let mut demod = Demodulator::new(driver);
    demod.configure(config)?;
    demod.set_bit_sink(move |bit| collected.borrow_mut().push(bit));
    demod.start()?;

    // Replay the capture at full speed: one completion event per chunk,
    // then one polling tick. A short read only skips that tick.
    while handle.deliver_chunk() {
        if let Err(err) = demod.process() {
            log::warn!("tick skipped: {err}");
        }
    }
    demod.stop()?;

    let bits = bits.borrow();
    println!("Decoded {} bits:", bits.len());
    for byte_bits in bits.chunks(8) {
        let rendered: String = byte_bits.iter().map(|b| (b'0' + b) as char).collect();
        print!("{rendered} ");
    }
    println!();
    Ok(())
}

fn probe_command(input: &PathBuf, freq: f32, baud: u32) -> Result<(), Box<dyn std::error::Error>> {
    let (samples, sample_rate) = read_capture(input)?;
    let window = (sample_rate / baud) as usize;
    if window == 0 {
        return Err(format!("baud rate {baud} exceeds sample rate {sample_rate}").into());
    }

    println!("Probing {} Hz in {}-sample windows", freq, window);
    for (index, chunk) in samples.chunks_exact(window).enumerate() {
        let power = tone_power(chunk, freq, sample_rate as f32)?;
        println!("window {index:5}: power {power:14.1}");
    }
    Ok(())
}
