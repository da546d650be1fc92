use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use wavepix_core::replay::ReplayDemodulator;
use wavepix_core::{
    ChannelSelect, ReassemblyController, ReceivedImage, Status, SystematicCoder,
};

#[derive(Parser)]
#[command(name = "wavepix")]
#[command(about = "Still-image receiver core for audio-modem transfers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded decode-event capture through the receiver
    Replay {
        /// Input capture file (WPXR format)
        #[arg(value_name = "CAPTURE")]
        input: PathBuf,

        /// Directory to store received images in
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Input channel routing (0=default, 1=first, 2=second, 3=sum, 4=analytic)
        #[arg(short, long, default_value = "0")]
        channel: u8,
    },

    /// Classify an image payload file without storing anything
    Probe {
        /// Payload file to inspect
        #[arg(value_name = "IMAGE")]
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            input,
            out_dir,
            channel,
        } => replay_command(&input, &out_dir, channel)?,
        Commands::Probe { input } => probe_command(&input)?,
    }

    Ok(())
}

fn channel_select(channel: u8) -> ChannelSelect {
    match channel {
        1 => ChannelSelect::First,
        2 => ChannelSelect::Second,
        3 => ChannelSelect::Summation,
        4 => ChannelSelect::Analytic,
        _ => ChannelSelect::Default,
    }
}

fn replay_command(
    input: &Path,
    out_dir: &Path,
    channel: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(input)?;
    let mut demod = ReplayDemodulator::from_bytes(&data)?;
    println!("Replaying {} ({} bytes)", input.display(), data.len());

    let mut controller = ReassemblyController::new(SystematicCoder::new());
    let channel = channel_select(channel);
    let mut images = 0usize;

    while !demod.is_exhausted() {
        let Some(status) = controller.tick(&mut demod, &[], channel) else {
            continue;
        };
        match status {
            Status::PreambleFail => println!("preamble not found"),
            Status::WeakSync { info } if info.is_ping() => {
                println!("ping from {} ({:+.1} Hz)", info.call_sign_str(), info.carrier_offset)
            }
            Status::WeakSync { info } => {
                println!("weak sync, mode {} ({:+.1} Hz)", info.mode, info.carrier_offset)
            }
            Status::ResourceExhausted => warn!("receiver out of resources"),
            Status::Synced { info } => println!(
                "synced to {} mode {} ({:+.1} Hz)",
                info.call_sign_str(),
                info.mode,
                info.carrier_offset
            ),
            Status::DecodeFailed => println!("block decode failed"),
            Status::ChunkReceived { have, need } => println!("chunk {have} of {need}"),
            Status::ChunkDuplicate => println!("duplicate chunk ignored"),
            Status::ChunkRedundant => println!("redundant chunk ignored"),
            Status::ChunkUnsupported => println!("unsupported chunk ignored"),
            Status::ChunkCorrupted => println!("recovered payload corrupted, transfer dropped"),
            Status::PayloadUnknown => println!("payload not a supported image, discarded"),
            Status::PayloadReady(image) => {
                let path = store_image(out_dir, &image)?;
                println!(
                    "received {} {}x{} from {} ({} bit flips) -> {}",
                    image.info.format.name(),
                    image.info.width,
                    image.info.height,
                    image.call_sign,
                    image.bit_flips,
                    path.display()
                );
                images += 1;
            }
        }
    }

    println!("Replay finished, {images} image(s) stored");
    Ok(())
}

/// Store a validated payload as `YYYYMMDD_HHMMSS_<CALLSIGN>.<ext>`.
fn store_image(
    out_dir: &Path,
    image: &ReceivedImage,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(out_dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let call = if image.call_sign.is_empty() {
        "UNKNOWN".to_string()
    } else {
        image.call_sign.replace(' ', "_")
    };
    let name = format!("{stamp}_{call}.{}", image.info.format.extension());
    let path = out_dir.join(name);
    std::fs::write(&path, &image.bytes)?;
    info!("stored {}", path.display());
    Ok(path)
}

fn probe_command(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(input)?;
    match wavepix_core::sniff::probe(&data) {
        Some(info) => {
            let in_range = (wavepix_core::MIN_IMAGE_DIM..=wavepix_core::MAX_IMAGE_DIM)
                .contains(&info.width)
                && (wavepix_core::MIN_IMAGE_DIM..=wavepix_core::MAX_IMAGE_DIM)
                    .contains(&info.height);
            println!(
                "{}: {} {}x{} ({})",
                input.display(),
                info.format.name(),
                info.width,
                info.height,
                if in_range { "accepted" } else { "out of range" }
            );
        }
        None => println!("{}: unrecognized payload", input.display()),
    }
    Ok(())
}
