use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use qimsteg::config::{DEFAULT_AC_COEFFS, DEFAULT_DELTA, DEFAULT_FPS};
use qimsteg::crypto::{self, keys};
use qimsteg::pipeline::{self, hook::NoopHook};
use qimsteg::{IntegrityPolicy, IntegrityStatus, QimParameters, StegoConfig};

/// qimsteg: hide an encrypted grayscale image in the luminance of a video.
#[derive(Parser)]
#[command(name = "qimsteg", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// QIM parameters; both sides must use the same values.
#[derive(Args)]
struct QimArgs {
    /// Quantization step for AC coefficients, must exceed 8 (default: 20.0)
    #[arg(long, default_value_t = DEFAULT_DELTA)]
    delta: f64,

    /// AC coefficients per 8x8 block carrying payload, 1..=63 (default: 10)
    #[arg(long, default_value_t = DEFAULT_AC_COEFFS)]
    coeffs: usize,
}

impl QimArgs {
    fn params(&self) -> Result<QimParameters> {
        Ok(QimParameters::new(self.delta, self.coeffs)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a receiver key pair as <name>_private_key.pem / <name>_public_key.pem
    Keygen {
        /// Key pair name
        #[arg(short, long)]
        name: String,

        /// Directory to write the PEM files into
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Overwrite an existing key pair
        #[arg(long)]
        force: bool,
    },

    /// Embed a secret image into a carrier video
    Embed {
        /// Carrier video path
        #[arg(short, long)]
        carrier: PathBuf,

        /// Secret image path (converted to grayscale)
        #[arg(short, long)]
        secret: PathBuf,

        /// Output stego video path (.mkv, FFV1)
        #[arg(short, long)]
        output: PathBuf,

        /// Receiver public key (PEM)
        #[arg(short, long)]
        public_key: PathBuf,

        /// Output frame rate when the carrier's cannot be probed (default: 24)
        #[arg(long, default_value_t = DEFAULT_FPS)]
        fps: f64,

        #[command(flatten)]
        qim: QimArgs,
    },

    /// Extract the secret image from a stego video
    Extract {
        /// Stego video path
        #[arg(short, long)]
        input: PathBuf,

        /// Recovered image output path
        #[arg(short, long)]
        output: PathBuf,

        /// Receiver private key (PEM)
        #[arg(short = 'k', long)]
        private_key: PathBuf,

        /// Fail instead of warning when the embedded SHA3-256 hash does not match
        #[arg(long)]
        strict_integrity: bool,

        #[command(flatten)]
        qim: QimArgs,
    },

    /// Embed, then extract again and compare the image hashes
    Roundtrip {
        #[arg(short, long)]
        carrier: PathBuf,

        #[arg(short, long)]
        secret: PathBuf,

        /// Intermediate stego video path
        #[arg(long, default_value = "stego.mkv")]
        stego: PathBuf,

        /// Recovered image output path
        #[arg(short, long)]
        output: PathBuf,

        /// Key pair name; generated in the current directory if missing
        #[arg(short, long)]
        name: String,

        #[command(flatten)]
        qim: QimArgs,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen { name, dir, force } => {
            let paths = keys::KeyPaths::for_name(&dir, &name);
            if force {
                let (secret, _) = crypto::generate_keypair();
                keys::write_keypair(&secret, &paths)?;
            } else {
                keys::load_or_generate(&paths)?;
            }
            println!("{}\n{}", paths.private.display(), paths.public.display());
        }

        Commands::Embed {
            carrier,
            secret,
            output,
            public_key,
            fps,
            qim,
        } => {
            let cfg = StegoConfig {
                qim: qim.params()?,
                fps_fallback: fps,
                ..Default::default()
            };
            let report = pipeline::embed::embed_file(&carrier, &secret, &output, &public_key, &cfg)?;
            println!(
                "{} payload bits in {} of {} frames",
                report.payload_bits, report.frames_with_payload, report.frames_total
            );
        }

        Commands::Extract {
            input,
            output,
            private_key,
            strict_integrity,
            qim,
        } => {
            let cfg = StegoConfig {
                qim: qim.params()?,
                integrity_policy: if strict_integrity {
                    IntegrityPolicy::Reject
                } else {
                    IntegrityPolicy::Warn
                },
                ..Default::default()
            };
            let extracted = pipeline::extract::extract_file(&input, &output, &private_key, &cfg)?;
            if extracted.integrity == IntegrityStatus::Mismatch {
                warn!("recovered image failed the SHA3-256 check");
            }
            println!(
                "{}x{} image from {} frame(s)",
                extracted.image.width(),
                extracted.image.height(),
                extracted.frames_read
            );
        }

        Commands::Roundtrip {
            carrier,
            secret,
            stego,
            output,
            name,
            qim,
        } => {
            let cfg = StegoConfig {
                qim: qim.params()?,
                ..Default::default()
            };
            let paths = keys::KeyPaths::for_name(&PathBuf::from("."), &name);
            keys::load_or_generate(&paths).context("failed to prepare key pair")?;

            let result = pipeline::roundtrip(
                &carrier,
                &secret,
                &stego,
                &output,
                &paths.public,
                &paths.private,
                &cfg,
                &NoopHook,
            )?;
            info!("original  {}", result.original_hash);
            info!("recovered {}", result.recovered_hash);
            if !result.matched {
                anyhow::bail!("roundtrip mismatch");
            }
            println!("roundtrip OK");
        }
    }

    Ok(())
}
