use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kiln::{config, ConversionRequest, OutputFormat, ProgressCallback, ProgressSample, Transcoder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "kiln.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one media file
    Convert {
        input: PathBuf,

        /// Output path (defaults to the input with the format's extension)
        output: Option<PathBuf>,

        /// H264, ProRes, DNxHR or AudioOnly
        #[arg(short, long, default_value = "H264")]
        format: OutputFormat,

        /// 4K, 1440p, 1080p, 720p or 480p
        #[arg(short, long, default_value = "1080p")]
        quality: String,

        /// Input duration in seconds (probed when omitted)
        #[arg(long)]
        duration: Option<f64>,

        /// Never use a hardware encoder
        #[arg(long)]
        cpu: bool,
    },
    /// Print the detected hardware encoding capabilities
    Capabilities {
        #[arg(long)]
        json: bool,
    },
    /// Print a media file's duration in seconds
    Duration { input: PathBuf },
    /// Check that ffmpeg is runnable
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let config = config::Config::load(&args.config).unwrap_or_else(|e| {
        warn!("Failed to load {:?}: {:#}. Using defaults.", args.config, e);
        config::Config::default()
    });
    let transcoder = Arc::new(Transcoder::new(config));

    match args.command {
        Command::Convert {
            input,
            output,
            format,
            quality,
            duration,
            cpu,
        } => {
            let output = output.unwrap_or_else(|| default_output(&input, format));
            let mut request = ConversionRequest::new(input, output, format, quality);
            if let Some(seconds) = duration {
                request = request.with_duration(seconds);
            }
            if cpu {
                request = request.with_prefer_gpu(false);
            }
            convert(transcoder, request).await
        }
        Command::Capabilities { json } => {
            let snapshot = transcoder.detect_capabilities().await;
            if json {
                println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
            } else {
                println!("Platform:  {} ({})", snapshot.platform, snapshot.arch);
                println!("Hardware:  {}", snapshot.hardware_type);
                println!("Encoders:  {}", snapshot.encoders.join(", "));
                println!("Decoders:  {}", snapshot.decoders.join(", "));
                if let Some(description) = &snapshot.description {
                    println!("Summary:   {}", description);
                }
                if let Some(err) = &snapshot.error {
                    println!("Error:     {}", err);
                }
            }
            Ok(())
        }
        Command::Duration { input } => match transcoder.get_duration(&input).await {
            Some(seconds) => {
                println!("{:.3}", seconds);
                Ok(())
            }
            None => anyhow::bail!("Could not determine the duration of {:?}", input),
        },
        Command::Check => {
            let version = transcoder.verify_ffmpeg().await?;
            println!("{}", version);
            Ok(())
        }
    }
}

async fn convert(transcoder: Arc<Transcoder>, request: ConversionRequest) -> Result<()> {
    let on_progress: ProgressCallback = Arc::new(|sample: ProgressSample| match sample.percent {
        Some(percent) => info!(
            "Job {}: {}% ({:.1}s, {}x)",
            sample.job_id,
            percent,
            sample.elapsed_seconds,
            sample.speed_multiplier.unwrap_or(0.0)
        ),
        None => info!(
            "Job {}: {:.1}s encoded",
            sample.job_id, sample.elapsed_seconds
        ),
    });

    let job = transcoder
        .start(request, Some(on_progress))
        .await
        .context("Failed to start conversion")?;
    info!("Job {} started (pid {:?})", job.id(), job.pid());

    let wait = job.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        result = &mut wait => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling {} job(s)", transcoder.cancel_all());
            wait.await
        }
    };

    match result {
        Ok(output) => {
            info!(
                "Wrote {:?} ({} bytes)",
                output.output_path, output.file_size_bytes
            );
            Ok(())
        }
        Err(e) => {
            error!("Conversion failed: {}", e);
            Err(e.into())
        }
    }
}

fn default_output(input: &Path, format: OutputFormat) -> PathBuf {
    let mut output = input.to_path_buf();
    if format.extension() == input.extension().and_then(|e| e.to_str()).unwrap_or("") {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        output.set_file_name(format!("{}.converted", stem));
    }
    output.set_extension(format.extension());
    output
}
