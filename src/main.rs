use anyhow::{bail, Context, Result};
use clap::Parser;
use clip_squeeze::batch::{BatchEvent, BatchTarget, UploadBatch, UploadStatus};
use clip_squeeze::cli::{Args, Commands, CompressionArgs};
use clip_squeeze::compress::{Compress, MediaCompressor, ProgressFn};
use clip_squeeze::config::PipelineConfig;
use clip_squeeze::constants::{ERROR_PREFIX, INFO_PREFIX, SUCCESS_PREFIX, WARNING_PREFIX};
use clip_squeeze::engine::{global_loader, install_engine_config};
use clip_squeeze::error::PipelineError;
use clip_squeeze::logger::{self, is_quiet};
use clip_squeeze::media::MediaFile;
use clip_squeeze::preview::TempPreviewStore;
use clip_squeeze::upload::{HttpUploadClient, UploadIntent};
use clip_squeeze::utils::{
    collect_media_files, create_percent_bar, create_progress_spinner, format_file_size,
};
use clip_squeeze::validation::validate_media;
use clip_squeeze::{say, verbose};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init_logging(args.verbose, args.quiet);

    let config = PipelineConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    install_engine_config(config.engine.clone());

    match args.command {
        Commands::Validate { inputs, recursive } => run_validate(&inputs, recursive),
        Commands::Compress { input, output, options } => {
            run_compress(&config, &input, &output, &options).await
        }
        Commands::Upload {
            inputs,
            intent,
            target,
            api_url,
            token,
            recursive,
            options,
        } => {
            let target = BatchTarget::new(intent, target);
            let client = HttpUploadClient::new(
                api_url.unwrap_or_else(|| config.api_base_url.clone()),
                token.or_else(|| config.token.clone()),
            );
            run_upload(&config, &inputs, recursive, &target, client, &options).await
        }
    }
}

fn collect_inputs(inputs: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        paths.extend(collect_media_files(input, recursive)?);
    }
    if paths.is_empty() {
        return Err(PipelineError::NoMediaFilesFound(inputs.join(" ")).into());
    }
    Ok(paths)
}

fn run_validate(inputs: &[String], recursive: bool) -> Result<()> {
    let paths = collect_inputs(inputs, recursive)?;
    let mut invalid = 0;

    for path in &paths {
        let file = MediaFile::from_path(path)?;
        match validate_media(&file).error_message() {
            None => say!(
                "{} {} ({})",
                SUCCESS_PREFIX,
                file.name,
                format_file_size(file.size())
            ),
            Some(message) => {
                invalid += 1;
                eprintln!("{} {}: {}", ERROR_PREFIX, file.name, message);
            }
        }
    }

    if invalid > 0 {
        bail!("{} of {} files failed validation", invalid, paths.len());
    }
    say!("{} All {} files are ready to upload", INFO_PREFIX, paths.len());
    Ok(())
}

fn build_compressor(config: &PipelineConfig, options: &CompressionArgs) -> Result<MediaCompressor> {
    let image_options = options.image_options(&config.image);
    let video_options = options.video_options(&config.video);
    image_options.validate()?;
    video_options.validate()?;
    Ok(MediaCompressor::new(global_loader())
        .with_image_options(image_options)
        .with_video_options(video_options))
}

async fn run_compress(
    config: &PipelineConfig,
    input: &Path,
    output: &Path,
    options: &CompressionArgs,
) -> Result<()> {
    let compressor = build_compressor(config, options)?;
    let file = MediaFile::from_path(input)?;
    verbose!("Compressing {} ({})", file.name, file.mime_type);

    let pb = create_percent_bar(&file.name);
    if is_quiet() {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    let bar = pb.clone();
    let on_progress: ProgressFn = Arc::new(move |percent| bar.set_position(u64::from(percent)));
    let result = compressor.compress(&file, on_progress).await;
    pb.finish_and_clear();
    let result = result?;

    let output = match result.output.extension() {
        Some(ext) if output.extension().and_then(|e| e.to_str()) != Some(ext.as_str()) => {
            let adjusted = output.with_extension(&ext);
            eprintln!(
                "{} Output is {}; writing {:?}",
                WARNING_PREFIX, result.output.mime_type, adjusted
            );
            adjusted
        }
        _ => output.to_path_buf(),
    };
    std::fs::write(&output, &result.output.data)
        .with_context(|| format!("failed to write {:?}", output))?;

    say!(
        "{} {} → {:?}: {} → {} ({:.1}% smaller)",
        SUCCESS_PREFIX,
        file.name,
        output,
        format_file_size(result.original_size_bytes),
        format_file_size(result.compressed_size_bytes),
        result.reduction_percent
    );
    Ok(())
}

async fn run_upload(
    config: &PipelineConfig,
    inputs: &[String],
    recursive: bool,
    target: &BatchTarget,
    client: HttpUploadClient,
    options: &CompressionArgs,
) -> Result<()> {
    let compressor = build_compressor(config, options)?;
    let paths = collect_inputs(inputs, recursive)?;
    let spinner = create_progress_spinner(&format!("Reading {} files", paths.len()));
    if is_quiet() {
        spinner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    let files = paths
        .iter()
        .map(|path| MediaFile::from_path(path))
        .collect::<clip_squeeze::Result<Vec<_>>>();
    spinner.finish_and_clear();
    let files = files?;

    let client = Arc::new(client);
    let mut batch = UploadBatch::new(
        Arc::new(compressor),
        client.clone(),
        client,
        Arc::new(TempPreviewStore::new()?),
    );
    for rejection in batch.add_files(files) {
        eprintln!("{} {}: {}", WARNING_PREFIX, rejection.file_name, rejection.message);
    }

    let names: Vec<String> = batch.records().iter().map(|r| r.source.name.clone()).collect();
    let reporter = tokio::spawn(report_events(batch.subscribe(), names));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Stopping after the current step...", WARNING_PREFIX);
            on_interrupt.cancel();
        }
    });

    let result = batch.run_batch(target, &cancel).await;
    let result = match result {
        Ok(result) => result,
        Err(e) => {
            reporter.abort();
            return Err(e.into());
        }
    };
    let _ = reporter.await;

    for record in batch.records() {
        match record.status {
            UploadStatus::Success => verbose!(
                "{} → {}",
                record.source.name,
                record.file_url.as_deref().unwrap_or_default()
            ),
            UploadStatus::Error => eprintln!(
                "{} {}: {}",
                ERROR_PREFIX,
                record.source.name,
                record.error_message.as_deref().unwrap_or("unknown error")
            ),
            _ => {}
        }
    }
    batch.close();

    say!(
        "{} Uploaded {} of {} files as {}",
        INFO_PREFIX,
        result.succeeded_count,
        result.total(),
        describe_intent(target.intent)
    );
    if result.cancelled {
        eprintln!("{} Cancelled with {} files not attempted", WARNING_PREFIX, result.pending_count);
    }
    if !result.is_success() {
        bail!(
            "{} files failed and {} were not attempted",
            result.failed_count,
            result.pending_count
        );
    }
    Ok(())
}

fn describe_intent(intent: UploadIntent) -> &'static str {
    match intent {
        UploadIntent::Highlight => "highlights",
        UploadIntent::ProfilePicture => "profile pictures",
        UploadIntent::TeamLogo => "team logos",
    }
}

async fn report_events(mut events: UnboundedReceiver<BatchEvent>, names: Vec<String>) {
    let name = |index: usize| names.get(index).map(String::as_str).unwrap_or("?");
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = events.recv().await {
        match event {
            BatchEvent::StatusChanged { index, status, .. } => match status {
                UploadStatus::Compressing => {
                    if !is_quiet() {
                        bar = Some(create_percent_bar(name(index)));
                    }
                }
                UploadStatus::Uploading => {
                    if let Some(pb) = bar.take() {
                        pb.finish_and_clear();
                    }
                    verbose!("Uploading {}", name(index));
                }
                UploadStatus::Success => say!("{} {}", SUCCESS_PREFIX, name(index)),
                UploadStatus::Error | UploadStatus::Pending => {
                    if let Some(pb) = bar.take() {
                        pb.finish_and_clear();
                    }
                }
            },
            BatchEvent::CompressionProgress { percent, .. } => {
                if let Some(pb) = &bar {
                    pb.set_position(u64::from(percent));
                }
            }
            BatchEvent::UploadProgress { .. } | BatchEvent::Rejected { .. } => {}
            BatchEvent::Finished(_) => break,
        }
    }
}
