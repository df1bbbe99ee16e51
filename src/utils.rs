/// Utility functions for common operations
///
/// Size formatting, ratio maths, progress bar styling and input collection
/// shared by the library and the command-line driver.

use crate::constants::{PROGRESS_BAR_TEMPLATE, PROGRESS_SPINNER_TEMPLATE};
use crate::error::{PipelineError, Result};
use crate::formats::is_media_file;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Create a progress spinner with consistent styling
pub fn create_progress_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template(PROGRESS_SPINNER_TEMPLATE) {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb
}

/// Create a 0-100 percentage bar labelled with `prefix`
pub fn create_percent_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_BAR_TEMPLATE) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_prefix(prefix.to_string());
    pb
}

/// Format file size in human-readable format
///
/// # Returns
/// * Human-readable size string (e.g., "1.2 MB", "512 B")
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Calculate size reduction as a percentage
///
/// # Returns
/// * Positive for a reduction, negative when the output grew, 0 for an empty original
pub fn calculate_compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    ((original_size as f64 - compressed_size as f64) / original_size as f64) * 100.0
}

/// Collect media files from a file path, a directory or a glob pattern
///
/// Hidden entries are skipped when walking directories; only files with a
/// recognised image or video extension are returned.
pub fn collect_media_files(input: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut media_files = Vec::new();
    let input_path = Path::new(input);

    if input_path.is_file() {
        media_files.push(input_path.to_path_buf());
    } else if input_path.is_dir() {
        let walker = if recursive {
            WalkDir::new(input_path)
        } else {
            WalkDir::new(input_path).max_depth(1)
        };

        for entry in walker
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && is_media_file(path) {
                media_files.push(path.to_path_buf());
            }
        }
        media_files.sort();
    } else if let Ok(pattern) = glob(input) {
        for entry in pattern.flatten() {
            if entry.is_file() && is_media_file(&entry) {
                media_files.push(entry);
            }
        }
    } else {
        return Err(PipelineError::NoMediaFilesFound(input.to_string()));
    }

    Ok(media_files)
}
