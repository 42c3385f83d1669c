//! Progress bar and summary rendering for the upload binary

use crate::pipeline::{ItemStatus, UploadBatch};
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

/// Progress bar sized to a batch; `pos` counts resolved items
pub fn create_batch_progress(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Reflect a fresh batch snapshot in the bar
pub fn update_progress(pb: &ProgressBar, batch: &UploadBatch) {
    pb.set_position(batch.resolved_count() as u64);
    pb.set_message(batch.progress_label());
}

/// Plain-text report, one line per item
pub fn format_summary(batch: &UploadBatch) -> String {
    let mut out = format!(
        "Batch {} ({}/{}): {}\n",
        batch.id,
        batch.site_key,
        batch.category,
        batch.progress_label()
    );

    for item in &batch.items {
        let detail = match item.status {
            ItemStatus::Done => item.public_url.clone().unwrap_or_default(),
            ItemStatus::Failed => item.error.clone().unwrap_or_default(),
            _ => String::new(),
        };
        out.push_str(&format!("  {:<8} {}  {}\n", item.status, item.file_name, detail));
    }

    out
}
