//! Pairing of captured screenshots with their state snapshots

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const IMAGE_PREFIX: &str = "screen_";
const IMAGE_SUFFIX: &str = ".png";
const LAYOUT_PREFIX: &str = "state_";
const LAYOUT_SUFFIX: &str = ".json";

/// Screenshot and the layout captured with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePair {
    pub token: String,
    pub image_path: PathBuf,
    pub layout_path: PathBuf,
}

impl CapturePair {
    /// File name of the screenshot, as registered
    pub fn file_name(&self) -> String {
        format!("{}{}{}", IMAGE_PREFIX, self.token, IMAGE_SUFFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    Pair(CapturePair),
    /// Screenshot without a layout; never registered
    Skipped {
        image_path: PathBuf,
        expected_layout: PathBuf,
    },
}

/// Token of `screen_<token>.png`; the match is case-sensitive
fn screenshot_token(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix(IMAGE_PREFIX)?
        .strip_suffix(IMAGE_SUFFIX)
        .filter(|token| !token.is_empty())
}

pub fn layout_name(token: &str) -> String {
    format!("{}{}{}", LAYOUT_PREFIX, token, LAYOUT_SUFFIX)
}

/// Scan the top level of `states_dir`, in file name order
pub fn scan(states_dir: &Path) -> Vec<IngestEvent> {
    if !states_dir.is_dir() {
        warn!("States directory {} does not exist", states_dir.display());
        return Vec::new();
    }

    let mut images: Vec<(String, PathBuf)> = WalkDir::new(states_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_str()?;
            let token = screenshot_token(name)?.to_string();
            Some((token, e.into_path()))
        })
        .collect();
    images.sort();

    let events: Vec<IngestEvent> = images
        .into_iter()
        .map(|(token, image_path)| {
            let layout_path = states_dir.join(layout_name(&token));
            if layout_path.is_file() {
                IngestEvent::Pair(CapturePair {
                    token,
                    image_path,
                    layout_path,
                })
            } else {
                warn!(
                    "Skipping {}: no layout {}",
                    image_path.display(),
                    layout_path.display()
                );
                IngestEvent::Skipped {
                    image_path,
                    expected_layout: layout_path,
                }
            }
        })
        .collect();

    debug!("Found {} screenshots in {}", events.len(), states_dir.display());
    events
}
