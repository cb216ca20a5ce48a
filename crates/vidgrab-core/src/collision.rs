//! Output file collision handling.
//!
//! A [`CollisionResolver`] lives for exactly one batch run. The first time an
//! item's output name is already taken, the resolver asks its
//! [`CollisionPrompt`] what to do and remembers the answer for every later
//! item of the same run.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::model::{CollisionStrategy, DEFAULT_OUTPUT_TEMPLATE, VideoMetadata};

/// Characters that are not allowed in file names on at least one supported
/// platform.
const INVALID_FILENAME_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Extension placeholder appended to resolved base names.
const EXTENSION_PLACEHOLDER: &str = ".%(ext)s";

/// Sanitize a string for use as a file name.
///
/// Surrounding whitespace is trimmed and every invalid or control character
/// is replaced with an underscore.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_control() || INVALID_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Source of the collision decision when no sticky strategy exists yet.
#[cfg_attr(test, mockall::automock)]
pub trait CollisionPrompt: Send + Sync {
    /// Choose how to handle `existing`, the first file found under the
    /// item's base name.
    fn choose(&self, existing: &Path) -> CollisionStrategy;
}

/// A prompt that always answers with the same strategy.
#[derive(Debug, Clone, Copy)]
pub struct FixedStrategy(pub CollisionStrategy);

impl CollisionPrompt for FixedStrategy {
    fn choose(&self, _existing: &Path) -> CollisionStrategy {
        self.0
    }
}

/// Outcome of resolving one item's output name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Download using this template and strategy.
    Proceed {
        /// Output template, relative to the output directory.
        output_template: String,
        /// Strategy to pass on to the downloader.
        strategy: CollisionStrategy,
    },
    /// Leave the existing file alone and skip the item.
    Skip {
        /// The existing file that caused the skip.
        existing: PathBuf,
    },
}

/// Per-run collision resolver with a sticky decision.
pub struct CollisionResolver<'a> {
    directory: PathBuf,
    prompt: &'a dyn CollisionPrompt,
    decided: Option<CollisionStrategy>,
}

impl<'a> CollisionResolver<'a> {
    /// Create a resolver for one run over `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, prompt: &'a dyn CollisionPrompt) -> Self {
        Self {
            directory: directory.into(),
            prompt,
            decided: None,
        }
    }

    /// Create a resolver whose decision is already made, so it never prompts.
    #[must_use]
    pub fn with_decision(
        directory: impl Into<PathBuf>,
        prompt: &'a dyn CollisionPrompt,
        strategy: CollisionStrategy,
    ) -> Self {
        Self {
            directory: directory.into(),
            prompt,
            decided: Some(strategy),
        }
    }

    /// The sticky decision, if one has been made in this run.
    #[must_use]
    pub const fn decided(&self) -> Option<CollisionStrategy> {
        self.decided
    }

    /// Resolve the output template and strategy for one item.
    ///
    /// Without metadata there is no reliable base name to compare against,
    /// so the downloader's default template is used with `AutoRename`.
    pub fn resolve(&mut self, metadata: Option<&VideoMetadata>) -> Resolution {
        let Some(metadata) = metadata else {
            debug!("No metadata available, using default template with auto-rename");
            return Resolution::Proceed {
                output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
                strategy: CollisionStrategy::AutoRename,
            };
        };

        let base_name = sanitize_filename(&metadata.base_name());
        let existing = files_with_base_name(&self.directory, &base_name);

        let Some(first) = existing.first() else {
            return Resolution::Proceed {
                output_template: format!("{base_name}{EXTENSION_PLACEHOLDER}"),
                strategy: self.decided.unwrap_or_default(),
            };
        };

        let strategy = match self.decided {
            Some(strategy) => strategy,
            None => {
                let strategy = self.prompt.choose(first);
                info!("Collision strategy for this run: {}", strategy);
                self.decided = Some(strategy);
                strategy
            }
        };

        match strategy {
            CollisionStrategy::Skip => Resolution::Skip {
                existing: first.clone(),
            },
            CollisionStrategy::Overwrite => {
                for file in &existing {
                    // Best effort.
                    if let Err(e) = fs::remove_file(file) {
                        warn!("Failed to remove {}: {}", file.display(), e);
                    }
                }
                Resolution::Proceed {
                    output_template: format!("{base_name}{EXTENSION_PLACEHOLDER}"),
                    strategy,
                }
            }
            CollisionStrategy::AutoRename => Resolution::Proceed {
                output_template: format!(
                    "{}{EXTENSION_PLACEHOLDER}",
                    unique_base_name(&self.directory, &base_name)
                ),
                strategy,
            },
        }
    }
}

impl std::fmt::Debug for CollisionResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionResolver")
            .field("directory", &self.directory)
            .field("decided", &self.decided)
            .finish_non_exhaustive()
    }
}

/// Append ` (1)`, ` (2)`, … to `base_name` until no file in `directory`
/// uses it.
#[must_use]
pub fn unique_base_name(directory: &Path, base_name: &str) -> String {
    let mut candidate = base_name.to_string();
    let mut counter = 1u32;
    while !files_with_base_name(directory, &candidate).is_empty() {
        candidate = format!("{base_name} ({counter})");
        counter += 1;
    }
    candidate
}

/// Files directly inside `directory` named `<base_name>.<anything>`, sorted
/// by path.
fn files_with_base_name(directory: &Path, base_name: &str) -> Vec<PathBuf> {
    let prefix = format!("{base_name}.");
    let mut files: Vec<PathBuf> = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&prefix))
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}
