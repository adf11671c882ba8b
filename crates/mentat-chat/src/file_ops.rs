// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::events::{FileEditMode, FileEditRequest};
use crate::markdown::{self, MarkdownEditMode};
use crate::notifications::NotificationsPrinter;

/// Asks whether an existing file may be overwritten.  The default prompts
/// on the terminal; tests inject a closure.
pub type OverwritePrompt = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Effectful target for `FileEdit` engine commands.
pub struct FileOperationsHandler {
    printer: NotificationsPrinter,
    backup_dir: PathBuf,
    overwrite_prompt: OverwritePrompt,
}

impl FileOperationsHandler {
    pub fn new(printer: NotificationsPrinter) -> Self {
        let prompt_printer = printer.clone();
        Self {
            printer,
            backup_dir: PathBuf::from("/tmp/mentat/backups"),
            overwrite_prompt: Box::new(move |path| prompt_overwrite(&prompt_printer, path)),
        }
    }

    pub fn with_overwrite_prompt(mut self, prompt: OverwritePrompt) -> Self {
        self.overwrite_prompt = prompt;
        self
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn handle(&self, request: &FileEditRequest) -> anyhow::Result<()> {
        match &request.mode {
            FileEditMode::Create => self.create(&request.path, &request.content),
            FileEditMode::Append => self.append(&request.path, &request.content),
            FileEditMode::Prepend => self.prepend(&request.path, &request.content),
            FileEditMode::UpdateMarkdownSection {
                section_path,
                submode,
            } => self.update_markdown_section(&request.path, section_path, &request.content, *submode),
        }
    }

    /// Write `content` to `path`.  An existing file requires confirmation
    /// and is backed up before being replaced.
    pub fn create(&self, path: &Path, content: &str) -> anyhow::Result<()> {
        if path.exists() {
            self.printer.notify(&format!("File {} already exists.", path.display()));
            if !(self.overwrite_prompt)(path) {
                self.printer.notify("File creation cancelled.");
                return Ok(());
            }
            self.backup_existing(path)?;
        }
        self.ensure_parent_exists(path)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        self.printer.notify(&format!("Created {}", path.display()));
        Ok(())
    }

    /// Append to `path`, creating it when missing.
    pub fn append(&self, path: &Path, content: &str) -> anyhow::Result<()> {
        self.ensure_parent_exists(path)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("appending to {}", path.display()))?;
        self.printer.notify(&format!("Appended to {}", path.display()));
        Ok(())
    }

    /// Prepend to `path` (read-modify-write), creating it when missing.
    pub fn prepend(&self, path: &Path, content: &str) -> anyhow::Result<()> {
        self.ensure_parent_exists(path)?;
        let existing = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        std::fs::write(path, format!("{content}{existing}"))
            .with_context(|| format!("writing {}", path.display()))?;
        self.printer.notify(&format!("Prepended to {}", path.display()));
        Ok(())
    }

    /// Edit one markdown section in place.  A missing target section leaves
    /// the file untouched and surfaces a warning; a missing file is created
    /// with the section's header chain.
    pub fn update_markdown_section(
        &self,
        path: &Path,
        section_path: &[String],
        content: &str,
        mode: MarkdownEditMode,
    ) -> anyhow::Result<()> {
        self.ensure_parent_exists(path)?;

        if !path.exists() {
            std::fs::write(path, markdown::render_new_document(section_path, content))
                .with_context(|| format!("writing {}", path.display()))?;
            self.printer.notify(&format!(
                "Created {} with section {}",
                path.display(),
                section_path.join(" > ")
            ));
            return Ok(());
        }

        let document =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        match markdown::update_section(&document, section_path, content, mode) {
            Some(rewritten) => {
                self.backup_existing(path)?;
                std::fs::write(path, rewritten)
                    .with_context(|| format!("writing {}", path.display()))?;
                let action = match mode {
                    MarkdownEditMode::Update => "Updated",
                    MarkdownEditMode::Append => "Appended to",
                };
                self.printer.notify(&format!(
                    "{action} section {} in {}",
                    section_path.join(" > "),
                    path.display()
                ));
            }
            None => {
                self.printer.warn(&format!(
                    "Warning: section {} not found in {}. No changes made.",
                    section_path.join(" > "),
                    path.display()
                ));
            }
        }
        Ok(())
    }

    fn ensure_parent_exists(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                self.printer
                    .notify(&format!("Creating directory structure: {}", parent.display()));
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        Ok(())
    }

    /// Copy `path` into the backup directory as `name_YYYYmmdd_HHMMSS.bak`.
    fn backup_existing(&self, path: &Path) -> anyhow::Result<()> {
        if !path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.backup_dir)
            .with_context(|| format!("creating {}", self.backup_dir.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let backup_path = self.backup_dir.join(format!("{filename}_{timestamp}.bak"));
        std::fs::copy(path, &backup_path)
            .with_context(|| format!("backing up {}", path.display()))?;
        self.printer
            .notify(&format!("Created backup at {}", backup_path.display()));
        Ok(())
    }
}

fn prompt_overwrite(printer: &NotificationsPrinter, path: &Path) -> bool {
    let _ = path;
    print!("Do you want to overwrite it? [y/N] ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    let yes = matches!(answer.trim().to_lowercase().as_str(), "y" | "yes");
    if !yes {
        printer.notify("Keeping the existing file.");
    }
    yes
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
