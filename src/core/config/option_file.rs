// src/core/config/option_file.rs

//! On-disk option-file handle: a key/value surface over one INI section.

use crate::core::errors::ReplicoreError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Key/value surface over an on-disk INI section. `set`/`remove` mutate an
/// in-memory view; `flush` writes the whole file atomically. Partial writes
/// never reach disk.
#[async_trait]
pub trait OptionFile: Send + Sync {
    /// Sets an option. `None` writes a bare key without a value.
    fn set(&mut self, name: &str, value: Option<&str>);

    fn remove(&mut self, name: &str);

    async fn flush(&mut self) -> Result<(), ReplicoreError>;
}

/// One line inside the managed section.
#[derive(Debug, Clone)]
enum SectionLine {
    /// Comment or blank line, kept verbatim.
    Raw(String),
    Entry { name: String, value: Option<String> },
}

/// An INI option file with a single managed section. Lines outside the
/// section, and comments inside it, are preserved verbatim.
#[derive(Debug)]
pub struct IniOptionFile {
    path: PathBuf,
    section: String,
    /// Lines before the managed section header (or the whole file if the
    /// section does not exist yet).
    prelude: Vec<String>,
    section_lines: Vec<SectionLine>,
    /// Lines from the next section header onwards.
    tail: Vec<String>,
}

/// MySQL treats `-` and `_` in option names as equivalent.
fn normalize(name: &str) -> String {
    name.replace('-', "_")
}

impl IniOptionFile {
    /// Loads `path`, parsing out the `[section]` block. A missing file is
    /// treated as empty and will be created on flush.
    pub async fn load(
        path: impl AsRef<Path>,
        section: &str,
    ) -> Result<Self, ReplicoreError> {
        let path = path.as_ref().to_path_buf();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let header = format!("[{section}]");
        let mut prelude = Vec::new();
        let mut section_lines = Vec::new();
        let mut tail = Vec::new();
        let mut where_at = 0; // 0 = prelude, 1 = section, 2 = tail

        for line in content.lines() {
            let trimmed = line.trim();
            match where_at {
                0 if trimmed.eq_ignore_ascii_case(&header) => where_at = 1,
                0 => prelude.push(line.to_string()),
                1 if trimmed.starts_with('[') => {
                    where_at = 2;
                    tail.push(line.to_string());
                }
                1 => section_lines.push(Self::parse_section_line(line)),
                _ => tail.push(line.to_string()),
            }
        }

        Ok(Self {
            path,
            section: section.to_string(),
            prelude,
            section_lines,
            tail,
        })
    }

    fn parse_section_line(line: &str) -> SectionLine {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            return SectionLine::Raw(line.to_string());
        }
        match trimmed.split_once('=') {
            Some((name, value)) => SectionLine::Entry {
                name: normalize(name.trim()),
                value: Some(value.trim().to_string()),
            },
            None => SectionLine::Entry {
                name: normalize(trimmed),
                value: None,
            },
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.prelude {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&format!("[{}]\n", self.section));
        for line in &self.section_lines {
            match line {
                SectionLine::Raw(raw) => out.push_str(raw),
                SectionLine::Entry { name, value } => {
                    out.push_str(name);
                    if let Some(value) = value {
                        out.push_str(" = ");
                        out.push_str(value);
                    }
                }
            }
            out.push('\n');
        }
        for line in &self.tail {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

#[async_trait]
impl OptionFile for IniOptionFile {
    fn set(&mut self, name: &str, value: Option<&str>) {
        let name = normalize(name);
        let value = value.map(str::to_string);
        for line in &mut self.section_lines {
            if let SectionLine::Entry {
                name: existing,
                value: existing_value,
            } = line
                && *existing == name
            {
                *existing_value = value;
                return;
            }
        }
        self.section_lines.push(SectionLine::Entry { name, value });
    }

    fn remove(&mut self, name: &str) {
        let name = normalize(name);
        self.section_lines.retain(|line| {
            !matches!(line, SectionLine::Entry { name: existing, .. } if *existing == name)
        });
    }

    async fn flush(&mut self) -> Result<(), ReplicoreError> {
        // Write to a temporary file and rename over the target, so a crash
        // mid-write leaves the original file intact.
        let temp_path = self
            .path
            .with_extension(format!("tmp.{}", rand::random::<u32>()));
        fs::write(&temp_path, self.render()).await?;
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}
