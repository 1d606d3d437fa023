//! Skin plug-in
//!
//! A skin is a folder of images and sounds described by `skin.ini`. Only the
//! definition files take part in the fingerprint, so re-exported artwork
//! with the same definition resolves to the same record.

use std::path::Path;

use async_trait::async_trait;

use super::{ModelPlugin, PopulateContext};
use crate::archive::ArchiveReader;
use crate::models::{ImportParameters, Model};

pub const SKIN_INI: &str = "skin.ini";

const HASHABLE_EXTENSIONS: &[&str] = &["ini", "json"];
const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Clone, Copy, Default)]
pub struct SkinPlugin;

impl SkinPlugin {
    pub fn new() -> Self {
        Self
    }
}

/// `[General]` values of a skin definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkinInfo {
    pub name: Option<String>,
    pub author: Option<String>,
}

/// Parse the `[General]` section of a `skin.ini`
///
/// Keys are case-insensitive and separated from values by `:`. Lines starting
/// with `//` are comments.
pub fn parse_skin_ini(content: &str) -> SkinInfo {
    let mut info = SkinInfo::default();
    let mut in_general = false;

    for line in content.lines() {
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() || line.starts_with("//") {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            in_general = line[1..line.len() - 1].trim().eq_ignore_ascii_case("general");
            continue;
        }

        if !in_general {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.trim().to_ascii_lowercase().as_str() {
            "name" => info.name = Some(value.to_string()),
            "author" => info.author = Some(value.to_string()),
            _ => {}
        }
    }

    info
}

/// Minimal definition for skins that ship without one
pub fn default_skin_ini(name: &str) -> String {
    format!(
        "// generated on import\n[General]\nName: {}\nAuthor: {}\n",
        name, UNKNOWN_AUTHOR
    )
}

fn display_name(archive_name: &str) -> String {
    Path::new(archive_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| archive_name.to_string())
}

#[async_trait]
impl ModelPlugin for SkinPlugin {
    fn model_name(&self) -> &str {
        "skin"
    }

    fn hashable_file_extensions(&self) -> &[&str] {
        HASHABLE_EXTENSIONS
    }

    fn create_model(
        &self,
        archive: &dyn ArchiveReader,
        _parameters: &ImportParameters,
    ) -> anyhow::Result<Option<Model>> {
        if archive.filenames().is_empty() {
            return Ok(None);
        }
        Ok(Some(Model::new(display_name(archive.name()))))
    }

    async fn populate(
        &self,
        model: &mut Model,
        _archive: &dyn ArchiveReader,
        ctx: &mut PopulateContext<'_>,
    ) -> anyhow::Result<()> {
        let info = match ctx.read_file(model, SKIN_INI).await? {
            Some(bytes) => parse_skin_ini(&String::from_utf8_lossy(&bytes)),
            None => {
                tracing::debug!(name = %model.name, "No skin.ini, generating one");
                let content = default_skin_ini(&model.name);
                ctx.write_file(model, SKIN_INI, content.into_bytes()).await?;
                SkinInfo {
                    name: None,
                    author: Some(UNKNOWN_AUTHOR.to_string()),
                }
            }
        };

        ctx.check_cancelled()?;

        if let Some(name) = info.name {
            model.metadata.insert("name".to_string(), name.clone());
            model.name = name;
        }
        model
            .metadata
            .insert("author".to_string(), info.author.unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()));

        Ok(())
    }

    fn should_delete_archive(&self, path: &Path) -> bool {
        path.is_file()
    }
}
