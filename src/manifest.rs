use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};

use crate::schema::AssemblyManifest;

/// Load an assembly manifest and resolve its clip and audio paths relative
/// to the manifest file. Configuration problems are fatal here, before any
/// frame work starts.
pub fn load_and_validate_manifest(path: &Path) -> Result<AssemblyManifest> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let mut manifest: AssemblyManifest = serde_yaml::from_str(&contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!(
            "failed to parse yaml in {} at {}: {}",
            path.display(),
            location,
            error
        )
    })?;

    validate_manifest(&mut manifest, path)?;
    Ok(manifest)
}

fn validate_manifest(manifest: &mut AssemblyManifest, manifest_path: &Path) -> Result<()> {
    manifest.validate()?;

    let manifest_dir = manifest_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let mut seen_names = HashSet::with_capacity(manifest.segments.len());
    for segment in &mut manifest.segments {
        if !seen_names.insert(segment.name.clone()) {
            bail!("duplicate segment name '{}'", segment.name);
        }
        segment.clip = resolve_and_validate_asset_path(
            &manifest_dir,
            &segment.clip,
            &format!("segment '{}' clip", segment.name),
        )?;
    }

    manifest.audio =
        resolve_and_validate_asset_path(&manifest_dir, &manifest.audio, "manifest audio")?;

    for (alias, canonical) in &manifest.aliases {
        if alias.is_empty() || canonical.is_empty() {
            bail!("empty alias entry '{alias}' -> '{canonical}'");
        }
    }

    Ok(())
}

fn resolve_and_validate_asset_path(
    manifest_dir: &Path,
    source_path: &Path,
    label: &str,
) -> Result<PathBuf> {
    let resolved = if source_path.is_absolute() {
        source_path.to_path_buf()
    } else {
        manifest_dir.join(source_path)
    };

    if !resolved.exists() {
        bail!("{} does not exist: {}", label, resolved.display());
    }

    if !resolved.is_file() {
        bail!("{} is not a file: {}", label, resolved.display());
    }

    Ok(resolved)
}
