use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const STORE_DIR: &str = "store/";
pub const BUNDLE_FORMAT_V1: &str = "recordbook-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub restored_files: Vec<String>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Bundles the named store files of `workspace` into a zip at `out_path`.
/// Files that do not exist are left out of the bundle.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    store_files: &[&str],
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let mut contents: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    for name in store_files {
        let p = workspace_path.join(name);
        if !p.is_file() {
            continue;
        }
        let bytes = std::fs::read(&p)
            .with_context(|| format!("failed to read store file {}", p.to_string_lossy()))?;
        contents.insert(name.to_string(), bytes);
    }
    if contents.is_empty() {
        return Err(anyhow!(
            "no store files found in workspace {}",
            workspace_path.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let checksums: BTreeMap<&str, String> = contents
        .iter()
        .map(|(name, bytes)| (name.as_str(), sha256_hex(bytes)))
        .collect();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "files": checksums,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (name, bytes) in &contents {
        zip.start_file(format!("{STORE_DIR}{name}"), opts)
            .with_context(|| format!("failed to start entry for {name}"))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write entry for {name}"))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: contents.len() + 1,
    })
}

/// Restores store files from a bundle. Only names listed in `store_files`
/// are accepted, and every entry is read and checksummed before the first
/// file in the workspace is replaced.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
    store_files: &[&str],
) -> anyhow::Result<ImportSummary> {
    if !is_zip_file(in_path)? {
        return Err(anyhow!(
            "not a zip bundle: {}",
            in_path.to_string_lossy()
        ));
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let files = manifest
        .get("files")
        .and_then(|v| v.as_object())
        .ok_or_else(|| anyhow!("manifest.json has no file list"))?;

    let mut verified: Vec<(String, Vec<u8>)> = Vec::new();
    for (name, expected) in files {
        if !store_files.contains(&name.as_str()) {
            return Err(anyhow!("unexpected file in manifest: {}", name));
        }
        let expected = expected
            .as_str()
            .ok_or_else(|| anyhow!("checksum for {} is not a string", name))?;
        let mut bytes = Vec::new();
        archive
            .by_name(&format!("{STORE_DIR}{name}"))
            .with_context(|| format!("bundle missing {STORE_DIR}{name}"))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read {STORE_DIR}{name}"))?;
        let actual = sha256_hex(&bytes);
        if actual != expected {
            return Err(anyhow!(
                "checksum mismatch for {}: expected {}, got {}",
                name,
                expected,
                actual
            ));
        }
        verified.push((name.clone(), bytes));
    }

    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;

    let mut restored_files = Vec::new();
    for (name, bytes) in verified {
        let dst = workspace_path.join(&name);
        let tmp_dst = workspace_path.join(format!("{name}.importing"));
        let mut out = File::create(&tmp_dst).with_context(|| {
            format!("failed to create temp file {}", tmp_dst.to_string_lossy())
        })?;
        out.write_all(&bytes)
            .and_then(|_| out.flush())
            .with_context(|| format!("failed to write {}", tmp_dst.to_string_lossy()))?;
        std::fs::rename(&tmp_dst, &dst).with_context(|| {
            format!("failed to move restored file to {}", dst.to_string_lossy())
        })?;
        restored_files.push(name);
    }

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        restored_files,
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
