use crate::config::Settings;
use crate::dataset::{Dataset, RelationTables};
use crate::table::{file_label, StagedWrite, Table};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
pub const BUNDLE_FORMAT_V1: &str = "gradebook-tables-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    version: u32,
    app_version: String,
    exported_at: u64,
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
    table: String,
    path: String,
    sha256: String,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub tables_restored: usize,
}

/// Bundle entry name paired with the configured file it maps to.
fn table_entries(settings: &Settings) -> [(&'static str, PathBuf); 4] {
    [
        ("students", settings.students_file.clone()),
        ("grades", settings.grades_file.clone()),
        ("groups", settings.groups_file.clone()),
        ("students_in_groups", settings.membership_file.clone()),
    ]
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn export_tables_bundle(settings: &Settings, out_path: &Path) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let mut payloads: Vec<(String, Vec<u8>)> = Vec::new();
    let mut entries: Vec<ManifestEntry> = Vec::new();
    for (table, path) in table_entries(settings) {
        let bytes = std::fs::read(&path)
            .with_context(|| format!("failed to read table {}", path.to_string_lossy()))?;
        let entry_path = format!("tables/{table}.csv");
        entries.push(ManifestEntry {
            table: table.to_string(),
            path: entry_path.clone(),
            sha256: sha256_hex(&bytes),
        });
        payloads.push((entry_path, bytes));
    }

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        version: 1,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at,
        entries,
    };

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (entry_path, bytes) in &payloads {
        zip.start_file(entry_path.as_str(), opts)
            .with_context(|| format!("failed to start entry {entry_path}"))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write entry {entry_path}"))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;
    tracing::info!(path = %out_path.display(), entries = payloads.len() + 1, "bundle exported");

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: payloads.len() + 1,
    })
}

fn parse_restored(dst: &Path, bytes: &[u8]) -> anyhow::Result<Table> {
    let label = file_label(dst);
    let text = std::str::from_utf8(bytes).with_context(|| format!("{label} is not valid UTF-8"))?;
    Ok(Table::parse(&label, text)?)
}

/// Restores all four tables from a bundle. Every entry is verified against
/// the manifest, and the tables must load as a dataset, before any file is
/// replaced.
pub fn import_tables_bundle(in_path: &Path, settings: &Settings) -> anyhow::Result<ImportSummary> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: Manifest =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    let mut restored: Vec<(PathBuf, Vec<u8>)> = Vec::new();
    for (table, dst) in table_entries(settings) {
        let entry = manifest
            .entries
            .iter()
            .find(|e| e.table == table)
            .ok_or_else(|| anyhow!("bundle manifest has no {table} table"))?;
        let mut bytes = Vec::new();
        archive
            .by_name(&entry.path)
            .with_context(|| format!("bundle missing {}", entry.path))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read {}", entry.path))?;
        let actual = sha256_hex(&bytes);
        if actual != entry.sha256.to_ascii_lowercase() {
            return Err(anyhow!(
                "checksum mismatch for {}: expected {} actual {}",
                entry.path,
                entry.sha256,
                actual
            ));
        }
        restored.push((dst, bytes));
    }

    let tables: [Table; 4] = restored
        .iter()
        .map(|(dst, bytes)| parse_restored(dst, bytes))
        .collect::<anyhow::Result<Vec<Table>>>()?
        .try_into()
        .map_err(|_| anyhow!("bundle must hold exactly four tables"))?;
    let [students, grades, groups, membership] = tables;
    Dataset::from_tables(&RelationTables {
        students,
        grades,
        groups,
        membership,
    })
    .context("bundle tables do not load as a dataset")?;

    let mut staged = StagedWrite::new();
    for (dst, bytes) in &restored {
        staged.stage_bytes(dst, bytes)?;
    }
    staged.commit()?;
    tracing::info!(path = %in_path.display(), tables = restored.len(), "bundle imported");

    Ok(ImportSummary {
        bundle_format_detected: manifest.format,
        tables_restored: restored.len(),
    })
}
