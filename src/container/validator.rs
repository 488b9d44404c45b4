//! Structural validation that never panics or throws: callers get back a
//! list of problems (empty = valid) instead of the first error encountered,
//! so tooling can report everything wrong with a container in one pass.

use std::path::Path;

use crate::container::format::{align_up, DType, TensorDirEntry, DIR_ENTRY_SIZE, MAGIC};
use crate::container::writer::manifest_path_for;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    BadMagic,
    UnsupportedVersion(u32),
    MetadataOverrun,
    DirectoryTruncated,
    DataOverlap { first: String, second: String },
    SizeInconsistent { tensor: String },
    MissingSidecarManifest,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::BadMagic => write!(f, "bad magic bytes"),
            ValidationIssue::UnsupportedVersion(v) => write!(f, "unsupported version {v}"),
            ValidationIssue::MetadataOverrun => write!(f, "metadata region overruns file"),
            ValidationIssue::DirectoryTruncated => write!(f, "tensor directory truncated"),
            ValidationIssue::DataOverlap { first, second } => {
                write!(f, "tensor payloads overlap: '{first}' and '{second}'")
            }
            ValidationIssue::SizeInconsistent { tensor } => {
                write!(f, "tensor '{tensor}' declared length doesn't match its dims/dtype")
            }
            ValidationIssue::MissingSidecarManifest => write!(f, "missing sidecar manifest file"),
        }
    }
}

/// Validates `path` byte-for-byte. Returns every issue found; an empty
/// vector means the container is structurally sound.
pub fn validate_container(path: &Path) -> Vec<ValidationIssue> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(_) => return vec![ValidationIssue::BadMagic],
    };

    let mut issues = Vec::new();

    if bytes.len() < 20 || &bytes[0..8] != MAGIC {
        issues.push(ValidationIssue::BadMagic);
        return issues;
    }

    let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    if version != crate::container::format::VERSION {
        issues.push(ValidationIssue::UnsupportedVersion(version));
        return issues;
    }

    let tensor_count = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
    let metadata_len = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;
    let metadata_start = 20usize;
    let metadata_end = metadata_start + metadata_len;
    if metadata_end > bytes.len() {
        issues.push(ValidationIssue::MetadataOverrun);
        return issues;
    }

    let dir_start = metadata_end;
    let dir_len = tensor_count * DIR_ENTRY_SIZE;
    let dir_end = dir_start + dir_len;
    if dir_end > bytes.len() {
        issues.push(ValidationIssue::DirectoryTruncated);
        return issues;
    }

    let mut entries = Vec::with_capacity(tensor_count);
    for i in 0..tensor_count {
        let start = dir_start + i * DIR_ENTRY_SIZE;
        match TensorDirEntry::from_bytes(&bytes[start..start + DIR_ENTRY_SIZE]) {
            Ok(e) => entries.push(e),
            Err(_) => {
                issues.push(ValidationIssue::DirectoryTruncated);
                return issues;
            }
        }
    }

    for entry in &entries {
        if let Err(_) = check_size_consistency(entry) {
            issues.push(ValidationIssue::SizeInconsistent {
                tensor: entry.name.clone(),
            });
        }
    }

    let mut spans: Vec<(u64, u64, &str)> = Vec::new();
    for entry in &entries {
        if entry.data_length > 0 {
            spans.push((entry.data_offset, entry.data_offset + entry.data_length, &entry.name));
        }
        if entry.scale_length > 0 {
            spans.push((entry.scale_offset, entry.scale_offset + entry.scale_length, &entry.name));
        }
    }
    spans.sort_by_key(|s| s.0);
    for w in spans.windows(2) {
        let (start_a, end_a, name_a) = w[0];
        let (start_b, _, name_b) = w[1];
        if start_b < end_a && name_a != name_b {
            issues.push(ValidationIssue::DataOverlap {
                first: name_a.to_string(),
                second: name_b.to_string(),
            });
        }
        let _ = start_a;
    }

    if !manifest_path_for(path).exists() {
        issues.push(ValidationIssue::MissingSidecarManifest);
    }

    issues
}

fn check_size_consistency(entry: &TensorDirEntry) -> Result<(), ()> {
    if entry.dims.len() != 2 {
        return Err(());
    }
    let elems = entry.dims[0] as usize * entry.dims[1] as usize;
    let expected_data_len = match entry.dtype {
        DType::F32 => elems * 4,
        DType::Q8_0 | DType::Q4_K => return Ok(()), // block-size dependent, checked at load time
        DType::Q4_0 | DType::Q4_1 => elems.div_ceil(2),
        DType::Q6_K => elems,
    };
    if entry.dtype == DType::F32 && entry.data_length as usize != expected_data_len {
        return Err(());
    }
    let _ = align_up(0);
    Ok(())
}
