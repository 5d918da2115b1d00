//! ROM image layout, splitting into per-chip files and comparison against
//! reference dumps.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::info;

use crate::{
    diag::{Diag, Severity},
    line::{ADDRESS_SPACE, Line},
};

/// One chip of the target board, declared with `.rom`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RomDef {
    pub filename: String,
    pub size: usize,
    pub offset: usize,
    /// Upper-case hex digest as written in the source.
    pub sha1: String,
}

impl RomDef {
    /// Parses `filename size sha1 offset`, size in decimal and offset in hex.
    pub fn parse(text: &str) -> Option<Self> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        let [filename, size, sha1, offset] = fields.as_slice() else {
            return None;
        };
        let offset = *offset;
        let offset = offset
            .strip_prefix('$')
            .or_else(|| offset.strip_prefix("0x"))
            .unwrap_or(offset);
        let size: usize = size.parse().ok()?;
        let offset = usize::from_str_radix(offset, 16).ok()?;
        offset
            .checked_add(size)
            .filter(|end| *end <= ADDRESS_SPACE as usize)?;
        Some(Self {
            filename: filename.to_string(),
            size,
            offset,
            sha1: sha1.to_ascii_uppercase(),
        })
    }

    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.size)
    }
}

#[derive(Debug, Error)]
pub enum RomError {
    #[error("rom `{filename}` covers 0x{offset:04X}..0x{end:04X} but the image ends at 0x{image_len:04X}")]
    OutOfRange {
        filename: String,
        offset: usize,
        end: usize,
        image_len: usize,
    },
    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("{} is {actual} bytes but its .rom declares {expected}", path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
    #[error("File {filename} SHA-1 of {actual} should be {expected}")]
    ChecksumMismatch {
        filename: String,
        expected: String,
        actual: String,
    },
}

/// Upper-case hex SHA-1 of `data`, the form `.rom` declares.
pub fn sha1_hex(data: &[u8]) -> String {
    Sha1::digest(data)
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect()
}

/// Bytes indexed by absolute address; unfilled regions are zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RomImage {
    bytes: Vec<u8>,
}

impl RomImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Places every line with an address and a non-zero length, warning on
    /// gaps and overlaps between consecutive lines.
    pub fn build(lines: &[Line]) -> (Self, Vec<Diag>) {
        let mut diags = Vec::new();
        let mut placed: Vec<(u32, u32, &Line)> = Vec::new();
        for line in lines {
            let (Some(address), Some(length)) = (line.address, line.length) else {
                continue;
            };
            if length == 0 {
                continue;
            }
            match line.end_address().filter(|_| address < ADDRESS_SPACE) {
                Some(end) => placed.push((address, end, line)),
                None => diags.push(Diag::warning(
                    line.file,
                    line.span.clone(),
                    format!("Address 0x{address:X} is outside the address space; line not placed"),
                )),
            }
        }
        placed.sort_by_key(|(address, _, _)| *address);

        let Some(&(first, _, _)) = placed.first() else {
            return (Self::default(), diags);
        };
        let size = placed
            .iter()
            .map(|(_, end, _)| *end as usize)
            .max()
            .unwrap_or_default();
        let mut bytes = vec![0u8; size];

        let mut cursor = first;
        for (address, end, line) in placed {
            if address > cursor {
                diags.push(
                    Diag::warning(
                        line.file,
                        line.span.clone(),
                        format!("Address 0x{cursor:04X} not accounted for in ROM"),
                    )
                    .with_help(format!(
                        "0x{:X} byte(s) up to 0x{:04X} are zero-filled",
                        address - cursor,
                        address - 1
                    )),
                );
            } else if address < cursor {
                diags.push(Diag::warning(
                    line.file,
                    line.span.clone(),
                    format!("Address 0x{address:04X} overlaps bytes placed up to 0x{cursor:04X}"),
                ));
            }

            let start = address as usize;
            let count = line.data.len().min((end - address) as usize);
            bytes[start..start + count].copy_from_slice(&line.data[..count]);
            cursor = end;
        }

        (Self { bytes }, diags)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Writes each declared slice of `image` to `dir/<filename>.out`.
pub fn split(image: &RomImage, defs: &[RomDef], dir: &Path) -> Result<Vec<PathBuf>, RomError> {
    let mut written = Vec::with_capacity(defs.len());
    for def in defs {
        let Some(slice) = image.bytes.get(def.offset..def.end()) else {
            return Err(RomError::OutOfRange {
                filename: def.filename.clone(),
                offset: def.offset,
                end: def.end(),
                image_len: image.len(),
            });
        };
        let path = dir.join(format!("{}.out", def.filename));
        fs::write(&path, slice).map_err(|source| RomError::Write {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), bytes = slice.len(), "rom split written");
        written.push(path);
    }
    Ok(written)
}

/// Reads every declared chip from `dir` into one image at its offset, checking
/// each file's size and SHA-1 against its `.rom` declaration.
pub fn load_reference(dir: &Path, defs: &[RomDef]) -> Result<RomImage, RomError> {
    let size = defs.iter().map(RomDef::end).max().unwrap_or_default();
    let mut bytes = vec![0u8; size];
    for def in defs {
        let path = dir.join(&def.filename);
        let data = fs::read(&path).map_err(|source| RomError::Read {
            path: path.clone(),
            source,
        })?;
        if data.len() != def.size {
            return Err(RomError::SizeMismatch {
                path,
                expected: def.size,
                actual: data.len(),
            });
        }
        let digest = sha1_hex(&data);
        if digest != def.sha1 {
            return Err(RomError::ChecksumMismatch {
                filename: def.filename.clone(),
                expected: def.sha1.clone(),
                actual: digest,
            });
        }
        bytes[def.offset..def.end()].copy_from_slice(&data);
        info!(path = %path.display(), "reference rom read");
    }
    Ok(RomImage { bytes })
}

#[derive(Clone, Debug, Default)]
pub struct Verification {
    /// Lines whose bytes differ from the reference.
    pub line_mismatches: usize,
    pub image_matches: bool,
    pub diags: Vec<Diag>,
}

impl Verification {
    pub fn is_clean(&self) -> bool {
        self.line_mismatches == 0 && self.image_matches
    }
}

/// Compares each line's bytes and then the whole image against `reference`.
/// At most `max_reports` line mismatches are reported individually.
pub fn verify(
    image: &RomImage,
    lines: &[Line],
    reference: &RomImage,
    max_reports: usize,
) -> Verification {
    let mut result = Verification::default();

    for line in lines {
        let Some(address) = line.address.map(|address| address as usize) else {
            continue;
        };
        let Some(first) = (0..line.data.len())
            .find(|&idx| reference.bytes.get(address + idx) != Some(&line.data[idx]))
        else {
            continue;
        };

        result.line_mismatches += 1;
        if result.line_mismatches > max_reports {
            continue;
        }
        let pairs: Vec<String> = line.data[first..]
            .iter()
            .enumerate()
            .map(|(offset, ours)| match reference.bytes.get(address + first + offset) {
                Some(correct) => format!("({correct:02X},{ours:02X})"),
                None => format!("(--,{ours:02X})"),
            })
            .collect();
        result.diags.push(
            Diag::error(
                line.file,
                line.span.clone(),
                format!("Data mismatch at address 0x{:04X} {line}", address + first),
            )
            .with_help(format!("(correct,ours): {}", pairs.join(" "))),
        );
    }
    if result.line_mismatches > max_reports {
        result.diags.push(Diag::global(
            Severity::Note,
            format!(
                "{} more mismatching line(s) not shown",
                result.line_mismatches - max_reports
            ),
        ));
    }

    let first_difference = image
        .bytes
        .iter()
        .zip(&reference.bytes)
        .position(|(ours, correct)| ours != correct);
    result.image_matches = image.len() == reference.len() && first_difference.is_none();
    if image.len() != reference.len() {
        let mut message = format!(
            "ROM lengths different: correct is 0x{:X}, assembled is 0x{:X}",
            reference.len(),
            image.len()
        );
        if let Some(at) = first_difference {
            message.push_str(&format!("; first byte mismatch at 0x{at:04X}"));
        }
        result.diags.push(Diag::global(Severity::Error, message));
    } else if let Some(at) = first_difference {
        result.diags.push(Diag::global(
            Severity::Error,
            format!("ROM images differ at address 0x{at:04X}"),
        ));
    }

    info!(
        line_mismatches = result.line_mismatches,
        image_matches = result.image_matches,
        "verification finished"
    );
    result
}
