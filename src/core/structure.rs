use std::collections::BTreeSet;
use std::fmt;
use std::io::{BufReader, Cursor};

use pdbtbx::{PDB, PDBError, ReadOptions};
use serde::Serialize;

use crate::core::error::{Error, Result};

/// Residue names treated as solvent water.
pub const WATER_RESIDUES: [&str; 4] = ["HOH", "H2O", "WAT", "DOD"];

/// Coordinate records must reach the residue sequence number (columns 23-26).
const MIN_COORD_LINE_LEN: usize = 26;

/// Classification of a single line of a PDB file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Atom,
    Hetatm,
    Water,
    Terminator,
    Model,
    EndModel,
    End,
    Connect,
    Other,
}

impl RecordKind {
    /// Whether the record carries atomic coordinates.
    pub fn is_coordinate(&self) -> bool {
        matches!(self, RecordKind::Atom | RecordKind::Hetatm | RecordKind::Water)
    }

    /// Chain and model delimiters, which a cleaned file keeps even without atoms.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            RecordKind::Terminator | RecordKind::Model | RecordKind::EndModel | RecordKind::End
        )
    }
}

/// One line of a structure file, classified and with its identifying columns extracted.
///
/// The raw line is kept verbatim so a retained record is re-emitted byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub kind: RecordKind,
    /// Chain identifier (column 22). For a bare `TER` this is the chain of the
    /// coordinate record it terminates.
    pub chain_id: Option<String>,
    /// Residue name (columns 18-20), upper-cased.
    pub residue_name: String,
    pub line: String,
}

impl Record {
    /// Whether this is a `HETATM` record in the PDB sense (waters included).
    pub fn is_hetero(&self) -> bool {
        self.kind == RecordKind::Hetatm
            || (self.kind == RecordKind::Water && self.line.starts_with("HETATM"))
    }
}

/// An ordered sequence of records parsed from one structure file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureFile {
    records: Vec<Record>,
}

impl StructureFile {
    pub fn new(records: Vec<Record>) -> Self {
        StructureFile { records }
    }

    /// Parses the raw bytes of a PDB file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] when the bytes are not UTF-8, when a coordinate
    /// record is too short to carry its chain and residue columns, or when the file
    /// holds neither coordinates nor a structural record (e.g. an HTML error page).
    /// A file reduced to `END` by cleaning parses as an empty structure.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let content = std::str::from_utf8(bytes).map_err(|e| {
            let line = bytes[..e.valid_up_to()].iter().filter(|&&b| b == b'\n').count() + 1;
            Error::malformed(line, "file is not valid UTF-8 text")
        })?;

        let mut records = Vec::new();
        let mut last_chain: Option<String> = None;

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let record = parse_line(line, index + 1, last_chain.as_deref())?;
            if record.kind.is_coordinate() {
                last_chain = record.chain_id.clone();
            }
            records.push(record);
        }

        if !records.iter().any(|r| r.kind.is_coordinate() || r.kind.is_structural()) {
            return Err(Error::malformed(0, "no ATOM, HETATM, TER, MODEL or END records found"));
        }

        Ok(StructureFile { records })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records carrying coordinates.
    pub fn atom_count(&self) -> usize {
        self.records.iter().filter(|r| r.kind.is_coordinate()).count()
    }

    /// Chain identifiers of the coordinate records, sorted.
    pub fn chain_ids(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .filter(|r| r.kind.is_coordinate())
            .filter_map(|r| r.chain_id.clone())
            .collect()
    }

    /// Serializes the records in order, one line each.
    pub fn to_pdb_string(&self) -> String {
        let mut output = String::with_capacity(self.records.iter().map(|r| r.line.len() + 1).sum());
        for record in &self.records {
            output.push_str(&record.line);
            output.push('\n');
        }
        output
    }
}

impl FromIterator<Record> for StructureFile {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        StructureFile::new(iter.into_iter().collect())
    }
}

/// Extracts a fixed-width column range, tolerating short lines.
fn column(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    if start >= end {
        return "";
    }
    line.get(start..end).unwrap_or("")
}

fn parse_line(line: &str, line_number: usize, last_chain: Option<&str>) -> Result<Record> {
    let name = column(line, 0, 6).trim_end();

    let kind = match name {
        "ATOM" | "HETATM" => {
            if line.len() < MIN_COORD_LINE_LEN {
                return Err(Error::malformed(
                    line_number,
                    format!(
                        "{} record has {} columns, at least {} are required",
                        name,
                        line.len(),
                        MIN_COORD_LINE_LEN
                    ),
                ));
            }
            let residue = column(line, 17, 20).trim().to_uppercase();
            if WATER_RESIDUES.contains(&residue.as_str()) {
                RecordKind::Water
            } else if name == "ATOM" {
                RecordKind::Atom
            } else {
                RecordKind::Hetatm
            }
        }
        "TER" => RecordKind::Terminator,
        "MODEL" => RecordKind::Model,
        "ENDMDL" => RecordKind::EndModel,
        "END" => RecordKind::End,
        "CONECT" | "MASTER" => RecordKind::Connect,
        _ => RecordKind::Other,
    };

    let chain_id = match kind {
        RecordKind::Atom | RecordKind::Hetatm | RecordKind::Water => chain_column(line),
        RecordKind::Terminator => chain_column(line).or_else(|| last_chain.map(str::to_string)),
        _ => None,
    };

    let residue_name = match kind {
        RecordKind::Atom | RecordKind::Hetatm | RecordKind::Water | RecordKind::Terminator => {
            column(line, 17, 20).trim().to_uppercase()
        }
        _ => String::new(),
    };

    Ok(Record {
        kind,
        chain_id,
        residue_name,
        line: line.to_string(),
    })
}

fn chain_column(line: &str) -> Option<String> {
    let chain = column(line, 21, 22).trim();
    if chain.is_empty() {
        None
    } else {
        Some(chain.to_string())
    }
}

/// Counts taken from a full parse of a written structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureSummary {
    pub chains: Vec<String>,
    pub residues: usize,
    pub atoms: usize,
}

impl fmt::Display for StructureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} chain(s) [{}], {} residue(s), {} atom(s)",
            self.chains.len(),
            self.chains.join(","),
            self.residues,
            self.atoms
        )
    }
}

/// Re-reads PDB content with pdbtbx and summarises it.
///
/// Used as a sanity check on cleaned output: anything pdbtbx refuses to read in loose
/// mode is unlikely to be accepted by the external tool either.
pub fn summarize_pdb(content: &str) -> std::result::Result<StructureSummary, Vec<PDBError>> {
    let pdb = load_pdb_from_content(content)?;
    Ok(StructureSummary {
        chains: pdb.chains().map(|chain| chain.id().to_string()).collect(),
        residues: pdb.residues().count(),
        atoms: pdb.atoms().count(),
    })
}

/// Loads a PDB structure from string content
///
/// # Arguments
/// * `content` - PDB file contents as a string
///
/// # Returns
/// Result containing either the parsed PDB or a list of errors
pub fn load_pdb_from_content(content: &str) -> std::result::Result<PDB, Vec<PDBError>> {
    let processed_content = process_pdb_string(content);

    let mut opts = ReadOptions::new();
    opts.set_format(pdbtbx::Format::Pdb)
        .set_level(pdbtbx::StrictnessLevel::Loose);

    let cursor = Cursor::new(processed_content.into_bytes());
    let reader = BufReader::new(cursor);

    match opts.read_raw(reader) {
        Ok((pdb, _)) => Ok(pdb),
        Err(e) => Err(e),
    }
}

/// Drops REMARK lines and pads short lines to 80 columns, which pdbtbx expects.
fn process_pdb_string(content: &str) -> String {
    let mut output = String::with_capacity(content.len());

    for line in content.lines() {
        if !line.starts_with("REMARK") {
            output.push_str(line);
            if line.len() < 80 {
                output.push_str(&" ".repeat(80 - line.len()));
            }
            output.push('\n');
        }
    }

    output
}
