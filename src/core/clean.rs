//! Record-level cleanup that strips solvent, heterogens and unwanted chains from a
//! parsed structure before it is handed to the external toolkit.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::structure::{Record, RecordKind, StructureFile};

/// Switches describing which records survive cleaning.
///
/// `keep_ligands` always overrides `remove_heteroatoms` for a matching residue name,
/// and also exempts that ligand from chain filtering. Water removal is never overridden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Strip water residues (HOH, H2O, WAT, DOD).
    pub remove_water: bool,
    /// Strip HETATM records whose residue is not listed in `keep_ligands`.
    pub remove_heteroatoms: bool,
    /// Chains to keep; empty keeps every chain.
    pub keep_chains: BTreeSet<String>,
    /// Residue names exempt from heteroatom removal and chain filtering.
    pub keep_ligands: BTreeSet<String>,
    /// Keep HEADER/REMARK/SEQRES and other non-coordinate annotation records.
    pub keep_metadata: bool,
}

impl Default for FilterSpec {
    fn default() -> Self {
        FilterSpec {
            remove_water: true,
            remove_heteroatoms: true,
            keep_chains: BTreeSet::new(),
            keep_ligands: BTreeSet::new(),
            keep_metadata: false,
        }
    }
}

impl FilterSpec {
    /// A filter that keeps everything except metadata.
    pub fn keep_all() -> Self {
        FilterSpec {
            remove_water: false,
            remove_heteroatoms: false,
            ..Default::default()
        }
    }

    pub fn with_chains<I, S>(mut self, chains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keep_chains = build_name_set(chains);
        self
    }

    pub fn with_ligands<I, S>(mut self, ligands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keep_ligands = build_name_set(ligands);
        self
    }

    fn chain_allowed(&self, chain_id: Option<&str>) -> bool {
        if self.keep_chains.is_empty() {
            return true;
        }
        match chain_id {
            Some(chain) => self.keep_chains.iter().any(|c| c.eq_ignore_ascii_case(chain)),
            None => false,
        }
    }

    fn ligand_kept(&self, record: &Record) -> bool {
        record.is_hetero()
            && self
                .keep_ligands
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&record.residue_name))
    }
}

/// Normalises a list of chain or residue names: trimmed, upper-cased, blanks dropped.
pub fn build_name_set<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| name.as_ref().trim().to_uppercase())
        .filter(|name| !name.is_empty())
        .collect()
}

/// How many coordinate records each rule removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanSummary {
    pub waters: usize,
    pub heteroatoms: usize,
    pub chains: usize,
}

impl CleanSummary {
    pub fn total(&self) -> usize {
        self.waters + self.heteroatoms + self.chains
    }
}

/// Why a coordinate record was dropped; the first matching rule wins.
enum Removal {
    Water,
    Hetero,
    Chain,
}

fn removal_reason(record: &Record, spec: &FilterSpec) -> Option<Removal> {
    if record.kind == RecordKind::Water && spec.remove_water {
        return Some(Removal::Water);
    }

    let ligand_kept = spec.ligand_kept(record);

    if !ligand_kept && spec.remove_heteroatoms && record.is_hetero() {
        return Some(Removal::Hetero);
    }

    if !ligand_kept && !spec.chain_allowed(record.chain_id.as_deref()) {
        return Some(Removal::Chain);
    }

    None
}

/// Applies the filter to `structure` and returns the cleaned structure.
///
/// See [`clean_with_summary`].
pub fn clean(structure: StructureFile, spec: &FilterSpec) -> StructureFile {
    clean_with_summary(structure, spec).0
}

/// Applies the filter preserving record order, also reporting what was removed.
///
/// Coordinate records are dropped by the water, heteroatom and chain rules. `TER`
/// records are kept only when at least one coordinate record of their chain survives
/// the chain rule on its own,
/// MODEL/ENDMDL/END are always kept, CONECT/MASTER are always dropped because they
/// refer to serials and counts that may no longer exist, and other records follow
/// `keep_metadata`.
///
/// Filtering everything away is not an error: the result is then a structure with no
/// coordinate records, and callers decide what to do with it.
pub fn clean_with_summary(structure: StructureFile, spec: &FilterSpec) -> (StructureFile, CleanSummary) {
    let mut summary = CleanSummary::default();
    let mut dropped = vec![false; structure.len()];
    let mut surviving_chains: HashSet<String> = HashSet::new();

    for (index, record) in structure.records().iter().enumerate() {
        if !record.kind.is_coordinate() {
            continue;
        }
        match removal_reason(record, spec) {
            Some(Removal::Water) => summary.waters += 1,
            Some(Removal::Hetero) => summary.heteroatoms += 1,
            Some(Removal::Chain) => summary.chains += 1,
            None => {
                // Ligands kept from an excluded chain do not keep its terminator.
                if let Some(chain) = record.chain_id.as_ref().filter(|c| spec.chain_allowed(Some(c))) {
                    surviving_chains.insert(chain.clone());
                }
                continue;
            }
        }
        dropped[index] = true;
    }

    let records = structure
        .into_records()
        .into_iter()
        .zip(dropped)
        .filter_map(|(record, dropped)| {
            let keep = match record.kind {
                RecordKind::Atom | RecordKind::Hetatm | RecordKind::Water => !dropped,
                RecordKind::Terminator => record
                    .chain_id
                    .as_ref()
                    .is_some_and(|chain| surviving_chains.contains(chain)),
                RecordKind::Model | RecordKind::EndModel | RecordKind::End => true,
                RecordKind::Connect => false,
                RecordKind::Other => spec.keep_metadata,
            };
            keep.then_some(record)
        })
        .collect();

    (StructureFile::new(records), summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(record: &str, serial: usize, res: &str, chain: &str, seq: i32) -> String {
        format!(
            "{:<6}{:>5} {:<4} {:>3} {:1}{:>4}    {:>8.3}{:>8.3}{:>8.3}{:>6.2}{:>6.2}          {:>2}",
            record, serial, "X", res, chain, seq, 0.0, 0.0, 0.0, 1.0, 0.0, "C"
        )
    }

    fn ter(serial: usize, res: &str, chain: &str, seq: i32) -> String {
        format!("{:<6}{:>5}      {:>3} {:1}{:>4}", "TER", serial, res, chain, seq)
    }

    fn sample() -> StructureFile {
        let content = [
            "HEADER    HYDROLASE".to_string(),
            "REMARK   2 RESOLUTION. 2.10 ANGSTROMS.".to_string(),
            line("ATOM", 1, "ALA", "A", 1),
            line("ATOM", 2, "GLY", "A", 2),
            ter(3, "GLY", "A", 2),
            line("ATOM", 4, "SER", "B", 1),
            ter(5, "SER", "B", 1),
            line("HETATM", 6, "NAG", "A", 101),
            line("HETATM", 7, "ZN", "B", 102),
            line("HETATM", 8, "HOH", "A", 201),
            line("HETATM", 9, "HOH", "B", 202),
            "CONECT    6    7".to_string(),
            "END".to_string(),
        ]
        .join("\n");
        StructureFile::parse(content.as_bytes()).unwrap()
    }

    fn residues(structure: &StructureFile) -> Vec<String> {
        structure
            .records()
            .iter()
            .filter(|r| r.kind.is_coordinate())
            .map(|r| r.residue_name.clone())
            .collect()
    }

    #[test]
    fn test_default_filter_removes_water_and_hetero() {
        let (cleaned, summary) = clean_with_summary(sample(), &FilterSpec::default());

        assert_eq!(residues(&cleaned), vec!["ALA", "GLY", "SER"]);
        assert_eq!(
            summary,
            CleanSummary {
                waters: 2,
                heteroatoms: 2,
                chains: 0
            }
        );
        // both chains survive, so both terminators stay; metadata and CONECT are gone
        let kinds: Vec<RecordKind> = cleaned.records().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RecordKind::Atom,
                RecordKind::Atom,
                RecordKind::Terminator,
                RecordKind::Atom,
                RecordKind::Terminator,
                RecordKind::End,
            ]
        );
    }

    #[test]
    fn test_keep_chains_drops_other_chains_and_their_terminators() {
        let spec = FilterSpec::default().with_chains(["a"]);
        let (cleaned, summary) = clean_with_summary(sample(), &spec);

        assert_eq!(residues(&cleaned), vec!["ALA", "GLY"]);
        assert_eq!(summary.chains, 1);
        assert!(
            cleaned
                .records()
                .iter()
                .filter(|r| r.kind.is_coordinate())
                .all(|r| r.chain_id.as_deref() == Some("A"))
        );
        let terminators: Vec<_> = cleaned
            .records()
            .iter()
            .filter(|r| r.kind == RecordKind::Terminator)
            .collect();
        assert_eq!(terminators.len(), 1);
        assert_eq!(terminators[0].chain_id.as_deref(), Some("A"));
    }

    #[test]
    fn test_keep_ligands_overrides_hetero_removal() {
        let spec = FilterSpec::default().with_ligands(["nag"]);
        let cleaned = clean(sample(), &spec);
        assert_eq!(residues(&cleaned), vec!["ALA", "GLY", "SER", "NAG"]);

        let cleaned = clean(sample(), &FilterSpec::default());
        assert!(!residues(&cleaned).contains(&"NAG".to_string()));
    }

    #[test]
    fn test_keep_ligands_wins_over_chain_filter() {
        let spec = FilterSpec::default().with_chains(["B"]).with_ligands(["NAG"]);
        let cleaned = clean(sample(), &spec);
        assert_eq!(residues(&cleaned), vec!["SER", "NAG"]);

        // the ligand alone does not bring back chain A's terminator
        let terminators: Vec<_> = cleaned
            .records()
            .iter()
            .filter(|r| r.kind == RecordKind::Terminator)
            .filter_map(|r| r.chain_id.as_deref())
            .collect();
        assert_eq!(terminators, vec!["B"]);
    }

    #[test]
    fn test_kept_water_listed_as_ligand_survives_hetero_removal() {
        let spec = FilterSpec {
            remove_water: false,
            ..Default::default()
        }
        .with_ligands(["HOH"]);
        let (cleaned, summary) = clean_with_summary(sample(), &spec);

        assert_eq!(residues(&cleaned), vec!["ALA", "GLY", "SER", "HOH", "HOH"]);
        assert_eq!(summary.waters, 0);
        assert_eq!(summary.heteroatoms, 2);
    }

    #[test]
    fn test_keep_ligands_does_not_rescue_water() {
        let spec = FilterSpec::default().with_ligands(["HOH"]);
        let cleaned = clean(sample(), &spec);
        assert!(cleaned.records().iter().all(|r| r.kind != RecordKind::Water));
    }

    #[test]
    fn test_keep_all_keeps_every_coordinate_record() {
        let (cleaned, summary) = clean_with_summary(sample(), &FilterSpec::keep_all());
        assert_eq!(cleaned.atom_count(), 7);
        assert_eq!(summary.total(), 0);
        assert!(cleaned.records().iter().all(|r| r.kind != RecordKind::Other));
    }

    #[test]
    fn test_keep_metadata() {
        let spec = FilterSpec {
            keep_metadata: true,
            ..Default::default()
        };
        let cleaned = clean(sample(), &spec);
        assert!(cleaned.records()[0].line.starts_with("HEADER"));
        assert!(cleaned.records()[1].line.starts_with("REMARK"));
        assert!(cleaned.records().iter().all(|r| r.kind != RecordKind::Connect));
    }

    #[test]
    fn test_filtering_everything_is_not_an_error() {
        let spec = FilterSpec::default().with_chains(["Z"]);
        let cleaned = clean(sample(), &spec);
        assert_eq!(cleaned.atom_count(), 0);
        assert!(cleaned.records().iter().all(|r| r.kind != RecordKind::Terminator));
        assert_eq!(cleaned.to_pdb_string(), "END\n");
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let spec = FilterSpec::default().with_chains(["A", "B"]).with_ligands(["ZN"]);
        let once = clean(sample(), &spec);
        let bytes = once.to_pdb_string();
        let twice = clean(StructureFile::parse(bytes.as_bytes()).unwrap(), &spec);
        assert_eq!(twice.to_pdb_string(), bytes);

        // also when nothing is left
        let spec = FilterSpec::default().with_chains(["Z"]);
        let bytes = clean(sample(), &spec).to_pdb_string();
        let twice = clean(StructureFile::parse(bytes.as_bytes()).unwrap(), &spec);
        assert_eq!(twice.to_pdb_string(), bytes);
    }

    #[test]
    fn test_build_name_set_normalises() {
        let set = build_name_set([" a", "B ", "", "hem"]);
        let names: Vec<&str> = set.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["A", "B", "HEM"]);
    }
}
