use crate::core::io::traits::EnsembleFile;
use crate::core::models::ensemble::{Ensemble, EnsembleBuilder, InvalidStateError, ResidueTable};
use crate::core::models::residue::{Residue, State};
use std::io::{self, BufRead, Write};
use thiserror::Error;
use tracing::{debug, info, warn};

const MAGIC: &str = "CRGMS";
const SUPPORTED_VERSION: u32 = 1;
const RESIDUES_KEYWORD: &str = "RESIDUES";
const MICROSTATES_KEYWORD: &str = "MICROSTATES";
const COMMENT_PREFIX: char = '#';

/// Header information of a crgms file that is not part of the ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct CrgmsMetadata {
    pub version: u32,
    /// Simulation condition lines (e.g. `PH 7.00`), in file order.
    pub conditions: Vec<(String, String)>,
}

impl Default for CrgmsMetadata {
    fn default() -> Self {
        Self {
            version: SUPPORTED_VERSION,
            conditions: Vec::new(),
        }
    }
}

impl CrgmsMetadata {
    pub fn condition(&self, key: &str) -> Option<&str> {
        self.conditions
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn condition_value(&self, key: &str) -> Option<f64> {
        self.condition(key).and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, Error)]
pub enum CrgmsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Format error on line {line}: {kind}")]
    Format { line: usize, kind: FormatErrorKind },
    #[error("Malformed microstate record {record} on line {line}: {kind}")]
    Record {
        line: usize,
        record: usize,
        kind: RecordErrorKind,
    },
    #[error("Invalid state reference on line {line}: {source}")]
    InvalidState {
        line: usize,
        #[source]
        source: InvalidStateError,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatErrorKind {
    #[error("Expected 'CRGMS <version>' header (found: '{found}')")]
    MissingMagic { found: String },
    #[error("Unsupported format version '{version}'")]
    UnsupportedVersion { version: String },
    #[error("Invalid residue count '{value}'")]
    InvalidResidueCount { value: String },
    #[error("Residue declaration needs chain, number, name and at least one state")]
    IncompleteResidue,
    #[error("Invalid chain identifier '{value}' (must be a single character)")]
    InvalidChainId { value: String },
    #[error("Invalid residue number '{value}'")]
    InvalidResidueNumber { value: String },
    #[error("Invalid state declaration '{token}' (expected 'label:charge')")]
    InvalidStateToken { token: String },
    #[error("Residue section declares {declared} residues but lists {found}")]
    ResidueCountMismatch { declared: usize, found: usize },
    #[error("Expected {expected} (found: '{found}')")]
    UnexpectedLine {
        expected: &'static str,
        found: String,
    },
    #[error("File ended while reading {section}")]
    Truncated { section: &'static str },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordErrorKind {
    #[error("Expected {expected} tokens (occupancy, energy and one state per residue), found {found}")]
    TokenCount { expected: usize, found: usize },
    #[error("Invalid occupancy count '{value}'")]
    InvalidOccupancy { value: String },
    #[error("Occupancy count must be non-negative (value: '{value}')")]
    NegativeOccupancy { value: String },
    #[error("Invalid energy '{value}'")]
    InvalidEnergy { value: String },
    #[error("Energy must be finite (value: '{value}')")]
    NonFiniteEnergy { value: String },
    #[error("Invalid state index '{value}' in column {column}")]
    InvalidStateIndex { column: usize, value: String },
}

enum Section {
    Magic,
    Conditions,
    Residues {
        declared: usize,
        table: ResidueTable,
    },
    Records(EnsembleBuilder),
}

fn format_error(line: usize, kind: FormatErrorKind) -> CrgmsError {
    CrgmsError::Format { line, kind }
}

fn parse_residue_line(tokens: &[&str], line: usize) -> Result<Residue, CrgmsError> {
    if tokens.len() < 4 {
        return Err(format_error(line, FormatErrorKind::IncompleteResidue));
    }
    let mut chain_chars = tokens[0].chars();
    let chain_id = match (chain_chars.next(), chain_chars.next()) {
        (Some(c), None) => c,
        _ => {
            return Err(format_error(
                line,
                FormatErrorKind::InvalidChainId {
                    value: tokens[0].into(),
                },
            ));
        }
    };
    let residue_number: isize = tokens[1].parse().map_err(|_| {
        format_error(
            line,
            FormatErrorKind::InvalidResidueNumber {
                value: tokens[1].into(),
            },
        )
    })?;

    let states = tokens[3..]
        .iter()
        .map(|token| {
            let invalid = || {
                format_error(
                    line,
                    FormatErrorKind::InvalidStateToken {
                        token: (*token).into(),
                    },
                )
            };
            let (label, charge_str) = token.rsplit_once(':').ok_or_else(invalid)?;
            let charge: f64 = charge_str.parse().map_err(|_| invalid())?;
            State::new(label, charge).map_err(|source| CrgmsError::InvalidState { line, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Residue::new(chain_id, residue_number, tokens[2], states)
        .map_err(|source| CrgmsError::InvalidState { line, source })
}

fn parse_record(
    tokens: &[&str],
    num_residues: usize,
    line: usize,
    record: usize,
) -> Result<(u64, f64, Vec<usize>), CrgmsError> {
    let record_error = |kind| CrgmsError::Record { line, record, kind };

    let expected = num_residues + 2;
    if tokens.len() != expected {
        return Err(record_error(RecordErrorKind::TokenCount {
            expected,
            found: tokens.len(),
        }));
    }

    let count_str = tokens[0];
    let count: u64 = count_str.parse().map_err(|_| {
        if count_str.parse::<i64>().is_ok() {
            record_error(RecordErrorKind::NegativeOccupancy {
                value: count_str.into(),
            })
        } else {
            record_error(RecordErrorKind::InvalidOccupancy {
                value: count_str.into(),
            })
        }
    })?;

    let energy_str = tokens[1];
    let energy: f64 = energy_str.parse().map_err(|_| {
        record_error(RecordErrorKind::InvalidEnergy {
            value: energy_str.into(),
        })
    })?;
    if !energy.is_finite() {
        return Err(record_error(RecordErrorKind::NonFiniteEnergy {
            value: energy_str.into(),
        }));
    }

    let states = tokens[2..]
        .iter()
        .enumerate()
        .map(|(offset, value)| {
            value.parse::<usize>().map_err(|_| {
                record_error(RecordErrorKind::InvalidStateIndex {
                    column: offset + 3,
                    value: (*value).into(),
                })
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((count, energy, states))
}

pub struct CrgmsFile;

impl EnsembleFile for CrgmsFile {
    type Metadata = CrgmsMetadata;
    type Error = CrgmsError;

    fn read_from(reader: &mut impl BufRead) -> Result<(Ensemble, Self::Metadata), Self::Error> {
        let mut metadata = CrgmsMetadata::default();
        let mut section = Section::Magic;
        let mut zero_count_records = 0usize;
        let mut last_line = 0usize;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            last_line = line_num;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with(COMMENT_PREFIX) {
                continue;
            }
            let tokens: Vec<&str> = trimmed.split_whitespace().collect();

            match &mut section {
                Section::Magic => {
                    if tokens[0] != MAGIC || tokens.len() != 2 {
                        return Err(format_error(
                            line_num,
                            FormatErrorKind::MissingMagic {
                                found: trimmed.into(),
                            },
                        ));
                    }
                    metadata.version = tokens[1]
                        .parse()
                        .ok()
                        .filter(|&v| v == SUPPORTED_VERSION)
                        .ok_or_else(|| {
                            format_error(
                                line_num,
                                FormatErrorKind::UnsupportedVersion {
                                    version: tokens[1].into(),
                                },
                            )
                        })?;
                    section = Section::Conditions;
                }
                Section::Conditions => match tokens[0] {
                    RESIDUES_KEYWORD => {
                        let declared = tokens
                            .get(1)
                            .filter(|_| tokens.len() == 2)
                            .and_then(|v| v.parse::<usize>().ok())
                            .ok_or_else(|| {
                                format_error(
                                    line_num,
                                    FormatErrorKind::InvalidResidueCount {
                                        value: tokens[1..].join(" "),
                                    },
                                )
                            })?;
                        section = Section::Residues {
                            declared,
                            table: ResidueTable::new(),
                        };
                    }
                    MICROSTATES_KEYWORD => {
                        return Err(format_error(
                            line_num,
                            FormatErrorKind::UnexpectedLine {
                                expected: "a RESIDUES declaration before MICROSTATES",
                                found: trimmed.into(),
                            },
                        ));
                    }
                    key => metadata
                        .conditions
                        .push((key.to_string(), tokens[1..].join(" "))),
                },
                Section::Residues { declared, table } => {
                    let declared = *declared;
                    if tokens[0] == MICROSTATES_KEYWORD {
                        if tokens.len() != 1 {
                            return Err(format_error(
                                line_num,
                                FormatErrorKind::UnexpectedLine {
                                    expected: "a bare MICROSTATES marker",
                                    found: trimmed.into(),
                                },
                            ));
                        }
                        if table.len() != declared {
                            return Err(format_error(
                                line_num,
                                FormatErrorKind::ResidueCountMismatch {
                                    declared,
                                    found: table.len(),
                                },
                            ));
                        }
                        debug!(
                            residues = table.len(),
                            "Residue table complete, reading microstate records."
                        );
                        let table = std::mem::take(table);
                        section = Section::Records(EnsembleBuilder::new(table));
                        continue;
                    }
                    if table.len() == declared {
                        return Err(format_error(
                            line_num,
                            FormatErrorKind::ResidueCountMismatch {
                                declared,
                                found: declared + 1,
                            },
                        ));
                    }
                    let residue = parse_residue_line(&tokens, line_num)?;
                    table
                        .push(residue)
                        .map_err(|source| CrgmsError::InvalidState {
                            line: line_num,
                            source,
                        })?;
                }
                Section::Records(builder) => {
                    let (count, energy, states) =
                        parse_record(&tokens, builder.residues().len(), line_num, builder.len())?;
                    if count == 0 {
                        zero_count_records += 1;
                    }
                    builder
                        .push_microstate(count, energy, states)
                        .map_err(|source| CrgmsError::InvalidState {
                            line: line_num,
                            source,
                        })?;
                }
            }
        }

        let builder = match section {
            Section::Records(builder) => builder,
            Section::Magic => {
                return Err(format_error(
                    last_line,
                    FormatErrorKind::Truncated { section: "header" },
                ));
            }
            Section::Conditions => {
                return Err(format_error(
                    last_line,
                    FormatErrorKind::Truncated {
                        section: "condition lines",
                    },
                ));
            }
            Section::Residues { .. } => {
                return Err(format_error(
                    last_line,
                    FormatErrorKind::Truncated {
                        section: "residue declarations",
                    },
                ));
            }
        };

        if zero_count_records > 0 {
            warn!(
                zero_count_records,
                "Some microstates were never sampled and will carry zero weight."
            );
        }
        let ensemble = builder.build();
        info!(
            residues = ensemble.num_residues(),
            microstates = ensemble.len(),
            "Decoded crgms ensemble."
        );
        Ok((ensemble, metadata))
    }

    fn write_to(
        ensemble: &Ensemble,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        writeln!(writer, "{} {}", MAGIC, metadata.version)?;
        for (key, value) in &metadata.conditions {
            writeln!(writer, "{} {}", key, value)?;
        }

        writeln!(writer, "{} {}", RESIDUES_KEYWORD, ensemble.num_residues())?;
        for residue in ensemble.residues() {
            write!(
                writer,
                "{} {:04} {}",
                residue.chain_id, residue.residue_number, residue.name
            )?;
            for state in residue.states() {
                write!(writer, " {}:{}", state.label(), state.charge())?;
            }
            writeln!(writer)?;
        }

        writeln!(writer, "{}", MICROSTATES_KEYWORD)?;
        for ms in ensemble.microstates() {
            write!(writer, "{} {}", ms.count(), ms.energy())?;
            for state in ms.states() {
                write!(writer, " {}", state)?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ids::{MicrostateId, ResidueIndex};
    use crate::core::models::residue::ResidueSpecifier;
    use std::io::Cursor;

    const EXAMPLE: &str = "\
# two-residue example
CRGMS 1
PH 7.00
EH 0.00
RESIDUES 2
A 0001 ASP ASPA:0 ASPB:1
A 0002 GLU GLUA:0 GLUB:-1

MICROSTATES
5 0 0 0
3 1 1 0
2 2 0 1
";

    fn read(content: &str) -> Result<(Ensemble, CrgmsMetadata), CrgmsError> {
        CrgmsFile::read_from(&mut Cursor::new(content))
    }

    #[test]
    fn read_from_parses_header_residues_and_records() {
        let (ensemble, metadata) = read(EXAMPLE).unwrap();

        assert_eq!(metadata.version, 1);
        assert_eq!(metadata.condition("ph"), Some("7.00"));
        assert_eq!(metadata.condition_value("EH"), Some(0.0));
        assert_eq!(ensemble.num_residues(), 2);
        assert_eq!(ensemble.residues()[1].states()[1].label(), "GLUB");
        assert_eq!(ensemble.residues()[1].states()[1].charge(), -1.0);
        assert_eq!(ensemble.len(), 3);

        let ms = ensemble.microstate(MicrostateId(1)).unwrap();
        assert_eq!(ms.count(), 3);
        assert_eq!(ms.energy(), 1.0);
        assert_eq!(ms.states(), &[1, 0]);
    }

    #[test]
    fn write_to_then_read_from_reproduces_records() {
        let content = "\
CRGMS 1
PH 4.5
RESIDUES 2
B -003 HIS HID:0 HIE:0 HIP:1
B 0010 LYS LYS0:0 LYS+:1
MICROSTATES
17 -12.345678901234567 2 1
0 0.1 0 0
4 1e-7 1 1
";
        let (ensemble, metadata) = read(content).unwrap();
        let mut buffer = Vec::new();
        CrgmsFile::write_to(&ensemble, &metadata, &mut buffer).unwrap();
        let (reread, remeta) = read(std::str::from_utf8(&buffer).unwrap()).unwrap();

        assert_eq!(reread, ensemble);
        assert_eq!(remeta, metadata);
        for (a, b) in ensemble.microstates().iter().zip(reread.microstates()) {
            assert_eq!(a.energy().to_bits(), b.energy().to_bits());
        }
        assert_eq!(reread.residues()[0].residue_number, -3);
    }

    #[test]
    fn read_from_path_and_write_to_path_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ms.crgms");
        let (ensemble, metadata) = read(EXAMPLE).unwrap();

        CrgmsFile::write_to_path(&ensemble, &metadata, &path).unwrap();
        let (reread, _) = CrgmsFile::read_from_path(&path).unwrap();
        assert_eq!(reread, ensemble);
    }

    #[test]
    fn read_from_rejects_missing_magic() {
        let result = read("RESIDUES 0\nMICROSTATES\n");
        assert!(matches!(
            result,
            Err(CrgmsError::Format {
                line: 1,
                kind: FormatErrorKind::MissingMagic { .. }
            })
        ));
    }

    #[test]
    fn read_from_rejects_unsupported_version() {
        let result = read("CRGMS 2\nRESIDUES 0\nMICROSTATES\n");
        assert!(matches!(
            result,
            Err(CrgmsError::Format {
                kind: FormatErrorKind::UnsupportedVersion { .. },
                ..
            })
        ));
    }

    #[test]
    fn read_from_rejects_wrong_token_count() {
        let content = EXAMPLE.replace("3 1 1 0", "3 1 1");
        let result = read(&content);
        match result {
            Err(CrgmsError::Record { line, record, kind }) => {
                assert_eq!(line, 11);
                assert_eq!(record, 1);
                assert_eq!(
                    kind,
                    RecordErrorKind::TokenCount {
                        expected: 4,
                        found: 3
                    }
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn read_from_rejects_negative_occupancy() {
        let content = EXAMPLE.replace("2 2 0 1", "-2 2 0 1");
        assert!(matches!(
            read(&content),
            Err(CrgmsError::Record {
                record: 2,
                kind: RecordErrorKind::NegativeOccupancy { .. },
                ..
            })
        ));
    }

    #[test]
    fn read_from_rejects_non_numeric_fields() {
        let content = EXAMPLE.replace("2 2 0 1", "2.5 2 0 1");
        assert!(matches!(
            read(&content),
            Err(CrgmsError::Record {
                kind: RecordErrorKind::InvalidOccupancy { .. },
                ..
            })
        ));

        let content = EXAMPLE.replace("2 2 0 1", "2 abc 0 1");
        assert!(matches!(
            read(&content),
            Err(CrgmsError::Record {
                kind: RecordErrorKind::InvalidEnergy { .. },
                ..
            })
        ));

        let content = EXAMPLE.replace("2 2 0 1", "2 2 0 x");
        assert!(matches!(
            read(&content),
            Err(CrgmsError::Record {
                kind: RecordErrorKind::InvalidStateIndex { column: 4, .. },
                ..
            })
        ));
    }

    #[test]
    fn read_from_rejects_nan_and_infinite_energies() {
        for bad in ["NaN", "inf", "-infinity"] {
            let content = EXAMPLE.replace("2 2 0 1", &format!("2 {bad} 0 1"));
            assert!(matches!(
                read(&content),
                Err(CrgmsError::Record {
                    kind: RecordErrorKind::NonFiniteEnergy { .. },
                    ..
                })
            ));
        }
    }

    #[test]
    fn read_from_reports_out_of_range_state_index() {
        let content = EXAMPLE.replace("2 2 0 1", "2 2 0 2");
        assert!(matches!(
            read(&content),
            Err(CrgmsError::InvalidState {
                line: 12,
                source: InvalidStateError::StateOutOfRange { state_index: 2, .. }
            })
        ));
    }

    #[test]
    fn read_from_rejects_inconsistent_residue_count() {
        let content = EXAMPLE.replace("RESIDUES 2", "RESIDUES 3");
        assert!(matches!(
            read(&content),
            Err(CrgmsError::Format {
                kind: FormatErrorKind::ResidueCountMismatch {
                    declared: 3,
                    found: 2
                },
                ..
            })
        ));

        let content = EXAMPLE.replace("RESIDUES 2", "RESIDUES 1");
        assert!(matches!(
            read(&content),
            Err(CrgmsError::Format {
                kind: FormatErrorKind::ResidueCountMismatch { declared: 1, .. },
                ..
            })
        ));
    }

    #[test]
    fn read_from_rejects_trailing_tokens_after_microstates_marker() {
        let content = EXAMPLE.replace("MICROSTATES\n", "MICROSTATES 3\n");
        assert!(matches!(
            read(&content),
            Err(CrgmsError::Format {
                line: 9,
                kind: FormatErrorKind::UnexpectedLine { .. },
            })
        ));
    }

    #[test]
    fn read_from_accepts_terminal_group_sharing_a_sequence_number() {
        let content = "\
CRGMS 1
RESIDUES 2
A 0001 NTR NTR0:0 NTR+:1
A 0001 LYS LYS0:0 LYS+:1
MICROSTATES
1 0.0 1 1
";
        let (ensemble, _) = read(content).unwrap();
        assert_eq!(ensemble.num_residues(), 2);
        assert_eq!(
            ensemble.find_residue(&ResidueSpecifier::new('A', 1, "NTR")),
            Some(ResidueIndex(0))
        );
        assert_eq!(
            ensemble.find_residue(&ResidueSpecifier::new('A', 1, "LYS")),
            Some(ResidueIndex(1))
        );
    }

    #[test]
    fn read_from_rejects_duplicate_residue() {
        let content = EXAMPLE.replace("A 0002 GLU", "A 0001 ASP");
        assert!(matches!(
            read(&content),
            Err(CrgmsError::InvalidState {
                source: InvalidStateError::DuplicateResidue { .. },
                ..
            })
        ));
    }

    #[test]
    fn read_from_rejects_malformed_state_declaration() {
        let content = EXAMPLE.replace("ASPB:1", "ASPB");
        assert!(matches!(
            read(&content),
            Err(CrgmsError::Format {
                kind: FormatErrorKind::InvalidStateToken { .. },
                ..
            })
        ));
    }

    #[test]
    fn read_from_reports_truncated_files() {
        assert!(matches!(
            read(""),
            Err(CrgmsError::Format {
                kind: FormatErrorKind::Truncated { section: "header" },
                ..
            })
        ));
        assert!(matches!(
            read("CRGMS 1\nRESIDUES 2\nA 0001 ASP ASPA:0 ASPB:1\n"),
            Err(CrgmsError::Format {
                line: 3,
                kind: FormatErrorKind::Truncated {
                    section: "residue declarations"
                },
            })
        ));
        assert!(matches!(
            read("CRGMS 1\nPH 7.0\n\n"),
            Err(CrgmsError::Format {
                line: 3,
                kind: FormatErrorKind::Truncated {
                    section: "condition lines"
                },
            })
        ));
    }

    #[test]
    fn read_from_accepts_an_ensemble_without_records() {
        let (ensemble, _) = read("CRGMS 1\nRESIDUES 0\nMICROSTATES\n").unwrap();
        assert!(ensemble.is_empty());
        assert_eq!(ensemble.num_residues(), 0);
    }
}
