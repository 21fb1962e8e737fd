use crate::core::models::residue::ResidueKind;
use phf::{Set, phf_set};

static ACIDIC_RESIDUE_NAMES: Set<&'static str> = phf_set! {
    "ASP", "GLU", "CTR", "TYR", "CYS", "PAA", "PDD",
};

static BASIC_RESIDUE_NAMES: Set<&'static str> = phf_set! {
    "ARG", "HIS", "LYS", "NTR", "NTG",
};

static POLAR_RESIDUE_NAMES: Set<&'static str> = phf_set! {
    "ASN", "GLN", "SER", "THR", "HOH", "MEL",
};

fn canonical_name(residue_name: &str) -> String {
    residue_name.trim().to_ascii_uppercase()
}

pub fn is_acidic_residue(residue_name: &str) -> bool {
    ACIDIC_RESIDUE_NAMES.contains(canonical_name(residue_name).as_str())
}

pub fn is_basic_residue(residue_name: &str) -> bool {
    BASIC_RESIDUE_NAMES.contains(canonical_name(residue_name).as_str())
}

pub fn is_ionizable_residue(residue_name: &str) -> bool {
    is_acidic_residue(residue_name) || is_basic_residue(residue_name)
}

pub fn classify_residue(residue_name: &str) -> ResidueKind {
    let name = canonical_name(residue_name);
    if ACIDIC_RESIDUE_NAMES.contains(name.as_str()) {
        ResidueKind::Acidic
    } else if BASIC_RESIDUE_NAMES.contains(name.as_str()) {
        ResidueKind::Basic
    } else if POLAR_RESIDUE_NAMES.contains(name.as_str()) {
        ResidueKind::Polar
    } else {
        ResidueKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_residue_recognizes_acidic_and_basic_names() {
        assert_eq!(classify_residue("ASP"), ResidueKind::Acidic);
        assert_eq!(classify_residue("GLU"), ResidueKind::Acidic);
        assert_eq!(classify_residue("LYS"), ResidueKind::Basic);
        assert_eq!(classify_residue("NTR"), ResidueKind::Basic);
    }

    #[test]
    fn classify_residue_is_case_and_whitespace_insensitive() {
        assert_eq!(classify_residue(" his "), ResidueKind::Basic);
        assert_eq!(classify_residue("hoh"), ResidueKind::Polar);
    }

    #[test]
    fn classify_residue_falls_back_to_other() {
        assert_eq!(classify_residue("ALA"), ResidueKind::Other);
        assert_eq!(classify_residue(""), ResidueKind::Other);
    }

    #[test]
    fn ionizable_covers_acidic_and_basic_only() {
        assert!(is_ionizable_residue("TYR"));
        assert!(is_ionizable_residue("ARG"));
        assert!(!is_ionizable_residue("SER"));
        assert!(!is_ionizable_residue("GLY"));
    }
}
