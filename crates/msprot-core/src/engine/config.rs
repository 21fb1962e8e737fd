use crate::core::models::residue::{ResidueKind, ResidueSpecifier};
use physical_constants::{BOLTZMANN_CONSTANT, ELEMENTARY_CHARGE, MOLAR_GAS_CONSTANT};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

const JOULES_PER_KILOCALORIE: f64 = 4184.0;
const JOULES_PER_KILOJOULE: f64 = 1000.0;

pub const DEFAULT_TOP_N: usize = 5;
pub const DEFAULT_MIN_OCCUPANCY: f64 = 0.02;
/// Formal charges closer than this are treated as equal when clustering by charge.
pub const CHARGE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },
    #[error("File I/O error for '{path}': {message}")]
    Io { path: String, message: String },
    #[error("TOML parsing error: {0}")]
    Toml(String),
}

/// Unit system of the microstate energies, which fixes the Boltzmann constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnergyUnit {
    KcalPerMol,
    KjPerMol,
    ElectronVolt,
    /// Explicit Boltzmann constant in energy units per kelvin.
    Custom { boltzmann_constant: f64 },
}

impl EnergyUnit {
    pub fn boltzmann_constant(&self) -> f64 {
        match self {
            EnergyUnit::KcalPerMol => MOLAR_GAS_CONSTANT / JOULES_PER_KILOCALORIE,
            EnergyUnit::KjPerMol => MOLAR_GAS_CONSTANT / JOULES_PER_KILOJOULE,
            EnergyUnit::ElectronVolt => BOLTZMANN_CONSTANT / ELEMENTARY_CHARGE,
            EnergyUnit::Custom { boltzmann_constant } => *boltzmann_constant,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThermodynamicsConfig {
    pub temperature_kelvin: f64,
    pub energy_unit: EnergyUnit,
    /// Overrides the minimum ensemble energy as the zero of the Boltzmann factors.
    pub energy_reference: Option<f64>,
}

impl ThermodynamicsConfig {
    /// Thermal energy `k_B * T` in the unit of the input energies.
    pub fn kt(&self) -> f64 {
        self.energy_unit.boltzmann_constant() * self.temperature_kelvin
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResidueSelection {
    #[default]
    All,
    List {
        include: Vec<ResidueSpecifier>,
        exclude: Vec<ResidueSpecifier>,
    },
    Kind(ResidueKind),
    Ionizable,
    /// Residues with at least two states occupied above the analysis `min_occupancy`.
    Fluctuating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterMode {
    /// Identical restricted assignment vectors.
    #[default]
    Exact,
    /// Hamming distance to the cluster representative of at most `max_differences`.
    Threshold { max_differences: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterBasis {
    /// Compare active state indices.
    #[default]
    States,
    /// Compare formal charges of the active states.
    Charges,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusteringConfig {
    pub mode: ClusterMode,
    pub basis: ClusterBasis,
    pub residues: ResidueSelection,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorrelationConfig {
    pub residues: ResidueSelection,
    /// Pairs with a smaller absolute coefficient are left out of the summary table.
    pub min_abs_correlation: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub thermodynamics: ThermodynamicsConfig,
    pub clustering: ClusteringConfig,
    pub correlation: Option<CorrelationConfig>,
    pub top_n: usize,
    pub min_occupancy: f64,
}

#[derive(Default)]
pub struct AnalysisConfigBuilder {
    temperature_kelvin: Option<f64>,
    energy_unit: Option<EnergyUnit>,
    energy_reference: Option<f64>,
    cluster_mode: Option<ClusterMode>,
    cluster_basis: Option<ClusterBasis>,
    cluster_residues: Option<ResidueSelection>,
    correlation: Option<CorrelationConfig>,
    top_n: Option<usize>,
    min_occupancy: Option<f64>,
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature_kelvin(mut self, temperature: f64) -> Self {
        self.temperature_kelvin = Some(temperature);
        self
    }
    pub fn energy_unit(mut self, unit: EnergyUnit) -> Self {
        self.energy_unit = Some(unit);
        self
    }
    pub fn energy_reference(mut self, reference: f64) -> Self {
        self.energy_reference = Some(reference);
        self
    }
    pub fn cluster_mode(mut self, mode: ClusterMode) -> Self {
        self.cluster_mode = Some(mode);
        self
    }
    pub fn cluster_basis(mut self, basis: ClusterBasis) -> Self {
        self.cluster_basis = Some(basis);
        self
    }
    pub fn cluster_residues(mut self, selection: ResidueSelection) -> Self {
        self.cluster_residues = Some(selection);
        self
    }
    pub fn correlation(mut self, correlation: CorrelationConfig) -> Self {
        self.correlation = Some(correlation);
        self
    }
    pub fn top_n(mut self, n: usize) -> Self {
        self.top_n = Some(n);
        self
    }
    pub fn min_occupancy(mut self, min_occupancy: f64) -> Self {
        self.min_occupancy = Some(min_occupancy);
        self
    }

    pub fn build(self) -> Result<AnalysisConfig, ConfigError> {
        let temperature_kelvin = self
            .temperature_kelvin
            .ok_or(ConfigError::MissingParameter("temperature_kelvin"))?;
        if !(temperature_kelvin.is_finite() && temperature_kelvin > 0.0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "temperature_kelvin",
                reason: format!("must be a finite positive number (got {temperature_kelvin})"),
            });
        }
        let energy_unit = self
            .energy_unit
            .ok_or(ConfigError::MissingParameter("energy_unit"))?;
        if let EnergyUnit::Custom { boltzmann_constant } = energy_unit {
            if !(boltzmann_constant.is_finite() && boltzmann_constant > 0.0) {
                return Err(ConfigError::InvalidParameter {
                    parameter: "boltzmann_constant",
                    reason: format!("must be a finite positive number (got {boltzmann_constant})"),
                });
            }
        }
        if let Some(reference) = self.energy_reference {
            if !reference.is_finite() {
                return Err(ConfigError::InvalidParameter {
                    parameter: "energy_reference",
                    reason: format!("must be finite (got {reference})"),
                });
            }
        }

        let top_n = self.top_n.unwrap_or(DEFAULT_TOP_N);
        if top_n == 0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "top_n",
                reason: "must be at least 1".into(),
            });
        }
        let min_occupancy = self.min_occupancy.unwrap_or(DEFAULT_MIN_OCCUPANCY);
        if !(0.0..=1.0).contains(&min_occupancy) {
            return Err(ConfigError::InvalidParameter {
                parameter: "min_occupancy",
                reason: format!("must lie in [0, 1] (got {min_occupancy})"),
            });
        }
        if let Some(correlation) = &self.correlation {
            if !(0.0..=1.0).contains(&correlation.min_abs_correlation) {
                return Err(ConfigError::InvalidParameter {
                    parameter: "min_abs_correlation",
                    reason: format!(
                        "must lie in [0, 1] (got {})",
                        correlation.min_abs_correlation
                    ),
                });
            }
        }

        Ok(AnalysisConfig {
            thermodynamics: ThermodynamicsConfig {
                temperature_kelvin,
                energy_unit,
                energy_reference: self.energy_reference,
            },
            clustering: ClusteringConfig {
                mode: self.cluster_mode.unwrap_or_default(),
                basis: self.cluster_basis.unwrap_or_default(),
                residues: self.cluster_residues.unwrap_or_default(),
            },
            correlation: self.correlation,
            top_n,
            min_occupancy,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum FileEnergyUnit {
    #[serde(rename = "kcal/mol")]
    KcalPerMol,
    #[serde(rename = "kj/mol")]
    KjPerMol,
    Ev,
    Custom,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum FileClusterMode {
    Exact,
    Threshold,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
struct FileResidueSpecifier {
    #[serde(rename = "chain-id")]
    chain_id: char,
    #[serde(rename = "residue-number")]
    residue_number: isize,
    #[serde(rename = "residue-name")]
    residue_name: String,
}

impl From<FileResidueSpecifier> for ResidueSpecifier {
    fn from(p: FileResidueSpecifier) -> Self {
        Self {
            chain_id: p.chain_id,
            residue_number: p.residue_number,
            name: p.residue_name,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum FileResidueSelection {
    All,
    List {
        #[serde(default)]
        include: Vec<FileResidueSpecifier>,
        #[serde(default)]
        exclude: Vec<FileResidueSpecifier>,
    },
    Kind {
        kind: ResidueKind,
    },
    Ionizable,
    Fluctuating,
}

impl From<FileResidueSelection> for ResidueSelection {
    fn from(p: FileResidueSelection) -> Self {
        match p {
            FileResidueSelection::All => ResidueSelection::All,
            FileResidueSelection::List { include, exclude } => ResidueSelection::List {
                include: include.into_iter().map(Into::into).collect(),
                exclude: exclude.into_iter().map(Into::into).collect(),
            },
            FileResidueSelection::Kind { kind } => ResidueSelection::Kind(kind),
            FileResidueSelection::Ionizable => ResidueSelection::Ionizable,
            FileResidueSelection::Fluctuating => ResidueSelection::Fluctuating,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FileCorrelationConfig {
    residues: Option<FileResidueSelection>,
    #[serde(default)]
    min_abs_correlation: f64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FileAnalysisConfig {
    temperature_kelvin: Option<f64>,
    energy_unit: Option<FileEnergyUnit>,
    boltzmann_constant: Option<f64>,
    energy_reference: Option<f64>,
    cluster_mode: Option<FileClusterMode>,
    cluster_threshold: Option<usize>,
    cluster_basis: Option<FileClusterBasis>,
    cluster_residues: Option<FileResidueSelection>,
    top_n: Option<usize>,
    min_occupancy: Option<f64>,
    correlation: Option<FileCorrelationConfig>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
enum FileClusterBasis {
    States,
    Charges,
}

impl AnalysisConfig {
    /// Parses a TOML analysis configuration.
    ///
    /// Keys use kebab-case (`temperature-kelvin`, `energy-unit`, ...). The energy unit
    /// has no default; `boltzmann-constant` is required when the unit is `custom`, and
    /// `cluster-threshold` is required when `cluster-mode = "threshold"`.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: FileAnalysisConfig =
            toml::from_str(content).map_err(|e| ConfigError::Toml(e.to_string()))?;

        let mut builder = AnalysisConfigBuilder::new();
        if let Some(t) = file.temperature_kelvin {
            builder = builder.temperature_kelvin(t);
        }
        if let Some(unit) = file.energy_unit {
            let unit = match unit {
                FileEnergyUnit::KcalPerMol => EnergyUnit::KcalPerMol,
                FileEnergyUnit::KjPerMol => EnergyUnit::KjPerMol,
                FileEnergyUnit::Ev => EnergyUnit::ElectronVolt,
                FileEnergyUnit::Custom => EnergyUnit::Custom {
                    boltzmann_constant: file
                        .boltzmann_constant
                        .ok_or(ConfigError::MissingParameter("boltzmann_constant"))?,
                },
            };
            builder = builder.energy_unit(unit);
        }
        if let Some(reference) = file.energy_reference {
            builder = builder.energy_reference(reference);
        }
        match file.cluster_mode {
            Some(FileClusterMode::Threshold) => {
                let max_differences = file
                    .cluster_threshold
                    .ok_or(ConfigError::MissingParameter("cluster_threshold"))?;
                builder = builder.cluster_mode(ClusterMode::Threshold { max_differences });
            }
            Some(FileClusterMode::Exact) | None => {
                if let Some(threshold) = file.cluster_threshold {
                    return Err(ConfigError::InvalidParameter {
                        parameter: "cluster_threshold",
                        reason: format!(
                            "only valid with cluster-mode = \"threshold\" (got {threshold})"
                        ),
                    });
                }
                builder = builder.cluster_mode(ClusterMode::Exact);
            }
        }
        if let Some(basis) = file.cluster_basis {
            builder = builder.cluster_basis(match basis {
                FileClusterBasis::States => ClusterBasis::States,
                FileClusterBasis::Charges => ClusterBasis::Charges,
            });
        }
        if let Some(selection) = file.cluster_residues {
            builder = builder.cluster_residues(selection.into());
        }
        if let Some(n) = file.top_n {
            builder = builder.top_n(n);
        }
        if let Some(min_occ) = file.min_occupancy {
            builder = builder.min_occupancy(min_occ);
        }
        if let Some(correlation) = file.correlation {
            builder = builder.correlation(CorrelationConfig {
                residues: correlation.residues.map(Into::into).unwrap_or_default(),
                min_abs_correlation: correlation.min_abs_correlation,
            });
        }
        builder.build()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string_lossy().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::new()
            .temperature_kelvin(298.15)
            .energy_unit(EnergyUnit::KcalPerMol)
    }

    #[test]
    fn build_applies_defaults() {
        let config = minimal_builder().build().unwrap();
        assert_eq!(config.top_n, DEFAULT_TOP_N);
        assert_eq!(config.min_occupancy, DEFAULT_MIN_OCCUPANCY);
        assert_eq!(config.clustering.mode, ClusterMode::Exact);
        assert_eq!(config.clustering.basis, ClusterBasis::States);
        assert_eq!(config.clustering.residues, ResidueSelection::All);
        assert!(config.correlation.is_none());
        assert!(config.thermodynamics.energy_reference.is_none());
    }

    #[test]
    fn build_requires_temperature_and_energy_unit() {
        let result = AnalysisConfigBuilder::new()
            .energy_unit(EnergyUnit::KjPerMol)
            .build();
        assert_eq!(result, Err(ConfigError::MissingParameter("temperature_kelvin")));

        let result = AnalysisConfigBuilder::new().temperature_kelvin(300.0).build();
        assert_eq!(result, Err(ConfigError::MissingParameter("energy_unit")));
    }

    #[test]
    fn build_rejects_invalid_values() {
        for t in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = minimal_builder().temperature_kelvin(t).build();
            assert!(matches!(
                result,
                Err(ConfigError::InvalidParameter {
                    parameter: "temperature_kelvin",
                    ..
                })
            ));
        }
        assert!(matches!(
            minimal_builder().top_n(0).build(),
            Err(ConfigError::InvalidParameter {
                parameter: "top_n",
                ..
            })
        ));
        assert!(matches!(
            minimal_builder().min_occupancy(1.5).build(),
            Err(ConfigError::InvalidParameter {
                parameter: "min_occupancy",
                ..
            })
        ));
        assert!(matches!(
            minimal_builder()
                .energy_unit(EnergyUnit::Custom {
                    boltzmann_constant: 0.0
                })
                .build(),
            Err(ConfigError::InvalidParameter {
                parameter: "boltzmann_constant",
                ..
            })
        ));
    }

    #[test]
    fn kt_matches_known_values_at_room_temperature() {
        let config = minimal_builder().build().unwrap();
        assert!((config.thermodynamics.kt() - 0.592_486).abs() < 1e-5);

        let kj = ThermodynamicsConfig {
            temperature_kelvin: 298.15,
            energy_unit: EnergyUnit::KjPerMol,
            energy_reference: None,
        };
        assert!((kj.kt() - 2.478_957).abs() < 1e-5);

        let ev = ThermodynamicsConfig {
            temperature_kelvin: 298.15,
            energy_unit: EnergyUnit::ElectronVolt,
            energy_reference: None,
        };
        assert!((ev.kt() - 0.025_693).abs() < 1e-6);
    }

    #[test]
    fn from_toml_str_reads_full_configuration() {
        let config = AnalysisConfig::from_toml_str(
            r#"
            temperature-kelvin = 300.0
            energy-unit = "kj/mol"
            energy-reference = -10.0
            cluster-mode = "threshold"
            cluster-threshold = 2
            cluster-basis = "charges"
            top-n = 10
            min-occupancy = 0.05

            [cluster-residues]
            type = "list"
            include = [{ chain-id = "A", residue-number = 12, residue-name = "GLU" }]

            [correlation]
            min-abs-correlation = 0.3
            residues = { type = "ionizable" }
            "#,
        )
        .unwrap();

        assert_eq!(config.thermodynamics.energy_unit, EnergyUnit::KjPerMol);
        assert_eq!(config.thermodynamics.energy_reference, Some(-10.0));
        assert_eq!(
            config.clustering.mode,
            ClusterMode::Threshold { max_differences: 2 }
        );
        assert_eq!(config.clustering.basis, ClusterBasis::Charges);
        assert_eq!(
            config.clustering.residues,
            ResidueSelection::List {
                include: vec![ResidueSpecifier::new('A', 12, "GLU")],
                exclude: vec![],
            }
        );
        assert_eq!(config.top_n, 10);
        assert_eq!(config.min_occupancy, 0.05);
        let correlation = config.correlation.unwrap();
        assert_eq!(correlation.residues, ResidueSelection::Ionizable);
        assert_eq!(correlation.min_abs_correlation, 0.3);
    }

    #[test]
    fn from_toml_str_requires_threshold_in_threshold_mode() {
        let result = AnalysisConfig::from_toml_str(
            r#"
            temperature-kelvin = 300.0
            energy-unit = "ev"
            cluster-mode = "threshold"
            "#,
        );
        assert_eq!(result, Err(ConfigError::MissingParameter("cluster_threshold")));
    }

    #[test]
    fn from_toml_str_rejects_threshold_outside_threshold_mode() {
        for mode in ["", "cluster-mode = \"exact\""] {
            let result = AnalysisConfig::from_toml_str(&format!(
                "temperature-kelvin = 300.0\nenergy-unit = \"ev\"\ncluster-threshold = 3\n{mode}\n"
            ));
            assert!(matches!(
                result,
                Err(ConfigError::InvalidParameter {
                    parameter: "cluster_threshold",
                    ..
                })
            ));
        }
    }

    #[test]
    fn from_toml_str_requires_constant_for_custom_unit() {
        let result = AnalysisConfig::from_toml_str(
            r#"
            temperature-kelvin = 1.0
            energy-unit = "custom"
            "#,
        );
        assert_eq!(result, Err(ConfigError::MissingParameter("boltzmann_constant")));

        let config = AnalysisConfig::from_toml_str(
            r#"
            temperature-kelvin = 2.0
            energy-unit = "custom"
            boltzmann-constant = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.thermodynamics.kt(), 1.0);
    }

    #[test]
    fn from_toml_str_rejects_unknown_keys() {
        let result = AnalysisConfig::from_toml_str(
            r#"
            temperature-kelvin = 300.0
            energy-unit = "ev"
            temprature = 3
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_reads_configuration_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.toml");
        std::fs::write(
            &path,
            "temperature-kelvin = 298.15\nenergy-unit = \"kcal/mol\"\n",
        )
        .unwrap();
        let config = AnalysisConfig::load(&path).unwrap();
        assert_eq!(config.thermodynamics.energy_unit, EnergyUnit::KcalPerMol);

        let missing = AnalysisConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
