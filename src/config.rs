use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read configuration file.")]
    Io(#[from] std::io::Error),

    #[error("Could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Static settings shared by every prediction run.
///
/// Built once at start-up and handed to each component; nothing mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub dbaasp: DbaaspConfig,
    #[serde(default)]
    pub stm: StmConfig,
    #[serde(default)]
    pub camp: CampConfig,
    #[serde(default)]
    pub amplify: AmplifyConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Directory for prediction files. Defaults to the directory of the input file.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbaaspConfig {
    #[serde(default = "default_dbaasp_url")]
    pub url: String,
    #[serde(default = "default_strain")]
    pub default_strain: String,
    #[serde(default = "default_strains")]
    pub strains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StmConfig {
    #[serde(default = "default_stm_url")]
    pub url: String,
    /// Position of the prediction table among the tables of the result page.
    #[serde(default)]
    pub table_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampConfig {
    #[serde(default = "default_camp_url")]
    pub url: String,
    #[serde(default = "default_camp_algorithms")]
    pub algorithms: Vec<String>,
    /// Index of the table holding the first algorithm's results.
    #[serde(default)]
    pub table_offset: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AmplifyConfig {
    #[serde(default = "default_amplify_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfig {
    /// Byte budget of a single request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    /// Byte budget of a request that carries a genome accession.
    #[serde(default = "default_genome_max_bytes")]
    pub genome_max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_dbaasp_url() -> String { "https://dbaasp.org/prediction/special/".to_string() }
fn default_strain() -> String { "Escherichia coli ATCC 25922".to_string() }
fn default_strains() -> Vec<String> {
    [
        "Escherichia coli ATCC 25922",
        "Pseudomonas aeruginosa ATCC 27853",
        "Klebsiella pneumonia",
        "Staphylococcus aureus ATCC 25923",
        "Human erythrocytes",
        "Bacillus Subtilis",
        "Candida albicans",
        "Saccharomyces cerevisiae",
    ]
    .iter()
    .map(|strain| strain.to_string())
    .collect()
}
fn default_stm_url() -> String { "https://www.portoreports.com/stm".to_string() }
fn default_camp_url() -> String { "http://www.camp3.bicnirrh.res.in/predict/hii.php".to_string() }
fn default_camp_algorithms() -> Vec<String> {
    ["svm", "rf", "ann", "da"].iter().map(|algo| algo.to_string()).collect()
}
fn default_amplify_url() -> String { "https://amplify.example.org/api/predict".to_string() }
fn default_max_bytes() -> usize { 20_000 }
fn default_genome_max_bytes() -> usize { 5_000 }
fn default_max_length() -> usize { 200 }
fn default_threshold() -> f64 { 0.5 }
fn default_user_agent() -> String { format!("ampclassif/{}", env!("CARGO_PKG_VERSION")) }

impl Default for DbaaspConfig {
    fn default() -> Self {
        Self {
            url: default_dbaasp_url(),
            default_strain: default_strain(),
            strains: default_strains(),
        }
    }
}

impl Default for StmConfig {
    fn default() -> Self {
        Self {
            url: default_stm_url(),
            table_index: 0,
        }
    }
}

impl Default for CampConfig {
    fn default() -> Self {
        Self {
            url: default_camp_url(),
            algorithms: default_camp_algorithms(),
            table_offset: 0,
        }
    }
}

impl Default for AmplifyConfig {
    fn default() -> Self {
        Self {
            url: default_amplify_url(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            genome_max_bytes: default_genome_max_bytes(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_length: default_max_length(),
            threshold: default_threshold(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
        }
    }
}

impl ChunkingConfig {
    pub fn general_limit(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.max_bytes)
            .ok_or_else(|| ConfigError::Invalid("chunking.max_bytes must be positive".to_string()))
    }

    pub fn genome_limit(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.genome_max_bytes).ok_or_else(|| {
            ConfigError::Invalid("chunking.genome_max_bytes must be positive".to_string())
        })
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking.general_limit()?;
        self.chunking.genome_limit()?;
        if self.model.max_length == 0 {
            return Err(ConfigError::Invalid(
                "model.max_length must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.model.threshold) {
            return Err(ConfigError::Invalid(format!(
                "model.threshold must lie in [0, 1], got {}",
                self.model.threshold
            )));
        }
        if self.camp.algorithms.is_empty() {
            return Err(ConfigError::Invalid(
                "camp.algorithms must name at least one algorithm".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}
