use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub input: InputConfig,
}

impl Config {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Jump search tuning. The weights were tuned empirically and are kept as
/// parameters rather than constants.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_margin")]
    pub margin: i32,
    #[serde(default = "default_progress_weight")]
    pub progress_weight: f64,
    #[serde(default = "default_offset_weight")]
    pub offset_weight: f64,
    #[serde(default = "default_offset_sigma")]
    pub offset_sigma: f64,
    #[serde(default = "default_crossing_coeff")]
    pub crossing_coeff: f64,
    #[serde(default = "default_crossing_weight")]
    pub crossing_weight: f64,
    #[serde(default = "default_gaussian_table_size")]
    pub gaussian_table_size: usize,
    #[serde(default = "default_force_multiplier")]
    pub force_multiplier: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cell_size: default_cell_size(),
            max_steps: default_max_steps(),
            max_depth: default_max_depth(),
            max_candidates: default_max_candidates(),
            margin: default_margin(),
            progress_weight: default_progress_weight(),
            offset_weight: default_offset_weight(),
            offset_sigma: default_offset_sigma(),
            crossing_coeff: default_crossing_coeff(),
            crossing_weight: default_crossing_weight(),
            gaussian_table_size: default_gaussian_table_size(),
            force_multiplier: default_force_multiplier(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecoveryConfig {
    #[serde(default = "default_recovery_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_jump_steps")]
    pub jump_steps: usize,
    #[serde(default = "default_max_dof_shift")]
    pub max_dof_shift: i32,
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
    #[serde(default = "default_min_open_neighbors")]
    pub min_open_neighbors: usize,
    #[serde(default = "default_allow_diagonal")]
    pub allow_diagonal: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_steps: default_recovery_max_steps(),
            jump_steps: default_jump_steps(),
            max_dof_shift: default_max_dof_shift(),
            lookahead: default_lookahead(),
            min_open_neighbors: default_min_open_neighbors(),
            allow_diagonal: default_allow_diagonal(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CleanupConfig {
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
    #[serde(default = "default_alternate_launch")]
    pub alternate_launch: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
            alternate_launch: default_alternate_launch(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TerminalConfig {
    #[serde(default = "default_max_slots")]
    pub max_departure_slots: usize,
    #[serde(default = "default_max_slots")]
    pub max_arrival_slots: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            max_departure_slots: default_max_slots(),
            max_arrival_slots: default_max_slots(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_scenario_file")]
    pub scenario_file: String,
    #[serde(default)]
    pub output_png: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            scenario_file: default_scenario_file(),
            output_png: None,
        }
    }
}

fn default_cell_size() -> f64 {
    10.0
}

fn default_max_steps() -> usize {
    100
}

fn default_max_depth() -> usize {
    25
}

fn default_max_candidates() -> usize {
    15
}

fn default_margin() -> i32 {
    20
}

fn default_progress_weight() -> f64 {
    1.0
}

fn default_offset_weight() -> f64 {
    0.5
}

fn default_offset_sigma() -> f64 {
    4.0
}

fn default_crossing_coeff() -> f64 {
    1.0
}

fn default_crossing_weight() -> f64 {
    0.25
}

fn default_gaussian_table_size() -> usize {
    64
}

fn default_force_multiplier() -> usize {
    4
}

fn default_recovery_max_steps() -> usize {
    100
}

fn default_jump_steps() -> usize {
    80
}

fn default_max_dof_shift() -> i32 {
    3
}

fn default_lookahead() -> usize {
    3
}

fn default_min_open_neighbors() -> usize {
    2
}

fn default_allow_diagonal() -> bool {
    true
}

fn default_max_passes() -> usize {
    15
}

fn default_alternate_launch() -> bool {
    true
}

fn default_max_slots() -> usize {
    8
}

fn default_scenario_file() -> String {
    "inputs/scenario.toml".to_string()
}
