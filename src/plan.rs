use serde::{Deserialize, Serialize};

/// ## Structure
/// This module contains the data structures for the run configuration.
///
/// ```text
/// Plan
///   ├── input: InputConfig
///   │   └── base: String      (directory holding song_data/ and log_data/)
///   └── output: OutputConfig
///       └── base: String      (directory the table directories are written under)
/// ```
///
/// The two base locations are the whole configuration surface of the
/// pipeline; credentials and storage resolution live outside it.

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Plan {
    pub input: InputConfig,
    pub output: OutputConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InputConfig {
    pub base: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OutputConfig {
    pub base: String,
}

impl Default for Plan {
    fn default() -> Self {
        Plan {
            input: InputConfig {
                base: "data".to_string(),
            },
            output: OutputConfig {
                base: "lake".to_string(),
            },
        }
    }
}
