//! Folder tree configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Behavioural limits for folder tree operations.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Characters that may not appear in folder names. These are the
    /// delimiters the search layer uses when it builds folder filters.
    #[serde(default = "default_reserved_characters")]
    pub reserved_characters: String,

    /// Maximum folder name length in characters.
    #[serde(default = "default_max_name_length")]
    #[validate(range(min = 1, max = 1024))]
    pub max_name_length: usize,

    /// Maximum number of folders removed per subtree deletion chunk.
    #[serde(default = "default_delete_batch_size")]
    #[validate(range(min = 1, max = 1000))]
    pub delete_batch_size: usize,

    /// How many times a mutation is retried after a transaction abort.
    #[serde(default = "default_transaction_retries")]
    #[validate(range(min = 0, max = 10))]
    pub transaction_retries: u32,
}

impl TreeConfig {
    /// Whether `c` is reserved.
    pub fn is_reserved(&self, c: char) -> bool {
        self.reserved_characters.contains(c)
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            reserved_characters: default_reserved_characters(),
            max_name_length: default_max_name_length(),
            delete_batch_size: default_delete_batch_size(),
            transaction_retries: default_transaction_retries(),
        }
    }
}

fn default_reserved_characters() -> String {
    ",|".to_string()
}

fn default_max_name_length() -> usize {
    255
}

fn default_delete_batch_size() -> usize {
    10
}

fn default_transaction_retries() -> u32 {
    3
}
