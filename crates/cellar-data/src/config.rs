use serde::{Deserialize, Serialize};

use crate::intern::{self, DEFAULT_INTERN_CAPACITY};
use crate::print::DEFAULT_PRINT_LIMIT;

/// Tunables for the data layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Byte budget for printed values.
    pub print_limit: usize,
    /// Share live symbol and keyword cells by name.
    pub intern_symbols: bool,
    /// Maximum names held per interning table before it is purged.
    pub intern_capacity: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            print_limit: DEFAULT_PRINT_LIMIT,
            intern_symbols: true,
            intern_capacity: DEFAULT_INTERN_CAPACITY,
        }
    }
}

impl DataConfig {
    /// Install the process-wide settings (currently just interning).
    pub fn apply(&self) {
        intern::configure(self.intern_symbols, self.intern_capacity);
    }
}
