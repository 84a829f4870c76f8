use std::time::Duration;

pub const MIN_SEARCH_CHARS: usize = 2;
pub const DEFAULT_SEARCH_PAGE_SIZE: u32 = 15;
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub search_min_chars: usize,
    pub search_page_size: u32,
    pub search_debounce: Duration,
    /// Update the program enrollment's location after the ownership change. Events are
    /// relocated regardless of this flag.
    pub cascade_enrollment_location: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            search_min_chars: MIN_SEARCH_CHARS,
            search_page_size: DEFAULT_SEARCH_PAGE_SIZE,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
            cascade_enrollment_location: false,
        }
    }
}

impl TransferConfig {
    /// Clamps values the search contract does not allow.
    pub fn normalized(mut self) -> Self {
        self.search_min_chars = self.search_min_chars.max(MIN_SEARCH_CHARS);
        if self.search_page_size == 0 {
            self.search_page_size = DEFAULT_SEARCH_PAGE_SIZE;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_search_contract() {
        let config = TransferConfig::default();
        assert_eq!(config.search_min_chars, 2);
        assert_eq!(config.search_page_size, 15);
        assert!(!config.cascade_enrollment_location);
    }

    #[test]
    fn normalized_clamps_min_chars_and_page_size() {
        let config = TransferConfig {
            search_min_chars: 1,
            search_page_size: 0,
            ..TransferConfig::default()
        }
        .normalized();
        assert_eq!(config.search_min_chars, 2);
        assert_eq!(config.search_page_size, 15);
    }
}
