//! Search flags for a channel

use serde::{Deserialize, Serialize};

/// Search phase and pairing flags carried by a channel.
///
/// Quick-search and waiting are the two consecutive discovery phases;
/// pairing is independent of both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFlags {
    /// Short, high priority search right after opening.
    pub quick_search: bool,
    /// Longer, low priority search after the quick search timed out.
    pub waiting: bool,
    /// Request pairing bit on the channel id.
    pub paired: bool,
}

impl SearchFlags {
    /// Flags for a freshly opened channel, keeping the pairing preference.
    pub fn opening(paired: bool) -> Self {
        Self { quick_search: true, waiting: false, paired }
    }

    pub fn is_searching(&self) -> bool {
        self.quick_search || self.waiting
    }

    /// Quick search timed out: fall back to waiting.
    pub fn start_waiting(&mut self) {
        self.quick_search = false;
        self.waiting = true;
    }

    /// A device answered: searching is over.
    pub fn found(&mut self) {
        self.quick_search = false;
        self.waiting = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_phases() {
        let mut flags = SearchFlags::opening(true);
        assert!(flags.is_searching());
        assert!(flags.quick_search);

        flags.start_waiting();
        assert!(!flags.quick_search);
        assert!(flags.waiting);
        assert!(flags.is_searching());

        flags.found();
        assert!(!flags.is_searching());
        assert!(flags.paired);
    }
}
