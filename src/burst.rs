//! Burst transfer reassembly

use tracing::{debug, trace};

use crate::codec::BurstFragment;

/// Default number of bytes kept from one transfer.
pub const DEFAULT_CAPACITY: usize = 128;

// sequence token expected after each token; 0 only ever opens a transfer
const NEXT_SEQUENCE: [u8; 4] = [1, 2, 3, 1];

/// Accumulates in-sequence burst fragments until the last one arrives.
///
/// Fragments carrying an unexpected sequence token are dropped and counted;
/// they neither advance the sequence nor touch the buffer. Payload past the
/// capacity is discarded.
#[derive(Debug, Clone)]
pub struct BurstReassembler {
    buffer: Vec<u8>,
    capacity: usize,
    next_sequence: u8,
    gaps: u64,
}

impl Default for BurstReassembler {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BurstReassembler {
    pub fn new(capacity: usize) -> Self {
        let buffer = Vec::with_capacity(capacity.min(DEFAULT_CAPACITY));
        Self { buffer, capacity, next_sequence: 0, gaps: 0 }
    }

    /// Feed one fragment; returns the completed transfer on the last fragment.
    pub fn feed(&mut self, fragment: &BurstFragment) -> Option<Vec<u8>> {
        let sequence = fragment.sequence & 0x03;
        // some transmitters open a transfer with token 1 instead of 0
        let opening = self.next_sequence == 0 && sequence == 1;

        if sequence == self.next_sequence || opening {
            let room = self.capacity.saturating_sub(self.buffer.len());
            let take = fragment.data.len().min(room);
            self.buffer.extend_from_slice(&fragment.data[..take]);
            self.next_sequence = NEXT_SEQUENCE[sequence as usize];
            trace!(sequence, bytes = take, total = self.buffer.len(), "Burst fragment");
        } else {
            self.gaps += 1;
            debug!(
                expected = self.next_sequence,
                found = sequence,
                gaps = self.gaps,
                "Dropping out of sequence burst fragment"
            );
        }

        if fragment.last {
            let data = std::mem::take(&mut self.buffer);
            self.next_sequence = 0;
            return Some(data);
        }

        None
    }

    /// Bytes accumulated for the transfer in progress.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Fragments dropped for being out of sequence, over the lifetime of the
    /// reassembler.
    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.next_sequence = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    fn fragment(sequence: u8, last: bool, data: &[u8]) -> BurstFragment {
        BurstFragment { channel: 0, sequence, last, data: data.to_vec() }
    }

    #[test]
    fn concatenates_in_sequence_fragments() {
        let mut burst = BurstReassembler::default();
        assert_eq!(burst.feed(&fragment(0, false, &[1, 2])), None);
        assert_eq!(burst.feed(&fragment(1, false, &[3, 4])), None);
        assert_eq!(burst.feed(&fragment(2, false, &[5])), None);
        assert_eq!(burst.feed(&fragment(3, false, &[6])), None);
        // after 3 the token wraps to 1, never 0
        assert_eq!(burst.feed(&fragment(1, true, &[7])), Some(vec![1, 2, 3, 4, 5, 6, 7]));
        assert_eq!(burst.pending(), 0);
        assert_eq!(burst.gaps(), 0);
    }

    #[test]
    fn transfer_may_open_with_token_one() {
        let mut burst = BurstReassembler::default();
        assert_eq!(burst.feed(&fragment(1, false, &[1, 2])), None);
        assert_eq!(burst.feed(&fragment(2, false, &[3, 4])), None);
        assert_eq!(burst.feed(&fragment(3, false, &[5, 6])), None);
        assert_eq!(burst.feed(&fragment(1, true, &[])), Some(vec![1, 2, 3, 4, 5, 6]));
        assert_eq!(burst.gaps(), 0);
    }

    #[test]
    fn token_one_only_opens_a_fresh_transfer() {
        let mut burst = BurstReassembler::default();
        burst.feed(&fragment(0, false, &[1]));
        burst.feed(&fragment(1, false, &[2]));
        // expecting 2 now, a repeated 1 is a gap
        burst.feed(&fragment(1, false, &[99]));
        assert_eq!(burst.gaps(), 1);
        assert_eq!(burst.feed(&fragment(2, true, &[3])), Some(vec![1, 2, 3]));
    }

    #[test]
    fn drops_out_of_sequence_fragments() {
        let mut burst = BurstReassembler::default();
        burst.feed(&fragment(0, false, &[1]));
        burst.feed(&fragment(2, false, &[99]));
        burst.feed(&fragment(1, false, &[2]));
        assert_eq!(burst.gaps(), 1);
        assert_eq!(burst.feed(&fragment(2, true, &[3])), Some(vec![1, 2, 3]));
    }

    #[test]
    fn out_of_sequence_last_still_completes() {
        let mut burst = BurstReassembler::default();
        burst.feed(&fragment(0, false, &[1, 2]));
        assert_eq!(burst.feed(&fragment(3, true, &[9])), Some(vec![1, 2]));
        assert_eq!(burst.gaps(), 1);
        // the next transfer starts fresh
        assert_eq!(burst.feed(&fragment(0, true, &[4])), Some(vec![4]));
    }

    #[test]
    fn truncates_at_capacity() {
        let mut burst = BurstReassembler::new(5);
        burst.feed(&fragment(0, false, &[1, 2, 3, 4]));
        burst.feed(&fragment(1, false, &[5, 6, 7, 8]));
        assert_eq!(burst.feed(&fragment(2, true, &[9])), Some(vec![1, 2, 3, 4, 5]));
    }

    proptest! {
        #[test]
        fn in_sequence_transfers_are_concatenated(
            chunks in vec(vec(any::<u8>(), 0..8), 1..24),
        ) {
            let mut burst = BurstReassembler::new(usize::MAX);
            let mut sequence = 0u8;
            let mut result = None;
            for (i, chunk) in chunks.iter().enumerate() {
                let last = i + 1 == chunks.len();
                result = burst.feed(&fragment(sequence, last, chunk));
                sequence = NEXT_SEQUENCE[sequence as usize];
            }
            prop_assert_eq!(result, Some(chunks.concat()));
            prop_assert_eq!(burst.gaps(), 0);
        }

        #[test]
        fn never_exceeds_capacity(
            capacity in 0usize..64,
            chunks in vec((0u8..4, vec(any::<u8>(), 0..8)), 0..32),
        ) {
            let mut burst = BurstReassembler::new(capacity);
            for (sequence, chunk) in &chunks {
                burst.feed(&fragment(*sequence, false, chunk));
                prop_assert!(burst.pending() <= capacity);
            }
        }
    }
}
