use std::num::NonZeroUsize;

use tracing::debug;

use crate::fasta::{self, SequenceRecord};

/// Records submitted together in one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Chunk {
    records: Vec<SequenceRecord>,
    size: usize,
}

impl Chunk {
    pub fn from_records(records: Vec<SequenceRecord>) -> Self {
        let size = records.iter().map(SequenceRecord::serialized_len).sum();
        Self { records, size }
    }

    fn push(&mut self, record: SequenceRecord) {
        self.size += record.serialized_len();
        self.records.push(record);
    }

    pub fn records(&self) -> &[SequenceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SequenceRecord> {
        self.records
    }

    /// Serialized FASTA size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_fasta(&self) -> String {
        fasta::to_fasta(&self.records)
    }
}

/// Greedily group records into the fewest chunks that stay within `limit` bytes.
///
/// Record order is preserved and records are never split. A record that is larger
/// than `limit` on its own is placed in a chunk by itself.
pub fn split<I>(records: I, limit: NonZeroUsize) -> Vec<Chunk>
where
    I: IntoIterator<Item = SequenceRecord>,
{
    let limit = limit.get();
    let mut chunks = Vec::new();
    let mut current = Chunk::default();

    for record in records {
        let record_size = record.serialized_len();
        if !current.is_empty() && current.size + record_size > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if record_size > limit {
            debug!(
                id = record.id.as_str(),
                size = record_size,
                limit,
                "Record exceeds chunk limit, sending it alone."
            );
        }
        current.push(record);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod test {
    use super::*;
    use itertools::Itertools;

    fn limit(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn records_of_lengths(lengths: &[usize]) -> Vec<SequenceRecord> {
        lengths
            .iter()
            .enumerate()
            .map(|(i, &length)| SequenceRecord::new(format!("s{}", i), "A".repeat(length)))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(split(Vec::new(), limit(10)).is_empty());
    }

    #[test]
    fn test_everything_fits_in_one_chunk() {
        let records = records_of_lengths(&[4, 4]);
        let chunks = split(records.clone(), limit(1000));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].records(), &records[..]);
        assert_eq!(chunks[0].size(), chunks[0].to_fasta().len());
    }

    #[test]
    fn test_exact_fit_does_not_open_new_chunk() {
        // Each record ">sN\nAAAAA\n" is 10 bytes.
        let chunks = split(records_of_lengths(&[5, 5, 5]), limit(20));
        assert_eq!(chunks.iter().map(Chunk::len).collect_vec(), vec![2, 1]);
    }

    #[test]
    fn test_oversized_record_gets_own_chunk() {
        let chunks = split(records_of_lengths(&[2, 50, 2]), limit(20));
        assert_eq!(chunks.iter().map(Chunk::len).collect_vec(), vec![1, 1, 1]);
        assert_eq!(chunks[1].records()[0].sequence.len(), 50);
        assert!(chunks[1].size() > 20);
    }

    #[test]
    fn test_round_trip_and_bound_over_many_inputs() {
        let length_sets: Vec<Vec<usize>> = vec![
            vec![1],
            vec![3, 17, 2, 9, 40, 1, 1, 1, 25],
            (0..60).map(|i| (i * 7) % 31 + 1).collect(),
            vec![100, 100, 100],
        ];
        for lengths in length_sets {
            let records = records_of_lengths(&lengths);
            for budget in [1, 8, 15, 32, 64, 500] {
                let chunks = split(records.clone(), limit(budget));

                let rebuilt = chunks
                    .iter()
                    .flat_map(|chunk| chunk.records().iter().cloned())
                    .collect_vec();
                assert_eq!(rebuilt, records);

                for chunk in &chunks {
                    assert!(!chunk.is_empty());
                    assert!(chunk.size() <= budget || chunk.len() == 1);
                }
                // Greedy packing: two neighbours never fit together.
                for (left, right) in chunks.iter().tuple_windows() {
                    assert!(left.size() + right.records()[0].serialized_len() > budget);
                }
            }
        }
    }

    #[test]
    fn test_deterministic_boundaries() {
        let records = records_of_lengths(&[5, 12, 3, 8, 8, 1, 30]);
        let first = split(records.clone(), limit(25));
        let second = split(records, limit(25));
        assert_eq!(first, second);
    }
}
