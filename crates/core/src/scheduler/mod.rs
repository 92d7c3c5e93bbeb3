//! Splitting jobs into ordered chunks.
//!
//! A job's inputs are cut into fixed-size, contiguous chunks. Both the chunk
//! size and the concurrency cap shrink as the job grows, so large jobs hold
//! fewer sources in flight at once.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::MixError;

/// Chunk size for jobs of up to 50 inputs.
pub const BASE_CHUNK_SIZE: usize = 15;
/// Chunk size for jobs above 50 inputs.
pub const MEDIUM_CHUNK_SIZE: usize = 12;
/// Chunk size for jobs above 100 inputs.
pub const LARGE_CHUNK_SIZE: usize = 10;

const MEDIUM_JOB_INPUTS: usize = 50;
const LARGE_JOB_INPUTS: usize = 100;
const MAX_BASE_CONCURRENCY: usize = 4;

/// A contiguous, ordered run of a job's inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position of this chunk within the job.
    pub index: usize,
    /// Inputs, in job order.
    pub inputs: Vec<PathBuf>,
}

impl Chunk {
    /// Number of inputs in this chunk.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Whether the chunk holds no inputs.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Splits `inputs` into chunks of `chunk_size`; the last chunk holds the
/// remainder.
///
/// A `chunk_size` of 0 is treated as 1. Fails with `InvalidJob` if there are
/// no inputs.
pub fn split(inputs: &[PathBuf], chunk_size: usize) -> Result<Vec<Chunk>, MixError> {
    if inputs.is_empty() {
        return Err(MixError::invalid_job("no input files provided"));
    }

    Ok(inputs
        .chunks(chunk_size.max(1))
        .enumerate()
        .map(|(index, inputs)| Chunk {
            index,
            inputs: inputs.to_vec(),
        })
        .collect())
}

/// Chunk size and concurrency cap chosen for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub chunk_size: usize,
    pub max_concurrent: usize,
}

impl BatchPlan {
    /// Picks the plan for a job of `input_count` inputs on `cores` cores.
    ///
    /// | inputs   | chunk size | concurrency cap          |
    /// |----------|------------|--------------------------|
    /// | <= 50    | 15         | min(4, max(1, cores/2))  |
    /// | 51..=100 | 12         | min(base, 3)             |
    /// | > 100    | 10         | min(base, 2)             |
    pub fn for_inputs(input_count: usize, cores: usize) -> Self {
        let base = (cores / 2).clamp(1, MAX_BASE_CONCURRENCY);

        if input_count > LARGE_JOB_INPUTS {
            Self {
                chunk_size: LARGE_CHUNK_SIZE,
                max_concurrent: base.min(2),
            }
        } else if input_count > MEDIUM_JOB_INPUTS {
            Self {
                chunk_size: MEDIUM_CHUNK_SIZE,
                max_concurrent: base.min(3),
            }
        } else {
            Self {
                chunk_size: BASE_CHUNK_SIZE,
                max_concurrent: base,
            }
        }
    }

    /// Number of chunks this plan yields for `input_count` inputs.
    pub fn chunk_count(&self, input_count: usize) -> usize {
        input_count.div_ceil(self.chunk_size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("track_{:03}.mp3", i))).collect()
    }

    #[test]
    fn test_split_empty_is_invalid() {
        let result = split(&[], 10);
        assert!(matches!(result, Err(MixError::InvalidJob { .. })));
    }

    #[test]
    fn test_split_counts_and_order() {
        for n in 1..=60 {
            for c in 1..=16 {
                let source = inputs(n);
                let chunks = split(&source, c).unwrap();
                assert_eq!(chunks.len(), n.div_ceil(c));

                let rebuilt: Vec<PathBuf> =
                    chunks.iter().flat_map(|chunk| chunk.inputs.clone()).collect();
                assert_eq!(rebuilt, source);

                for (i, chunk) in chunks.iter().enumerate() {
                    assert_eq!(chunk.index, i);
                    assert!(!chunk.is_empty());
                    if i + 1 < chunks.len() {
                        assert_eq!(chunk.len(), c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_split_zero_chunk_size() {
        let chunks = split(&inputs(3), 0).unwrap();
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_plan_tiers() {
        assert_eq!(
            BatchPlan::for_inputs(30, 16),
            BatchPlan {
                chunk_size: 15,
                max_concurrent: 4
            }
        );
        assert_eq!(
            BatchPlan::for_inputs(51, 16),
            BatchPlan {
                chunk_size: 12,
                max_concurrent: 3
            }
        );
        assert_eq!(
            BatchPlan::for_inputs(100, 16),
            BatchPlan {
                chunk_size: 12,
                max_concurrent: 3
            }
        );
        assert_eq!(
            BatchPlan::for_inputs(101, 16),
            BatchPlan {
                chunk_size: 10,
                max_concurrent: 2
            }
        );
    }

    #[test]
    fn test_plan_concurrency_follows_cores() {
        assert_eq!(BatchPlan::for_inputs(10, 1).max_concurrent, 1);
        assert_eq!(BatchPlan::for_inputs(10, 4).max_concurrent, 2);
        assert_eq!(BatchPlan::for_inputs(10, 6).max_concurrent, 3);
        assert_eq!(BatchPlan::for_inputs(500, 2).max_concurrent, 1);
    }

    #[test]
    fn test_plan_chunk_count() {
        let plan = BatchPlan::for_inputs(101, 8);
        assert_eq!(plan.chunk_count(101), 11);
    }
}
