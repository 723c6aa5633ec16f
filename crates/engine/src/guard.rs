//! Size ceilings and wall-clock budget around upstream traversal
//!
//! The traversal itself is a plain iterator; the guard decides how far to
//! drive it. Every step re-checks the deadline, the visited-node cap and the
//! running cell total, so a query either finishes inside its limits or
//! returns an error with nothing partial attached.

use crate::config::QueryConfig;
use crate::error::{QueryError, Resource};
use std::time::{Duration, Instant};

/// Nodes visited and steps taken by one guarded traversal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardedWalk {
    pub ids: Vec<u32>,
    pub cells: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceGuard {
    max_cells: u64,
    max_nodes: usize,
    budget: Duration,
}

impl ResourceGuard {
    pub fn new(max_cells: u64, max_nodes: usize, budget: Duration) -> Self {
        Self {
            max_cells,
            max_nodes,
            budget,
        }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        Self::new(config.max_cells, config.max_nodes, config.timeout())
    }

    pub fn max_cells(&self) -> u64 {
        self.max_cells
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// O(1) check of an outlet's stored accumulation.
    pub fn preflight(&self, estimated_cells: u64) -> Result<(), QueryError> {
        if estimated_cells > self.max_cells {
            return Err(QueryError::TooLarge {
                resource: Resource::Cells,
                estimated: estimated_cells,
                ceiling: self.max_cells,
            });
        }
        Ok(())
    }

    /// Fails once `started` is at least one budget in the past. A zero
    /// budget therefore always times out.
    pub fn check_deadline(&self, started: Instant) -> Result<(), QueryError> {
        let elapsed = started.elapsed();
        if elapsed >= self.budget {
            return Err(QueryError::Timeout {
                elapsed,
                budget: self.budget,
            });
        }
        Ok(())
    }

    /// Run a post-traversal stage and re-check the deadline once it returns.
    pub fn within_budget<T, F>(&self, started: Instant, stage: F) -> Result<T, QueryError>
    where
        F: FnOnce() -> Result<T, QueryError>,
    {
        let out = stage()?;
        self.check_deadline(started)?;
        Ok(out)
    }

    /// Drain `walk`, charging `cells_of(id)` for every node it yields.
    pub fn drive<I, F>(&self, walk: I, cells_of: F, started: Instant) -> Result<GuardedWalk, QueryError>
    where
        I: IntoIterator<Item = u32>,
        F: Fn(u32) -> u64,
    {
        let mut out = GuardedWalk::default();
        let mut walk = walk.into_iter();
        loop {
            self.check_deadline(started)?;
            let Some(id) = walk.next() else {
                return Ok(out);
            };
            out.ids.push(id);
            if out.ids.len() > self.max_nodes {
                return Err(QueryError::TooLarge {
                    resource: Resource::Nodes,
                    estimated: out.ids.len() as u64,
                    ceiling: self.max_nodes as u64,
                });
            }
            out.cells += cells_of(id);
            if out.cells > self.max_cells {
                return Err(QueryError::TooLarge {
                    resource: Resource::Cells,
                    estimated: out.cells,
                    ceiling: self.max_cells,
                });
            }
        }
    }
}
