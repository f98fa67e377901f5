//! Observation: structured table statistics with a human-readable form.

use std::fmt;

use crate::map::StepMap;
use crate::node::Link;
use crate::rehash::Hooks;

/// Chain-length histogram resolution; longer chains saturate the last slot.
pub const STATS_VECTLEN: usize = 50;

/// Snapshot of one bucket table.
pub struct TableStats {
    /// 0 for the main table, 1 for the rehashing target.
    pub table: usize,
    pub size: usize,
    pub used: usize,
    /// Only filled for a full snapshot; walking every chain is `O(size)`.
    pub chains: Option<ChainStats>,
}

/// Chain shape of a table.
pub struct ChainStats {
    /// Buckets holding at least one entry.
    pub nonempty_buckets: usize,
    pub max_chain_len: usize,
    pub total_chain_len: usize,
    /// `lengths[n]` counts buckets with a chain of `n` entries.
    pub lengths: [usize; STATS_VECTLEN],
}

/// Snapshot of a map: the main table, plus the target table while a
/// migration is in flight.
pub struct MapStats {
    pub main: TableStats,
    pub rehashing: Option<TableStats>,
}

impl<K, V, S, H: Hooks> StepMap<K, V, S, H> {
    /// Takes a statistics snapshot. `full` walks every bucket to build the
    /// chain-length histogram; otherwise only sizes and counts are read.
    pub fn stats(&self, full: bool) -> MapStats {
        MapStats {
            main: self.table_stats(0, full),
            rehashing: self
                .is_rehashing()
                .then(|| self.table_stats(1, full)),
        }
    }

    fn table_stats(&self, t: usize, full: bool) -> TableStats {
        let table = &self.tables[t];
        let mut stats = TableStats {
            table: t,
            size: table.len(),
            used: table.used,
            chains: None,
        };
        if !full {
            return stats;
        }
        let mut chains = ChainStats {
            nonempty_buckets: 0,
            max_chain_len: 0,
            total_chain_len: 0,
            lengths: [0; STATS_VECTLEN],
        };
        for slot in &table.slots {
            if matches!(slot, Link::Empty) {
                chains.lengths[0] += 1;
                continue;
            }
            chains.nonempty_buckets += 1;
            let len = slot.chain_len();
            chains.lengths[len.min(STATS_VECTLEN - 1)] += 1;
            chains.max_chain_len = chains.max_chain_len.max(len);
            chains.total_chain_len += len;
        }
        stats.chains = Some(chains);
        stats
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = if self.table == 0 {
            "main hash table"
        } else {
            "rehashing target"
        };
        if self.used == 0 {
            return writeln!(
                f,
                "Hash table {} stats ({}):\nNo stats available for empty tables",
                self.table, role
            );
        }
        writeln!(f, "Hash table {} stats ({}):", self.table, role)?;
        writeln!(f, " table size: {}", self.size)?;
        writeln!(f, " number of elements: {}", self.used)?;
        if let Some(chains) = &self.chains {
            writeln!(f, " different slots: {}", chains.nonempty_buckets)?;
            writeln!(f, " max chain length: {}", chains.max_chain_len)?;
            writeln!(
                f,
                " avg chain length (counted): {:.2}",
                chains.total_chain_len as f64 / chains.nonempty_buckets as f64
            )?;
            writeln!(
                f,
                " avg chain length (computed): {:.2}",
                self.used as f64 / chains.nonempty_buckets as f64
            )?;
            writeln!(f, " Chain length distribution:")?;
            for (len, &n) in chains.lengths.iter().enumerate() {
                if n == 0 {
                    continue;
                }
                writeln!(
                    f,
                    "   {}: {} ({:.2}%)",
                    len,
                    n,
                    n as f64 / self.size as f64 * 100.0
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for MapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.main)?;
        if let Some(rehashing) = &self.rehashing {
            write!(f, "{rehashing}")?;
        }
        Ok(())
    }
}
