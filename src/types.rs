//src/types.rs

use std::fmt;

/// The eight ranks a lineage string is built from, in top-down order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rank {
    Domain,
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl Rank {
    pub const ALL: [Rank; 8] = [
        Rank::Domain,
        Rank::Kingdom,
        Rank::Phylum,
        Rank::Class,
        Rank::Order,
        Rank::Family,
        Rank::Genus,
        Rank::Species,
    ];

    /// Parse the single-letter report code. Sub-rank codes such as `G1` or
    /// `S2`, and `U`/`R`, are not lineage ranks.
    pub fn from_code(code: &str) -> Option<Rank> {
        match code {
            "D" => Some(Rank::Domain),
            "K" => Some(Rank::Kingdom),
            "P" => Some(Rank::Phylum),
            "C" => Some(Rank::Class),
            "O" => Some(Rank::Order),
            "F" => Some(Rank::Family),
            "G" => Some(Rank::Genus),
            "S" => Some(Rank::Species),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            Rank::Domain => 'D',
            Rank::Kingdom => 'K',
            Rank::Phylum => 'P',
            Rank::Class => 'C',
            Rank::Order => 'O',
            Rank::Family => 'F',
            Rank::Genus => 'G',
            Rank::Species => 'S',
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Rank::Domain => "d__",
            Rank::Kingdom => "k__",
            Rank::Phylum => "p__",
            Rank::Class => "c__",
            Rank::Order => "o__",
            Rank::Family => "f__",
            Rank::Genus => "g__",
            Rank::Species => "s__",
        }
    }

    /// Position in the ladder, domain = 0.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Genus and species rows are the only ones that produce a lineage.
    pub fn is_terminal(self) -> bool {
        matches!(self, Rank::Genus | Rank::Species)
    }
}

/// Which side of the mapping step a read stream came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Mapped,
    Unmapped,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Mapped => f.write_str("mapped"),
            Partition::Unmapped => f.write_str("unmapped"),
        }
    }
}

/// Running totals for one lineage across both partitions.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct LineageCounts {
    pub total: u64,
    pub mapped: u64,
    pub unmapped: u64,
    pub gc_sum: f64,
    pub gc_n: u64,
}

impl LineageCounts {
    pub fn record(&mut self, partition: Partition, gc: f64) {
        self.total += 1;
        match partition {
            Partition::Mapped => self.mapped += 1,
            Partition::Unmapped => self.unmapped += 1,
        }
        self.gc_sum += gc;
        self.gc_n += 1;
    }

    pub fn mapped_proportion(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.mapped as f64 / self.total as f64
        }
    }

    pub fn unmapped_proportion(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.unmapped as f64 / self.total as f64
        }
    }

    pub fn average_gc(&self) -> f64 {
        if self.gc_n == 0 {
            0.0
        } else {
            self.gc_sum / self.gc_n as f64
        }
    }
}

/// One finished row of the attrition table.
#[derive(Debug, Clone, PartialEq)]
pub struct AttritionRow {
    pub lineage: String,
    pub total: u64,
    pub mapped_proportion: f64,
    pub unmapped_proportion: f64,
    pub average_gc: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_codes_round_trip_in_order() {
        for (i, rank) in Rank::ALL.iter().enumerate() {
            assert_eq!(rank.index(), i);
            assert_eq!(Rank::from_code(&rank.code().to_string()), Some(*rank));
        }
        assert_eq!(Rank::from_code("G1"), None);
        assert_eq!(Rank::from_code("U"), None);
    }

    #[test]
    fn empty_counts_never_divide_by_zero() {
        let c = LineageCounts::default();
        assert_eq!(c.mapped_proportion(), 0.0);
        assert_eq!(c.unmapped_proportion(), 0.0);
        assert_eq!(c.average_gc(), 0.0);
    }
}
