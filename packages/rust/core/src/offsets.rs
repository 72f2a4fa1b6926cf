//! Code-point to UTF-16 code-unit offset translation.
//!
//! The scoring model reports spans in code points, while the collection
//! service addresses text in UTF-16 code units. The two only diverge after
//! a character outside the Basic Multilingual Plane, so the map records one
//! breakpoint per such character and binary-searches it.

use docenrich_shared::Location;

/// Cumulative positions right after a character that takes two code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub code_unit: usize,
    pub code_point: usize,
}

impl Breakpoint {
    fn delta(&self) -> usize {
        self.code_unit - self.code_point
    }
}

/// Lookup table from code-point offsets to code-unit offsets for one text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetMap {
    breakpoints: Vec<Breakpoint>,
}

impl OffsetMap {
    /// Scan `text` once and record a breakpoint after every multi-unit character.
    pub fn build(text: &str) -> Self {
        let mut breakpoints = Vec::new();
        let mut code_unit = 0;
        let mut code_point = 0;

        for ch in text.chars() {
            let units = ch.len_utf16();
            code_unit += units;
            code_point += 1;
            if units > 1 {
                breakpoints.push(Breakpoint {
                    code_unit,
                    code_point,
                });
            }
        }

        Self { breakpoints }
    }

    /// Breakpoints, ascending by code point.
    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Translate a code-point offset into a code-unit offset.
    pub fn to_code_unit(&self, code_point: usize) -> usize {
        let nearest = match self
            .breakpoints
            .binary_search_by_key(&code_point, |b| b.code_point)
        {
            Ok(exact) => Some(&self.breakpoints[exact]),
            Err(0) => None,
            Err(insert_at) => Some(&self.breakpoints[insert_at - 1]),
        };

        nearest.map_or(code_point, |b| b.delta() + code_point)
    }

    /// Translate a code-point span and shift it by `base` code units.
    pub fn to_utf16(&self, begin: usize, end: usize, base: usize) -> Location {
        Location {
            begin: base + self.to_code_unit(begin),
            end: base + self.to_code_unit(end),
        }
    }
}
