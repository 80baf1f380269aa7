// Copyright 2025 The Absorb Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line history across the revisions of a file stack.
//!
//! A [`LineLog`] indexes every line ever present in a file across a
//! linear stack of revisions. It can check out the content at any
//! revision, report the revision that introduced each line, and accept
//! edits attributed to past or fractional revisions so that later
//! checkouts observe the override.

use std::fmt;
use std::ops::Mul;

use bstr::BStr;
use bstr::BString;

use crate::diff::changed_line_ranges;
use crate::diff::find_line_ranges;

/// Revision label within a [`LineLog`].
///
/// Integer stack positions are stored scaled by [`Rev::SUB_REV_SLOTS`],
/// leaving fractional slots between consecutive positions. The slots
/// carry absorb edits (see [`crate::absorb::embed_absorb_id`]); all
/// arithmetic on them is exact.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Rev(u64);

impl Rev {
    /// Number of fractional slots between consecutive stack positions.
    pub const SUB_REV_SLOTS: u64 = 1 << 20;

    /// The immutable public base of a stack.
    pub const PUBLIC: Rev = Rev(0);

    /// Label of the integer stack position `index`.
    pub fn from_index(index: usize) -> Self {
        Rev((index as u64) * Self::SUB_REV_SLOTS)
    }

    /// The stack position, if this label is integral.
    pub fn index(self) -> Option<usize> {
        self.is_integral().then(|| self.floor_index())
    }

    /// The nearest integral label at or below this one.
    pub fn floor(self) -> Rev {
        Rev(self.0 - self.sub_rev())
    }

    /// Stack position of [`Rev::floor`].
    pub fn floor_index(self) -> usize {
        (self.0 / Self::SUB_REV_SLOTS) as usize
    }

    /// Whether the label has no fractional part.
    pub fn is_integral(self) -> bool {
        self.sub_rev() == 0
    }

    /// Whether this is the immutable public base revision.
    pub fn is_public(self) -> bool {
        self == Self::PUBLIC
    }

    pub(crate) fn sub_rev(self) -> u64 {
        self.0 % Self::SUB_REV_SLOTS
    }

    pub(crate) fn from_parts(index: usize, sub_rev: u64) -> Rev {
        debug_assert!(sub_rev < Self::SUB_REV_SLOTS);
        Rev((index as u64) * Self::SUB_REV_SLOTS + sub_rev)
    }
}

impl Mul<u64> for Rev {
    type Output = Rev;

    /// Scales the label, integer and fractional parts alike. Used to open
    /// override slots between existing revisions.
    fn mul(self, factor: u64) -> Rev {
        Rev(self.0 * factor)
    }
}

impl fmt::Display for Rev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_integral() {
            write!(f, "{}", self.floor_index())
        } else {
            write!(
                f,
                "{}+{}/{}",
                self.floor_index(),
                self.sub_rev(),
                Self::SUB_REV_SLOTS
            )
        }
    }
}

/// Identity of a line within a [`LineLog`], stable across edits.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LineId(u32);

/// A line visible at some revision, with its provenance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LineInfo<'a> {
    /// Line content, trailing newline included (except possibly at EOF).
    pub text: &'a BStr,
    /// Revision that introduced the line.
    pub rev: Rev,
    /// Stable identity of the line.
    pub id: LineId,
}

#[derive(Clone, Debug)]
struct LineRecord {
    introduced: Rev,
    deleted: Option<Rev>,
    id: LineId,
    text: BString,
}

impl LineRecord {
    fn visible_at(&self, rev: Rev) -> bool {
        self.introduced <= rev && self.deleted.is_none_or(|deleted| deleted > rev)
    }
}

/// Interleaved history of every line across the revisions of a stack.
///
/// Records are kept in weave order: the records visible at any revision
/// appear in the file's line order at that revision.
#[derive(Clone, Debug, Default)]
pub struct LineLog {
    records: Vec<LineRecord>,
    max_rev: Rev,
    next_line_id: u32,
}

impl LineLog {
    /// Creates an empty log whose every checkout is the empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// The highest revision recorded or edited so far.
    pub fn max_rev(&self) -> Rev {
        self.max_rev
    }

    /// File content at `rev`.
    pub fn checkout(&self, rev: Rev) -> BString {
        let mut text = BString::default();
        for record in &self.records {
            if record.visible_at(rev) {
                text.extend_from_slice(&record.text);
            }
        }
        text
    }

    /// Per-line provenance of the content at `rev`.
    pub fn checkout_lines(&self, rev: Rev) -> Vec<LineInfo<'_>> {
        self.records
            .iter()
            .filter(|record| record.visible_at(rev))
            .map(|record| LineInfo {
                text: record.text.as_ref(),
                rev: record.introduced,
                id: record.id,
            })
            .collect()
    }

    /// Within the view at `from_rev`, replaces lines `[a1, a2)` by
    /// `new_lines`. The edit is attributed to `to_rev` and observed by
    /// checkouts at `to_rev` and later; checkouts below `to_rev` are
    /// unaffected.
    ///
    /// Panics if `[a1, a2)` is not a valid line range at `from_rev`.
    pub fn edit_chunk(
        &mut self,
        from_rev: Rev,
        a1: usize,
        a2: usize,
        to_rev: Rev,
        new_lines: impl IntoIterator<Item = BString>,
    ) {
        let visible: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.visible_at(from_rev))
            .map(|(index, _)| index)
            .collect();
        assert!(
            a1 <= a2 && a2 <= visible.len(),
            "line range {a1}..{a2} out of bounds at revision {from_rev}"
        );
        let insert_at = if a1 < visible.len() {
            visible[a1]
        } else {
            visible.last().map_or(self.records.len(), |last| last + 1)
        };
        for &index in &visible[a1..a2] {
            let record = &mut self.records[index];
            record.deleted = Some(record.deleted.map_or(to_rev, |deleted| deleted.min(to_rev)));
        }
        let new_records: Vec<LineRecord> = new_lines
            .into_iter()
            .map(|text| {
                let id = LineId(self.next_line_id);
                self.next_line_id += 1;
                LineRecord {
                    introduced: to_rev,
                    deleted: None,
                    id,
                    text,
                }
            })
            .collect();
        self.records.splice(insert_at..insert_at, new_records);
        self.max_rev = self.max_rev.max(to_rev).max(from_rev);
    }

    /// Makes `rev` check out exactly `text` by diffing against the
    /// current tip and recording the changed blocks as edits.
    pub fn record_text(&mut self, rev: Rev, text: &[u8]) {
        let from_rev = self.max_rev;
        let old_text = self.checkout(from_rev);
        let line_ranges = find_line_ranges(text);
        // Apply high blocks first so the line numbers of the remaining
        // blocks stay valid in the `from_rev` view.
        for (old_range, new_range) in changed_line_ranges(&old_text, text).iter().rev() {
            let new_lines = line_ranges[new_range.clone()]
                .iter()
                .map(|range| BString::from(&text[range.clone()]));
            self.edit_chunk(from_rev, old_range.start, old_range.end, rev, new_lines);
        }
        self.max_rev = self.max_rev.max(rev);
    }

    /// Rewrites every revision label through `remap`.
    pub fn remap_revs(&mut self, remap: impl Fn(Rev) -> Rev) {
        for record in &mut self.records {
            record.introduced = remap(record.introduced);
            record.deleted = record.deleted.map(&remap);
        }
        self.max_rev = remap(self.max_rev);
    }
}
