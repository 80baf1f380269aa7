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

//! Line-oriented diffing of two byte texts.

#![expect(missing_docs)]

use std::collections::HashMap;
use std::iter;
use std::ops::Range;

use bstr::BStr;

/// Byte ranges of the lines in `text`. Each line includes its trailing
/// newline, except possibly the last one.
pub fn find_line_ranges(text: &[u8]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for line in text.split_inclusive(|b| *b == b'\n') {
        ranges.push(start..start + line.len());
        start += line.len();
    }
    ranges
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiffHunkKind {
    Matching,
    Different,
}

/// A contiguous region of a two-input diff.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiffHunk<'input> {
    pub kind: DiffHunkKind,
    pub contents: [&'input BStr; 2],
}

/// Line-level diff of two inputs.
#[derive(Clone, Debug)]
pub struct ContentDiff<'input> {
    hunks: Vec<DiffHunk<'input>>,
}

impl<'input> ContentDiff<'input> {
    /// Diffs `inputs` by line. The returned hunks alternate between
    /// matching and differing regions and together cover both inputs.
    pub fn by_line<T: AsRef<[u8]> + ?Sized>(inputs: [&'input T; 2]) -> Self {
        let [left, right]: [&[u8]; 2] = inputs.map(AsRef::as_ref);
        let left_ranges = find_line_ranges(left);
        let right_ranges = find_line_ranges(right);
        let mut symbols = HashMap::new();
        let left_symbols = intern_lines(&mut symbols, left, &left_ranges);
        let right_symbols = intern_lines(&mut symbols, right, &right_ranges);
        let mut matches = Vec::new();
        collect_matches(&left_symbols, &right_symbols, 0, 0, &mut matches);

        let line_span = |text: &'input [u8], ranges: &[Range<usize>], lines: Range<usize>| {
            let start = ranges.get(lines.start).map_or(text.len(), |range| range.start);
            let end = if lines.is_empty() {
                start
            } else {
                ranges[lines.end - 1].end
            };
            BStr::new(&text[start..end])
        };

        let mut hunks = Vec::new();
        let (mut left_pos, mut right_pos) = (0, 0);
        let mut index = 0;
        while index < matches.len() {
            let (left_start, right_start) = matches[index];
            if left_start > left_pos || right_start > right_pos {
                hunks.push(DiffHunk {
                    kind: DiffHunkKind::Different,
                    contents: [
                        line_span(left, &left_ranges, left_pos..left_start),
                        line_span(right, &right_ranges, right_pos..right_start),
                    ],
                });
            }
            let mut run = 1;
            while index + run < matches.len()
                && matches[index + run] == (left_start + run, right_start + run)
            {
                run += 1;
            }
            hunks.push(DiffHunk {
                kind: DiffHunkKind::Matching,
                contents: [
                    line_span(left, &left_ranges, left_start..left_start + run),
                    line_span(right, &right_ranges, right_start..right_start + run),
                ],
            });
            left_pos = left_start + run;
            right_pos = right_start + run;
            index += run;
        }
        if left_pos < left_ranges.len() || right_pos < right_ranges.len() {
            hunks.push(DiffHunk {
                kind: DiffHunkKind::Different,
                contents: [
                    line_span(left, &left_ranges, left_pos..left_ranges.len()),
                    line_span(right, &right_ranges, right_pos..right_ranges.len()),
                ],
            });
        }
        Self { hunks }
    }

    pub fn hunks(&self) -> &[DiffHunk<'input>] {
        &self.hunks
    }
}

/// The changed regions between `left` and `right` as pairs of line
/// ranges: `left[a1..a2]` is replaced by `right[b1..b2]`. The pairs are
/// ordered and non-overlapping, and together with the matching gaps
/// between them they cover both inputs.
pub fn changed_line_ranges(left: &[u8], right: &[u8]) -> Vec<(Range<usize>, Range<usize>)> {
    let diff = ContentDiff::by_line([left, right]);
    let mut changed = Vec::new();
    let (mut left_pos, mut right_pos) = (0, 0);
    for hunk in diff.hunks() {
        let left_count = count_lines(hunk.contents[0]);
        let right_count = count_lines(hunk.contents[1]);
        if hunk.kind == DiffHunkKind::Different {
            changed.push((
                left_pos..left_pos + left_count,
                right_pos..right_pos + right_count,
            ));
        }
        left_pos += left_count;
        right_pos += right_count;
    }
    changed
}

fn count_lines(text: &BStr) -> usize {
    text.split_inclusive(|b| *b == b'\n').count()
}

fn intern_lines<'input>(
    symbols: &mut HashMap<&'input [u8], u32>,
    text: &'input [u8],
    ranges: &[Range<usize>],
) -> Vec<u32> {
    ranges
        .iter()
        .map(|range| {
            let next = symbols.len() as u32;
            *symbols.entry(&text[range.clone()]).or_insert(next)
        })
        .collect()
}

/// Appends `(left, right)` line index pairs for lines common to both
/// sides, strictly increasing on both. Lines unique to each side anchor
/// the match, patience style; regions without usable anchors contribute
/// no matches and end up in a single differing hunk.
fn collect_matches(
    left: &[u32],
    right: &[u32],
    left_off: usize,
    right_off: usize,
    out: &mut Vec<(usize, usize)>,
) {
    let prefix_len = iter::zip(left, right).take_while(|(l, r)| l == r).count();
    out.extend((0..prefix_len).map(|i| (left_off + i, right_off + i)));
    let left_rest = &left[prefix_len..];
    let right_rest = &right[prefix_len..];
    let suffix_len = iter::zip(left_rest.iter().rev(), right_rest.iter().rev())
        .take_while(|(l, r)| l == r)
        .count();
    let left_mid = &left_rest[..left_rest.len() - suffix_len];
    let right_mid = &right_rest[..right_rest.len() - suffix_len];
    let left_mid_off = left_off + prefix_len;
    let right_mid_off = right_off + prefix_len;

    let mut anchors: Vec<(usize, usize)> = {
        let left_unique = unique_positions(left_mid);
        let right_unique = unique_positions(right_mid);
        left_unique
            .into_iter()
            .filter_map(|(symbol, left_pos)| {
                right_unique
                    .get(&symbol)
                    .map(|&right_pos| (left_pos, right_pos))
            })
            .collect()
    };
    anchors.sort_unstable();
    let chosen = longest_increasing_run(&anchors);
    if !chosen.is_empty() {
        let (mut left_pos, mut right_pos) = (0, 0);
        for &(left_anchor, right_anchor) in &chosen {
            collect_matches(
                &left_mid[left_pos..left_anchor],
                &right_mid[right_pos..right_anchor],
                left_mid_off + left_pos,
                right_mid_off + right_pos,
                out,
            );
            out.push((left_mid_off + left_anchor, right_mid_off + right_anchor));
            (left_pos, right_pos) = (left_anchor + 1, right_anchor + 1);
        }
        collect_matches(
            &left_mid[left_pos..],
            &right_mid[right_pos..],
            left_mid_off + left_pos,
            right_mid_off + right_pos,
            out,
        );
    }
    out.extend((0..suffix_len).map(|i| {
        (
            left_off + left.len() - suffix_len + i,
            right_off + right.len() - suffix_len + i,
        )
    }));
}

/// Positions of the symbols occurring exactly once.
fn unique_positions(symbols: &[u32]) -> HashMap<u32, usize> {
    let mut counts: HashMap<u32, (usize, usize)> = HashMap::new();
    for (pos, &symbol) in symbols.iter().enumerate() {
        let entry = counts.entry(symbol).or_insert((0, pos));
        entry.0 += 1;
    }
    counts
        .into_iter()
        .filter(|&(_, (count, _))| count == 1)
        .map(|(symbol, (_, pos))| (symbol, pos))
        .collect()
}

/// Longest subsequence of `anchors` (sorted by left position) whose right
/// positions are strictly increasing.
fn longest_increasing_run(anchors: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; anchors.len()];
    for (index, &(_, right_pos)) in anchors.iter().enumerate() {
        let insert_at = tails.partition_point(|&tail| anchors[tail].1 < right_pos);
        if insert_at > 0 {
            prev[index] = Some(tails[insert_at - 1]);
        }
        if insert_at == tails.len() {
            tails.push(index);
        } else {
            tails[insert_at] = index;
        }
    }
    let mut chosen = Vec::new();
    let mut cursor = tails.last().copied();
    while let Some(index) = cursor {
        chosen.push(anchors[index]);
        cursor = prev[index];
    }
    chosen.reverse();
    chosen
}
