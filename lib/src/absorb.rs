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

//! Absorb: fold pending working-copy changes back into the stack revision
//! that last touched the surrounding lines.
//!
//! [`analyse_file_stack`] fuses a line diff of the new text against the
//! stack top with per-line blame from the stack's
//! [`LineLog`](crate::linelog::LineLog), producing [`AbsorbDiffChunk`]s
//! annotated with the revision each hunk can be folded into.
//! [`apply_file_stack_edits`] materializes accepted chunks into a new
//! stack. [`calculate_absorb_edits_for_file_stack`] instead encodes every
//! chunk into the stack as a fractional revision keyed by its
//! [`AbsorbEditId`], so an interactive caller can re-target chunks
//! without re-running the analysis.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use bstr::BStr;
use bstr::BString;
use itertools::Itertools as _;
use thiserror::Error;

use crate::diff::changed_line_ranges;
use crate::file_stack::FileStackState;
use crate::linelog::Rev;

/// Error from analysing or applying absorb edits.
#[derive(Debug, Error)]
pub enum AbsorbError {
    /// Analyse or apply was called on a stack with no revisions.
    #[error("file stack has no revisions")]
    EmptyStack,
    /// An operation needing an integer stack position got a fractional
    /// revision.
    #[error("revision {rev} is not an integer stack position")]
    FractionalRev {
        /// The offending revision.
        rev: Rev,
    },
    /// All fractional slots between two stack positions are taken.
    #[error("absorb edit id {id} does not fit in a fractional revision")]
    AbsorbEditIdOverflow {
        /// The identifier that does not fit.
        id: AbsorbEditId,
    },
    /// The revision carries no embedded absorb edit id.
    #[error("revision {rev} has no embedded absorb edit id")]
    MissingAbsorbId {
        /// The revision that was unpacked.
        rev: Rev,
    },
    /// A chunk is destined to a revision older than the one that
    /// introduced the surrounding lines.
    #[error("chunk destination {selected} predates introduction revision {introduction}")]
    DestinationTooEarly {
        /// The destination selected for the chunk.
        selected: Rev,
        /// The earliest revision the chunk may be absorbed into.
        introduction: Rev,
    },
}

/// Identifier of one absorb edit within a single analysis result.
///
/// Embedded into the fractional part of a revision so that a single line
/// log can carry many uncommitted absorb edits while staying
/// checkout-able at every revision.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AbsorbEditId(u32);

impl AbsorbEditId {
    /// The highest assignable id. The top fractional slot is reserved so
    /// [`rev_with_absorb`] can address "this revision with all of its
    /// absorb edits".
    pub const MAX: AbsorbEditId = AbsorbEditId(Rev::SUB_REV_SLOTS as u32 - 2);

    /// Wraps a raw id.
    pub const fn new(id: u32) -> Self {
        AbsorbEditId(id)
    }

    /// The raw id.
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for AbsorbEditId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Embeds `id` into the fractional part of the integer revision `rev`.
///
/// The result orders after `rev` and before `rev + 1`, so an edit
/// attributed to it is observed from `rev` onward without disturbing the
/// stack's integer positions.
pub fn embed_absorb_id(rev: Rev, id: AbsorbEditId) -> Result<Rev, AbsorbError> {
    if !rev.is_integral() {
        return Err(AbsorbError::FractionalRev { rev });
    }
    if id > AbsorbEditId::MAX {
        return Err(AbsorbError::AbsorbEditIdOverflow { id });
    }
    Ok(Rev::from_parts(rev.floor_index(), u64::from(id.value()) + 1))
}

/// Splits a fractional revision back into its integer stack position and
/// the embedded absorb edit id.
pub fn extract_rev_absorb_id(rev: Rev) -> Result<(Rev, AbsorbEditId), AbsorbError> {
    let sub_rev = rev.sub_rev();
    if sub_rev == 0 {
        return Err(AbsorbError::MissingAbsorbId { rev });
    }
    Ok((rev.floor(), AbsorbEditId((sub_rev - 1) as u32)))
}

/// The fractional revision just below `rev + 1`. Checking it out yields
/// the content of `rev` with every absorb edit currently assigned to it
/// included.
pub fn rev_with_absorb(rev: Rev) -> Rev {
    Rev::from_parts(rev.floor_index(), Rev::SUB_REV_SLOTS - 1)
}

/// A contiguous region of the diff between the stack top and the new
/// working-copy text, annotated with the revision it can be folded into.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AbsorbDiffChunk {
    /// Start of the replaced line range in the stack-top text.
    pub old_start: usize,
    /// End (exclusive) of the replaced line range.
    pub old_end: usize,
    /// The replaced lines, `old[old_start..old_end]`.
    pub old_lines: Vec<BString>,
    /// Start of the replacement line range in the new text.
    pub new_start: usize,
    /// End (exclusive) of the replacement line range.
    pub new_end: usize,
    /// The replacement lines, `new[new_start..new_end]`.
    pub new_lines: Vec<BString>,
    /// Earliest revision the chunk may be absorbed into. The public base
    /// marks a chunk that cannot be absorbed anywhere.
    pub introduction_rev: Rev,
    /// Destination revision, or `None` to leave the change in the working
    /// copy. Callers may flip this to any revision at or after
    /// `introduction_rev`.
    pub selected_rev: Option<Rev>,
    /// Identifier assigned by [`calculate_absorb_edits_for_file_stack`]
    /// when the chunk is encoded as a fractional revision.
    pub absorb_edit_id: Option<AbsorbEditId>,
}

/// Computes how the changes between the stack top and `new_text` can be
/// folded back into the stack.
///
/// Chunks are returned in textual order. `stack_top_rev` overrides the
/// revision the diff and blame are taken against; it defaults to the
/// stack's last revision.
pub fn analyse_file_stack(
    stack: &FileStackState,
    new_text: &[u8],
    stack_top_rev: Option<usize>,
) -> Result<Vec<AbsorbDiffChunk>, AbsorbError> {
    if stack.rev_length() == 0 {
        return Err(AbsorbError::EmptyStack);
    }
    let old_rev = Rev::from_index(stack_top_rev.unwrap_or(stack.rev_length() - 1));
    let log = stack.to_line_log();
    let old_line_infos = log.checkout_lines(old_rev);
    let mut old_text = BString::default();
    for info in &old_line_infos {
        old_text.extend_from_slice(info.text);
    }
    let old_lines: Vec<&BStr> = old_line_infos.iter().map(|info| info.text).collect();
    // Blame per old line, with a trailing public entry standing in for
    // the end of file so insertions at EOF can consult "the next line".
    let blame: Vec<Rev> = old_line_infos
        .iter()
        .map(|info| info.rev)
        .chain([Rev::PUBLIC])
        .collect();
    let new_lines: Vec<&BStr> = new_text
        .split_inclusive(|b| *b == b'\n')
        .map(BStr::new)
        .collect();

    let make_chunk = |old_range: Range<usize>,
                      new_range: Range<usize>,
                      introduction_rev: Rev,
                      selected_rev: Option<Rev>| {
        AbsorbDiffChunk {
            old_start: old_range.start,
            old_end: old_range.end,
            old_lines: old_lines[old_range].iter().map(|&line| line.to_owned()).collect(),
            new_start: new_range.start,
            new_end: new_range.end,
            new_lines: new_lines[new_range].iter().map(|&line| line.to_owned()).collect(),
            introduction_rev,
            selected_rev,
            absorb_edit_id: None,
        }
    };

    let mut chunks = Vec::new();
    for (old_range, new_range) in changed_line_ranges(&old_text, new_text) {
        let (a1, a2) = (old_range.start, old_range.end);
        let (b1, b2) = (new_range.start, new_range.end);
        let involved_revs: Vec<Rev> = blame[a1..a2].iter().copied().unique().collect();
        let mutable_revs: Vec<Rev> = involved_revs
            .iter()
            .copied()
            .filter(|rev| !rev.is_public())
            .collect();
        if a1 == a2 {
            // Pure insertion: attribute to the revision owning the
            // surrounding lines, if that is unambiguous after excluding
            // the public base.
            let nearby_revs: Vec<Rev> = [a2, a1.saturating_sub(1)]
                .into_iter()
                .unique()
                .map(|index| blame[index])
                .unique()
                .filter(|rev| !rev.is_public())
                .collect();
            if let &[rev] = nearby_revs.as_slice() {
                chunks.push(make_chunk(a1..a2, b1..b2, rev, Some(rev)));
                continue;
            }
        } else if let &[rev] = mutable_revs.as_slice() {
            // The changed lines come from one mutable revision, ignoring
            // any public lines caught in the range; the whole range folds
            // into that revision.
            chunks.push(make_chunk(a1..a2, b1..b2, rev, Some(rev)));
            continue;
        } else if b1 == b2 {
            // Deletion: split by the revision owning each deleted run.
            // Runs owned by the public base keep it as their selection;
            // the appliers skip those.
            split_chunk(a1, a2, &blame, |start, end, rev| {
                chunks.push(make_chunk(start..end, b1..b2, rev, Some(rev)));
            });
            continue;
        } else if a2 - a1 == b2 - b1 && !mutable_revs.is_empty() {
            // Equal-length replacement: old and new lines map 1:1, split
            // by owning revision. Public runs stay unselected.
            split_chunk(a1, a2, &blame, |start, end, rev| {
                let new_start = start - a1 + b1;
                let new_end = end - a1 + b1;
                chunks.push(make_chunk(
                    start..end,
                    new_start..new_end,
                    rev,
                    (!rev.is_public()).then_some(rev),
                ));
            });
            continue;
        }
        // Mixed provenance or an uneven replacement: leave the chunk in
        // the working copy, bounded below by the newest involved revision.
        let introduction_rev = involved_revs.iter().copied().max().unwrap_or(Rev::PUBLIC);
        chunks.push(make_chunk(a1..a2, b1..b2, introduction_rev, None));
    }
    Ok(chunks)
}

/// Splits `[start, end)` into maximal runs of lines owned by the same
/// revision, invoking `emit(run_start, run_end, rev)` for each run in
/// order. Runs split on ownership changes only; whether the owning lines
/// were contiguous in the owning revision is not considered.
fn split_chunk(start: usize, end: usize, blame: &[Rev], mut emit: impl FnMut(usize, usize, Rev)) {
    let mut run_start = start;
    for index in start..end {
        if index + 1 == end || blame[index + 1] != blame[index] {
            emit(run_start, index + 1, blame[index]);
            run_start = index + 1;
        }
    }
}

/// Materializes `chunks` into a new stack.
///
/// Each chunk with a non-public `selected_rev` is folded into that
/// revision and carried forward through the rest of the stack; all other
/// chunks are skipped. Chunk line numbers are interpreted against the
/// stack's top revision. The input stack is left untouched.
pub fn apply_file_stack_edits<'a>(
    stack: &FileStackState,
    chunks: impl IntoIterator<Item = &'a AbsorbDiffChunk>,
) -> Result<FileStackState, AbsorbError> {
    if stack.rev_length() == 0 {
        return Err(AbsorbError::EmptyStack);
    }
    let mut log = stack.to_line_log();
    // Shift every revision to an even label, reserving the odd labels in
    // between as override slots: an edit attributed to `2 * rev + 1` is
    // observed by revision `rev` and all of its successors without
    // colliding with the revision's own lines.
    log.remap_revs(|rev| rev * 2);
    let old_rev = Rev::from_index((stack.rev_length() - 1) * 2);
    // Apply in descending line order so earlier edits cannot shift the
    // line numbers of chunks still to be applied.
    let selected = chunks
        .into_iter()
        .filter_map(|chunk| {
            let rev = chunk.selected_rev.filter(|rev| !rev.is_public())?;
            Some((rev, chunk))
        })
        .sorted_by_key(|&(_, chunk)| Reverse(chunk.old_end));
    for (rev, chunk) in selected {
        if rev < chunk.introduction_rev {
            return Err(AbsorbError::DestinationTooEarly {
                selected: rev,
                introduction: chunk.introduction_rev,
            });
        }
        let index = rev.index().ok_or(AbsorbError::FractionalRev { rev })?;
        log.edit_chunk(
            old_rev,
            chunk.old_start,
            chunk.old_end,
            Rev::from_index(index * 2 + 1),
            chunk.new_lines.iter().cloned(),
        );
    }
    let texts = (0..stack.rev_length())
        .map(|index| log.checkout(Rev::from_index(index * 2 + 1)))
        .collect();
    Ok(FileStackState::new(texts))
}

/// Analyses a stack whose last revision is the working copy and encodes
/// every resulting chunk into the stack as a fractional revision.
///
/// Returns the line-log-backed stack and the chunk per absorb edit id.
/// Checking out `rev_with_absorb(rev)` of the returned stack yields the
/// content of `rev` with all chunks currently assigned to it, and
/// `rev_with_absorb` of the working-copy revision still yields every
/// pending change. An interactive caller can re-target one chunk by
/// remapping only its fractional revision, with no further analysis.
pub fn calculate_absorb_edits_for_file_stack(
    stack: &FileStackState,
) -> Result<(FileStackState, BTreeMap<AbsorbEditId, AbsorbDiffChunk>), AbsorbError> {
    if stack.rev_length() == 0 {
        return Err(AbsorbError::EmptyStack);
    }
    let wdir_index = stack.rev_length() - 1;
    let wdir_rev = Rev::from_index(wdir_index);
    let new_text = stack.get_text(wdir_rev);
    // Analyse against the stack without the working-copy revision.
    let stack_without_wdir = stack.truncate(wdir_index);
    let mut chunks = analyse_file_stack(&stack_without_wdir, &new_text, None)?;
    for (index, chunk) in chunks.iter_mut().enumerate() {
        chunk.absorb_edit_id = Some(AbsorbEditId::new(index as u32));
    }
    let mut log = stack_without_wdir.to_line_log();
    let old_rev = Rev::from_index(stack_without_wdir.rev_length() - 1);
    // Descending line order, for the same reason as in
    // `apply_file_stack_edits`.
    for chunk in chunks.iter().sorted_by_key(|chunk| Reverse(chunk.old_end)) {
        let id = chunk.absorb_edit_id.expect("assigned above");
        // Chunks with no destination, and chunks the analysis pinned to
        // the public base, stay in the working copy.
        let base = chunk
            .selected_rev
            .filter(|rev| !rev.is_public())
            .unwrap_or(wdir_rev);
        let target = embed_absorb_id(base, id)?;
        if target < chunk.introduction_rev {
            return Err(AbsorbError::DestinationTooEarly {
                selected: target,
                introduction: chunk.introduction_rev,
            });
        }
        log.edit_chunk(
            old_rev,
            chunk.old_start,
            chunk.old_end,
            target,
            chunk.new_lines.iter().cloned(),
        );
    }
    let edits = chunks
        .into_iter()
        .map(|chunk| (chunk.absorb_edit_id.expect("assigned above"), chunk))
        .collect();
    Ok((FileStackState::from_line_log(log, wdir_index + 1), edits))
}
