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

use absorb_lib::absorb::AbsorbEditId;
use absorb_lib::absorb::AbsorbError;
use absorb_lib::absorb::analyse_file_stack;
use absorb_lib::absorb::apply_file_stack_edits;
use absorb_lib::absorb::calculate_absorb_edits_for_file_stack;
use absorb_lib::absorb::rev_with_absorb;
use absorb_lib::file_stack::FileStackState;
use absorb_lib::linelog::Rev;
use assert_matches::assert_matches;
use bstr::BString;
use indoc::indoc;

fn make_stack(texts: &[&str]) -> FileStackState {
    FileStackState::new(texts.iter().map(|text| BString::from(*text)).collect())
}

fn rev(index: usize) -> Rev {
    Rev::from_index(index)
}

#[test]
fn test_absorb_single_blame_line() {
    let stack = make_stack(&["a\nb\nc\n", "a\nB\nc\n"]);
    let chunks = analyse_file_stack(&stack, b"a\nBB\nc\n", None).unwrap();
    assert_eq!(chunks.len(), 1);
    let chunk = &chunks[0];
    assert_eq!((chunk.old_start, chunk.old_end), (1, 2));
    assert_eq!((chunk.new_start, chunk.new_end), (1, 2));
    assert_eq!(chunk.old_lines, ["B\n"]);
    assert_eq!(chunk.new_lines, ["BB\n"]);
    assert_eq!(chunk.introduction_rev, rev(1));
    assert_eq!(chunk.selected_rev, Some(rev(1)));

    let applied = apply_file_stack_edits(&stack, &chunks).unwrap();
    assert_eq!(applied.texts(), ["a\nb\nc\n", "a\nBB\nc\n"]);
}

#[test]
fn test_absorb_insertion_next_to_public_line() {
    // The insertion's neighbours are a public line and a rev-1 line;
    // after excluding the public base, rev 1 remains as the only
    // candidate.
    let stack = make_stack(&["x\ny\n", "x\nY\n"]);
    let chunks = analyse_file_stack(&stack, b"x\nY\nZ\n", None).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!((chunks[0].old_start, chunks[0].old_end), (2, 2));
    assert_eq!((chunks[0].new_start, chunks[0].new_end), (2, 3));
    assert_eq!(chunks[0].selected_rev, Some(rev(1)));

    let applied = apply_file_stack_edits(&stack, &chunks).unwrap();
    assert_eq!(applied.texts(), ["x\ny\n", "x\nY\nZ\n"]);
}

#[test]
fn test_absorb_deletion_spanning_blames() {
    let stack = make_stack(&["a\nb\n", "a\nb\nc\n", "a\nb\nc\nd\n"]);
    let chunks = analyse_file_stack(&stack, b"a\n", None).unwrap();
    let ranges: Vec<_> = chunks
        .iter()
        .map(|chunk| (chunk.old_start, chunk.old_end))
        .collect();
    assert_eq!(ranges, [(1, 2), (2, 3), (3, 4)]);
    let selections: Vec<_> = chunks.iter().map(|chunk| chunk.selected_rev).collect();
    assert_eq!(selections, [Some(rev(0)), Some(rev(1)), Some(rev(2))]);

    // The public sub-chunk is skipped; the others remove their lines from
    // their own revisions onward.
    let applied = apply_file_stack_edits(&stack, &chunks).unwrap();
    assert_eq!(applied.texts(), ["a\nb\n", "a\nb\n", "a\nb\n"]);
}

#[test]
fn test_absorb_equal_length_replacement_with_mixed_blames() {
    let stack = make_stack(&["p\nq\n", "P\nq\n", "P\nQ\n"]);
    let chunks = analyse_file_stack(&stack, b"P'\nQ'\n", None).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].new_lines, ["P'\n"]);
    assert_eq!(chunks[0].selected_rev, Some(rev(1)));
    assert_eq!(chunks[1].new_lines, ["Q'\n"]);
    assert_eq!(chunks[1].selected_rev, Some(rev(2)));

    let applied = apply_file_stack_edits(&stack, &chunks).unwrap();
    assert_eq!(applied.texts(), ["p\nq\n", "P'\nq\n", "P'\nQ'\n"]);
    // With every chunk selected, the top revision reproduces the new
    // text.
    assert_eq!(applied.get_text(rev(2)), "P'\nQ'\n");
}

#[test]
fn test_absorb_equal_length_replacement_folds_public_run_with_single_blame() {
    // The range mixes a public line with lines from exactly one mutable
    // revision, so the whole range folds into that revision.
    let stack = make_stack(&["a\nb\n", "a\nB\n"]);
    let chunks = analyse_file_stack(&stack, b"A\nB'\n", None).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].old_lines, ["a\n", "B\n"]);
    assert_eq!(chunks[0].new_lines, ["A\n", "B'\n"]);
    assert_eq!(chunks[0].introduction_rev, rev(1));
    assert_eq!(chunks[0].selected_rev, Some(rev(1)));

    let applied = apply_file_stack_edits(&stack, &chunks).unwrap();
    assert_eq!(applied.texts(), ["a\nb\n", "A\nB'\n"]);
}

#[test]
fn test_absorb_deletion_folds_public_run_with_single_blame() {
    // Same blame shape as above, but as a pure deletion: the deleted
    // range is not split per owning revision when only one mutable
    // revision is involved.
    let stack = make_stack(&["a\nb\nc\n", "a\nb\nC\n"]);
    let chunks = analyse_file_stack(&stack, b"a\n", None).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!((chunks[0].old_start, chunks[0].old_end), (1, 3));
    assert_eq!(chunks[0].old_lines, ["b\n", "C\n"]);
    assert!(chunks[0].new_lines.is_empty());
    assert_eq!(chunks[0].introduction_rev, rev(1));
    assert_eq!(chunks[0].selected_rev, Some(rev(1)));

    let applied = apply_file_stack_edits(&stack, &chunks).unwrap();
    assert_eq!(applied.texts(), ["a\nb\nc\n", "a\n"]);
}

#[test]
fn test_absorb_uneven_replacement_with_single_blame() {
    // An uneven replacement still folds when only one mutable revision is
    // involved.
    let stack = make_stack(&["a\nb\n", "a\nB\n"]);
    let chunks = analyse_file_stack(&stack, b"X\nY\nZ\n", None).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].introduction_rev, rev(1));
    assert_eq!(chunks[0].selected_rev, Some(rev(1)));

    let applied = apply_file_stack_edits(&stack, &chunks).unwrap();
    assert_eq!(applied.texts(), ["a\nb\n", "X\nY\nZ\n"]);
}

#[test]
fn test_absorb_uneven_replacement_falls_back() {
    // Replaced lines come from two mutable revisions and the sides have
    // different lengths, so there is no destination to propose.
    let stack = make_stack(&["a\nb\n", "a\nB\n", "A\nB\n"]);
    let chunks = analyse_file_stack(&stack, b"X\nY\nZ\n", None).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].selected_rev, None);
    assert_eq!(chunks[0].introduction_rev, rev(2));

    // Nothing is selected, so applying changes nothing.
    let applied = apply_file_stack_edits(&stack, &chunks).unwrap();
    assert_eq!(applied.texts(), ["a\nb\n", "a\nB\n", "A\nB\n"]);
}

#[test]
fn test_absorb_ambiguous_insertion_left_in_working_copy() {
    // The inserted line sits between lines owned by two different
    // mutable revisions.
    let stack = make_stack(&["a\nb\n", "A\nb\n", "A\nB\n"]);
    let chunks = analyse_file_stack(&stack, b"A\nZ\nB\n", None).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!((chunks[0].old_start, chunks[0].old_end), (1, 1));
    assert_eq!(chunks[0].selected_rev, None);
    assert_eq!(chunks[0].introduction_rev, rev(0));
}

#[test]
fn test_apply_trivial_input_is_identity() {
    let stack = make_stack(&["a\n", "a\nb\n", "a\nb\nc\n"]);
    let chunks = analyse_file_stack(&stack, b"a\nb\nc\n", None).unwrap();
    assert!(chunks.is_empty());
    let applied = apply_file_stack_edits(&stack, &chunks).unwrap();
    assert_eq!(applied.texts(), stack.texts());
}

#[test]
fn test_chunks_cover_both_texts_in_order() {
    let stack = make_stack(&[
        indoc! {"
            fn a() {}
            fn b() {}
            fn c() {}
        "},
        indoc! {"
            fn a() {}
            fn b() { b }
            fn c() {}
        "},
        indoc! {"
            fn a() { a }
            fn b() { b }
            fn c() {}
        "},
    ]);
    let new_text = indoc! {"
        fn a() { A }
        fn b() { B }
        fn c() {}
        fn d() {}
    "}
    .as_bytes();
    let chunks = analyse_file_stack(&stack, new_text, None).unwrap();

    let old_text = stack.get_text(rev(2));
    let old_lines: Vec<&[u8]> = old_text.split_inclusive(|b| *b == b'\n').collect();
    let new_lines: Vec<&[u8]> = new_text.split_inclusive(|b| *b == b'\n').collect();
    let mut old_rebuilt = BString::default();
    let mut new_rebuilt = BString::default();
    let (mut old_pos, mut new_pos) = (0, 0);
    for chunk in &chunks {
        // Chunks arrive in textual order on both sides.
        assert!(chunk.old_start >= old_pos);
        assert!(chunk.new_start >= new_pos);
        for line in &old_lines[old_pos..chunk.old_start] {
            old_rebuilt.extend_from_slice(line);
        }
        for line in &chunk.old_lines {
            old_rebuilt.extend_from_slice(line);
        }
        for line in &new_lines[new_pos..chunk.new_start] {
            new_rebuilt.extend_from_slice(line);
        }
        for line in &chunk.new_lines {
            new_rebuilt.extend_from_slice(line);
        }
        old_pos = chunk.old_end;
        new_pos = chunk.new_end;
    }
    for line in &old_lines[old_pos..] {
        old_rebuilt.extend_from_slice(line);
    }
    for line in &new_lines[new_pos..] {
        new_rebuilt.extend_from_slice(line);
    }
    // Concatenating the gaps and the chunks reconstructs both texts.
    assert_eq!(old_rebuilt, old_text);
    assert_eq!(new_rebuilt, new_text);

    // Every selectable destination is within the stack and at or after
    // its introduction revision.
    for chunk in &chunks {
        if let Some(selected) = chunk.selected_rev {
            assert!(selected >= chunk.introduction_rev);
            assert!(!selected.is_public());
        }
    }
}

#[test]
fn test_preview_round_trip() {
    let stack = make_stack(&["a\nb\nc\n", "a\nB\nc\n", "a\nBB\nc\n"]);
    let (preview, edits) = calculate_absorb_edits_for_file_stack(&stack).unwrap();
    assert_eq!(edits.len(), 1);
    let chunk = &edits[&AbsorbEditId::new(0)];
    assert_eq!(chunk.selected_rev, Some(rev(1)));

    // The absorb edit is observable from its fractional revision onward,
    // while the integer revisions still check out their original text.
    assert_eq!(preview.get_text(rev(0)), "a\nb\nc\n");
    assert_eq!(preview.get_text(rev(1)), "a\nB\nc\n");
    assert_eq!(preview.get_text(rev_with_absorb(rev(1))), "a\nBB\nc\n");
    assert_eq!(preview.get_text(rev(2)), "a\nBB\nc\n");
    assert_eq!(preview.get_text(rev_with_absorb(rev(2))), "a\nBB\nc\n");
}

#[test]
fn test_preview_keeps_unassigned_edits_in_working_copy() {
    let stack = make_stack(&["a\nb\n", "a\nb\nc\n", "a\nb\nc\nd\n", "a\n"]);
    let (preview, edits) = calculate_absorb_edits_for_file_stack(&stack).unwrap();
    assert_eq!(edits.len(), 3);
    // The deletions of "c" and "d" are absorbed into revisions 1 and 2;
    // the deletion of the public line "b" stays in the working copy.
    assert_eq!(preview.get_text(rev_with_absorb(rev(0))), "a\nb\n");
    assert_eq!(preview.get_text(rev_with_absorb(rev(1))), "a\nb\n");
    assert_eq!(preview.get_text(rev_with_absorb(rev(2))), "a\nb\n");
    assert_eq!(preview.get_text(rev_with_absorb(rev(3))), "a\n");
    assert_eq!(preview.get_text(rev(1)), "a\nb\nc\n");
}

#[test]
fn test_preview_matches_committed_apply() {
    let stack = make_stack(&["a\nb\n", "a\nb\nc\n", "a\nb\nc\nd\n", "a\nx\nc\nd\ne\n"]);
    let (preview, edits) = calculate_absorb_edits_for_file_stack(&stack).unwrap();

    let truncated = stack.truncate(3);
    let committed = apply_file_stack_edits(&truncated, edits.values()).unwrap();
    for index in 0..3 {
        assert_eq!(
            preview.get_text(rev_with_absorb(rev(index))),
            committed.get_text(rev(index)),
        );
    }
    // The working copy still checks out with every pending change,
    // including the ones that could not be absorbed.
    assert_eq!(preview.get_text(rev_with_absorb(rev(3))), "a\nx\nc\nd\ne\n");
}

#[test]
fn test_chunk_can_be_retargeted_to_later_revision() {
    let stack = make_stack(&["a\nb\nc\n", "a\nB\nc\n", "a\nB\nC\n"]);
    let mut chunks = analyse_file_stack(&stack, b"a\nBB\nC\n", None).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].selected_rev, Some(rev(1)));

    chunks[0].selected_rev = Some(rev(2));
    let applied = apply_file_stack_edits(&stack, &chunks).unwrap();
    assert_eq!(applied.texts(), ["a\nb\nc\n", "a\nB\nc\n", "a\nBB\nC\n"]);
}

#[test]
fn test_destination_before_introduction_is_rejected() {
    let stack = make_stack(&["a\nb\nc\n", "a\nB\nc\n", "a\nB\nC\n"]);
    let mut chunks = analyse_file_stack(&stack, b"a\nB\nCC\n", None).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].introduction_rev, rev(2));

    chunks[0].selected_rev = Some(rev(1));
    assert_matches!(
        apply_file_stack_edits(&stack, &chunks),
        Err(AbsorbError::DestinationTooEarly { .. })
    );
}

#[test]
fn test_empty_stack_is_rejected() {
    let empty = FileStackState::new(vec![]);
    assert_matches!(
        analyse_file_stack(&empty, b"x\n", None),
        Err(AbsorbError::EmptyStack)
    );
    assert_matches!(
        apply_file_stack_edits(&empty, []),
        Err(AbsorbError::EmptyStack)
    );
    assert_matches!(
        calculate_absorb_edits_for_file_stack(&empty),
        Err(AbsorbError::EmptyStack)
    );
}

#[test]
fn test_calculate_needs_a_committed_revision() {
    // A stack holding only the working copy has nothing to absorb into.
    let only_wdir = make_stack(&["a\n"]);
    assert_matches!(
        calculate_absorb_edits_for_file_stack(&only_wdir),
        Err(AbsorbError::EmptyStack)
    );
}
