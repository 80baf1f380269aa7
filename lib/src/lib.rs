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

//! Engine for absorbing working-copy changes back into a stack of file
//! revisions.
//!
//! Given a linear stack of revisions of a file, with the working copy at
//! the top, the engine computes how pending changes can be redistributed
//! so that each hunk lands on the revision that last touched the
//! surrounding lines. See [`absorb::analyse_file_stack`],
//! [`absorb::apply_file_stack_edits`] and
//! [`absorb::calculate_absorb_edits_for_file_stack`].

pub mod absorb;
pub mod diff;
pub mod file_stack;
pub mod linelog;
