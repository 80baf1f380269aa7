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

//! An immutable stack of revisions of one file.

use bstr::BString;

use crate::linelog::LineLog;
use crate::linelog::Rev;

/// Ordered sequence of file texts: revision 0 is the immutable public
/// base, the last revision is the working copy.
///
/// A stack is a value. Transformations return new states and never mutate
/// their input.
#[derive(Clone, Debug)]
pub struct FileStackState {
    source: FileStackSource,
}

#[derive(Clone, Debug)]
enum FileStackSource {
    /// Materialized text per revision.
    Plain(Vec<BString>),
    /// Backed by a line log, which also serves fractional revisions.
    LineLog { log: LineLog, rev_length: usize },
}

impl FileStackState {
    /// Creates a stack from one text per revision.
    pub fn new(texts: Vec<BString>) -> Self {
        Self {
            source: FileStackSource::Plain(texts),
        }
    }

    /// Wraps a line log as a stack of `rev_length` revisions.
    pub fn from_line_log(log: LineLog, rev_length: usize) -> Self {
        Self {
            source: FileStackSource::LineLog { log, rev_length },
        }
    }

    /// Number of revisions, the working copy included.
    pub fn rev_length(&self) -> usize {
        match &self.source {
            FileStackSource::Plain(texts) => texts.len(),
            FileStackSource::LineLog { rev_length, .. } => *rev_length,
        }
    }

    /// File content at `rev`.
    ///
    /// Fractional revisions are served when the stack is backed by a line
    /// log. Panics if `rev` is fractional or out of range for a plain
    /// stack.
    pub fn get_text(&self, rev: Rev) -> BString {
        match &self.source {
            FileStackSource::Plain(texts) => {
                let index = rev
                    .index()
                    .expect("plain stacks hold integer revisions only");
                texts[index].clone()
            }
            FileStackSource::LineLog { log, .. } => log.checkout(rev),
        }
    }

    /// The stack's texts, one per integer revision.
    pub fn texts(&self) -> Vec<BString> {
        (0..self.rev_length())
            .map(|index| self.get_text(Rev::from_index(index)))
            .collect()
    }

    /// A copy limited to the first `rev_length` revisions.
    pub fn truncate(&self, rev_length: usize) -> Self {
        let length = rev_length.min(self.rev_length());
        Self::new(
            (0..length)
                .map(|index| self.get_text(Rev::from_index(index)))
                .collect(),
        )
    }

    /// Converts the stack to a line log answering blame queries and
    /// accepting edits.
    pub fn to_line_log(&self) -> LineLog {
        match &self.source {
            FileStackSource::LineLog { log, .. } => log.clone(),
            FileStackSource::Plain(texts) => {
                let mut log = LineLog::new();
                for (index, text) in texts.iter().enumerate() {
                    log.record_text(Rev::from_index(index), text);
                }
                log
            }
        }
    }
}
