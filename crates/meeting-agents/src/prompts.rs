//! Prompt templates for the two generation phases.
//!
//! Templates use `{name}` placeholders filled from the prompt variables.
//! Bump `PROMPT_VERSION` whenever template content changes; it is recorded
//! in every attempt artifact.

use crate::model::{Phase, PromptVars};

/// Prompt version. Bump on any template change.
pub const PROMPT_VERSION: &str = "1.0.0";

pub const POSITION_LIMIT_FEW: &str = "You can only add at most 1 new position, unless the dialog explicitly mentions multiple structured aspects.";
pub const POSITION_LIMIT_MANY: &str =
    "Make sure the total number of positions is less than 5; typically within 3.";

/// Hint on how many positions the model may add, given the live count.
pub fn position_number_limitation(live_positions: usize) -> &'static str {
    if live_positions <= 2 {
        POSITION_LIMIT_FEW
    } else {
        POSITION_LIMIT_MANY
    }
}

pub const DELIBERATION_SYSTEM: &str = "\
You maintain an issue map for a live meeting. An issue is an open question; \
positions are candidate answers to it. Work only from what was actually said. \
Answer in {meeting_language}.";

pub const TEXT_TO_POSITION_TEMPLATE: &str = "\
## Issue chain
{issue_chain}

## Earlier discussion
{context}

## Current positions
Positions marked `- unmodifiable` must be repeated verbatim or omitted. \
Positions marked `- modifiable` may be reworded.
{current_positions}

## New dialog
{dialog}

## Task
Extract the positions the dialog takes on the last issue in the chain. \
{position_number_limitation}
Write each position as `<issue>.<n> position: <content>`, optionally followed by \
a line `// <note>`. New positions take numbers above the highest existing one. \
Wrap the whole answer in <position_and_note></position_and_note>.";

pub const TEXT_TO_ISSUE_TEMPLATE: &str = "\
## Issue chain
{issue_chain}

## Earlier discussion
{context}

## Positions
{positions_list}

## New dialog
{dialog}

## Task
For each position above that the dialog questions or needs to refine, list \
the sub-issues it raises. Repeat the position line as given, then one line per \
sub-issue as `- <n> sub_issue: <question>`. If there are none, answer `None`. \
Wrap the whole answer in <sub_issue_list></sub_issue_list>.";

/// Fill `{name}` placeholders. Unknown placeholders are left in place.
pub fn render(template: &str, vars: &PromptVars) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

/// System and user messages for one phase.
pub fn messages(phase: Phase, vars: &PromptVars) -> (String, String) {
    let user = match phase {
        Phase::Positions => TEXT_TO_POSITION_TEMPLATE,
        Phase::Issues => TEXT_TO_ISSUE_TEMPLATE,
    };
    (render(DELIBERATION_SYSTEM, vars), render(user, vars))
}
