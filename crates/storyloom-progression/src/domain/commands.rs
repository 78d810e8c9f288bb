//! Commands accepted by the progression engine.

use storyloom_core::command::Command;
use uuid::Uuid;

/// Command to create a story with its opening chapter.
#[derive(Debug, Clone)]
pub struct CreateStory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The creator, who becomes the story's admin.
    pub author_id: Uuid,
    /// Story title.
    pub title: String,
    /// Proposal phase length; the engine default when absent.
    pub proposal_time_ms: Option<i64>,
    /// Voting phase length; the engine default when absent.
    pub voting_time_ms: Option<i64>,
    /// Title of chapter #1.
    pub initial_chapter_title: String,
    /// Text of chapter #1.
    pub initial_chapter_content: String,
}

/// Command to submit a continuation for the story's open round.
#[derive(Debug, Clone)]
pub struct SubmitProposal {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story being continued.
    pub story_id: Uuid,
    /// Must be the story's current last chapter.
    pub parent_chapter_id: Uuid,
    /// The proposing user.
    pub author_id: Uuid,
    /// Proposed title.
    pub title: String,
    /// Proposed text.
    pub content: String,
}

/// Command to rewrite a proposal while the round is still collecting.
#[derive(Debug, Clone)]
pub struct EditProposal {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The proposal to edit.
    pub proposal_id: Uuid,
    /// Must be the proposal's author.
    pub author_id: Uuid,
    /// Replacement title, if any.
    pub title: Option<String>,
    /// Replacement text, if any.
    pub content: Option<String>,
}

/// Command to withdraw a proposal while the round is still collecting.
#[derive(Debug, Clone)]
pub struct WithdrawProposal {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The proposal to remove.
    pub proposal_id: Uuid,
    /// Must be the proposal's author.
    pub author_id: Uuid,
}

/// Command to vote for a proposal.
#[derive(Debug, Clone)]
pub struct CastVote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The proposal voted for.
    pub proposal_id: Uuid,
    /// The voter.
    pub user_id: Uuid,
}

/// Command to take back a vote.
#[derive(Debug, Clone)]
pub struct RetractVote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The proposal the vote was cast for.
    pub proposal_id: Uuid,
    /// The voter.
    pub user_id: Uuid,
}

/// Command for a story admin to close the round with a chosen winner.
#[derive(Debug, Clone)]
pub struct SelectWinner {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The winning proposal.
    pub proposal_id: Uuid,
    /// Must hold the ADMIN role on the proposal's story.
    pub caller_id: Uuid,
}

/// Command for a story admin to change phase lengths.
#[derive(Debug, Clone)]
pub struct ChangePhaseDurations {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The story to reconfigure.
    pub story_id: Uuid,
    /// Must hold the ADMIN role on the story.
    pub caller_id: Uuid,
    /// New proposal phase length, if changing.
    pub proposal_time_ms: Option<i64>,
    /// New voting phase length, if changing.
    pub voting_time_ms: Option<i64>,
}

macro_rules! impl_command {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Command for $ty {
                fn command_type(&self) -> &'static str {
                    $name
                }

                fn correlation_id(&self) -> Uuid {
                    self.correlation_id
                }
            }
        )*
    };
}

impl_command! {
    CreateStory => "progression.create_story",
    SubmitProposal => "progression.submit_proposal",
    EditProposal => "progression.edit_proposal",
    WithdrawProposal => "progression.withdraw_proposal",
    CastVote => "progression.cast_vote",
    RetractVote => "progression.retract_vote",
    SelectWinner => "progression.select_winner",
    ChangePhaseDurations => "progression.change_phase_durations",
}
