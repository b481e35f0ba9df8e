// SPDX-License-Identifier: MIT

//! Conversational handoff between agents.
//!
//! A [`HandoffCoordinator`] owns the conversation and decides which agent
//! speaks next; a [`UserInputGateway`] turns its requests for user input
//! into paused requests and feeds the replies back.

pub mod builder;
pub mod coordinator;
pub mod detection;
pub mod gateway;
pub mod types;

pub use builder::{HandoffBuilder, ParticipantFactory};
pub use coordinator::{
    HandoffConfig, HandoffCoordinator, CONVERSATION_STATE_KEY, COORDINATOR_ID, GATEWAY_ID,
};
pub use detection::{detect_handoff, handoff_function_name, HandoffSignal};
pub use gateway::{resume_from_user, UserInputGateway};
pub use types::{
    ConversationWithUserInput, CoordinatorState, HandoffUserInputRequest, InteractionMode,
    TerminationCondition,
};
