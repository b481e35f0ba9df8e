// SPDX-License-Identifier: MIT

//! Branching and looping as message protocols.
//!
//! A condition executor emits one `ConditionResult`; conditional edges keyed
//! on `branch_index` carry it to the chosen branch. A loop is an init
//! executor and a next executor that both emit `LoopIterationResult`;
//! conditional edges on `has_next` lead into the body or out to the exit.

use super::{CONTINUATION, LOOP_STATE_KEY};
use crate::adk::error::Result;
use crate::baton::declarative::actions::ConditionalAction;
use crate::baton::declarative::expression::values_equal;
use crate::baton::declarative::protocol::{
    ActionComplete, ConditionResult, LoopAction, LoopControl, LoopIterationResult,
};
use crate::baton::declarative::state::DeclarativeWorkflowState;
use crate::baton::workflow::{EdgeCondition, Executor, MessageKind, WorkflowContext, WorkflowMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Edge predicate selecting one branch (`-1` for else)
pub fn branch_condition(index: i32) -> EdgeCondition {
    Arc::new(move |message: &WorkflowMessage| {
        matches!(message, WorkflowMessage::ConditionResult(r) if r.branch_index == index)
    })
}

/// Edge predicate on `LoopIterationResult::has_next`
pub fn iteration_condition(has_next: bool) -> EdgeCondition {
    Arc::new(move |message: &WorkflowMessage| {
        matches!(message, WorkflowMessage::LoopIterationResult(r) if r.has_next == has_next)
    })
}

/// Evaluates If / Switch / ConditionGroup branches in declaration order
pub struct ConditionExecutor {
    id: String,
    conditional: ConditionalAction,
}

impl ConditionExecutor {
    pub fn new(id: impl Into<String>, conditional: ConditionalAction) -> Self {
        Self {
            id: id.into(),
            conditional,
        }
    }

    fn select(&self, state: &mut DeclarativeWorkflowState) -> Result<ConditionResult> {
        let subject = match &self.conditional.value {
            Some(expr) => Some(state.eval(expr)?),
            None => None,
        };
        for (index, branch) in self.conditional.branches.iter().enumerate() {
            let matched = match &subject {
                Some(subject) => values_equal(subject, &state.eval(&branch.test)?),
                None => state.eval_condition(&branch.test)?,
            };
            if matched {
                return Ok(ConditionResult::branch(index));
            }
        }
        Ok(ConditionResult::no_match())
    }
}

#[async_trait]
impl Executor for ConditionExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        CONTINUATION
    }

    async fn handle(&self, _message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        let mut state = DeclarativeWorkflowState::load(ctx.shared_state()).await?;
        let result = self.select(&mut state)?;
        state.save(ctx.shared_state()).await?;

        log::debug!(
            "Condition '{}' selected branch {}",
            self.id,
            result.branch_index
        );
        ctx.send_message(WorkflowMessage::ConditionResult(result), None);
        Ok(())
    }
}

/// Iteration bookkeeping kept in `_loop_state.<loop id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSlot {
    pub items: Vec<Value>,
    pub index: usize,
    pub length: usize,
}

/// Loop variables shared by the init and next executors
#[derive(Debug, Clone)]
struct LoopVariables {
    loop_id: String,
    item_variable: String,
    index_variable: Option<String>,
}

impl LoopVariables {
    async fn load_slot(&self, ctx: &WorkflowContext) -> Option<LoopSlot> {
        let slots = ctx.get_shared_state(LOOP_STATE_KEY).await?;
        serde_json::from_value(slots.get(&self.loop_id)?.clone()).ok()
    }

    async fn store_slot(&self, ctx: &WorkflowContext, slot: Option<&LoopSlot>) -> Result<()> {
        let mut slots = match ctx.get_shared_state(LOOP_STATE_KEY).await {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        match slot {
            Some(slot) => {
                slots.insert(self.loop_id.clone(), serde_json::to_value(slot)?);
            }
            None => {
                slots.remove(&self.loop_id);
            }
        }
        ctx.set_shared_state(LOOP_STATE_KEY, Value::Object(slots))
            .await;
        Ok(())
    }

    /// Emit the iteration at `slot.index`, or the end of the loop
    async fn emit(&self, ctx: &mut WorkflowContext, slot: LoopSlot) -> Result<()> {
        let Some(item) = slot.items.get(slot.index).cloned() else {
            return self.finish(ctx, slot.index).await;
        };
        let mut state = DeclarativeWorkflowState::load(ctx.shared_state()).await?;
        state.set(&self.item_variable, item.clone())?;
        if let Some(index_variable) = &self.index_variable {
            state.set(index_variable, json!(slot.index))?;
        }
        state.save(ctx.shared_state()).await?;
        self.store_slot(ctx, Some(&slot)).await?;

        log::debug!("Loop '{}' iteration {}", self.loop_id, slot.index);
        ctx.send_message(
            WorkflowMessage::LoopIterationResult(LoopIterationResult {
                has_next: true,
                current_item: Some(item),
                current_index: slot.index,
            }),
            None,
        );
        Ok(())
    }

    async fn finish(&self, ctx: &mut WorkflowContext, index: usize) -> Result<()> {
        self.store_slot(ctx, None).await?;
        log::debug!("Loop '{}' finished at index {}", self.loop_id, index);
        ctx.send_message(
            WorkflowMessage::LoopIterationResult(LoopIterationResult {
                has_next: false,
                current_item: None,
                current_index: index,
            }),
            None,
        );
        Ok(())
    }
}

/// Foreach entry: resolves the items and starts the first iteration
pub struct ForeachInitExecutor {
    items: Value,
    vars: LoopVariables,
}

impl ForeachInitExecutor {
    pub fn new(
        id: impl Into<String>,
        items: Value,
        item_variable: impl Into<String>,
        index_variable: Option<String>,
    ) -> Self {
        Self {
            items,
            vars: LoopVariables {
                loop_id: id.into(),
                item_variable: item_variable.into(),
                index_variable,
            },
        }
    }
}

#[async_trait]
impl Executor for ForeachInitExecutor {
    fn id(&self) -> &str {
        &self.vars.loop_id
    }

    fn input_types(&self) -> &[MessageKind] {
        CONTINUATION
    }

    async fn handle(&self, _message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        let mut state = DeclarativeWorkflowState::load(ctx.shared_state()).await?;
        let items = match state.eval_if_expression(&self.items)? {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        state.save(ctx.shared_state()).await?;

        let slot = LoopSlot {
            length: items.len(),
            items,
            index: 0,
        };
        self.vars.emit(ctx, slot).await
    }
}

/// `<loop>_next`: advances after each body pass and applies break/continue
pub struct ForeachNextExecutor {
    id: String,
    vars: LoopVariables,
}

impl ForeachNextExecutor {
    pub fn new(
        loop_id: impl Into<String>,
        item_variable: impl Into<String>,
        index_variable: Option<String>,
    ) -> Self {
        let loop_id = loop_id.into();
        Self {
            id: super::next_id(&loop_id),
            vars: LoopVariables {
                loop_id,
                item_variable: item_variable.into(),
                index_variable,
            },
        }
    }

    async fn advance(&self, ctx: &mut WorkflowContext) -> Result<()> {
        match self.vars.load_slot(ctx).await {
            Some(mut slot) => {
                slot.index += 1;
                self.vars.emit(ctx, slot).await
            }
            None => {
                log::warn!(
                    "Loop '{}' advanced without an active iteration",
                    self.vars.loop_id
                );
                self.vars.finish(ctx, 0).await
            }
        }
    }

    async fn handle_loop_control(&self, control: LoopControl, ctx: &mut WorkflowContext) -> Result<()> {
        match control.action {
            LoopAction::Break => {
                let index = self.vars.load_slot(ctx).await.map(|s| s.index).unwrap_or(0);
                self.vars.finish(ctx, index).await
            }
            LoopAction::Continue => self.advance(ctx).await,
        }
    }
}

#[async_trait]
impl Executor for ForeachNextExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        &[
            MessageKind::ActionTrigger,
            MessageKind::ActionComplete,
            MessageKind::ConditionResult,
            MessageKind::LoopIterationResult,
            MessageKind::LoopControl,
        ]
    }

    async fn handle(&self, message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        match message {
            WorkflowMessage::LoopControl(control) => self.handle_loop_control(control, ctx).await,
            _ => self.advance(ctx).await,
        }
    }
}

/// BreakLoop / ContinueLoop: signals the enclosing loop's next executor
pub struct LoopControlExecutor {
    id: String,
    action: LoopAction,
    loop_next_id: String,
}

impl LoopControlExecutor {
    pub fn new(id: impl Into<String>, action: LoopAction, loop_id: &str) -> Self {
        Self {
            id: id.into(),
            action,
            loop_next_id: super::next_id(loop_id),
        }
    }
}

#[async_trait]
impl Executor for LoopControlExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        CONTINUATION
    }

    async fn handle(&self, _message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        ctx.send_message(
            WorkflowMessage::LoopControl(LoopControl {
                action: self.action,
            }),
            Some(&self.loop_next_id),
        );
        Ok(())
    }
}

/// Jumps to a declared action
pub struct GotoExecutor {
    id: String,
    target: String,
}

impl GotoExecutor {
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
        }
    }
}

#[async_trait]
impl Executor for GotoExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> &[MessageKind] {
        CONTINUATION
    }

    async fn handle(&self, _message: WorkflowMessage, ctx: &mut WorkflowContext) -> Result<()> {
        log::debug!("Goto '{}' -> '{}'", self.id, self.target);
        ctx.send_message(
            WorkflowMessage::ActionComplete(ActionComplete::default()),
            Some(&self.target),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, state};
    use super::*;
    use crate::baton::declarative::actions::Branch;
    use crate::baton::declarative::protocol::ActionTrigger;
    use crate::baton::workflow::SharedState;

    fn trigger() -> WorkflowMessage {
        WorkflowMessage::ActionTrigger(ActionTrigger::default())
    }

    fn iteration(effects: &crate::baton::workflow::context::ContextEffects) -> LoopIterationResult {
        match &effects.messages[0].data {
            WorkflowMessage::LoopIterationResult(r) => r.clone(),
            other => panic!("expected LoopIterationResult, got {:?}", other),
        }
    }

    async fn seeded(pairs: &[(&str, Value)]) -> SharedState {
        let shared = SharedState::new();
        let mut state = DeclarativeWorkflowState::new();
        for (path, value) in pairs {
            state.set(path, value.clone()).unwrap();
        }
        state.save(&shared).await.unwrap();
        shared
    }

    async fn start_loop(shared: &SharedState) {
        let init = ForeachInitExecutor::new("loop", json!("=Local.items"), "Local.item", None);
        let mut ctx = context("loop", shared);
        init.handle(trigger(), &mut ctx).await.unwrap();
        let first = iteration(&ctx.into_effects());
        assert!(first.has_next);
        assert_eq!(first.current_index, 0);
    }

    #[test]
    fn test_edge_predicates() {
        let pick = branch_condition(-1);
        assert!(pick(&WorkflowMessage::ConditionResult(ConditionResult::no_match())));
        assert!(!pick(&WorkflowMessage::ConditionResult(ConditionResult::branch(0))));

        let more = iteration_condition(true);
        assert!(!more(&WorkflowMessage::LoopIterationResult(LoopIterationResult {
            has_next: false,
            current_item: None,
            current_index: 3,
        })));
    }

    #[tokio::test]
    async fn test_condition_group_picks_first_true_branch() {
        let shared = seeded(&[("Local.n", json!(5))]).await;
        let exec = ConditionExecutor::new(
            "group",
            ConditionalAction {
                value: None,
                branches: vec![
                    Branch {
                        test: json!("=n > 10"),
                        actions: vec![],
                    },
                    Branch {
                        test: json!("=n > 3"),
                        actions: vec![],
                    },
                    Branch {
                        test: json!(true),
                        actions: vec![],
                    },
                ],
                else_actions: vec![],
            },
        );
        let mut ctx = context("group", &shared);
        exec.handle(trigger(), &mut ctx).await.unwrap();
        let effects = ctx.into_effects();
        assert_eq!(
            effects.messages[0].data,
            WorkflowMessage::ConditionResult(ConditionResult::branch(1))
        );
    }

    #[tokio::test]
    async fn test_switch_without_match_selects_else() {
        let shared = seeded(&[("Local.color", json!("green"))]).await;
        let exec = ConditionExecutor::new(
            "switch",
            ConditionalAction {
                value: Some(json!("=Local.color")),
                branches: vec![Branch {
                    test: json!("red"),
                    actions: vec![],
                }],
                else_actions: vec![],
            },
        );
        let mut ctx = context("switch", &shared);
        exec.handle(trigger(), &mut ctx).await.unwrap();
        assert_eq!(
            ctx.into_effects().messages[0].data,
            WorkflowMessage::ConditionResult(ConditionResult::no_match())
        );
    }

    #[tokio::test]
    async fn test_foreach_init_writes_slot_and_item() {
        let shared = seeded(&[("Local.items", json!(["a", "b"]))]).await;
        start_loop(&shared).await;

        let slots = shared.get(LOOP_STATE_KEY).await.unwrap();
        assert_eq!(slots["loop"]["length"], json!(2));
        assert_eq!(slots["loop"]["index"], json!(0));
        assert_eq!(state(&shared).await.get("Local.item"), Some(json!("a")));
    }

    #[tokio::test]
    async fn test_empty_items_skip_the_body() {
        let shared = seeded(&[("Local.items", json!([]))]).await;
        let init = ForeachInitExecutor::new("loop", json!("=Local.items"), "Local.item", None);
        let mut ctx = context("loop", &shared);
        init.handle(trigger(), &mut ctx).await.unwrap();
        assert!(!iteration(&ctx.into_effects()).has_next);
    }

    #[tokio::test]
    async fn test_break_at_first_item_ends_loop() {
        let shared = seeded(&[("Local.items", json!(["a", "b", "c"]))]).await;
        start_loop(&shared).await;

        let next = ForeachNextExecutor::new("loop", "Local.item", None);
        let mut ctx = context("loop_next", &shared);
        next.handle(
            WorkflowMessage::LoopControl(LoopControl {
                action: LoopAction::Break,
            }),
            &mut ctx,
        )
        .await
        .unwrap();

        let result = iteration(&ctx.into_effects());
        assert!(!result.has_next);
        assert_eq!(result.current_index, 0);
        let slots = shared.get(LOOP_STATE_KEY).await.unwrap();
        assert!(slots.get("loop").is_none());
    }

    #[tokio::test]
    async fn test_continue_at_first_item_moves_to_second() {
        let shared = seeded(&[("Local.items", json!(["a", "b", "c"]))]).await;
        start_loop(&shared).await;

        let next = ForeachNextExecutor::new("loop", "Local.item", Some("Local.i".into()));
        let mut ctx = context("loop_next", &shared);
        next.handle(
            WorkflowMessage::LoopControl(LoopControl {
                action: LoopAction::Continue,
            }),
            &mut ctx,
        )
        .await
        .unwrap();

        let result = iteration(&ctx.into_effects());
        assert!(result.has_next);
        assert_eq!(result.current_index, 1);
        assert_eq!(result.current_item, Some(json!("b")));
        let state = state(&shared).await;
        assert_eq!(state.get("Local.item"), Some(json!("b")));
        assert_eq!(state.get("Local.i"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_last_item_completes_loop() {
        let shared = seeded(&[("Local.items", json!(["only"]))]).await;
        start_loop(&shared).await;

        let next = ForeachNextExecutor::new("loop", "Local.item", None);
        let mut ctx = context("loop_next", &shared);
        next.handle(
            WorkflowMessage::ActionComplete(ActionComplete::default()),
            &mut ctx,
        )
        .await
        .unwrap();
        let result = iteration(&ctx.into_effects());
        assert!(!result.has_next);
        assert_eq!(result.current_index, 1);
    }

    #[tokio::test]
    async fn test_loop_control_and_goto_target_explicitly() {
        let shared = SharedState::new();
        let brk = LoopControlExecutor::new("stop", LoopAction::Break, "loop");
        let mut ctx = context("stop", &shared);
        brk.handle(trigger(), &mut ctx).await.unwrap();
        let effects = ctx.into_effects();
        assert_eq!(effects.messages[0].target_id.as_deref(), Some("loop_next"));

        let goto = GotoExecutor::new("jump", "retry");
        let mut ctx = context("jump", &shared);
        goto.handle(trigger(), &mut ctx).await.unwrap();
        let effects = ctx.into_effects();
        assert_eq!(effects.messages[0].target_id.as_deref(), Some("retry"));
    }
}
