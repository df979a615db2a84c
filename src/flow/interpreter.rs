//! Walks a [`FlowTree`] and dispatches each node to its handler.
//!
//! Roots run in array order, children in array order under their parent. There is
//! no parallelism: every driver call completes before the next node starts.
//! Cancellation is observed after each root node and before each loop iteration;
//! a node that is already running is never interrupted.

use crate::error::Result;
use crate::flow::condition::{evaluate_loop, evaluate_switch};
use crate::flow::context::RunContext;
use crate::flow::events::{EventBus, RunEvent};
use crate::flow::handlers::{self, Session};
use crate::flow::schema::{Branch, FlowTree, LoopProps, LoopType, NodeKind, SwitchProps, TreeNode};
use async_recursion::async_recursion;
use std::sync::Arc;
use std::time::Instant;

/// Hard cap on condition-loop iterations.
pub const MAX_CONDITION_ITERATIONS: usize = 1000;

pub struct Interpreter {
    session: Session,
    events: Option<(EventBus, String)>,
}

impl Interpreter {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            events: None,
        }
    }

    /// Report node progress on `bus`, tagged with `run_id`.
    pub fn with_events(mut self, bus: EventBus, run_id: impl Into<String>) -> Self {
        self.events = Some((bus, run_id.into()));
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Execute every root node in order. The first handler error ends the walk.
    pub async fn run(&mut self, tree: &FlowTree, ctx: &mut RunContext) -> Result<()> {
        for root in tree.roots() {
            self.execute_node(tree, root, ctx).await?;
            if ctx.is_cancelled() {
                tracing::info!("Run cancelled after node {}", root.id);
                break;
            }
        }
        Ok(())
    }

    fn emit(&self, event: impl FnOnce(String) -> RunEvent) {
        if let Some((bus, run_id)) = &self.events {
            bus.emit(event(run_id.clone()));
        }
    }

    #[async_recursion]
    async fn execute_node(
        &mut self,
        tree: &FlowTree,
        node: &TreeNode,
        ctx: &mut RunContext,
    ) -> Result<()> {
        // Every node, control nodes included, needs a live page
        self.session.page()?;

        let started = Instant::now();
        self.emit(|run_id| RunEvent::NodeStarted {
            run_id,
            node_id: node.id.clone(),
            node_type: node.kind.type_name().to_string(),
        });
        tracing::debug!("Executing node {} ({})", node.id, node.kind.type_name());

        match &node.kind {
            NodeKind::Start | NodeKind::End => {}
            NodeKind::Browser(props) => {
                handlers::browser::execute(&mut self.session, &node.id, props, ctx).await?
            }
            NodeKind::Click(props) => {
                handlers::click::execute(&self.session, &node.id, props, ctx).await?
            }
            NodeKind::Input(props) => handlers::input::execute(&self.session, props, ctx).await?,
            NodeKind::Extract(props) => {
                handlers::extract::execute(&self.session, props, ctx).await?
            }
            NodeKind::Keyboard(props) => {
                handlers::keyboard::execute(&self.session, props, ctx).await?
            }
            NodeKind::Mouse(props) => handlers::mouse::execute(&self.session, props, ctx).await?,
            NodeKind::Wait(props) => handlers::wait::execute(&self.session, props, ctx).await?,
            NodeKind::Screenshot(props) => {
                handlers::screenshot::execute(&self.session, props, ctx).await?
            }
            NodeKind::Scroll(props) => {
                handlers::scroll::execute(&self.session, props, ctx).await?
            }
            NodeKind::Switch(props) => self.execute_switch(tree, node, props, ctx).await?,
            NodeKind::Loop(props) => self.execute_loop(tree, node, props, ctx).await?,
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.emit(|run_id| RunEvent::NodeFinished {
            run_id,
            node_id: node.id.clone(),
            duration_ms,
        });
        Ok(())
    }

    async fn execute_switch(
        &mut self,
        tree: &FlowTree,
        node: &TreeNode,
        props: &SwitchProps,
        ctx: &mut RunContext,
    ) -> Result<()> {
        let Some(locator) = props.target.locator(ctx) else {
            return Ok(());
        };
        let page = Arc::clone(self.session.page()?);
        let value = ctx.interpolate_opt(props.value.as_ref());

        let result = match props.condition {
            Some(condition) => evaluate_switch(&page, condition, &locator, value.as_deref()).await?,
            None => false,
        };
        let wanted = if result { Branch::True } else { Branch::False };
        tracing::debug!("Switch {} evaluated to {}", node.id, result);

        for child in tree.children(&node.id) {
            if child.branch == Some(wanted) {
                self.execute_node(tree, child, ctx).await?;
            }
        }
        Ok(())
    }

    async fn execute_loop(
        &mut self,
        tree: &FlowTree,
        node: &TreeNode,
        props: &LoopProps,
        ctx: &mut RunContext,
    ) -> Result<()> {
        match props.loop_type {
            Some(LoopType::Count) => {
                let Some(count) = props.count.filter(|c| *c > 0) else {
                    return Ok(());
                };
                for i in 0..count as usize {
                    if ctx.is_cancelled() {
                        break;
                    }
                    ctx.loop_index = Some(i);
                    self.execute_children(tree, node, ctx).await?;
                }
            }
            Some(LoopType::Elements) => {
                let Some(locator) = props.target.locator(ctx) else {
                    return Ok(());
                };
                let elements = self.session.page()?.query_all(&locator).await?;
                tracing::debug!("Loop {} over {} elements", node.id, elements.len());
                for (i, element) in elements.into_iter().enumerate() {
                    if ctx.is_cancelled() {
                        break;
                    }
                    ctx.loop_index = Some(i);
                    ctx.loop_element = Some(element);
                    self.execute_children(tree, node, ctx).await?;
                }
            }
            Some(LoopType::Condition) => {
                let (Some(condition), Some(locator)) = (props.condition, props.target.locator(ctx))
                else {
                    return Ok(());
                };
                let mut iterations = 0;
                while iterations < MAX_CONDITION_ITERATIONS {
                    if ctx.is_cancelled() {
                        break;
                    }
                    let page = Arc::clone(self.session.page()?);
                    if !evaluate_loop(&page, condition, &locator).await? {
                        break;
                    }
                    ctx.loop_index = Some(iterations);
                    self.execute_children(tree, node, ctx).await?;
                    iterations += 1;
                }
                if iterations == MAX_CONDITION_ITERATIONS {
                    tracing::warn!(
                        "Loop {} stopped at the {} iteration limit",
                        node.id,
                        MAX_CONDITION_ITERATIONS
                    );
                }
            }
            None => {}
        }
        Ok(())
    }

    async fn execute_children(
        &mut self,
        tree: &FlowTree,
        node: &TreeNode,
        ctx: &mut RunContext,
    ) -> Result<()> {
        for child in tree.children(&node.id) {
            self.execute_node(tree, child, ctx).await?;
        }
        Ok(())
    }
}
