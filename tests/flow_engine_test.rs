//! Interpreter and controller behaviour against the in-memory page.

mod common;

use common::{node, FakeElement, FakeLauncher, FakePage, StubPicker};
use flowrunner_lib::config::{AppConfig, RunSettings};
use flowrunner_lib::controller::FlowController;
use flowrunner_lib::error::FlowError;
use flowrunner_lib::flow::handlers::Session;
use flowrunner_lib::flow::{
    EventBus, FlowNode, FlowTree, Interpreter, RunContext, RunEvent, RunStatus, SelectorType,
    MAX_CONDITION_ITERATIONS,
};
use flowrunner_lib::picker::PickedSelector;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn stub_picker() -> Arc<StubPicker> {
    StubPicker::new(PickedSelector {
        selector: "go".to_string(),
        selector_type: SelectorType::Id,
    })
}

async fn run_nodes(
    page: &Arc<FakePage>,
    nodes: Vec<FlowNode>,
    cancel: CancellationToken,
) -> (flowrunner_lib::error::Result<()>, RunContext) {
    let tree = FlowTree::parse(&nodes).unwrap();
    let session = Session::new(page.clone(), RunSettings::default(), stub_picker());
    let mut interpreter = Interpreter::new(session);
    let mut ctx = RunContext::new(cancel);
    let result = interpreter.run(&tree, &mut ctx).await;
    (result, ctx)
}

fn gotos(page: &FakePage) -> Vec<String> {
    page.calls()
        .into_iter()
        .filter(|c| c.starts_with("goto:"))
        .collect()
}

fn controller_with(page: &Arc<FakePage>) -> (FlowController, Arc<FakeLauncher>) {
    let launcher = FakeLauncher::new(page.clone());
    let config = Arc::new(RwLock::new(AppConfig::default()));
    let controller = FlowController::new(config, launcher.clone(), EventBus::new());
    (controller, launcher)
}

// ---------------------------------------------------------------------------
// Ordering and branching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_roots_run_in_array_order() {
    let page = FakePage::new();
    let nodes = vec![
        node("start", "start", json!({})),
        node("a", "browser", json!({ "actionType": "goto", "url": "https://a.test" })),
        node("b", "browser", json!({ "actionType": "goto", "url": "https://b.test", "parentId": "gone" })),
        node("c", "browser", json!({ "actionType": "goto", "url": "https://c.test" })),
        node("end", "end", json!({})),
    ];
    let (result, _) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    assert_eq!(
        gotos(&page),
        vec!["goto:https://a.test", "goto:https://b.test", "goto:https://c.test"]
    );
}

#[tokio::test]
async fn test_switch_runs_only_matching_branch() {
    let page = FakePage::new();
    page.insert(FakeElement::new(&["#banner"], "Welcome back"));

    let nodes = vec![
        node("sw", "switch", json!({ "selector": "#banner", "condition": "textContains", "value": "Welcome" })),
        node("yes", "browser", json!({ "actionType": "goto", "url": "https://yes.test", "parentId": "sw", "branchType": "true" })),
        node("no", "browser", json!({ "actionType": "goto", "url": "https://no.test", "parentId": "sw", "branchType": "false" })),
        node("plain", "browser", json!({ "actionType": "goto", "url": "https://plain.test", "parentId": "sw" })),
        node("sw2", "switch", json!({ "selector": "#missing", "condition": "exists" })),
        node("yes2", "browser", json!({ "actionType": "goto", "url": "https://yes2.test", "parentId": "sw2", "branchType": "true" })),
        node("no2", "browser", json!({ "actionType": "goto", "url": "https://no2.test", "parentId": "sw2", "branchType": "false" })),
    ];
    let (result, _) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    assert_eq!(gotos(&page), vec!["goto:https://yes.test", "goto:https://no2.test"]);
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_count_loop_appends_each_iteration() {
    let page = FakePage::new();
    page.insert(FakeElement::new(&["h1"], "  Title  "));

    let nodes = vec![
        node("loop", "loop", json!({ "loopType": "count", "count": 3 })),
        node("ex", "extract", json!({
            "parentId": "loop",
            "selector": "h1",
            "extractType": "text",
            "variableName": "titles",
            "append": true
        })),
    ];
    let (result, ctx) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    assert_eq!(ctx.variables["titles"], json!(["Title", "Title", "Title"]));
    assert_eq!(ctx.loop_index, Some(2));
}

#[tokio::test]
async fn test_cancel_stops_count_loop_between_iterations() {
    let page = FakePage::new();
    let next = page.insert(FakeElement::new(&["#next"], "Next"));
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    page.on_click(next, move |page| {
        if page.count_calls("click:") >= 2 {
            token.cancel();
        }
    });

    let nodes = vec![
        node("loop", "loop", json!({ "loopType": "count", "count": 5 })),
        node("click", "click", json!({ "parentId": "loop", "selector": "#next" })),
        node("after", "browser", json!({ "actionType": "goto", "url": "https://after.test" })),
    ];
    let (result, ctx) = run_nodes(&page, nodes, cancel).await;
    result.unwrap();
    assert!(ctx.is_cancelled());
    assert_eq!(page.count_calls("click:"), 2);
    assert!(gotos(&page).is_empty());
}

#[tokio::test]
async fn test_condition_loop_stops_at_iteration_cap() {
    let page = FakePage::new();
    page.insert(FakeElement::new(&["#always"], "x"));

    let nodes = vec![
        node("loop", "loop", json!({ "loopType": "condition", "condition": "exists", "selector": "#always" })),
        node("ex", "extract", json!({
            "parentId": "loop",
            "selector": "#always",
            "extractType": "text",
            "variableName": "hits",
            "append": true
        })),
    ];
    let (result, ctx) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    assert_eq!(
        ctx.variables["hits"].as_array().unwrap().len(),
        MAX_CONDITION_ITERATIONS
    );
}

#[tokio::test]
async fn test_condition_loop_ends_when_element_disappears() {
    let page = FakePage::new();
    let more = page.insert(FakeElement::new(&[".more"], "More"));
    page.on_click(more, move |page| {
        if page.count_calls("click:") >= 3 {
            page.remove(more);
        }
    });

    let nodes = vec![
        node("loop", "loop", json!({ "loopType": "condition", "condition": "visible", "selector": ".more" })),
        node("click", "click", json!({ "parentId": "loop", "selector": ".more" })),
    ];
    let (result, ctx) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    assert_eq!(page.count_calls("click:"), 3);
    assert_eq!(ctx.loop_index, Some(2));
}

#[tokio::test]
async fn test_elements_loop_iterates_snapshot() {
    let page = FakePage::new();
    let list = page.insert(FakeElement::new(&["ul"], ""));
    let first = page.insert(FakeElement::new(&["li"], "a").child_of(list));
    page.insert(FakeElement::new(&["li"], "b").child_of(list));
    page.on_click(first, move |page| {
        page.insert(FakeElement::new(&["li"], "late").child_of(list));
    });

    let nodes = vec![
        node("loop", "loop", json!({ "loopType": "elements", "selector": "li" })),
        node("click", "click", json!({ "parentId": "loop", "useLoopElement": true })),
        node("ex", "extract", json!({
            "parentId": "loop",
            "useLoopElement": true,
            "extractType": "text",
            "variableName": "items",
            "append": true
        })),
    ];
    let (result, ctx) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    assert_eq!(ctx.variables["items"], json!(["a", "b"]));
    assert_eq!(page.count_calls("click:"), 2);
    assert_eq!(ctx.loop_index, Some(1));
}

#[tokio::test]
async fn test_loop_index_interpolates_into_selectors() {
    let page = FakePage::new();
    page.insert(FakeElement::new(&["#row-0"], "zero"));
    page.insert(FakeElement::new(&["#row-1"], "one"));

    let nodes = vec![
        node("loop", "loop", json!({ "loopType": "count", "count": 2 })),
        node("ex", "extract", json!({
            "parentId": "loop",
            "selector": "row-${loopIndex}",
            "selectorType": "id",
            "extractType": "text",
            "variableName": "rows",
            "append": true
        })),
    ];
    let (result, ctx) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    assert_eq!(ctx.variables["rows"], json!(["zero", "one"]));
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_table_extraction_keeps_header_through_filter() {
    let page = FakePage::new();
    let table = page.insert(FakeElement::new(&["#fruit"], ""));
    let head = page.insert(FakeElement::new(&["tr"], "").child_of(table));
    page.insert(FakeElement::new(&["th"], "Fruit").child_of(head));
    page.insert(FakeElement::new(&["th"], "Qty").child_of(head));
    for (name, qty) in [("Apple", "3"), ("Banana", "5")] {
        let row = page.insert(FakeElement::new(&["tr"], "").child_of(table));
        page.insert(FakeElement::new(&["td"], name).child_of(row));
        page.insert(FakeElement::new(&["td"], qty).child_of(row));
    }

    let nodes = vec![node("ex", "extract", json!({
        "selector": "#fruit",
        "extractType": "table",
        "headerSelector": "th",
        "variableName": "stock",
        "enableFilter": true,
        "filterType": "greaterThan",
        "filterValue": 4,
        "numeric": true,
        "filterColumn": 1
    }))];
    let (result, ctx) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    assert_eq!(
        ctx.variables["stock"],
        json!([["Fruit", "Qty"], ["Banana", "5"]])
    );
}

#[tokio::test]
async fn test_list_extraction_with_contains_filter() {
    let page = FakePage::new();
    for text in ["Rust book", "Go book", "rust mug"] {
        page.insert(FakeElement::new(&[".item"], text));
    }

    let nodes = vec![node("ex", "extract", json!({
        "selector": "item",
        "selectorType": "class",
        "extractType": "list",
        "variableName": "rusty",
        "enableFilter": true,
        "filterType": "contains",
        "filterValue": "RUST",
        "caseSensitive": false
    }))];
    let (result, ctx) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    assert_eq!(ctx.variables["rusty"], json!(["Rust book", "rust mug"]));
}

#[tokio::test]
async fn test_input_verification_failure() {
    let page = FakePage::new();
    let field = page.insert(FakeElement::new(&["#zip"], ""));
    page.update(field, |el| el.max_length = Some(3));

    let nodes = vec![node("in", "input", json!({ "selector": "#zip", "text": "12345" }))];
    let (result, _) = run_nodes(&page, nodes, CancellationToken::new()).await;
    let err = result.unwrap_err();
    assert!(matches!(err, FlowError::InputVerification { .. }));
    assert!(err.to_string().starts_with("input failed"));
    assert!(err.to_string().contains("\"123\""));
}

#[tokio::test]
async fn test_input_requires_selector_and_text() {
    let page = FakePage::new();
    let nodes = vec![node("in", "input", json!({ "selector": "#q" }))];
    let (result, _) = run_nodes(&page, nodes, CancellationToken::new()).await;
    assert!(matches!(result, Err(FlowError::Input(_))));
    assert!(page.calls().is_empty());
}

#[tokio::test]
async fn test_input_interpolates_variables() {
    let page = FakePage::new();
    page.insert(FakeElement::new(&["[name=\"q\"]"], ""));

    let nodes = vec![
        node("ex", "extract", json!({ "selector": "#term", "extractType": "text", "variableName": "term" })),
        node("in", "input", json!({ "selector": "q", "selectorType": "name", "text": "${term} docs", "clearFirst": true })),
    ];
    page.insert(FakeElement::new(&["#term"], "tokio"));
    let (result, _) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    assert!(page.calls().contains(&"fill:tokio docs".to_string()));
}

#[tokio::test]
async fn test_close_then_any_node_fails() {
    let page = FakePage::new();
    let nodes = vec![
        node("close", "browser", json!({ "actionType": "close" })),
        node("end", "end", json!({})),
    ];
    let (result, _) = run_nodes(&page, nodes, CancellationToken::new()).await;
    assert!(matches!(result, Err(FlowError::BrowserNotStarted)));
    assert!(page.calls().contains(&"close".to_string()));
}

#[tokio::test]
async fn test_keyboard_and_scroll_nodes() {
    let page = FakePage::new();
    let nodes = vec![
        node("k", "keyboard", json!({ "key": "ctrl+a" })),
        node("s", "scroll", json!({ "scrollType": "bottom" })),
    ];
    let (result, _) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    let calls = page.calls();
    assert!(calls.contains(&"press:Control+a".to_string()), "{:?}", calls);
    assert!(calls.iter().any(|c| c.starts_with("scroll:Bottom")), "{:?}", calls);
}

#[tokio::test]
async fn test_plus_key_is_pressed_literally() {
    let page = FakePage::new();
    let nodes = vec![
        node("plus", "keyboard", json!({ "key": "+" })),
        node("zoom", "keyboard", json!({ "key": "ctrl++" })),
    ];
    let (result, _) = run_nodes(&page, nodes, CancellationToken::new()).await;
    result.unwrap();
    let presses: Vec<String> = page
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("press:"))
        .collect();
    assert_eq!(presses, vec!["press:+", "press:Control++"]);
}

#[tokio::test]
async fn test_zero_timeout_wait_does_not_sleep() {
    let page = FakePage::new();
    let nodes = vec![
        node("w", "wait", json!({ "waitType": "timeout", "timeout": 0 })),
        node("go", "browser", json!({ "actionType": "goto", "url": "https://after.test" })),
    ];
    let (result, _) = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        run_nodes(&page, nodes, CancellationToken::new()),
    )
    .await
    .expect("zero wait should finish immediately");
    result.unwrap();
    assert_eq!(gotos(&page), vec!["goto:https://after.test"]);
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_goto_and_extract_scenario() {
    let page = FakePage::new();
    page.add_site(
        "https://example.com",
        vec![FakeElement::new(&["h1"], "Example Domain")],
    );
    let (controller, launcher) = controller_with(&page);

    let nodes = vec![
        node("start", "start", json!({})),
        node("go", "browser", json!({ "actionType": "goto", "url": "https://example.com" })),
        node("ex", "extract", json!({ "selector": "h1", "extractType": "text", "variableName": "title" })),
        node("end", "end", json!({})),
    ];
    let report = controller.start_flow(nodes).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.variables["title"], json!("Example Domain"));
    assert_eq!(controller.variables()["title"], json!("Example Domain"));
    assert_eq!(launcher.launches(), 1);
    assert!(!controller.status().await.running);
}

#[tokio::test]
async fn test_unknown_node_type_aborts_before_any_handler() {
    let page = FakePage::new();
    let (controller, launcher) = controller_with(&page);

    let nodes = vec![
        node("go", "browser", json!({ "actionType": "goto", "url": "https://example.com" })),
        node("bad", "teleport", json!({})),
    ];
    let err = controller.start_flow(nodes).await.unwrap_err();
    assert!(matches!(err, FlowError::UnknownNodeType(ref t) if t == "teleport"));
    assert_eq!(launcher.launches(), 0);
    assert!(page.calls().is_empty());
}

#[tokio::test]
async fn test_rejected_flow_tears_down_open_browser() {
    let page = FakePage::new();
    let (controller, _launcher) = controller_with(&page);
    let mut events = controller.events().subscribe();

    let first = vec![node("go", "browser", json!({ "actionType": "goto", "url": "https://example.com" }))];
    controller.start_flow(first).await.unwrap();
    assert!(controller.status().await.browser_open);

    let err = controller
        .start_flow(vec![node("bad", "teleport", json!({}))])
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::UnknownNodeType(_)));
    assert!(page.calls().contains(&"close".to_string()));
    assert!(!controller.status().await.browser_open);

    let mut last_finish = None;
    while let Ok(event) = events.try_recv() {
        if let RunEvent::RunFinished { status, error, .. } = event {
            last_finish = Some((status, error));
        }
    }
    let (status, error) = last_finish.unwrap();
    assert_eq!(status, RunStatus::Failed);
    assert!(error.unwrap().contains("teleport"));
}

#[tokio::test]
async fn test_concurrent_start_is_skipped() {
    let page = FakePage::new();
    let (controller, _) = controller_with(&page);
    let controller = Arc::new(controller);

    let slow = vec![node("w", "wait", json!({ "waitType": "timeout", "timeout": 0.3 }))];
    let first = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.start_flow(slow).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second = controller
        .start_flow(vec![node("end", "end", json!({}))])
        .await
        .unwrap();
    assert_eq!(second.status, RunStatus::Skipped);
    assert!(second.run_id.is_none());

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_stop_cancels_running_flow() {
    let page = FakePage::new();
    let (controller, _) = controller_with(&page);
    let controller = Arc::new(controller);

    let nodes = vec![
        node("loop", "loop", json!({ "loopType": "count", "count": 100 })),
        node("w", "wait", json!({ "parentId": "loop", "waitType": "timeout", "timeout": 0.05 })),
    ];
    let run = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.start_flow(nodes).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(120)).await;
    controller.stop_flow().await;

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(report.loop_index.unwrap() < 99);
    assert!(page.calls().contains(&"close".to_string()));
}

#[tokio::test]
async fn test_picker_selection_is_recorded() {
    let page = FakePage::new();
    let button = page.insert(FakeElement::new(&["#go"], "Go"));
    let picker = stub_picker();
    let (controller, _) = controller_with(&page);
    let controller = controller.with_picker(picker.clone());

    let nodes = vec![
        node("loop", "loop", json!({ "loopType": "count", "count": 2 })),
        node("pick", "click", json!({ "parentId": "loop" })),
    ];
    let report = controller.start_flow(nodes).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(
        report.picked_selectors["pick"],
        PickedSelector {
            selector: "go".to_string(),
            selector_type: SelectorType::Id,
        }
    );
    // Picked once, reused on the second iteration
    assert_eq!(picker.picks(), 1);
    assert_eq!(page.count_calls(&format!("click:{}", button)), 2);
}

#[tokio::test]
async fn test_run_events_are_emitted() {
    let page = FakePage::new();
    let (controller, _) = controller_with(&page);
    let mut rx = controller.events().subscribe();

    controller
        .start_flow(vec![node("start", "start", json!({})), node("end", "end", json!({}))])
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(RunEvent::RunStarted { node_count: 2, .. })));
    assert!(matches!(
        events.last(),
        Some(RunEvent::RunFinished { status: RunStatus::Completed, .. })
    ));
    let started = events
        .iter()
        .filter(|e| matches!(e, RunEvent::NodeStarted { .. }))
        .count();
    assert_eq!(started, 2);
}

#[tokio::test]
async fn test_preview_requires_open_page() {
    let page = FakePage::new();
    let (controller, _) = controller_with(&page);
    let err = controller
        .preview_extraction(json!({ "selector": "h1", "extractType": "text" }))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::BrowserNotStarted));
}

#[tokio::test]
async fn test_preview_uses_current_page_without_storing() {
    let page = FakePage::new();
    page.add_site("https://shop.test", vec![
        FakeElement::new(&[".price"], "12"),
        FakeElement::new(&[".price"], "40"),
    ]);
    let (controller, _) = controller_with(&page);
    controller
        .start_flow(vec![node("go", "browser", json!({ "actionType": "goto", "url": "https://shop.test" }))])
        .await
        .unwrap();

    let value = controller
        .preview_extraction(json!({
            "selector": ".price",
            "extractType": "list",
            "variableName": "prices",
            "enableFilter": true,
            "filterType": "lessThan",
            "filterValue": "20",
            "numeric": true
        }))
        .await
        .unwrap();
    assert_eq!(value, json!(["12"]));
    assert!(!controller.variables().contains_key("prices"));
}
