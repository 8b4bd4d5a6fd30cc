//! Behavioural tests for dispatch, routing and shutdown escalation.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use querypool_protocol::{CorrelationId, Payload, QueryRequest, Row, Value};

use crate::orchestrator::{Dispatched, Orchestrator};
use crate::process::StopSignal;
use crate::routes::RouteTable;
use crate::settings::PoolSettings;
use crate::shutdown::ShutdownReport;
use crate::tests::support::{
    InThreadLauncher, RecordingReporter, SEEDED_NAMES, SignalLog, StubbornLauncher,
    test_bootstrap,
};

const ROUTES: [&str; 3] = ["inbox", "first", "second"];
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(10);
const STUBBORN_GRACE: Duration = Duration::from_millis(100);

type StepResult = Result<(), String>;

#[derive(Debug, Clone, PartialEq)]
struct Delivery {
    route: &'static str,
    payload: Payload,
    correlation_id: Option<CorrelationId>,
}

struct DispatchWorld {
    orchestrator: Option<Orchestrator>,
    deliveries: Rc<RefCell<Vec<Delivery>>>,
    receipts: Vec<Dispatched>,
    report: Option<ShutdownReport>,
    signals: Option<SignalLog>,
}

impl DispatchWorld {
    fn new() -> Self {
        Self {
            orchestrator: None,
            deliveries: Rc::default(),
            receipts: Vec::new(),
            report: None,
            signals: None,
        }
    }

    fn routes(&self) -> RouteTable {
        ROUTES.into_iter().fold(RouteTable::new(), |table, route| {
            let sink = Rc::clone(&self.deliveries);
            table.with_route(route, move |payload, correlation_id| {
                sink.borrow_mut().push(Delivery {
                    route,
                    payload,
                    correlation_id: correlation_id.cloned(),
                });
            })
        })
    }

    fn orchestrator(&mut self) -> Result<&mut Orchestrator, String> {
        self.orchestrator
            .as_mut()
            .ok_or_else(|| String::from("the pool was never started"))
    }

    fn send(&mut self, request: &QueryRequest) -> StepResult {
        let receipt = self
            .orchestrator()?
            .dispatch(request)
            .map_err(|error| error.to_string())?;
        self.receipts.push(receipt);
        Ok(())
    }

    fn on_route(&self, route: &str) -> Vec<Delivery> {
        self.deliveries
            .borrow()
            .iter()
            .filter(|delivery| delivery.route == route)
            .cloned()
            .collect()
    }

    fn call(&self, route: &str, position: usize) -> Result<Delivery, String> {
        position
            .checked_sub(1)
            .and_then(|index| self.on_route(route).into_iter().nth(index))
            .ok_or_else(|| format!("route '{route}' has no call {position}"))
    }
}

impl Drop for DispatchWorld {
    fn drop(&mut self) {
        if let Some(orchestrator) = self.orchestrator.take() {
            drop(orchestrator.shutdown());
        }
    }
}

#[fixture]
fn world() -> RefCell<DispatchWorld> {
    RefCell::new(DispatchWorld::new())
}

#[given("a pool of {count} workers serving the test catalogue")]
fn given_pool(world: &RefCell<DispatchWorld>, count: usize) -> StepResult {
    let routes = world.borrow().routes();
    let orchestrator = Orchestrator::start(
        &PoolSettings::new(count, test_bootstrap()).with_grace_period(COMPLETION_TIMEOUT),
        &InThreadLauncher::new(),
        routes,
        Arc::new(RecordingReporter::default()),
    )
    .map_err(|error| error.to_string())?;
    world.borrow_mut().orchestrator = Some(orchestrator);
    Ok(())
}

#[given("a pool of {count} workers that ignore termination")]
fn given_stubborn_pool(world: &RefCell<DispatchWorld>, count: usize) -> StepResult {
    let launcher = StubbornLauncher::default();
    let routes = world.borrow().routes();
    let orchestrator = Orchestrator::start(
        &PoolSettings::new(count, test_bootstrap()).with_grace_period(STUBBORN_GRACE),
        &launcher,
        routes,
        Arc::new(RecordingReporter::default()),
    )
    .map_err(|error| error.to_string())?;
    let mut state = world.borrow_mut();
    state.orchestrator = Some(orchestrator);
    state.signals = Some(launcher.signals());
    Ok(())
}

#[when("{count} \"{name}\" requests are sent on route \"{route}\"")]
fn when_many_requests(
    world: &RefCell<DispatchWorld>,
    count: usize,
    name: String,
    route: String,
) -> StepResult {
    for _ in 0..count {
        world
            .borrow_mut()
            .send(&QueryRequest::new(name.as_str(), route.as_str()))?;
    }
    Ok(())
}

#[when("the query \"{name}\" is sent on route \"{route}\" with correlation {id}")]
fn when_query_with_correlation(
    world: &RefCell<DispatchWorld>,
    name: String,
    route: String,
    id: u64,
) -> StepResult {
    world
        .borrow_mut()
        .send(&QueryRequest::new(name, route).with_correlation_id(CorrelationId::from(id)))
}

#[when("the query \"{name}\" is sent on route \"{route}\" with parameter {value}")]
fn when_query_with_parameter(
    world: &RefCell<DispatchWorld>,
    name: String,
    route: String,
    value: i64,
) -> StepResult {
    let receipt = world
        .borrow_mut()
        .orchestrator()?
        .query(&name, &route, vec![Value::Integer(value)])
        .map_err(|error| error.to_string())?;
    world.borrow_mut().receipts.push(receipt);
    Ok(())
}

#[when("responses are pumped until every request completes")]
fn when_pumped_to_completion(world: &RefCell<DispatchWorld>) -> StepResult {
    let mut state = world.borrow_mut();
    let completed = state
        .orchestrator()?
        .pump_until(COMPLETION_TIMEOUT, |pool| pool.outstanding() == 0);
    if completed {
        Ok(())
    } else {
        Err(String::from("requests did not complete in time"))
    }
}

#[when("responses are pumped for {seconds} second")]
fn when_pumped_for(world: &RefCell<DispatchWorld>, seconds: u64) -> StepResult {
    let mut state = world.borrow_mut();
    let orchestrator = state.orchestrator()?;
    orchestrator.pump_until(Duration::from_secs(seconds), |_| false);
    Ok(())
}

#[when("the pool shuts down")]
fn when_pool_shuts_down(world: &RefCell<DispatchWorld>) -> StepResult {
    let mut state = world.borrow_mut();
    let orchestrator = state
        .orchestrator
        .take()
        .ok_or_else(|| String::from("the pool was never started"))?;
    state.report = Some(orchestrator.shutdown());
    Ok(())
}

#[then("the requests went to workers {order}")]
fn then_rotation_order(world: &RefCell<DispatchWorld>, order: String) {
    let expected: Vec<usize> = order
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty() && *token != "and")
        .map(|token| token.parse().expect("worker index"))
        .collect();
    let actual: Vec<usize> = world
        .borrow()
        .receipts
        .iter()
        .map(|receipt| receipt.handle_id().get())
        .collect();
    assert_eq!(actual, expected);
}

#[then("the handler for route \"{route}\" was called {count} times")]
fn then_call_count(world: &RefCell<DispatchWorld>, route: String, count: usize) {
    assert_eq!(world.borrow().on_route(&route).len(), count);
}

#[then("call {position} on route \"{route}\" delivered a row holding {value}")]
fn then_call_is_row(
    world: &RefCell<DispatchWorld>,
    position: usize,
    route: String,
    value: i64,
) -> StepResult {
    let delivery = world.borrow().call(&route, position)?;
    assert_eq!(
        delivery.payload,
        Payload::Row(Row::Positional(vec![Value::Integer(value)]))
    );
    Ok(())
}

#[then("call {position} on route \"{route}\" delivered EOF")]
fn then_call_is_eof(world: &RefCell<DispatchWorld>, position: usize, route: String) -> StepResult {
    let delivery = world.borrow().call(&route, position)?;
    assert!(delivery.payload.is_eof(), "expected EOF, got {delivery:?}");
    Ok(())
}

#[then("every call on route \"{route}\" carried correlation {id}")]
fn then_correlation_preserved(world: &RefCell<DispatchWorld>, route: String, id: u64) {
    let expected = Some(CorrelationId::from(id));
    let deliveries = world.borrow().on_route(&route);
    assert!(!deliveries.is_empty());
    assert!(
        deliveries
            .iter()
            .all(|delivery| delivery.correlation_id == expected)
    );
}

#[then("{count} request is still outstanding")]
fn then_outstanding(world: &RefCell<DispatchWorld>, count: usize) -> StepResult {
    let outstanding = world.borrow_mut().orchestrator()?.outstanding();
    assert_eq!(outstanding, count);
    Ok(())
}

#[then("the two requests went to different workers")]
fn then_different_workers(world: &RefCell<DispatchWorld>) {
    let handles: Vec<_> = world
        .borrow()
        .receipts
        .iter()
        .map(Dispatched::handle_id)
        .collect();
    assert_eq!(handles.len(), 2);
    assert_ne!(handles.first(), handles.last());
}

#[then("route \"{route}\" received the seeded names in order then EOF")]
fn then_seeded_names(world: &RefCell<DispatchWorld>, route: String) {
    let payloads: Vec<Payload> = world
        .borrow()
        .on_route(&route)
        .into_iter()
        .map(|delivery| delivery.payload)
        .collect();
    let mut expected: Vec<Payload> = SEEDED_NAMES
        .iter()
        .map(|name| Payload::Row(Row::Positional(vec![Value::from(*name)])))
        .collect();
    expected.push(Payload::Eof);
    assert_eq!(payloads, expected);
}

#[then("{graceful} workers exited gracefully and {killed} were killed")]
fn then_shutdown_report(
    world: &RefCell<DispatchWorld>,
    graceful: usize,
    killed: usize,
) -> StepResult {
    let report = world
        .borrow()
        .report
        .ok_or_else(|| String::from("the pool has not shut down"))?;
    assert_eq!(report.graceful(), graceful);
    assert_eq!(report.killed(), killed);
    Ok(())
}

#[then("every worker received TERMINATE and then KILL")]
fn then_escalated(world: &RefCell<DispatchWorld>) -> StepResult {
    let log = world
        .borrow()
        .signals
        .clone()
        .ok_or_else(|| String::from("no stubborn workers were launched"))?;
    let signals = log.lock().unwrap_or_else(PoisonError::into_inner).clone();
    let mut pids: Vec<u32> = signals.iter().map(|(pid, _)| *pid).collect();
    pids.sort_unstable();
    pids.dedup();
    assert!(!pids.is_empty());
    for pid in pids {
        let received: Vec<StopSignal> = signals
            .iter()
            .filter(|(target, _)| *target == pid)
            .map(|(_, signal)| *signal)
            .collect();
        assert_eq!(received, vec![StopSignal::Terminate, StopSignal::Kill]);
    }
    Ok(())
}

#[scenario(path = "tests/features/query_dispatch.feature")]
fn query_dispatch(#[from(world)] _: RefCell<DispatchWorld>) {}

#[scenario(path = "tests/features/pool_shutdown.feature")]
fn pool_shutdown(#[from(world)] _: RefCell<DispatchWorld>) {}
