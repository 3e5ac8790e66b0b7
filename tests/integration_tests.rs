//! End-to-end scheduler scenarios that don't fit naturally as unit tests: these
//! exercise real wall-clock concurrency and graph rewiring between two separate
//! `execute()` calls on the same `Graph`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dataflow_graph::{DataFlowMode, Graph, Node};

/// One `Source` fans out (push) to three `Worker`s, each sleeping 100ms, all
/// feeding into a single `Sink`. At `max_concurrency = 3` the three workers run
/// concurrently, so end-to-end wall time should sit close to a single 100ms
/// sleep rather than the sum of three.
#[tokio::test]
async fn parallel_workers_run_concurrently_under_the_concurrency_budget() {
    let graph = Graph::builder().max_concurrency(3).build();

    graph
        .add_node(
            Node::from_fn("source", |ctx| Box::pin(async move { ctx.set_output("out", 1).await }))
                .add_output_endpoint("out", DataFlowMode::Push),
        )
        .unwrap();

    for worker in ["w1", "w2", "w3"] {
        graph
            .add_node(
                Node::from_fn(worker, |ctx| {
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        let n: i64 = ctx.get_input("in").unwrap_or(0);
                        ctx.set_output("out", n).await
                    })
                })
                .add_input_endpoint("in", DataFlowMode::Push)
                .add_output_endpoint("out", DataFlowMode::Push),
            )
            .unwrap();
        graph.connect("source", "out", worker, "in").unwrap();
    }

    let received = Arc::new(AtomicI64::new(0));
    graph
        .add_node(
            Node::from_fn("sink", {
                let received = received.clone();
                move |ctx| {
                    let received = received.clone();
                    Box::pin(async move {
                        let n: i64 = ctx.get_input("in").unwrap_or(0);
                        received.fetch_add(n, Ordering::SeqCst);
                        Ok(())
                    })
                }
            })
            .add_input_endpoint("in", DataFlowMode::Push),
        )
        .unwrap();
    for worker in ["w1", "w2", "w3"] {
        graph.connect(worker, "out", "sink", "in").unwrap();
    }

    let start = Instant::now();
    graph.execute().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(received.load(Ordering::SeqCst), 3);
    assert!(elapsed >= Duration::from_millis(100), "workers should not finish instantly: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(250), "workers should overlap, not serialize: {elapsed:?}");
}

/// `Source(100) -> Sink` is wired, then torn down before ever being executed:
/// the edge is removed, a `Transform(x -> x * 3)` node is added, and
/// `Source -> Transform -> Sink` is reconnected. A single `execute()` call
/// should then carry `100` through the transform to the sink as `300`.
#[tokio::test]
async fn rewiring_a_graph_before_execution_reaches_the_new_topology() {
    let graph = Graph::default();

    graph
        .add_node(
            Node::from_fn("source", |ctx| Box::pin(async move { ctx.set_output("out", 100).await }))
                .add_output_endpoint("out", DataFlowMode::Push),
        )
        .unwrap();

    let collected = Arc::new(Mutex::new(Vec::new()));
    graph
        .add_node(
            Node::from_fn("sink", {
                let collected = collected.clone();
                move |ctx| {
                    let collected = collected.clone();
                    Box::pin(async move {
                        let n: i64 = ctx.get_input("in").unwrap_or(0);
                        collected.lock().unwrap().push(n);
                        Ok(())
                    })
                }
            })
            .add_input_endpoint("in", DataFlowMode::Push),
        )
        .unwrap();

    let direct_edge = graph.connect("source", "out", "sink", "in").unwrap();
    graph.remove_edge(&direct_edge).unwrap();

    graph
        .add_node(
            Node::from_fn("transform", |ctx| {
                Box::pin(async move {
                    let n: i64 = ctx.get_input("in").unwrap_or(0);
                    ctx.set_output("out", n * 3).await
                })
            })
            .add_input_endpoint("in", DataFlowMode::Push)
            .add_output_endpoint("out", DataFlowMode::Push),
        )
        .unwrap();
    graph.connect("source", "out", "transform", "in").unwrap();
    graph.connect("transform", "out", "sink", "in").unwrap();

    graph.execute().await.unwrap();

    assert_eq!(*collected.lock().unwrap(), vec![300]);
}

/// A push endpoint with two downstream edges delivers the same value to both
/// consumers (fan-out is a broadcast, not a queue split).
#[tokio::test]
async fn push_fan_out_delivers_to_every_connected_consumer() {
    let graph = Graph::default();

    graph
        .add_node(
            Node::from_fn("source", |ctx| Box::pin(async move { ctx.set_output("out", 7).await }))
                .add_output_endpoint("out", DataFlowMode::Push),
        )
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    for id in ["a", "b"] {
        graph
            .add_node(
                Node::from_fn(id, {
                    let seen = seen.clone();
                    move |ctx| {
                        let seen = seen.clone();
                        Box::pin(async move {
                            let n: i64 = ctx.get_input("in").unwrap_or(0);
                            seen.lock().unwrap().push(n);
                            Ok(())
                        })
                    }
                })
                .add_input_endpoint("in", DataFlowMode::Push),
            )
            .unwrap();
        graph.connect("source", "out", id, "in").unwrap();
    }

    graph.execute().await.unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec![7, 7]);
}
