//! Tests for chain replacement while runs are in flight.

use async_trait::async_trait;
use edgeflow::{
    Data, Envelope, Event, Flow, Input, PipelineContext, PipelineRuntime, TargetType, Transform,
    TransformChain, TransformRegistry,
};
use futures::future::join_all;
use std::sync::{Arc, Mutex};

/// Appends its generation to the text it receives.
struct Tag {
    generation: usize,
}

#[async_trait]
impl Transform for Tag {
    fn name(&self) -> &'static str {
        "tag"
    }

    async fn execute(&self, _ctx: &mut PipelineContext, input: Input) -> Flow {
        tokio::task::yield_now().await;
        let mut text = input
            .data()
            .and_then(Data::as_text)
            .unwrap_or_default()
            .to_string();
        text.push_str(&format!("{},", self.generation));
        Flow::Continue(Some(Data::Text(text)))
    }
}

/// Records the tags collected by one run.
struct Collect {
    runs: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Transform for Collect {
    fn name(&self) -> &'static str {
        "collect"
    }

    async fn execute(&self, _ctx: &mut PipelineContext, input: Input) -> Flow {
        let text = input.data().and_then(Data::as_text).unwrap_or_default();
        self.runs.lock().unwrap().push(text.to_string());
        Flow::Continue(None)
    }
}

fn generation(n: usize, runs: &Arc<Mutex<Vec<String>>>) -> TransformChain {
    vec![
        Arc::new(Tag { generation: n }),
        Arc::new(Tag { generation: n }),
        Arc::new(Tag { generation: n }),
        Arc::new(Collect { runs: runs.clone() }),
    ]
}

#[test]
fn test_snapshot_survives_replace() {
    let runs = Arc::default();
    let registry = TransformRegistry::new(generation(0, &runs));

    let before = registry.snapshot();
    registry.replace(vec![Arc::new(Tag { generation: 1 })]);
    let after = registry.snapshot();

    assert_eq!(before.len(), 4);
    assert_eq!(after.len(), 1);
    assert_eq!(registry.names(), vec!["tag"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_runs_never_see_mixed_generations() {
    let runs: Arc<Mutex<Vec<String>>> = Arc::default();
    let runtime = Arc::new(
        PipelineRuntime::new(TargetType::event()).with_transforms(generation(0, &runs)),
    );
    let envelope = Envelope::json(&Event::new("sensor")).unwrap();

    let mut handles = Vec::new();
    for _ in 0..64 {
        let runtime = runtime.clone();
        let envelope = envelope.clone();
        handles.push(tokio::spawn(async move {
            runtime.process_message(&envelope).await
        }));
    }

    let swapper = {
        let runtime = runtime.clone();
        let runs = runs.clone();
        tokio::spawn(async move {
            for n in 1..=32 {
                runtime.set_transforms(generation(n, &runs));
                tokio::task::yield_now().await;
            }
        })
    };

    for result in join_all(handles).await {
        result.unwrap().unwrap();
    }
    swapper.await.unwrap();

    let runs = runs.lock().unwrap();
    assert_eq!(runs.len(), 64);
    for run in runs.iter() {
        let tags: Vec<&str> = run.trim_end_matches(',').split(',').collect();
        assert_eq!(tags.len(), 3, "run saw a partial chain: {run}");
        assert!(
            tags.iter().all(|t| *t == tags[0]),
            "run mixed generations: {run}"
        );
    }
}

#[tokio::test]
async fn test_replace_does_not_affect_started_run() {
    let runs: Arc<Mutex<Vec<String>>> = Arc::default();
    let runtime = PipelineRuntime::new(TargetType::event()).with_transforms(generation(7, &runs));
    let envelope = Envelope::json(&Event::new("sensor")).unwrap();

    let mut ctx = PipelineContext::new("held");
    let snapshot = runtime.registry().snapshot();
    runtime.set_transforms(Vec::new());

    edgeflow::execute(&envelope, runtime.target_type(), &snapshot, &mut ctx)
        .await
        .unwrap();

    assert_eq!(*runs.lock().unwrap(), vec!["7,7,7,".to_string()]);
    assert!(runtime.registry().is_empty());
}
