//! Property tests for the wire layer.
//!
//! 1. Generated store keys are strictly increasing for any timestamp sequence.
//! 2. The live mirror agrees with a plain map under random put/patch/delete.
//! 3. The event-stream decoder yields the same events however the body is split.

#![allow(clippy::expect_used)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::Value;
use tarefas_proto::path::DataPath;
use tarefas_proto::push_id::{PUSH_ID_LEN, PushIdGenerator};
use tarefas_proto::stream::{EventDecoder, PathData, StreamEvent};
use tarefas_proto::task::{Task, TaskKey, TaskPatch};
use tarefas_proto::tree::TaskTree;

#[derive(Debug, Clone)]
enum Op {
    Put(String, Task),
    Patch(String, TaskPatch),
    Delete(String),
}

fn arb_key() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["-a", "-b", "-c", "-d"]).prop_map(String::from)
}

fn arb_task() -> impl Strategy<Value = Task> {
    (".{0,12}", ".{0,12}").prop_map(|(titulo, descricao)| Task::new(titulo, descricao))
}

fn arb_patch() -> impl Strategy<Value = TaskPatch> {
    (prop::option::of(".{0,12}"), prop::option::of(".{0,12}"))
        .prop_map(|(titulo, descricao)| TaskPatch { titulo, descricao })
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arb_key(), arb_task()).prop_map(|(k, t)| Op::Put(k, t)),
        (arb_key(), arb_patch()).prop_map(|(k, p)| Op::Patch(k, p)),
        arb_key().prop_map(Op::Delete),
    ]
}

fn event_for(op: &Op) -> StreamEvent {
    match op {
        Op::Put(key, task) => StreamEvent::Put(PathData::new(
            &DataPath::root().child(key),
            serde_json::to_value(task).expect("task serializes"),
        )),
        Op::Patch(key, patch) => StreamEvent::Patch(PathData::new(
            &DataPath::root().child(key),
            serde_json::to_value(patch).expect("patch serializes"),
        )),
        Op::Delete(key) => {
            StreamEvent::Put(PathData::new(&DataPath::root().child(key), Value::Null))
        }
    }
}

fn apply_model(model: &mut BTreeMap<TaskKey, Task>, op: &Op) {
    match op {
        Op::Put(key, task) => {
            model.insert(TaskKey::new(key.clone()), task.clone());
        }
        Op::Patch(key, patch) => {
            if patch.is_empty() {
                return;
            }
            model
                .entry(TaskKey::new(key.clone()))
                .or_default()
                .apply(patch);
        }
        Op::Delete(key) => {
            model.remove(&TaskKey::new(key.clone()));
        }
    }
}

proptest! {
    /// Keys never repeat and sort in generation order, even when the clock
    /// stalls or steps backwards.
    #[test]
    fn push_ids_strictly_increase(times in prop::collection::vec(0u64..5_000, 1..64)) {
        let mut generator = PushIdGenerator::new();
        let mut previous: Option<TaskKey> = None;
        for now in times {
            let key = generator.next_key_at(now);
            prop_assert_eq!(key.as_str().len(), PUSH_ID_LEN);
            if let Some(prev) = &previous {
                prop_assert!(&key > prev, "{} should sort after {}", key, prev);
            }
            previous = Some(key);
        }
    }

    /// Applying stream events to the mirror matches applying the same
    /// operations to an ordinary ordered map.
    #[test]
    fn mirror_matches_model(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut tree = TaskTree::new();
        let mut model = BTreeMap::new();
        for op in &ops {
            tree.apply(&event_for(op));
            apply_model(&mut model, op);
        }
        let snapshot = tree.snapshot();
        let mirrored: Vec<(&TaskKey, &Task)> = snapshot.iter().collect();
        let expected: Vec<(&TaskKey, &Task)> = model.iter().collect();
        prop_assert_eq!(mirrored, expected);
    }

    /// Splitting a body at arbitrary byte offsets never changes the decoded events.
    #[test]
    fn decoder_is_chunking_invariant(
        ops in prop::collection::vec(arb_op(), 1..8),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
    ) {
        let events: Vec<StreamEvent> = ops.iter().map(event_for).collect();
        let body: String = events.iter().map(StreamEvent::encode).collect();
        let bytes = body.as_bytes();

        let mut offsets: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
        offsets.push(0);
        offsets.push(bytes.len());
        offsets.sort_unstable();
        offsets.dedup();

        let mut decoder = EventDecoder::new();
        let mut decoded = Vec::new();
        for window in offsets.windows(2) {
            for event in decoder.push(&bytes[window[0]..window[1]]) {
                decoded.push(event.expect("well-formed frame decodes"));
            }
        }
        prop_assert_eq!(decoded, events);
    }
}
